#![allow(dead_code)]

use alterproj::{InMemoryData, Loss, Minibatch, Model, ParamView, ParameterSet, Scalar};
use ndarray::{arr0, arr1, Array1, Array2, ArrayD, ArrayViewD};

/// ℓ = (w·x − y)², no bias.
pub struct LinearSquared;

impl Loss for LinearSquared {
    fn loss<T: Scalar<Float = f64>>(
        &self,
        p: &ParamView<'_, T>,
        x: ArrayViewD<'_, f64>,
        y: ArrayViewD<'_, f64>,
    ) -> T {
        let r = LinearSquared.forward(p, x)[0] - T::from_f(y[[0]]);
        r * r
    }
}

impl Model for LinearSquared {
    fn forward<T: Scalar<Float = f64>>(&self, p: &ParamView<'_, T>, x: ArrayViewD<'_, f64>) -> Vec<T> {
        let w = p.slice("w");
        let mut acc = T::zero();
        for (wi, &xi) in w.iter().zip(x.iter()) {
            acc += *wi * T::from_f(xi);
        }
        vec![acc]
    }
}

/// One hidden tanh layer, scalar output, squared error.
pub struct TanhMlp;

impl Model for TanhMlp {
    fn forward<T: Scalar<Float = f64>>(&self, p: &ParamView<'_, T>, x: ArrayViewD<'_, f64>) -> Vec<T> {
        let w1 = p.tensor("w1");
        let b1 = p.slice("b1");
        let w2 = p.slice("w2");
        let mut out = p.scalar("b2");
        for (h, (&bh, &vh)) in b1.iter().zip(w2).enumerate() {
            let mut pre = bh;
            for (d, &xd) in x.iter().enumerate() {
                pre += w1[[h, d]] * T::from_f(xd);
            }
            out += vh * pre.tanh();
        }
        vec![out]
    }
}

impl Loss for TanhMlp {
    fn loss<T: Scalar<Float = f64>>(
        &self,
        p: &ParamView<'_, T>,
        x: ArrayViewD<'_, f64>,
        y: ArrayViewD<'_, f64>,
    ) -> T {
        let r = self.forward(p, x)[0] - T::from_f(y[[0]]);
        r * r
    }
}

/// Deterministic, irregular values in roughly `[-1, 1]`.
pub fn wiggle(i: usize) -> f64 {
    ((i as f64 + 1.0) * 0.7548776662466927).fract() * 2.0 - 1.0
}

/// Hidden width 3, input dimension 2: 13 parameters.
pub fn mlp_params() -> ParameterSet {
    ParameterSet::new()
        .with(
            "w1",
            Array2::from_shape_fn((3, 2), |(h, d)| wiggle(2 * h + d)).into_dyn(),
        )
        .with("b1", Array1::from_shape_fn(3, |h| 0.1 * wiggle(10 + h)).into_dyn())
        .with("w2", Array1::from_shape_fn(3, |h| wiggle(20 + h)).into_dyn())
        .with("b2", arr0(0.05).into_dyn())
}

/// `n` inputs in 2-d with noisy sine targets.
pub fn mlp_arrays(n: usize) -> (ArrayD<f64>, ArrayD<f64>) {
    let x = Array2::from_shape_fn((n, 2), |(i, d)| wiggle(31 * i + 7 * d));
    let y = Array2::from_shape_fn((n, 1), |(i, _)| (2.0 * x[[i, 0]]).sin() + 0.1 * wiggle(97 + i));
    (x.into_dyn(), y.into_dyn())
}

pub fn mlp_data(n: usize, batch_size: usize) -> InMemoryData {
    let (x, y) = mlp_arrays(n);
    InMemoryData::from_arrays(x, y, batch_size).expect("valid arrays")
}

/// Two single-example batches in 3-d whose loss null spaces are
/// `{v₀ = 0}` and `{v₀ + v₁ = 0}`; their intersection is the `v₂` axis.
pub fn two_plane_data() -> InMemoryData {
    let batch = |x: [f64; 3]| {
        Minibatch::new(
            Array2::from_shape_vec((1, 3), x.to_vec()).expect("shape").into_dyn(),
            Array2::zeros((1, 1)).into_dyn(),
        )
        .expect("valid batch")
    };
    InMemoryData::new(vec![batch([1.0, 0.0, 0.0]), batch([1.0, 1.0, 0.0])])
}

pub fn linear_params(w: [f64; 3]) -> ParameterSet {
    ParameterSet::new().with("w", arr1(&w).into_dyn())
}
