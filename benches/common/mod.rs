#![allow(dead_code)]

use alterproj::{InMemoryData, Loss, ParamView, ParameterSet, Scalar};
use ndarray::{arr0, Array1, Array2, ArrayViewD};

// ─── Two-layer tanh regressor ──────────────────────────────────────────────
// ℓ = (w2·tanh(W1 x + b1) + b2 − y)², width and input size chosen per bench.

pub struct Mlp;

impl Loss for Mlp {
    fn loss<T: Scalar<Float = f64>>(
        &self,
        p: &ParamView<'_, T>,
        x: ArrayViewD<'_, f64>,
        y: ArrayViewD<'_, f64>,
    ) -> T {
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
        let r = out - T::from_f(y[[0]]);
        r * r
    }
}

fn wiggle(i: usize) -> f64 {
    ((i as f64 + 1.0) * 0.7548776662466927).fract() * 2.0 - 1.0
}

pub fn mlp_params(hidden: usize, input: usize) -> ParameterSet {
    ParameterSet::new()
        .with(
            "w1",
            Array2::from_shape_fn((hidden, input), |(h, d)| wiggle(h * input + d) / (input as f64).sqrt())
                .into_dyn(),
        )
        .with("b1", Array1::from_shape_fn(hidden, |h| 0.1 * wiggle(7 * h + 3)).into_dyn())
        .with("w2", Array1::from_shape_fn(hidden, |h| wiggle(11 * h + 5)).into_dyn())
        .with("b2", arr0(0.0).into_dyn())
}

pub fn mlp_data(n: usize, input: usize, batch_size: usize) -> InMemoryData {
    let x = Array2::from_shape_fn((n, input), |(i, d)| wiggle(31 * i + d));
    let y = Array2::from_shape_fn((n, 1), |(i, _)| x[[i, 0]].sin());
    InMemoryData::from_arrays(x.into_dyn(), y.into_dyn(), batch_size).expect("valid arrays")
}
