use crate::dual::Dual;
use crate::float::Float;
use crate::reverse::Reverse;
use crate::tape::{Tape, TapeGuard, TapeThreadLocal, CONSTANT};

/// Jacobian-vector product (forward mode): `(f(x), J·v)` in one pass.
///
/// # Panics
///
/// Panics if `x` and `v` differ in length.
///
/// ```
/// let (y, jv) = alterproj::jvp(|p| vec![p[0] * p[1]], &[2.0, 3.0], &[1.0, 0.0]);
/// assert_eq!(y, vec![6.0]);
/// assert_eq!(jv, vec![3.0]);
/// ```
pub fn jvp<F: Float>(f: impl FnOnce(&[Dual<F>]) -> Vec<Dual<F>>, x: &[F], v: &[F]) -> (Vec<F>, Vec<F>) {
    assert_eq!(x.len(), v.len(), "x and v must have the same length");
    let inputs: Vec<Dual<F>> = x
        .iter()
        .zip(v.iter())
        .map(|(&xi, &vi)| Dual::new(xi, vi))
        .collect();
    let outputs = f(&inputs);
    outputs.iter().map(|d| (d.re, d.eps)).unzip()
}

/// Vector-Jacobian product (reverse mode): `(f(x), wᵀ·J)` with one sweep.
///
/// # Panics
///
/// Panics if the number of outputs differs from `w.len()`.
pub fn vjp<F: TapeThreadLocal>(
    f: impl FnOnce(&[Reverse<F>]) -> Vec<Reverse<F>>,
    x: &[F],
    w: &[F],
) -> (Vec<F>, Vec<F>) {
    let mut tape = Tape::with_capacity(x.len() * 10);
    let inputs: Vec<Reverse<F>> = x
        .iter()
        .map(|&val| Reverse::from_tape(val, tape.new_input()))
        .collect();

    let outputs = {
        let _guard = TapeGuard::new(&mut tape);
        f(&inputs)
    };
    assert_eq!(
        outputs.len(),
        w.len(),
        "output length must match weight vector length"
    );

    let values: Vec<F> = outputs.iter().map(|r| r.value).collect();
    let seeds: Vec<(u32, F)> = outputs
        .iter()
        .zip(w.iter())
        .filter(|(r, _)| r.index != CONSTANT)
        .map(|(r, &wi)| (r.index, wi))
        .collect();
    (values, tape.reverse_seeded(&seeds))
}

/// Gradient of a scalar function via reverse mode.
///
/// ```
/// let g = alterproj::grad(|x| x[0] * x[0] + x[1] * x[1], &[3.0_f64, 4.0]);
/// assert!((g[0] - 6.0).abs() < 1e-12);
/// assert!((g[1] - 8.0).abs() < 1e-12);
/// ```
pub fn grad<F: TapeThreadLocal>(f: impl FnOnce(&[Reverse<F>]) -> Reverse<F>, x: &[F]) -> Vec<F> {
    let (_, g) = vjp(|v| vec![f(v)], x, &[F::one()]);
    g
}
