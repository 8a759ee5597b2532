//! Gaussian prior draws over parameter space.

use ndarray::ArrayD;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::error::Result;
use crate::params::ParameterSet;

/// Prior precision (inverse variance), global or per entry.
///
/// Values must be strictly positive; nothing here checks that, and a zero or
/// negative precision yields non-finite draws.
#[derive(Clone, Debug, PartialEq)]
pub enum Precision {
    Scalar(f64),
    PerEntry(ParameterSet),
}

impl From<f64> for Precision {
    fn from(tau: f64) -> Self {
        Precision::Scalar(tau)
    }
}

impl From<ParameterSet> for Precision {
    fn from(tau: ParameterSet) -> Self {
        Precision::PerEntry(tau)
    }
}

fn standard_normal<R: Rng + ?Sized>(rng: &mut R, shape: &[usize]) -> ArrayD<f64> {
    ArrayD::from_shape_simple_fn(shape, || StandardNormal.sample(rng))
}

/// One draw shaped like `template`, entry `i` ~ `N(0, 1/precision_i)`.
///
/// `template` contributes only names and shapes.
pub fn draw<R: Rng + ?Sized>(
    rng: &mut R,
    template: &ParameterSet,
    precision: &Precision,
) -> Result<ParameterSet> {
    match precision {
        Precision::Scalar(tau) => {
            let sd = 1.0 / tau.sqrt();
            Ok(template
                .iter()
                .map(|(name, t)| (name.to_string(), standard_normal(rng, t.shape()) * sd))
                .collect())
        }
        Precision::PerEntry(tau) => {
            template.check_compatible(tau)?;
            Ok(tau
                .iter()
                .map(|(name, tau_t)| {
                    let mut z = standard_normal(rng, tau_t.shape());
                    z.zip_mut_with(tau_t, |zi, &ti| *zi /= ti.sqrt());
                    (name.to_string(), z)
                })
                .collect())
        }
    }
}

/// `n` independent draws.
pub fn draw_many<R: Rng + ?Sized>(
    rng: &mut R,
    template: &ParameterSet,
    precision: &Precision,
    n: usize,
) -> Result<Vec<ParameterSet>> {
    (0..n).map(|_| draw(rng, template, precision)).collect()
}

/// `n` draws stacked along a new leading sample axis when `n > 1`; a single
/// draw keeps the template's shapes.
pub fn draw_stacked<R: Rng + ?Sized>(
    rng: &mut R,
    template: &ParameterSet,
    precision: &Precision,
    n: usize,
) -> Result<ParameterSet> {
    let draws = draw_many(rng, template, precision, n)?;
    if n == 1 {
        return Ok(draws.into_iter().next().unwrap_or_default());
    }
    ParameterSet::stack(&draws)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr0, arr1, Array2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn template() -> ParameterSet {
        ParameterSet::new()
            .with("w", Array2::zeros((2, 3)).into_dyn())
            .with("b", arr1(&[0.0, 0.0]).into_dyn())
    }

    #[test]
    fn draws_follow_template_shapes() {
        let mut rng = StdRng::seed_from_u64(1);
        let d = draw(&mut rng, &template(), &Precision::Scalar(4.0)).unwrap();
        template().check_compatible(&d).unwrap();
        assert!(d.is_finite());

        let stacked = draw_stacked(&mut rng, &template(), &4.0.into(), 5).unwrap();
        assert_eq!(stacked.get("w").unwrap().shape(), &[5, 2, 3]);
        assert_eq!(stacked.unstack().unwrap().len(), 5);
    }

    #[test]
    fn seeded_draws_are_reproducible() {
        let a = draw(&mut StdRng::seed_from_u64(9), &template(), &1.0.into()).unwrap();
        let b = draw(&mut StdRng::seed_from_u64(9), &template(), &1.0.into()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn per_entry_precision_scales_each_entry() {
        let t = ParameterSet::new().with("a", arr0(0.0).into_dyn()).with("b", arr0(0.0).into_dyn());
        let tau = ParameterSet::new()
            .with("a", arr0(1.0).into_dyn())
            .with("b", arr0(1e8).into_dyn());
        let mut rng = StdRng::seed_from_u64(3);
        let draws = draw_many(&mut rng, &t, &tau.into(), 200).unwrap();
        let max_b = draws
            .iter()
            .map(|d| d.get("b").unwrap().iter().next().unwrap().abs())
            .fold(0.0, f64::max);
        let max_a = draws
            .iter()
            .map(|d| d.get("a").unwrap().iter().next().unwrap().abs())
            .fold(0.0, f64::max);
        assert!(max_b < 1e-3);
        assert!(max_a > 0.5);
    }

    #[test]
    fn per_entry_precision_must_match_template() {
        let tau = ParameterSet::new().with("w", arr1(&[1.0]).into_dyn());
        let mut rng = StdRng::seed_from_u64(0);
        assert!(draw(&mut rng, &template(), &tau.into()).is_err());
    }
}
