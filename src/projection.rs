//! Projection onto the null space of one batch's loss Jacobian.
//!
//! `Proj(v) = (I − Jᵗ M⁻¹ J) v` with `M⁻¹ = pinv(JJᵗ)` taken from the inverse
//! cache. Only the forward product `Jv`, a `B × B` mat-vec and the reverse
//! product `Jᵗw` are evaluated; neither `J` nor any `P × P` operator is formed.

use nalgebra::{DMatrix, DVector};

use crate::batched::BatchedLoss;
use crate::data::Minibatch;
use crate::error::{Result, SamplerError};
use crate::loss::Loss;
use crate::params::ParameterSet;

pub struct NullSpaceProjector<'a, L> {
    batched: BatchedLoss<'a, L>,
}

impl<'a, L: Loss> NullSpaceProjector<'a, L> {
    /// Projector for `loss` linearised at `params`.
    pub fn new(loss: &'a L, params: &ParameterSet) -> Self {
        NullSpaceProjector {
            batched: BatchedLoss::new(loss, params),
        }
    }

    pub fn batched(&self) -> &BatchedLoss<'a, L> {
        &self.batched
    }

    /// Project a parameter set. The result has the names and shapes of `v`.
    pub fn project(
        &self,
        v: &ParameterSet,
        batch: &Minibatch,
        inv: &DMatrix<f64>,
    ) -> Result<ParameterSet> {
        v.check_layout(self.batched.layout())?;
        let out = self.project_flat(&v.flatten(), batch, inv)?;
        ParameterSet::from_flat(self.batched.layout(), &out)
    }

    /// Project a flat parameter vector laid out like the reference parameters.
    pub fn project_flat(&self, v: &[f64], batch: &Minibatch, inv: &DMatrix<f64>) -> Result<Vec<f64>> {
        let correction = self.correction(v, batch, inv)?;
        Ok(v.iter().zip(correction).map(|(vi, ci)| vi - ci).collect())
    }

    /// `Jᵗ M⁻¹ J v`: the component of `v` that the batch constrains.
    pub fn correction(&self, v: &[f64], batch: &Minibatch, inv: &DMatrix<f64>) -> Result<Vec<f64>> {
        let p = self.batched.layout().num_params();
        if v.len() != p {
            return Err(SamplerError::ShapeMismatch(format!(
                "candidate has {} entries, parameters have {p}",
                v.len()
            )));
        }
        let b = batch.len();
        if inv.shape() != (b, b) {
            return Err(SamplerError::CacheMismatch(format!(
                "cached inverse is {}x{}, batch has {b} examples",
                inv.nrows(),
                inv.ncols()
            )));
        }

        let jv = DVector::from_vec(self.batched.jvp(batch, v));
        let w = inv * jv;
        Ok(self.batched.vjp(batch, w.as_slice()))
    }

    /// `Jv` for a parameter set; approximately zero for projected candidates.
    pub fn residual(&self, v: &ParameterSet, batch: &Minibatch) -> Result<Vec<f64>> {
        v.check_layout(self.batched.layout())?;
        Ok(self.batched.jvp(batch, &v.flatten()))
    }
}

/// One-shot projection of `v` for `loss` linearised at `params`.
pub fn project<L: Loss>(
    loss: &L,
    params: &ParameterSet,
    v: &ParameterSet,
    batch: &Minibatch,
    inv: &DMatrix<f64>,
) -> Result<ParameterSet> {
    NullSpaceProjector::new(loss, params).project(v, batch, inv)
}
