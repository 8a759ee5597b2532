//! Batch curvature `JJᵗ` and its Moore–Penrose pseudo-inverse.

use nalgebra::DMatrix;

use crate::batched::BatchedLoss;
use crate::data::Minibatch;
use crate::error::{Result, SamplerError};
use crate::loss::Loss;
use crate::params::ParameterSet;

/// `B × B` matrix `JJᵗ` of per-example loss gradients for one batch.
///
/// Each parameter tensor contributes the Gram matrix of its own block of
/// Jacobian columns; the blocks partition the flat parameter axis, so the sum
/// over tensors is the full inner product. The result is symmetrised to remove
/// rounding asymmetry.
pub fn batch_jjt<L: Loss>(f: &BatchedLoss<'_, L>, batch: &Minibatch) -> DMatrix<f64> {
    let jac = f.jacobian(batch);
    let b = batch.len();
    let mut jjt = DMatrix::zeros(b, b);
    for entry in f.layout().entries() {
        if entry.is_empty() {
            continue;
        }
        let block = jac.columns(entry.offset, entry.len());
        jjt.gemm(1.0, &block, &block.transpose(), 1.0);
    }
    (&jjt + jjt.transpose()) * 0.5
}

/// [`batch_jjt`] for a loss and parameter set given directly.
pub fn batched_jjt<L: Loss>(loss: &L, params: &ParameterSet, batch: &Minibatch) -> DMatrix<f64> {
    batch_jjt(&BatchedLoss::new(loss, params), batch)
}

/// Default relative cutoff for a `rows × cols` matrix: `max(rows, cols)·ε`.
pub fn default_rtol(rows: usize, cols: usize) -> f64 {
    rows.max(cols) as f64 * f64::EPSILON
}

/// Moore–Penrose pseudo-inverse via SVD.
///
/// Singular values at or below `rtol · σ_max` are treated as zero, so a rank
/// deficient `JJᵗ` leaves its own null directions unconstrained instead of
/// failing. `batch` only labels errors.
pub fn pseudo_inverse(m: &DMatrix<f64>, rtol: Option<f64>, batch: usize) -> Result<DMatrix<f64>> {
    if m.iter().any(|x| !x.is_finite()) {
        return Err(SamplerError::PseudoInverse {
            batch,
            reason: "curvature matrix has non-finite entries".into(),
        });
    }
    let rtol = rtol.unwrap_or_else(|| default_rtol(m.nrows(), m.ncols()));
    let svd = m
        .clone()
        .try_svd(true, true, f64::EPSILON, 0)
        .ok_or_else(|| SamplerError::PseudoInverse {
            batch,
            reason: "SVD did not converge".into(),
        })?;
    let sigma_max = svd.singular_values.iter().copied().fold(0.0, f64::max);
    svd.pseudo_inverse(rtol * sigma_max)
        .map_err(|reason| SamplerError::PseudoInverse {
            batch,
            reason: reason.to_string(),
        })
}
