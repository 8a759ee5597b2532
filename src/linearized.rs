//! First-order (tangent-space) model evaluation around a reference point.
//!
//! `f_lin(x; θ₁) = f(x; θ₀) + J_f(x; θ₀)·(θ₁ − θ₀)`, with the second term
//! propagated as a tangent in one forward pass rather than differenced.

use ndarray::ArrayViewD;

use crate::api::jvp;
use crate::error::{Result, SamplerError};
use crate::loss::Model;
use crate::params::{ParamView, ParameterSet};
use crate::sampler::PosteriorSample;

/// Evaluate the model linearised at `param0` at the point `param1`.
pub fn linearized_predict<M: Model>(
    model: &M,
    param0: &ParameterSet,
    param1: &ParameterSet,
    x: ArrayViewD<'_, f64>,
) -> Result<Vec<f64>> {
    let delta = param1.sub(param0)?;
    linearized_offset(model, param0, &delta, x)
}

/// `f(x; θ₀) + J·δ` for a deviation `δ` shaped like `param0`.
pub fn linearized_offset<M: Model>(
    model: &M,
    param0: &ParameterSet,
    delta: &ParameterSet,
    x: ArrayViewD<'_, f64>,
) -> Result<Vec<f64>> {
    let layout = param0.layout();
    delta.check_layout(&layout)?;
    let (y0, jd) = jvp(
        |p| model.forward(&ParamView::new(&layout, p), x.view()),
        &param0.flatten(),
        &delta.flatten(),
    );
    Ok(y0.iter().zip(jd).map(|(a, b)| a + b).collect())
}

/// Per-output mean and standard deviation of an ensemble of predictions.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictiveSummary {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

/// Linearised posterior predictive at `x` over posterior samples drawn
/// around `param0`.
///
/// The standard deviation uses the population (`1/n`) normalisation.
pub fn predictive_summary<M: Model>(
    model: &M,
    param0: &ParameterSet,
    samples: &[PosteriorSample],
    x: ArrayViewD<'_, f64>,
) -> Result<PredictiveSummary> {
    if samples.is_empty() {
        return Err(SamplerError::ShapeMismatch(
            "predictive summary needs at least one sample".into(),
        ));
    }
    let preds = samples
        .iter()
        .map(|s| linearized_offset(model, param0, &s.params, x.view()))
        .collect::<Result<Vec<_>>>()?;

    let n = preds.len() as f64;
    let dim = preds[0].len();
    let mean: Vec<f64> = (0..dim)
        .map(|j| preds.iter().map(|p| p[j]).sum::<f64>() / n)
        .collect();
    let std = (0..dim)
        .map(|j| {
            let var = preds.iter().map(|p| (p[j] - mean[j]).powi(2)).sum::<f64>() / n;
            var.sqrt()
        })
        .collect();
    Ok(PredictiveSummary { mean, std })
}
