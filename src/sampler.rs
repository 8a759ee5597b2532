//! Alternating-projection sampler for the loss-projected posterior.
//!
//! A prior draw is swept repeatedly over all batches, each step projecting the
//! running candidate onto the null space of that batch's loss Jacobian. The
//! iterates converge to the projection of the draw onto the intersection of
//! all batch null spaces.
//!
//! References:
//! - Miani, Roy, Hauberg. *Bayes without Underfitting: Fully Correlated Deep
//!   Learning Posteriors via Alternating Projections*, arXiv:2410.16901.
//! - Roy et al. *Reparameterization invariance in approximate Bayesian
//!   inference*, arXiv:2406.03334.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::cache::{CacheKey, CacheStore, InverseCache};
use crate::config::SamplerConfig;
use crate::data::DataSource;
use crate::error::{Result, SamplerError};
use crate::loss::Loss;
use crate::params::ParameterSet;
use crate::prior::{self, Precision};
use crate::projection::NullSpaceProjector;

/// A projected prior draw.
#[derive(Clone, Debug, PartialEq)]
pub struct PosteriorSample {
    /// Deviation from the reference parameters, in the intersection of the
    /// batch null spaces.
    pub params: ParameterSet,
    /// Epochs actually run.
    pub epochs: usize,
    /// Relative change of the candidate in each epoch.
    pub deltas: Vec<f64>,
    /// Whether the tolerance was met before `max_epochs`.
    pub converged: bool,
}

impl PosteriorSample {
    /// `reference + params`: a parameter point drawn from the posterior.
    pub fn params_around(&self, reference: &ParameterSet) -> Result<ParameterSet> {
        reference.add(&self.params)
    }
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

fn relative_change(prev: &[f64], next: &[f64]) -> f64 {
    let diff = prev
        .iter()
        .zip(next)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt();
    diff / norm(prev).max(f64::MIN_POSITIVE)
}

/// Sampler with no cache yet.
#[derive(Clone, Debug, Default)]
pub struct AlternatingProjection {
    config: SamplerConfig,
}

impl AlternatingProjection {
    pub fn new(config: SamplerConfig) -> Result<Self> {
        config.validate()?;
        Ok(AlternatingProjection { config })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Load or build the inverse cache for `(loss, params, data)`.
    pub fn prepare<'a, L: Loss, D: DataSource>(
        &self,
        loss: &'a L,
        params: &ParameterSet,
        data: &'a D,
    ) -> Result<PreparedSampler<'a, L, D>> {
        let projector = NullSpaceProjector::new(loss, params);
        let key = CacheKey::new(loss, params, data).with_pinv_rtol(self.config.pinv_rtol);
        let store = self.config.cache_dir.as_ref().map(|dir| CacheStore::new(dir.clone()));
        let cache = InverseCache::load_or_build(
            store.as_ref(),
            projector.batched(),
            data,
            key,
            self.config.progress,
        )?;
        Ok(PreparedSampler {
            config: self.config.clone(),
            template: params.clone(),
            projector,
            data,
            cache,
        })
    }
}

/// Sampler whose inverse cache is ready. Sampling only reads the cache, so
/// `sample` can be called any number of times.
pub struct PreparedSampler<'a, L, D> {
    config: SamplerConfig,
    template: ParameterSet,
    projector: NullSpaceProjector<'a, L>,
    data: &'a D,
    cache: InverseCache,
}

impl<'a, L: Loss, D: DataSource> PreparedSampler<'a, L, D> {
    pub fn cache(&self) -> &InverseCache {
        &self.cache
    }

    pub fn projector(&self) -> &NullSpaceProjector<'a, L> {
        &self.projector
    }

    /// Draw `n` posterior samples, seeding the prior from the config.
    ///
    /// With a fixed `seed`, repeated calls return the same samples.
    pub fn sample(&self, n: usize, precision: &Precision) -> Result<Vec<PosteriorSample>> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        self.sample_with_rng(n, precision, &mut rng)
    }

    pub fn sample_with_rng<R: Rng + ?Sized>(
        &self,
        n: usize,
        precision: &Precision,
        rng: &mut R,
    ) -> Result<Vec<PosteriorSample>> {
        let priors = prior::draw_many(rng, &self.template, precision, n)?;
        tracing::info!(
            samples = n,
            batches = self.cache.len(),
            max_epochs = self.config.max_epochs,
            "Projecting prior samples"
        );

        #[cfg(feature = "parallel")]
        let samples: Result<Vec<PosteriorSample>> = if self.config.parallel_samples {
            priors
                .into_par_iter()
                .enumerate()
                .map(|(i, p)| self.project_sample(i, &p))
                .collect()
        } else {
            priors
                .iter()
                .enumerate()
                .map(|(i, p)| self.project_sample(i, p))
                .collect()
        };
        #[cfg(not(feature = "parallel"))]
        let samples: Result<Vec<PosteriorSample>> = priors
            .iter()
            .enumerate()
            .map(|(i, p)| self.project_sample(i, p))
            .collect();

        let samples = samples?;
        tracing::info!(
            samples = samples.len(),
            converged = samples.iter().filter(|s| s.converged).count(),
            "Posterior sampling complete"
        );
        Ok(samples)
    }

    /// Sweep one starting point until the tolerance or `max_epochs` is hit.
    /// `index` only labels logs and errors.
    pub fn project_sample(&self, index: usize, start: &ParameterSet) -> Result<PosteriorSample> {
        let layout = self.projector.batched().layout();
        start.check_layout(layout)?;

        let mut v = start.flatten();
        let mut deltas = Vec::with_capacity(self.config.max_epochs);
        let mut converged = false;

        for epoch in 1..=self.config.max_epochs {
            let prev = v.clone();
            self.sweep(&mut v)?;
            let change = relative_change(&prev, &v);
            tracing::debug!(sample = index, epoch, change, "Alternating projection epoch");
            deltas.push(change);
            if !change.is_finite() {
                break;
            }
            if self.config.tolerance > 0.0 && change < self.config.tolerance {
                converged = true;
                break;
            }
        }

        let epochs = deltas.len();
        if v.iter().any(|x| !x.is_finite()) {
            return Err(SamplerError::NonFinite {
                sample: index,
                epochs,
            });
        }
        if !converged && self.config.tolerance > 0.0 {
            tracing::warn!(
                sample = index,
                epochs,
                last_change = deltas.last().copied().unwrap_or(f64::NAN),
                tolerance = self.config.tolerance,
                "Sample did not reach tolerance within max_epochs"
            );
        }

        Ok(PosteriorSample {
            params: ParameterSet::from_flat(layout, &v)?,
            epochs,
            deltas,
            converged,
        })
    }

    /// One epoch: project onto every batch's null space in data order.
    fn sweep(&self, v: &mut Vec<f64>) -> Result<()> {
        let mut count = 0;
        for (k, batch) in self.data.batches().enumerate() {
            let inv = self.cache.get(k).ok_or_else(|| {
                SamplerError::CacheMismatch(format!(
                    "data source yielded batch {k}, cache holds {} entries",
                    self.cache.len()
                ))
            })?;
            *v = self.projector.project_flat(v, &batch, inv)?;
            count += 1;
        }
        if count != self.cache.len() {
            return Err(SamplerError::CacheMismatch(format!(
                "data source yielded {count} batches, cache holds {}",
                self.cache.len()
            )));
        }
        Ok(())
    }
}

/// Draw `n_samples` loss-projected posterior samples in one call: prepare the
/// cache, draw from the prior, then sweep.
pub fn sample_posterior<L: Loss, D: DataSource>(
    n_samples: usize,
    loss: &L,
    params: &ParameterSet,
    prior_precision: &Precision,
    data: &D,
    config: SamplerConfig,
) -> Result<Vec<PosteriorSample>> {
    AlternatingProjection::new(config)?
        .prepare(loss, params, data)?
        .sample(n_samples, prior_precision)
}
