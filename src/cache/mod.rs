//! Per-batch pseudo-inverses of `JJᵗ`, computed once per data pass.
//!
//! Entry `k` belongs to the `k`-th batch yielded by the data source. The cache
//! is only meaningful for the exact loss, parameters, batch ordering and
//! pseudo-inverse cutoff it was built from; [`CacheKey`] records all of them and
//! the sweep re-checks batch count and sizes.

mod key;
mod store;

pub use key::CacheKey;
pub use store::CacheStore;

use std::path::PathBuf;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::DMatrix;

use crate::batched::BatchedLoss;
use crate::curvature::{batch_jjt, pseudo_inverse};
use crate::data::DataSource;
use crate::error::{Result, SamplerError};
use crate::loss::Loss;

/// Ordered pseudo-inverses `pinv(J_k J_kᵗ)`, one per batch.
#[derive(Clone, Debug, PartialEq)]
pub struct InverseCache {
    key: CacheKey,
    entries: Vec<DMatrix<f64>>,
}

fn progress_bar(len_hint: (usize, Option<usize>), enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = match len_hint {
        (lo, Some(hi)) if lo == hi => ProgressBar::new(lo as u64),
        _ => ProgressBar::no_length(),
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) Inverting batch curvature")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}

impl InverseCache {
    pub fn from_entries(key: CacheKey, entries: Vec<DMatrix<f64>>) -> Self {
        InverseCache { key, entries }
    }

    /// One full pass over `data`: `JJᵗ` then its pseudo-inverse per batch,
    /// using the cutoff recorded in `key`.
    pub fn build<L: Loss, D: DataSource>(
        f: &BatchedLoss<'_, L>,
        data: &D,
        key: CacheKey,
        progress: bool,
    ) -> Result<Self> {
        let start = Instant::now();
        let rtol = key.pinv_rtol();
        let batches = data.batches();
        let pb = progress_bar(batches.size_hint(), progress);

        let mut entries = Vec::new();
        for (k, batch) in batches.enumerate() {
            let jjt = batch_jjt(f, &batch);
            entries.push(pseudo_inverse(&jjt, rtol, k)?);
            pb.inc(1);
        }
        pb.finish_and_clear();

        tracing::info!(
            batches = entries.len(),
            elapsed_s = start.elapsed().as_secs_f64(),
            "Built inverse cache"
        );
        Ok(InverseCache { key, entries })
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn entries(&self) -> &[DMatrix<f64>] {
        &self.entries
    }

    pub fn get(&self, k: usize) -> Option<&DMatrix<f64>> {
        self.entries.get(k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn save(&self, store: &CacheStore) -> Result<PathBuf> {
        let path = store.save(&self.key, &self.entries)?;
        tracing::info!(
            batches = self.entries.len(),
            path = %path.display(),
            "Saved inverse cache"
        );
        Ok(path)
    }

    /// Load the cache stored under `key`, or `Ok(None)` on a miss.
    pub fn load(store: &CacheStore, key: &CacheKey) -> Result<Option<Self>> {
        let Some(entries) = store.load(key)? else {
            return Ok(None);
        };
        tracing::info!(
            batches = entries.len(),
            path = %store.path_for(key).display(),
            "Loaded inverse cache"
        );
        Ok(Some(InverseCache {
            key: key.clone(),
            entries,
        }))
    }

    /// Check entry count and per-batch dimensions against `data`.
    pub fn validate_against<D: DataSource>(&self, data: &D) -> Result<()> {
        let mut count = 0;
        for (k, batch) in data.batches().enumerate() {
            let b = batch.len();
            match self.entries.get(k) {
                None => {
                    return Err(SamplerError::CacheMismatch(format!(
                        "data source yields more than the {} cached batches",
                        self.entries.len()
                    )))
                }
                Some(m) if m.shape() != (b, b) => {
                    return Err(SamplerError::CacheMismatch(format!(
                        "batch {k} has {b} examples but its cached inverse is {}x{}",
                        m.nrows(),
                        m.ncols()
                    )))
                }
                Some(_) => {}
            }
            count += 1;
        }
        if count != self.entries.len() {
            return Err(SamplerError::CacheMismatch(format!(
                "data source yields {count} batches, cache holds {}",
                self.entries.len()
            )));
        }
        Ok(())
    }

    /// Load from `store` when a valid file exists, otherwise build and save.
    ///
    /// Unreadable or foreign files are rebuilt. A file stored under the right
    /// key that disagrees with `data` is returned as an error: the data source
    /// is not yielding the ordering it claims.
    pub fn load_or_build<L: Loss, D: DataSource>(
        store: Option<&CacheStore>,
        f: &BatchedLoss<'_, L>,
        data: &D,
        key: CacheKey,
        progress: bool,
    ) -> Result<Self> {
        if let Some(store) = store {
            match Self::load(store, &key) {
                Ok(Some(cache)) => {
                    cache.validate_against(data)?;
                    return Ok(cache);
                }
                Ok(None) => {
                    tracing::debug!(digest = %key.digest(), "Inverse cache miss");
                }
                Err(SamplerError::CacheMismatch(reason)) => {
                    tracing::warn!(%reason, "Discarding unusable inverse cache, rebuilding");
                }
                Err(e) => return Err(e),
            }
        }

        let cache = Self::build(f, data, key, progress)?;
        if let Some(store) = store {
            cache.save(store)?;
        }
        Ok(cache)
    }
}
