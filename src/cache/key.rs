use serde::{Deserialize, Serialize};

use crate::data::DataSource;
use crate::loss::Loss;
use crate::params::ParameterSet;

/// Identity of the `(loss, parameters, data ordering)` triple a cache was
/// built for, plus the pseudo-inverse cutoff its entries were computed with.
///
/// Two keys are equal exactly when all components are; the cache file name is
/// derived from [`digest`](CacheKey::digest).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub loss: String,
    pub params: String,
    pub data: String,
    /// Bit pattern of the relative cutoff; `None` is the size-based default.
    #[serde(default)]
    pub pinv_rtol: Option<u64>,
}

impl CacheKey {
    pub fn new<L: Loss, D: DataSource>(loss: &L, params: &ParameterSet, data: &D) -> Self {
        CacheKey {
            loss: loss.identity(),
            params: params.fingerprint(),
            data: data.identity(),
            pinv_rtol: None,
        }
    }

    /// Key for entries inverted with cutoff `rtol` (see [`pseudo_inverse`]).
    ///
    /// [`pseudo_inverse`]: crate::curvature::pseudo_inverse
    pub fn with_pinv_rtol(mut self, rtol: Option<f64>) -> Self {
        self.pinv_rtol = rtol.map(f64::to_bits);
        self
    }

    pub fn pinv_rtol(&self) -> Option<f64> {
        self.pinv_rtol.map(f64::from_bits)
    }

    /// blake3 hex digest over every component.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for part in [&self.loss, &self.params, &self.data] {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        match self.pinv_rtol {
            Some(bits) => {
                hasher.update(&[1]);
                hasher.update(&bits.to_le_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    pub fn file_name(&self) -> String {
        format!("jjt-pinv-{}.json", self.digest())
    }
}
