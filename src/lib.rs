//! Loss-projected posterior sampling via alternating null-space projections.
//!
//! A Gaussian prior draw over network parameters is repeatedly projected onto
//! the null space of each minibatch's per-example loss Jacobian. The fixed
//! point lies in the intersection of all batch null spaces: directions along
//! which the linearised training loss does not change.
//!
//! The differentiation core is a small dual-number forward mode plus an
//! Adept-style thread-local tape for reverse mode. Losses are written once,
//! generic over [`Scalar`], and evaluated in either mode.

pub mod api;
pub mod batched;
pub mod cache;
pub mod config;
pub mod curvature;
pub mod data;
pub mod dual;
pub mod error;
pub mod float;
pub mod linearized;
pub mod loss;
pub mod params;
pub mod prior;
pub mod projection;
pub mod reverse;
pub mod sampler;
pub mod scalar;
pub mod tape;
mod traits;

pub use api::{grad, jvp, vjp};
pub use batched::BatchedLoss;
pub use cache::{CacheKey, CacheStore, InverseCache};
pub use config::SamplerConfig;
pub use curvature::{batched_jjt, pseudo_inverse};
pub use data::{DataSource, InMemoryData, Minibatch};
pub use dual::Dual;
pub use error::{Result, SamplerError};
pub use float::Float;
pub use linearized::{linearized_predict, predictive_summary, PredictiveSummary};
pub use loss::{Loss, Model};
pub use params::{Layout, ParamView, ParameterSet};
pub use prior::Precision;
pub use projection::{project, NullSpaceProjector};
pub use reverse::Reverse;
pub use sampler::{sample_posterior, AlternatingProjection, PosteriorSample, PreparedSampler};
pub use scalar::Scalar;

/// Type alias for forward-mode dual numbers over `f64`.
pub type Dual64 = Dual<f64>;
/// Type alias for reverse-mode variables over `f64`.
pub type Reverse64 = Reverse<f64>;
