use std::path::PathBuf;

/// Errors surfaced by the sampler.
///
/// A singular curvature matrix is not an error; the pseudo-inverse absorbs it.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    /// Two parameter sets (or a set and a layout) disagree on names or shapes.
    #[error("parameter shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A minibatch is empty or its input and target disagree on batch size.
    #[error("invalid minibatch: {0}")]
    InvalidBatch(String),

    /// A cached pseudo-inverse sequence does not correspond to the data source.
    #[error("inverse cache mismatch: {0}")]
    CacheMismatch(String),

    /// A posterior sample contained NaN or infinite entries after sweeping.
    #[error("sample {sample} became non-finite after {epochs} epoch(s)")]
    NonFinite { sample: usize, epochs: usize },

    /// The SVD behind the pseudo-inverse failed.
    #[error("pseudo-inverse failed for batch {batch}: {reason}")]
    PseudoInverse { batch: usize, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cache file {}: {source}", path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, SamplerError>;
