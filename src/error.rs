use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid domain pack '{pack}': {reason}")]
    InvalidPack { pack: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Classification worker is gone: {0}")]
    WorkerGone(&'static str),
}

/// Failure reported by a [`crate::classifier::Classifier`] implementation.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classification service unavailable: {0}")]
    Unavailable(String),

    #[error("classification timed out after {0} ms")]
    Timeout(u64),

    #[error("classification rejected the thumbnail: {0}")]
    Rejected(String),
}
