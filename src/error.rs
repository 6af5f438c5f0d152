use thiserror::Error;

/// Failures reported by an externally rendered surface (wallet sheet,
/// bank collector, challenge screen).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExternalSurfaceError {
    #[error("external surface was cancelled")]
    Cancelled,
    #[error("external surface timed out")]
    TimedOut,
    #[error("protocol error: {0}")]
    ProtocolError(String),
    #[error("runtime error {code}: {detail}")]
    RuntimeError { code: String, detail: String },
    #[error("failed to present external surface: {0}")]
    PresentationFailed(String),
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Validation error on {field}: {message}")]
    Validation { field: String, message: String },
    #[error("Interactor error: {0}")]
    Interactor(String),
    #[error(transparent)]
    ExternalSurface(#[from] ExternalSurfaceError),
    #[error("Missing payload: {0}")]
    MissingPayload(&'static str),
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlowError {
    /// True when the failure is the user backing out of an external surface.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            FlowError::ExternalSurface(ExternalSurfaceError::Cancelled)
        )
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
