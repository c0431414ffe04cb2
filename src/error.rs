use thiserror::Error;

/// Every failure the pipeline can surface to the user.
///
/// Results for calls whose snapshot has been superseded are never turned into
/// one of these; they are dropped by the controller before reaching the
/// message slot.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The engine failed to load. Fatal for the session.
    #[error("engine failed to initialize: {0}")]
    EngineInit(String),

    /// A single preview or transform call failed.
    #[error("engine call failed: {0}")]
    EngineCall(String),

    /// The configuration failed its structural checks; no engine call was made.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// Reading the input file failed.
    #[error("could not read input: {0}")]
    Io(#[from] std::io::Error),

    /// An engine call did not resolve within the configured bound.
    #[error("engine call timed out after {0} ms")]
    Timeout(u64),

    /// The requested action makes no sense in the current pipeline state.
    #[error("not ready: {0}")]
    NotReady(&'static str),
}

impl PipelineError {
    /// Whether the user can recover by re-issuing an action.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PipelineError::EngineInit(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
