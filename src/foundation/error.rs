/// Convenience result type used across the crate.
pub type RenderResult<T> = Result<T, RenderError>;

/// Top-level error taxonomy used by orchestration APIs.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// Invalid user-provided job parameters or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// Malformed frame or message on the control channel.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The control stream closed in the middle of a frame.
    #[error("connection terminated unexpectedly")]
    ConnectionTerminated,

    /// Failures while spawning or talking to a worker process.
    #[error("worker error: {0}")]
    Worker(String),

    /// Failures of a post-processing stage (mixdown, concatenation).
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Errors when serializing or deserializing messages and config.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RenderError {
    /// Build a [`RenderError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`RenderError::Protocol`] value.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Build a [`RenderError::Worker`] value.
    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }

    /// Build a [`RenderError::Pipeline`] value.
    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }

    /// Build a [`RenderError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
