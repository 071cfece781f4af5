//! Fatal error classification and process exit codes.

use thiserror::Error;

/// Fatal, exit-code-bearing pipeline errors. Non-fatal conditions are
/// accumulated in the run summary instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Usage error: {message}")]
    Usage { message: String },

    #[error("Input/Output error: {message}")]
    Io { message: String },

    #[error("Malformed input: {message}")]
    MalformedInput { message: String },

    #[error("Internal invariant violated: {message}")]
    Invariant { message: String },
}

impl PipelineError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage { message: message.into() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput { message: message.into() }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant { message: message.into() }
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Usage { .. } => 1,
            PipelineError::Io { .. } => 2,
            PipelineError::MalformedInput { .. } => 3,
            PipelineError::Invariant { .. } => 4,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io {
            message: err.to_string(),
        }
    }
}

/// Exit code for an arbitrary error chain: the innermost classified
/// `PipelineError` wins, anything unclassified maps to the invariant
/// code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(pe) = cause.downcast_ref::<PipelineError>() {
            return pe.exit_code();
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return 2;
        }
    }
    4
}
