use finsight_core::{PipelineError, ValidationError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ValidationError> for CliError {
    fn from(error: ValidationError) -> Self {
        Self::Pipeline(PipelineError::Validation(error))
    }
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Pipeline(PipelineError::Validation(_)) => 2,
            Self::Pipeline(PipelineError::NotFound(_) | PipelineError::InsufficientData(_)) => 3,
            Self::Pipeline(PipelineError::UpstreamUnavailable(_)) => 4,
            Self::Pipeline(PipelineError::ModelUnavailable(_)) => 5,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}
