use seige_storage::StorageError;
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid target identifier: {0}")]
    InvalidTargetId(String),

    #[error("Unsupported upload content type: {0}")]
    UnsupportedContentType(String),

    #[error("Source acquisition failed: {0}")]
    SourceAcquisition(String),

    #[error("Build failed: {0}")]
    Build(String),

    #[error("Test generation failed: {0}")]
    TestGeneration(String),

    #[error("Engine transport '{transport}' failed: {message}")]
    Engine { transport: String, message: String },

    #[error("Command `{program}` failed to start: {message}")]
    CommandSpawn { program: String, message: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchestratorError {
    pub fn serialization<E: std::fmt::Display>(e: E) -> Self {
        Self::Serialization(e.to_string())
    }

    pub fn engine(transport: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Engine {
            transport: transport.into(),
            message: message.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            OrchestratorError::InvalidRequest(_)
            | OrchestratorError::InvalidTargetId(_)
            | OrchestratorError::UnsupportedContentType(_)
            | OrchestratorError::Archive(_) => ErrorCategory::Input,
            OrchestratorError::Storage(_)
            | OrchestratorError::Config(_)
            | OrchestratorError::Io(_)
            | OrchestratorError::CommandSpawn { .. } => ErrorCategory::Infrastructure,
            _ => ErrorCategory::Stage,
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e)
    }
}

/// Error category, used by the API layer to pick a response class
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Rejected synchronously at submission; no job exists
    Input,
    /// Recorded on the job (fatal or recoverable, depending on the stage)
    Stage,
    /// Storage, configuration or process-level failure
    Infrastructure,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Input => "input",
            ErrorCategory::Stage => "stage",
            ErrorCategory::Infrastructure => "infrastructure",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            OrchestratorError::InvalidTargetId("x".into()).category(),
            ErrorCategory::Input
        );
        assert_eq!(
            OrchestratorError::engine("http", "503").category(),
            ErrorCategory::Stage
        );
        assert_eq!(
            OrchestratorError::Storage(StorageError::database("locked")).category(),
            ErrorCategory::Infrastructure
        );
    }

    #[test]
    fn test_engine_error_display() {
        let err = OrchestratorError::engine("container-exec", "exit status 1");
        assert_eq!(
            err.to_string(),
            "Engine transport 'container-exec' failed: exit status 1"
        );
    }
}
