//! Runner configuration
//!
//! ```text
//! defaults → YAML (version: 1) → SEIGE_* env overrides → validate()
//! ```

pub mod error;
pub mod runner_config;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use runner_config::{
    EngineConfig, PipelineSettings, RunnerConfig, TestGenerationConfig, WorkspaceConfig,
    SUPPORTED_VERSIONS,
};
pub use validation::Validatable;
