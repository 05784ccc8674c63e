//! Runner configuration
//!
//! Built once at process start and shared as `Arc<RunnerConfig>` by the
//! orchestrator and every client. Loading order: defaults → YAML file →
//! environment overrides → `validate()`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};
use super::validation::{check_range, Validatable};
use crate::stages::DEFAULT_MAX_EXTRACTED_BYTES;

pub const SUPPORTED_VERSIONS: &[u64] = &[1];

/// Top-level configuration (YAML schema v1)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    pub version: u64,
    pub engine: EngineConfig,
    pub test_generation: TestGenerationConfig,
    pub pipeline: PipelineSettings,
    pub workspace: WorkspaceConfig,
}

/// External core-engine access (direct HTTP + container exec fallback)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub host: String,
    pub api_key: Option<String>,
    pub container_name: String,
    /// Command run inside the container; the request JSON is appended last
    pub exec_command: Vec<String>,
    pub exec_workdir: PathBuf,
    pub timeout_secs: u64,
    pub health_timeout_secs: u64,
}

/// EvoSuite test generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestGenerationConfig {
    pub enabled: bool,
    pub jar_path: PathBuf,
    pub search_budget: u32,
    pub max_classes: usize,
    pub timeout_secs: u64,
}

/// Stage timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSettings {
    pub fetch_delay_ms: u64,
    pub build_delay_ms: u64,
    /// Lower bound of the hold applied when a caller skips a stage
    pub skip_delay_min_ms: u64,
    pub skip_delay_max_ms: u64,
}

/// Where cloned and uploaded sources are materialized
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
    /// Cap on the decompressed size of an uploaded archive
    pub max_extracted_bytes: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            version: 1,
            engine: EngineConfig::default(),
            test_generation: TestGenerationConfig::default(),
            pipeline: PipelineSettings::default(),
            workspace: WorkspaceConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:9000".to_string(),
            api_key: None,
            container_name: "core_engine_container".to_string(),
            exec_command: vec![
                "java".to_string(),
                "-jar".to_string(),
                "/app/core.jar".to_string(),
                "--json".to_string(),
            ],
            exec_workdir: PathBuf::from("/app"),
            timeout_secs: 600,
            health_timeout_secs: 5,
        }
    }
}

impl Default for TestGenerationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            jar_path: PathBuf::from("/opt/tools/evosuite.jar"),
            search_budget: 60,
            max_classes: 10,
            timeout_secs: 600,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fetch_delay_ms: 1_000,
            build_delay_ms: 2_000,
            skip_delay_min_ms: 120_000,
            skip_delay_max_ms: 300_000,
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("seige-runner"),
            max_extracted_bytes: DEFAULT_MAX_EXTRACTED_BYTES,
        }
    }
}

impl EngineConfig {
    pub fn run_url(&self) -> String {
        format!("{}/run", self.host.trim_end_matches('/'))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

impl TestGenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PipelineSettings {
    /// Zero delays everywhere (tests, local dry runs)
    pub fn immediate() -> Self {
        Self {
            fetch_delay_ms: 0,
            build_delay_ms: 0,
            skip_delay_min_ms: 0,
            skip_delay_max_ms: 0,
        }
    }
}

impl RunnerConfig {
    /// Load from a YAML file and apply process environment overrides
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let mut config = Self::from_yaml(path)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus process environment overrides
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(content)?;
        let version = raw
            .get("version")
            .and_then(serde_yaml::Value::as_u64)
            .ok_or(ConfigError::MissingVersion)?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ConfigError::UnsupportedVersion {
                found: version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }

        Ok(serde_yaml::from_value(raw)?)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn apply_env(&mut self) -> ConfigResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `SEIGE_*` overrides from an arbitrary lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SEIGE_CORE_ENGINE_HOST") {
            self.engine.host = host;
        }
        if let Some(key) = lookup("SEIGE_CORE_ENGINE_API_KEY") {
            self.engine.api_key = (!key.is_empty()).then_some(key);
        }
        if let Some(container) = lookup("SEIGE_CORE_ENGINE_CONTAINER") {
            self.engine.container_name = container;
        }
        if let Some(enabled) = lookup("SEIGE_EVOSUITE_ENABLED") {
            self.test_generation.enabled = parse_bool("SEIGE_EVOSUITE_ENABLED", &enabled)?;
        }
        if let Some(jar) = lookup("SEIGE_EVOSUITE_JAR_PATH") {
            self.test_generation.jar_path = PathBuf::from(jar);
        }
        if let Some(budget) = lookup("SEIGE_EVOSUITE_SEARCH_BUDGET") {
            self.test_generation.search_budget =
                budget.trim().parse().map_err(|e| ConfigError::Env {
                    var: "SEIGE_EVOSUITE_SEARCH_BUDGET".to_string(),
                    value: budget.clone(),
                    reason: format!("{}", e),
                })?;
        }
        if let Some(root) = lookup("SEIGE_WORKSPACE_ROOT") {
            self.workspace.root = PathBuf::from(root);
        }
        if let Some(limit) = lookup("SEIGE_MAX_EXTRACTED_BYTES") {
            self.workspace.max_extracted_bytes =
                limit.trim().parse().map_err(|e| ConfigError::Env {
                    var: "SEIGE_MAX_EXTRACTED_BYTES".to_string(),
                    value: limit.clone(),
                    reason: format!("{}", e),
                })?;
        }
        Ok(())
    }
}

fn parse_bool(var: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            var: var.to_string(),
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

impl Validatable for RunnerConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.engine.validate()?;
        self.test_generation.validate()?;
        self.pipeline.validate()?;
        self.workspace.validate()
    }

    fn config_name(&self) -> &'static str {
        "RunnerConfig"
    }
}

impl Validatable for EngineConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !(self.host.starts_with("http://") || self.host.starts_with("https://")) {
            return Err(ConfigError::invalid_value(
                "engine.host",
                format!("'{}' must start with http:// or https://", self.host),
            ));
        }
        if self.exec_command.is_empty() {
            return Err(ConfigError::invalid_value(
                "engine.exec_command",
                "fallback command must not be empty",
            ));
        }
        check_range(
            "engine.timeout_secs",
            self.timeout_secs,
            1,
            86_400,
            "Engine calls need a positive timeout",
        )?;
        check_range(
            "engine.health_timeout_secs",
            self.health_timeout_secs,
            1,
            300,
            "Health checks should be short",
        )
    }

    fn config_name(&self) -> &'static str {
        "EngineConfig"
    }
}

impl Validatable for TestGenerationConfig {
    fn validate(&self) -> ConfigResult<()> {
        check_range(
            "test_generation.max_classes",
            self.max_classes,
            1,
            1_000,
            "At least one class must be tested",
        )?;
        check_range(
            "test_generation.search_budget",
            self.search_budget,
            1,
            86_400,
            "EvoSuite needs a positive search budget (seconds)",
        )?;
        check_range(
            "test_generation.timeout_secs",
            self.timeout_secs,
            1,
            86_400,
            "Subprocesses need a positive timeout",
        )
    }

    fn config_name(&self) -> &'static str {
        "TestGenerationConfig"
    }
}

impl Validatable for PipelineSettings {
    fn validate(&self) -> ConfigResult<()> {
        if self.skip_delay_min_ms > self.skip_delay_max_ms {
            return Err(ConfigError::range_with_hint(
                "pipeline.skip_delay_min_ms",
                self.skip_delay_min_ms,
                0,
                self.skip_delay_max_ms,
                "The skip window minimum must not exceed its maximum",
            ));
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "PipelineSettings"
    }
}

impl Validatable for WorkspaceConfig {
    fn validate(&self) -> ConfigResult<()> {
        check_range(
            "workspace.max_extracted_bytes",
            self.max_extracted_bytes,
            1,
            u64::MAX,
            "Uploads need a positive extraction limit",
        )
    }

    fn config_name(&self) -> &'static str {
        "WorkspaceConfig"
    }
}
