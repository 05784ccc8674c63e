//! External core-engine client
//!
//! Two interchangeable transports behind [`EngineTransport`]:
//! - [`HttpEngineTransport`]: `POST {host}/run` (primary)
//! - [`ContainerExecTransport`]: `docker exec` into the engine's sidecar container (fallback)
//!
//! [`EngineClient`] shapes the payload for each transport; the orchestrator
//! decides when to fall back.

use crate::config::EngineConfig;
use crate::error::{OrchestratorError, Result};
use crate::process::{CommandRunner, CommandSpec};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait EngineTransport: Send + Sync {
    /// Short name used in errors and logs
    fn name(&self) -> &'static str;

    async fn invoke(&self, body: &Value, timeout: Duration) -> Result<Value>;
}

pub struct HttpEngineTransport {
    http_client: Client,
    run_url: String,
    api_key: Option<String>,
}

impl HttpEngineTransport {
    /// Fails only when the HTTP client cannot initialize its TLS backend
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let http_client = Client::builder()
            .build()
            .map_err(|e| OrchestratorError::engine("http", format!("client setup failed: {}", e)))?;
        Ok(Self {
            http_client,
            run_url: config.run_url(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn run_url(&self) -> &str {
        &self.run_url
    }
}

#[async_trait]
impl EngineTransport for HttpEngineTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn invoke(&self, body: &Value, timeout: Duration) -> Result<Value> {
        let mut request = self
            .http_client
            .post(&self.run_url)
            .timeout(timeout)
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-KEY", key);
        }

        debug!("POST {}", self.run_url);
        let response = request
            .send()
            .await
            .map_err(|e| OrchestratorError::engine(self.name(), e))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::engine(
                self.name(),
                format!("{} from {}: {}", status, self.run_url, text.trim()),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| OrchestratorError::engine(self.name(), format!("invalid JSON response: {}", e)))
    }
}

pub struct ContainerExecTransport {
    runner: Arc<dyn CommandRunner>,
    container: String,
    command: Vec<String>,
    workdir: PathBuf,
}

impl ContainerExecTransport {
    pub fn new(config: &EngineConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            container: config.container_name.clone(),
            command: config.exec_command.clone(),
            workdir: config.exec_workdir.clone(),
        }
    }

    fn spec(&self, body: &Value, timeout: Duration) -> CommandSpec {
        let mut spec = CommandSpec::new("docker")
            .arg("exec")
            .arg(self.container.as_str())
            .args(self.command.iter().cloned())
            .arg(body.to_string())
            .timeout(timeout);
        if self.workdir.is_dir() {
            spec = spec.cwd(self.workdir.clone());
        }
        spec
    }
}

#[async_trait]
impl EngineTransport for ContainerExecTransport {
    fn name(&self) -> &'static str {
        "container-exec"
    }

    async fn invoke(&self, body: &Value, timeout: Duration) -> Result<Value> {
        let output = self
            .runner
            .run(&self.spec(body, timeout))
            .await
            .map_err(|e| OrchestratorError::engine(self.name(), e))?;
        if !output.success() {
            return Err(OrchestratorError::engine(
                self.name(),
                format!("core-engine exec failed: {}", output.stderr.trim()),
            ));
        }
        Ok(parse_stdout(&output.stdout))
    }
}

/// Structured stdout is returned as-is; anything else is wrapped as `{"raw": ...}`
pub fn parse_stdout(stdout: &str) -> Value {
    match serde_json::from_str::<Value>(stdout.trim()) {
        Ok(value) => value,
        Err(_) => {
            warn!("core-engine returned non-JSON output ({} bytes)", stdout.len());
            json!({ "raw": stdout })
        }
    }
}

pub struct EngineClient {
    direct: Arc<dyn EngineTransport>,
    fallback: Arc<dyn EngineTransport>,
    timeout: Duration,
    health_timeout: Duration,
}

impl EngineClient {
    pub fn new(
        direct: Arc<dyn EngineTransport>,
        fallback: Arc<dyn EngineTransport>,
        timeout: Duration,
        health_timeout: Duration,
    ) -> Self {
        Self {
            direct,
            fallback,
            timeout,
            health_timeout,
        }
    }

    pub fn from_config(config: &EngineConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        Ok(Self::new(
            Arc::new(HttpEngineTransport::new(config)?),
            Arc::new(ContainerExecTransport::new(config, runner)),
            config.timeout(),
            config.health_timeout(),
        ))
    }

    /// Primary transport; the request is wrapped as `{"request": ...}`
    pub async fn invoke_direct(&self, request: &Value, timeout: Option<Duration>) -> Result<Value> {
        self.direct
            .invoke(&json!({ "request": request }), timeout.unwrap_or(self.timeout))
            .await
    }

    /// Fallback transport; the request JSON becomes the last command argument
    pub async fn invoke_fallback(&self, request: &Value, timeout: Option<Duration>) -> Result<Value> {
        self.fallback
            .invoke(request, timeout.unwrap_or(self.timeout))
            .await
    }

    /// Forward an arbitrary body over the primary transport
    pub async fn proxy(&self, body: &Value) -> Result<Value> {
        self.direct.invoke(body, self.timeout).await
    }

    pub async fn health(&self) -> Result<Value> {
        self.direct
            .invoke(&json!({ "action": "health" }), self.health_timeout)
            .await
    }
}
