use crate::error::{OrchestratorError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use uuid::Uuid;

static CVE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^CVE-\d{4}-\d{4,}$").ok());
static GHSA_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^GHSA(-[0-9a-z]{4}){3}$").ok());

/// Allocate a fresh execution id (`exec-` + 12 hex chars)
pub fn new_execution_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("exec-{}", &hex[..12])
}

/// Validate and normalize a target identifier.
///
/// Accepted (case-insensitive): `OTHER`, `CVE-YYYY-NNNN+`, `GHSA-xxxx-xxxx-xxxx`.
pub fn normalize_target_id(raw: &str) -> Result<String> {
    let value = raw.trim();
    if value.eq_ignore_ascii_case("other") {
        return Ok("OTHER".to_string());
    }
    if matches_pattern(&CVE_PATTERN, value) {
        return Ok(value.to_ascii_uppercase());
    }
    if matches_pattern(&GHSA_PATTERN, value) {
        return Ok(format!("GHSA-{}", value[5..].to_ascii_lowercase()));
    }
    Err(OrchestratorError::InvalidTargetId(raw.to_string()))
}

fn matches_pattern(pattern: &LazyLock<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().map_or(false, |re| re.is_match(value))
}

/// Declared source kind of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Remote git repository, shallow-cloned per run
    Repository,
    /// Directory already materialized from an uploaded archive
    Archive,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Repository => "repository",
            SourceKind::Archive => "archive",
        }
    }

    /// Returns `None` for unknown kinds; the orchestrator fails those runs
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "repository" | "repo" | "git" => Some(SourceKind::Repository),
            "archive" | "upload" => Some(SourceKind::Archive),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_source_type() -> String {
    SourceKind::Repository.as_str().to_string()
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Submission parameters.
///
/// Typed fields are the ones the pipeline reads; everything else lands in
/// `extensions` and is stored verbatim with the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default = "default_source_type")]
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_budget: Option<u32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub skip_test_generation: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub skip_engine: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            source_type: default_source_type(),
            repository_url: None,
            branch: None,
            source_path: None,
            target_id: None,
            target_method: None,
            target_line: None,
            timeout_secs: None,
            search_budget: None,
            skip_test_generation: false,
            skip_engine: false,
            options: None,
            extensions: Map::new(),
        }
    }
}

impl RunRequest {
    pub fn repository(url: impl Into<String>) -> Self {
        Self {
            repository_url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn archive(path: impl Into<String>) -> Self {
        Self {
            source_type: SourceKind::Archive.as_str().to_string(),
            source_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        SourceKind::parse(&self.source_type)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| OrchestratorError::InvalidRequest(e.to_string()))
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Submission-time validation: normalizes `target_id` in place
    pub fn validate(&mut self) -> Result<()> {
        if let Some(raw) = self.target_id.as_deref() {
            if !raw.trim().is_empty() {
                self.target_id = Some(normalize_target_id(raw)?);
            } else {
                self.target_id = None;
            }
        }
        if self.timeout_secs == Some(0) {
            return Err(OrchestratorError::InvalidRequest(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn hints(&self) -> TargetHints {
        TargetHints {
            target_id: self.target_id.clone(),
            target_method: self.target_method.clone().filter(|m| !m.trim().is_empty()),
            target_line: self.target_line,
            timeout_secs: self.timeout_secs,
        }
    }
}

/// Optional focus hints; absent values are logged as-is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetHints {
    pub target_id: Option<String>,
    pub target_method: Option<String>,
    pub target_line: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl TargetHints {
    pub fn describe(&self) -> String {
        fn show<T: std::fmt::Display>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "none".to_string())
        }
        format!(
            "target_id={}, target_method={}, target_line={}, timeout={}",
            show(&self.target_id),
            show(&self.target_method),
            show(&self.target_line),
            show(&self.timeout_secs)
        )
    }
}
