//! Test-generation client (EvoSuite)
//!
//! ```text
//! discover *.java → compile (mvn | javac) → list target/classes
//!   → filter by target method → evosuite per class → reachability traces
//! ```
//!
//! Compilation failures and per-class failures are reported inside the
//! [`TestGenReport`]; only missing prerequisites (jar, sources) are errors.

use crate::config::TestGenerationConfig;
use crate::error::{OrchestratorError, Result};
use crate::process::{CommandRunner, CommandSpec};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{info, warn};
use walkdir::WalkDir;

const EXCLUDED_DIRS: &[&str] = &["target", "build", ".git", ".idea", ".gradle"];
const TESTS_DIR: &str = "evosuite-tests";

static TEST_METHOD_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"void\s+(test[\w_]*)\s*\(").ok());

/// Inputs for one generation pass
#[derive(Debug, Clone)]
pub struct TestGenRequest {
    pub source_path: PathBuf,
    pub target_method: Option<String>,
    /// Overrides the configured search budget (seconds per class)
    pub search_budget: Option<u32>,
    /// Overrides the configured per-command timeout
    pub timeout: Option<Duration>,
}

#[async_trait]
pub trait TestGenerator: Send + Sync {
    /// Globally enabled; when false the orchestrator records the stage as skipped
    fn enabled(&self) -> bool;

    async fn generate(&self, request: &TestGenRequest) -> Result<TestGenReport>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Success,
    Failed,
}

impl StepStatus {
    fn from_exit(success: bool) -> Self {
        if success {
            StepStatus::Success
        } else {
            StepStatus::Failed
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompileReport {
    pub stdout: String,
    pub stderr: String,
    pub status: StepStatus,
}

/// One EvoSuite invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassGeneration {
    pub class: String,
    pub stdout: String,
    pub stderr: String,
    pub status: StepStatus,
    pub test_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub line: usize,
    pub code: String,
}

/// Calls to the target method found in one generated test file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReachabilityTrace {
    pub test_file: String,
    pub occurrences: Vec<Occurrence>,
    pub test_methods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestGenReport {
    pub runtime: String,
    pub jar_path: PathBuf,
    pub search_budget: u32,
    pub compile: CompileReport,
    pub generated_tests: Vec<ClassGeneration>,
    pub target_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled_classes_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reachability: Option<Vec<ReachabilityTrace>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestGenReport {
    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

pub struct EvoSuiteClient {
    config: TestGenerationConfig,
    runner: Arc<dyn CommandRunner>,
}

impl EvoSuiteClient {
    pub fn new(config: TestGenerationConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    async fn compile(
        &self,
        source_dir: &Path,
        java_files: &[PathBuf],
        classes_root: &Path,
        timeout: Duration,
    ) -> Result<(CompileReport, std::result::Result<String, &'static str>)> {
        if source_dir.join("pom.xml").is_file() {
            let compile = CommandSpec::new("mvn")
                .args(["-q", "-DskipTests", "clean", "compile"])
                .cwd(source_dir)
                .timeout(timeout);
            let out = self.runner.run(&compile).await?;
            let report = CompileReport {
                status: StepStatus::from_exit(out.success()),
                stdout: out.stdout,
                stderr: out.stderr,
            };
            if report.status == StepStatus::Failed {
                return Ok((report, Err("Maven compilation failed")));
            }

            let classpath = CommandSpec::new("mvn")
                .args([
                    "-q",
                    "dependency:build-classpath",
                    "-Dmdep.outputFile=target/classpath.txt",
                ])
                .cwd(source_dir)
                .timeout(timeout);
            let cp_out = self.runner.run(&classpath).await?;
            if !cp_out.success() {
                warn!("Dependency classpath resolution failed: {}", cp_out.diagnostic());
            }

            let deps = tokio::fs::read_to_string(source_dir.join("target").join("classpath.txt"))
                .await
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            let classes = classes_root.to_string_lossy().into_owned();
            let project_cp = if deps.is_empty() {
                classes
            } else {
                format!("{}:{}", classes, deps)
            };
            Ok((report, Ok(project_cp)))
        } else {
            let javac = CommandSpec::new("javac")
                .arg("-d")
                .arg(classes_root.to_string_lossy())
                .args(java_files.iter().map(|f| f.to_string_lossy().into_owned()))
                .cwd(source_dir)
                .timeout(timeout);
            let out = self.runner.run(&javac).await?;
            let report = CompileReport {
                status: StepStatus::from_exit(out.success()),
                stdout: out.stdout,
                stderr: out.stderr,
            };
            let cp = if report.status == StepStatus::Success {
                Ok(classes_root.to_string_lossy().into_owned())
            } else {
                Err("Compilation failed")
            };
            Ok((report, cp))
        }
    }
}

#[async_trait]
impl TestGenerator for EvoSuiteClient {
    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn generate(&self, request: &TestGenRequest) -> Result<TestGenReport> {
        if !self.config.enabled {
            return Err(OrchestratorError::TestGeneration(
                "EvoSuite is disabled".to_string(),
            ));
        }
        let jar = &self.config.jar_path;
        if !jar.is_file() {
            return Err(OrchestratorError::TestGeneration(format!(
                "EvoSuite jar not found at {}",
                jar.display()
            )));
        }
        let source_dir = request.source_path.as_path();
        if !source_dir.is_dir() {
            return Err(OrchestratorError::TestGeneration(format!(
                "source directory not found: {}",
                source_dir.display()
            )));
        }
        let java_files = collect_java_files(source_dir);
        if java_files.is_empty() {
            return Err(OrchestratorError::TestGeneration(
                "no Java source files found".to_string(),
            ));
        }

        let budget = request.search_budget.unwrap_or(self.config.search_budget);
        let timeout = request.timeout.unwrap_or_else(|| self.config.timeout());
        let classes_root = source_dir.join("target").join("classes");
        let tests_root = source_dir.join(TESTS_DIR);
        tokio::fs::create_dir_all(&classes_root).await?;
        tokio::fs::create_dir_all(&tests_root).await?;

        let mut report = TestGenReport {
            runtime: "local".to_string(),
            jar_path: jar.clone(),
            search_budget: budget,
            compile: CompileReport::default(),
            generated_tests: Vec::new(),
            target_method: request.target_method.clone(),
            compiled_classes_count: None,
            reachability: None,
            error: None,
        };

        info!(
            "Compiling {} Java files under {}",
            java_files.len(),
            source_dir.display()
        );
        let (compile, project_cp) = self
            .compile(source_dir, &java_files, &classes_root, timeout)
            .await?;
        report.compile = compile;
        let project_cp = match project_cp {
            Ok(cp) => cp,
            Err(reason) => return Ok(report.with_error(reason)),
        };

        let compiled = list_compiled_classes(&classes_root);
        report.compiled_classes_count = Some(compiled.len());
        if compiled.is_empty() {
            return Ok(report.with_error("No compiled classes found after compilation"));
        }

        let method = request.target_method.as_deref();
        let candidates = select_candidates(source_dir, &compiled, method, self.config.max_classes);
        info!("Generating tests for {} classes", candidates.len());

        for class in candidates {
            let spec = CommandSpec::new("java")
                .arg("-jar")
                .arg(jar.to_string_lossy())
                .args(["-class", class.as_str()])
                .args(["-projectCP", project_cp.as_str()])
                .arg(format!("-Dsearch_budget={}", budget))
                .arg("-Djunit_suffix=Test")
                .arg(format!("-Doutput_directory={}", tests_root.display()))
                .arg(format!("-Dreport_dir={}/reports", tests_root.display()))
                .cwd(source_dir)
                .timeout(timeout);

            let entry = match self.runner.run(&spec).await {
                Ok(out) => ClassGeneration {
                    status: StepStatus::from_exit(out.success()),
                    test_files: generated_test_files(source_dir, &tests_root, simple_name(&class)),
                    class,
                    stdout: out.stdout,
                    stderr: out.stderr,
                },
                Err(e) => {
                    warn!("EvoSuite run for {} failed: {}", class, e);
                    ClassGeneration {
                        class,
                        stdout: String::new(),
                        stderr: e.to_string(),
                        status: StepStatus::Failed,
                        test_files: Vec::new(),
                    }
                }
            };
            report.generated_tests.push(entry);
        }

        if let Some(method) = method {
            report.reachability = Some(extract_reachability(source_dir, &tests_root, method));
        }

        Ok(report)
    }
}

fn is_excluded(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map_or(false, |name| EXCLUDED_DIRS.contains(&name))
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

/// `.java` files under `root`, skipping build output and VCS/IDE directories
pub fn collect_java_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_excluded(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), "java"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Fully-qualified names of compiled classes, skipping `$1` anonymous units
pub fn list_compiled_classes(classes_root: &Path) -> Vec<String> {
    let mut classes: Vec<String> = WalkDir::new(classes_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), "class"))
        .filter(|e| !e.file_name().to_string_lossy().ends_with("$1.class"))
        .filter_map(|e| {
            let rel = e.path().strip_prefix(classes_root).ok()?.with_extension("");
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            Some(parts.join("."))
        })
        .collect();
    classes.sort();
    classes
}

fn simple_name(fqcn: &str) -> &str {
    fqcn.rsplit('.').next().unwrap_or(fqcn)
}

fn call_pattern(method: &str) -> Option<Regex> {
    Regex::new(&format!(r"\b{}\s*\(", regex::escape(method))).ok()
}

/// Simple names of source files mentioning `method(`
pub fn classes_mentioning(root: &Path, method: &str) -> Vec<String> {
    let Some(pattern) = call_pattern(method) else {
        return Vec::new();
    };
    collect_java_files(root)
        .into_iter()
        .filter(|path| {
            std::fs::read(path)
                .map(|bytes| pattern.is_match(&String::from_utf8_lossy(&bytes)))
                .unwrap_or(false)
        })
        .filter_map(|path| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .collect()
}

/// Classes to run EvoSuite on: those matching the target method when any
/// match, otherwise all, capped at `max`.
pub fn select_candidates(
    source_dir: &Path,
    compiled: &[String],
    method: Option<&str>,
    max: usize,
) -> Vec<String> {
    if let Some(method) = method {
        let mentions = classes_mentioning(source_dir, method);
        let filtered: Vec<String> = compiled
            .iter()
            .filter(|c| mentions.iter().any(|m| m == simple_name(c)))
            .take(max)
            .cloned()
            .collect();
        if !filtered.is_empty() {
            return filtered;
        }
    }
    compiled.iter().take(max).cloned().collect()
}

fn relative(source_dir: &Path, path: &Path) -> String {
    path.strip_prefix(source_dir)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

fn generated_test_files(source_dir: &Path, tests_root: &Path, simple: &str) -> Vec<String> {
    WalkDir::new(tests_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), "java"))
        .filter(|e| {
            let name = e.file_name().to_string_lossy();
            name.contains(simple) && name.contains("Test")
        })
        .map(|e| relative(source_dir, e.path()))
        .collect()
}

/// Calls to `method` inside generated tests, with the enclosing test names
pub fn extract_reachability(
    source_dir: &Path,
    tests_root: &Path,
    method: &str,
) -> Vec<ReachabilityTrace> {
    let Some(pattern) = call_pattern(method) else {
        return Vec::new();
    };

    let mut traces = Vec::new();
    for entry in WalkDir::new(tests_root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), "java"))
    {
        let Ok(bytes) = std::fs::read(entry.path()) else {
            continue;
        };
        let text = String::from_utf8_lossy(&bytes);
        let occurrences: Vec<Occurrence> = text
            .lines()
            .enumerate()
            .filter(|(_, line)| pattern.is_match(line))
            .map(|(idx, line)| Occurrence {
                line: idx + 1,
                code: line.trim().to_string(),
            })
            .collect();
        if occurrences.is_empty() {
            continue;
        }

        let test_methods = TEST_METHOD_PATTERN
            .as_ref()
            .map(|re| {
                re.captures_iter(&text)
                    .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                    .collect()
            })
            .unwrap_or_default();

        traces.push(ReachabilityTrace {
            test_file: relative(source_dir, entry.path()),
            occurrences,
            test_methods,
        });
    }
    traces
}
