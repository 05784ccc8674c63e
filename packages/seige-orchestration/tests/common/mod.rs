//! Fakes for the pipeline's port traits

#![allow(dead_code)]

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use seige_orchestration::config::PipelineSettings;
use seige_orchestration::stages::test_generation::{ClassGeneration, CompileReport, StepStatus};
use seige_orchestration::{
    EngineClient, EngineTransport, OrchestratorError, PipelineComponents, PipelineOrchestrator,
    ProjectBuilder, Result, SourceProvider, SourceRef, TaskScheduler, TestGenReport,
    TestGenRequest, TestGenerator,
};
use seige_storage::{ExecutionRecord, ExecutionStore, InMemoryExecutionStore};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct FakeSource {
    pub path: PathBuf,
    pub error: Option<String>,
    pub calls: Mutex<Vec<SourceRef>>,
}

impl FakeSource {
    pub fn ok(path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            error: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            path: PathBuf::new(),
            error: Some(message.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SourceProvider for FakeSource {
    async fn acquire(&self, _execution_id: &str, source: &SourceRef) -> Result<PathBuf> {
        self.calls.lock().push(source.clone());
        match &self.error {
            Some(msg) => Err(OrchestratorError::SourceAcquisition(msg.clone())),
            None => match source {
                SourceRef::Archive { path } if !path.is_dir() => Err(
                    OrchestratorError::SourceAcquisition(format!(
                        "invalid source path: {}",
                        path.display()
                    )),
                ),
                SourceRef::Archive { path } => Ok(path.clone()),
                SourceRef::Repository { .. } => Ok(self.path.clone()),
            },
        }
    }
}

pub enum BuildBehavior {
    Succeed(Duration),
    Fail(String),
    Panic,
}

pub struct FakeBuilder(pub BuildBehavior);

#[async_trait]
impl ProjectBuilder for FakeBuilder {
    async fn build(&self, _source_path: &Path) -> Result<()> {
        match &self.0 {
            BuildBehavior::Succeed(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
            BuildBehavior::Fail(msg) => Err(OrchestratorError::Build(msg.clone())),
            BuildBehavior::Panic => panic!("builder exploded"),
        }
    }
}

pub struct FakeTestGen {
    pub enabled: bool,
    pub outcome: std::result::Result<TestGenReport, String>,
    pub calls: AtomicUsize,
}

impl FakeTestGen {
    pub fn disabled() -> Arc<Self> {
        Arc::new(Self {
            enabled: false,
            outcome: Err("disabled".into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn returning(report: TestGenReport) -> Arc<Self> {
        Arc::new(Self {
            enabled: true,
            outcome: Ok(report),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            enabled: true,
            outcome: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TestGenerator for FakeTestGen {
    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn generate(&self, _request: &TestGenRequest) -> Result<TestGenReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Ok(report) => Ok(report.clone()),
            Err(msg) => Err(OrchestratorError::TestGeneration(msg.clone())),
        }
    }
}

pub struct ScriptedTransport {
    pub name: &'static str,
    pub outcome: std::result::Result<Value, String>,
    pub bodies: Mutex<Vec<Value>>,
}

impl ScriptedTransport {
    pub fn ok(name: &'static str, result: Value) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcome: Ok(result),
            bodies: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(name: &'static str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcome: Err(message.to_string()),
            bodies: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.bodies.lock().len()
    }
}

#[async_trait]
impl EngineTransport for ScriptedTransport {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn invoke(&self, body: &Value, _timeout: Duration) -> Result<Value> {
        self.bodies.lock().push(body.clone());
        self.outcome
            .clone()
            .map_err(|msg| OrchestratorError::engine(self.name, msg))
    }
}

/// Collects scheduled runs so tests decide when they execute
#[derive(Default)]
pub struct DeferredScheduler {
    tasks: Mutex<Vec<BoxFuture<'static, ()>>>,
}

impl DeferredScheduler {
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    pub async fn run_all(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.await;
        }
    }
}

impl TaskScheduler for DeferredScheduler {
    fn schedule(&self, task: BoxFuture<'static, ()>) {
        self.tasks.lock().push(task);
    }
}

/// A successful EvoSuite-style report for one class
pub fn sample_report(target_method: Option<&str>) -> TestGenReport {
    TestGenReport {
        runtime: "local".into(),
        jar_path: PathBuf::from("/opt/tools/evosuite.jar"),
        search_budget: 60,
        compile: CompileReport::default(),
        generated_tests: vec![ClassGeneration {
            class: "com.acme.Parser".into(),
            stdout: String::new(),
            stderr: String::new(),
            status: StepStatus::Success,
            test_files: vec!["evosuite-tests/com/acme/Parser_ESTest.java".into()],
        }],
        target_method: target_method.map(str::to_string),
        compiled_classes_count: Some(1),
        reachability: None,
        error: None,
    }
}

pub struct Harness {
    pub store: Arc<InMemoryExecutionStore>,
    pub source: Arc<FakeSource>,
    pub test_gen: Arc<FakeTestGen>,
    pub direct: Arc<ScriptedTransport>,
    pub fallback: Arc<ScriptedTransport>,
    pub orchestrator: Arc<PipelineOrchestrator>,
}

impl Harness {
    pub fn new(
        source: Arc<FakeSource>,
        builder: FakeBuilder,
        test_gen: Arc<FakeTestGen>,
        direct: Arc<ScriptedTransport>,
        fallback: Arc<ScriptedTransport>,
    ) -> Self {
        let store = Arc::new(InMemoryExecutionStore::new());
        let components = PipelineComponents {
            store: store.clone(),
            source: source.clone(),
            builder: Arc::new(builder),
            test_generator: test_gen.clone(),
            engine: Arc::new(EngineClient::new(
                direct.clone(),
                fallback.clone(),
                Duration::from_secs(5),
                Duration::from_secs(1),
            )),
            settings: PipelineSettings::immediate(),
        };
        Self {
            store,
            source,
            test_gen,
            direct,
            fallback,
            orchestrator: Arc::new(PipelineOrchestrator::new(components)),
        }
    }

    /// Source and engine succeed; test generation disabled
    pub fn happy(source_dir: &Path) -> Self {
        Self::new(
            FakeSource::ok(source_dir),
            FakeBuilder(BuildBehavior::Succeed(Duration::ZERO)),
            FakeTestGen::disabled(),
            ScriptedTransport::ok("http", serde_json::json!({"summary": {"vulnerable": false}})),
            ScriptedTransport::ok("container-exec", serde_json::json!({"raw": "fallback"})),
        )
    }

    pub async fn record(&self, id: &str) -> ExecutionRecord {
        self.store
            .get(id)
            .await
            .expect("store read")
            .expect("record exists")
    }
}

/// `finished_at` is set exactly when the status is terminal
pub fn assert_terminal_consistency(record: &ExecutionRecord) {
    assert_eq!(record.finished_at.is_some(), record.status.is_terminal());
    assert_eq!(record.result_payload.is_some(), record.status.is_terminal());
}

pub fn position(logs: &[String], prefix: &str) -> Option<usize> {
    logs.iter().position(|l| l.starts_with(prefix))
}
