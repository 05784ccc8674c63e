//! EvoSuite client driven by a scripted command runner
//!
//! The runner emulates javac/mvn/java by writing the files the real tools
//! would produce, so discovery, filtering and reachability run for real.

use async_trait::async_trait;
use parking_lot::Mutex;
use seige_orchestration::config::TestGenerationConfig;
use seige_orchestration::stages::test_generation::StepStatus;
use seige_orchestration::{
    CommandOutput, CommandRunner, CommandSpec, EvoSuiteClient, Result, TestGenRequest,
    TestGenerator,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Default)]
struct FakeToolchain {
    calls: Mutex<Vec<CommandSpec>>,
    fail_compile: bool,
    fail_class: Option<String>,
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(0),
        stdout: stdout.to_string(),
        ..CommandOutput::default()
    }
}

fn failed(stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(1),
        stderr: stderr.to_string(),
        ..CommandOutput::default()
    }
}

fn touch(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn arg_value<'a>(spec: &'a CommandSpec, flag: &str) -> Option<&'a str> {
    spec.args
        .iter()
        .position(|a| a == flag)
        .and_then(|i| spec.args.get(i + 1))
        .map(String::as_str)
}

fn prefixed<'a>(spec: &'a CommandSpec, prefix: &str) -> Option<&'a str> {
    spec.args.iter().find_map(|a| a.strip_prefix(prefix))
}

#[async_trait]
impl CommandRunner for FakeToolchain {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().push(spec.clone());
        let cwd = spec.cwd.clone().unwrap_or_default();
        match spec.program.as_str() {
            "javac" | "mvn" if self.fail_compile => Ok(failed("error: cannot find symbol")),
            "javac" => {
                let out = PathBuf::from(arg_value(spec, "-d").unwrap());
                touch(&out.join("com/acme/Parser.class"), "");
                touch(&out.join("com/acme/Parser$1.class"), "");
                touch(&out.join("com/acme/Util.class"), "");
                Ok(ok(""))
            }
            "mvn" if spec.args.iter().any(|a| a == "compile") => {
                touch(&cwd.join("target/classes/com/acme/Parser.class"), "");
                Ok(ok(""))
            }
            "mvn" => {
                touch(&cwd.join("target/classpath.txt"), "/m2/dep-a.jar:/m2/dep-b.jar\n");
                Ok(ok(""))
            }
            "java" => {
                let class = arg_value(spec, "-class").unwrap().to_string();
                if self.fail_class.as_deref() == Some(class.as_str()) {
                    return Ok(failed("EvoSuite crashed"));
                }
                let simple = class.rsplit('.').next().unwrap();
                let out = PathBuf::from(prefixed(spec, "-Doutput_directory=").unwrap());
                let package = class.rsplit_once('.').map(|(p, _)| p.replace('.', "/"));
                let dir = package.map(|p| out.join(p)).unwrap_or(out);
                touch(
                    &dir.join(format!("{}_ESTest.java", simple)),
                    &format!(
                        "public class {s}_ESTest {{\n  @Test\n  public void test00() {{\n    {l}.parse(\"x\");\n  }}\n}}\n",
                        s = simple,
                        l = simple.to_lowercase()
                    ),
                );
                Ok(ok("generated"))
            }
            other => panic!("unexpected program {other}"),
        }
    }
}

struct Fixture {
    _tmp: TempDir,
    source: PathBuf,
    config: TestGenerationConfig,
}

fn fixture(with_pom: bool) -> Fixture {
    let tmp = TempDir::new().unwrap();
    let jar = tmp.path().join("evosuite.jar");
    touch(&jar, "jar");
    let source = tmp.path().join("project");
    touch(
        &source.join("src/main/java/com/acme/Parser.java"),
        "package com.acme; class Parser { void parse(String s) {} }",
    );
    touch(
        &source.join("src/main/java/com/acme/Util.java"),
        "package com.acme; class Util { void help() {} }",
    );
    touch(&source.join("target/stale/Old.java"), "class Old {}");
    if with_pom {
        touch(&source.join("pom.xml"), "<project/>");
    }
    let config = TestGenerationConfig {
        enabled: true,
        jar_path: jar,
        search_budget: 15,
        max_classes: 10,
        timeout_secs: 30,
    };
    Fixture {
        _tmp: tmp,
        source,
        config,
    }
}

fn request(source: &Path, method: Option<&str>) -> TestGenRequest {
    TestGenRequest {
        source_path: source.to_path_buf(),
        target_method: method.map(str::to_string),
        search_budget: None,
        timeout: None,
    }
}

#[tokio::test]
async fn test_javac_flow_with_target_method() {
    let fx = fixture(false);
    let runner = Arc::new(FakeToolchain::default());
    let client = EvoSuiteClient::new(fx.config.clone(), runner.clone());

    let report = client
        .generate(&request(&fx.source, Some("parse")))
        .await
        .unwrap();

    assert!(report.error.is_none());
    assert_eq!(report.compile.status, StepStatus::Success);
    assert_eq!(report.search_budget, 15);
    assert_eq!(report.compiled_classes_count, Some(2));
    assert_eq!(report.generated_tests.len(), 1);
    assert_eq!(report.generated_tests[0].class, "com.acme.Parser");
    assert_eq!(
        report.generated_tests[0].test_files,
        vec!["evosuite-tests/com/acme/Parser_ESTest.java"]
    );

    let traces = report.reachability.unwrap();
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0].occurrences[0].line, 4);
    assert_eq!(traces[0].test_methods, vec!["test00"]);

    let calls = runner.calls.lock();
    let javac = &calls[0];
    assert_eq!(javac.program, "javac");
    // stale sources under target/ are not compiled
    assert_eq!(javac.args.len(), 4);
    assert!(javac.args.iter().all(|a| !a.contains("Old.java")));

    let java = &calls[1];
    assert_eq!(java.program, "java");
    assert!(java.args.contains(&"-Dsearch_budget=15".to_string()));
    assert!(java.args.contains(&"-Djunit_suffix=Test".to_string()));
    let classes = fx.source.join("target/classes").to_string_lossy().into_owned();
    assert_eq!(arg_value(java, "-projectCP"), Some(classes.as_str()));
}

#[tokio::test]
async fn test_maven_flow_builds_project_classpath() {
    let fx = fixture(true);
    let runner = Arc::new(FakeToolchain::default());
    let client = EvoSuiteClient::new(fx.config.clone(), runner.clone());

    let report = client.generate(&request(&fx.source, None)).await.unwrap();
    assert!(report.error.is_none());
    assert!(report.reachability.is_none());

    let calls = runner.calls.lock();
    assert_eq!(calls[0].args, vec!["-q", "-DskipTests", "clean", "compile"]);
    assert_eq!(
        calls[1].args,
        vec![
            "-q",
            "dependency:build-classpath",
            "-Dmdep.outputFile=target/classpath.txt"
        ]
    );
    let expected_cp = format!(
        "{}:/m2/dep-a.jar:/m2/dep-b.jar",
        fx.source.join("target/classes").display()
    );
    assert_eq!(arg_value(&calls[2], "-projectCP"), Some(expected_cp.as_str()));
}

#[tokio::test]
async fn test_compile_failure_is_reported_not_raised() {
    let fx = fixture(false);
    let runner = Arc::new(FakeToolchain {
        fail_compile: true,
        ..FakeToolchain::default()
    });
    let client = EvoSuiteClient::new(fx.config.clone(), runner.clone());

    let report = client.generate(&request(&fx.source, None)).await.unwrap();
    assert_eq!(report.error.as_deref(), Some("Compilation failed"));
    assert_eq!(report.compile.status, StepStatus::Failed);
    assert!(report.compile.stderr.contains("cannot find symbol"));
    assert!(report.generated_tests.is_empty());
    assert_eq!(runner.calls.lock().len(), 1);
}

#[tokio::test]
async fn test_maven_compile_failure_names_the_build_tool() {
    let fx = fixture(true);
    let runner = Arc::new(FakeToolchain {
        fail_compile: true,
        ..FakeToolchain::default()
    });
    let client = EvoSuiteClient::new(fx.config.clone(), runner.clone());

    let report = client.generate(&request(&fx.source, None)).await.unwrap();
    assert_eq!(report.error.as_deref(), Some("Maven compilation failed"));
    assert_eq!(report.compile.status, StepStatus::Failed);
    assert!(report.compile.stderr.contains("cannot find symbol"));

    // classpath resolution is never attempted after a failed compile
    let calls = runner.calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].program, "mvn");
    assert!(calls[0].args.iter().any(|a| a == "compile"));
}

#[tokio::test]
async fn test_per_class_failure_does_not_abort_others() {
    let fx = fixture(false);
    let runner = Arc::new(FakeToolchain {
        fail_class: Some("com.acme.Parser".into()),
        ..FakeToolchain::default()
    });
    let client = EvoSuiteClient::new(fx.config.clone(), runner);

    let report = client.generate(&request(&fx.source, None)).await.unwrap();
    let statuses: Vec<_> = report
        .generated_tests
        .iter()
        .map(|g| (g.class.as_str(), g.status.clone()))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("com.acme.Parser", StepStatus::Failed),
            ("com.acme.Util", StepStatus::Success)
        ]
    );
}

#[tokio::test]
async fn test_max_classes_and_budget_override() {
    let mut fx = fixture(false);
    fx.config.max_classes = 1;
    let runner = Arc::new(FakeToolchain::default());
    let client = EvoSuiteClient::new(fx.config.clone(), runner.clone());

    let mut req = request(&fx.source, Some("doesNotExist"));
    req.search_budget = Some(5);
    let report = client.generate(&req).await.unwrap();

    assert_eq!(report.generated_tests.len(), 1);
    assert_eq!(report.search_budget, 5);
    assert_eq!(report.reachability, Some(vec![]));
}

#[tokio::test]
async fn test_missing_prerequisites_are_errors() {
    let fx = fixture(false);
    let runner = Arc::new(FakeToolchain::default());

    let mut no_jar = fx.config.clone();
    no_jar.jar_path = PathBuf::from("/nonexistent/evosuite.jar");
    let err = EvoSuiteClient::new(no_jar, runner.clone())
        .generate(&request(&fx.source, None))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("jar not found"));

    let empty = TempDir::new().unwrap();
    let err = EvoSuiteClient::new(fx.config.clone(), runner.clone())
        .generate(&request(empty.path(), None))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no Java source files"));

    let mut disabled = fx.config.clone();
    disabled.enabled = false;
    let client = EvoSuiteClient::new(disabled, runner.clone());
    assert!(!client.enabled());
    assert!(client.generate(&request(&fx.source, None)).await.is_err());

    assert!(runner.calls.lock().is_empty());
}
