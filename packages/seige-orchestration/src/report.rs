//! Plain-text rendering of an execution result for export

use seige_storage::ExecutionRecord;
use serde_json::Value;
use std::fmt::Write;

fn heading(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n{}\n{}", title, "-".repeat(title.len()));
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

fn first_str<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| item.get(*k).and_then(Value::as_str))
}

fn render_engine(out: &mut String, engine: &Value) {
    if engine.get("skipped").and_then(Value::as_bool) == Some(true) {
        heading(out, "Core Engine");
        let _ = writeln!(out, "skipped");
        return;
    }

    heading(out, "Summary");
    match engine.get("summary") {
        Some(Value::Object(map)) if !map.is_empty() => {
            for (key, value) in map {
                let _ = writeln!(out, "{}: {}", key, scalar(value));
            }
        }
        Some(other) if !other.is_null() => {
            let _ = writeln!(out, "{}", scalar(other));
        }
        _ => {
            let _ = writeln!(out, "(no summary)");
        }
    }

    heading(out, "CVE Details");
    match engine.get("cve_details").and_then(Value::as_array) {
        Some(items) if !items.is_empty() => {
            for item in items {
                let id = first_str(item, &["cve_id", "id", "cve"]).unwrap_or("unknown");
                let severity = first_str(item, &["severity"]).unwrap_or("n/a");
                let text = first_str(item, &["description", "title", "summary"]).unwrap_or("");
                let _ = writeln!(out, "- {} [{}] {}", id, severity, text);
            }
        }
        _ => {
            let _ = writeln!(out, "(none reported)");
        }
    }

    if let Some(raw) = engine.get("raw").and_then(Value::as_str) {
        heading(out, "Raw Engine Output");
        let _ = writeln!(out, "{}", raw.trim_end());
    }
}

fn render_test_generation(out: &mut String, section: &Value) {
    heading(out, "Test Generation");
    if section.get("skipped").and_then(Value::as_bool) == Some(true) {
        let reason = first_str(section, &["reason"]).unwrap_or("skipped");
        let _ = writeln!(out, "skipped ({})", reason);
        return;
    }
    if let Some(err) = first_str(section, &["error"]) {
        let _ = writeln!(out, "error: {}", err);
    }
    if let Some(count) = section.get("compiled_classes_count").and_then(Value::as_u64) {
        let _ = writeln!(out, "compiled classes: {}", count);
    }
    if let Some(runs) = section.get("generated_tests").and_then(Value::as_array) {
        let succeeded = runs
            .iter()
            .filter(|r| r.get("status").and_then(Value::as_str) == Some("success"))
            .count();
        let _ = writeln!(out, "classes tested: {} ({} succeeded)", runs.len(), succeeded);
        for run in runs {
            let class = first_str(run, &["class"]).unwrap_or("?");
            let files = run
                .get("test_files")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            let _ = writeln!(out, "  - {}: {} test file(s)", class, files);
        }
    }
    if let Some(traces) = section.get("reachability").and_then(Value::as_array) {
        let method = first_str(section, &["target_method"]).unwrap_or("target");
        let calls: usize = traces
            .iter()
            .filter_map(|t| t.get("occurrences").and_then(Value::as_array))
            .map(Vec::len)
            .sum();
        let _ = writeln!(
            out,
            "reachability: {} call(s) to {} in {} test file(s)",
            calls,
            method,
            traces.len()
        );
    }
}

/// Render the record's result payload; `None` while no result exists
pub fn render_text_report(record: &ExecutionRecord) -> Option<String> {
    let result = record.result_payload.as_ref()?;
    let mut out = String::new();

    let _ = writeln!(out, "SEIGE Analysis Report");
    let _ = writeln!(out, "=====================");
    let _ = writeln!(out, "Execution:    {}", record.id);
    let _ = writeln!(out, "Status:       {}", record.status);
    let _ = writeln!(out, "Submitted by: {}", record.submitted_by);
    let _ = writeln!(out, "Started:      {}", record.started_at.to_rfc3339());
    if let Some(finished) = record.finished_at {
        let _ = writeln!(out, "Finished:     {}", finished.to_rfc3339());
    }
    if let Some(target) = record.request_payload.get("target_id").and_then(Value::as_str) {
        let _ = writeln!(out, "Target:       {}", target);
    }

    if let Some(err) = first_str(result, &["error"]) {
        heading(&mut out, "Error");
        let _ = writeln!(out, "{}", err);
        if let Some(direct) = first_str(result, &["direct_error"]) {
            let _ = writeln!(out, "direct transport: {}", direct);
        }
    }
    if let Some(engine) = result.get("core_engine") {
        render_engine(&mut out, engine);
    }
    if let Some(section) = result.get("test_generation") {
        render_test_generation(&mut out, section);
    }

    Some(out)
}
