//! Status view with advisory progress inferred from milestone logs

use crate::pipeline::milestones as m;
use chrono::{DateTime, Utc};
use seige_storage::{ExecutionRecord, ExecutionStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Done,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    pub name: &'static str,
    pub status: StepState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusView {
    pub execution_id: String,
    pub state: ExecutionStatus,
    pub logs: Vec<String>,
    pub progress: u8,
    pub current_step: Option<String>,
    pub steps: Vec<StepView>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

struct StepRule {
    name: &'static str,
    started: &'static [&'static str],
    done: &'static [&'static str],
    failed: &'static [&'static str],
    skipped: &'static [&'static str],
}

const STEPS: &[StepRule] = &[
    StepRule {
        name: "fetch_source",
        started: &[m::FETCHING_SOURCE],
        done: &[m::SOURCE_READY],
        failed: &[],
        skipped: &[],
    },
    StepRule {
        name: "build",
        started: &[m::BUILDING],
        done: &[m::BUILD_COMPLETED],
        failed: &[],
        skipped: &[],
    },
    StepRule {
        name: "test_generation",
        started: &[m::GENERATING_TESTS],
        done: &[m::TEST_GENERATION_COMPLETED],
        failed: &[m::TEST_GENERATION_FAILED],
        skipped: &[m::TEST_GENERATION_SKIPPED, m::TEST_GENERATION_DISABLED],
    },
    StepRule {
        name: "core_engine",
        started: &[m::INVOKING_ENGINE],
        done: &[m::ENGINE_DIRECT_COMPLETED, m::ENGINE_FALLBACK_COMPLETED],
        failed: &[m::ENGINE_FALLBACK_FAILED],
        skipped: &[m::ENGINE_SKIPPED],
    },
    StepRule {
        name: "finalize",
        started: &[m::PARSING_RESULT],
        done: &[m::PIPELINE_COMPLETED],
        failed: &[],
        skipped: &[],
    },
];

/// Percent reached once a milestone has been logged
const PROGRESS: &[(&str, u8)] = &[
    (m::PIPELINE_STARTED, 5),
    (m::FETCHING_SOURCE, 10),
    (m::SOURCE_READY, 20),
    (m::TARGET_PARAMETERS, 25),
    (m::BUILDING, 30),
    (m::BUILD_COMPLETED, 45),
    (m::GENERATING_TESTS, 50),
    (m::TEST_GENERATION_SKIPPED, 65),
    (m::TEST_GENERATION_DISABLED, 65),
    (m::TEST_GENERATION_COMPLETED, 65),
    (m::TEST_GENERATION_FAILED, 65),
    (m::INVOKING_ENGINE, 70),
    (m::ENGINE_DIRECT_FAILED, 75),
    (m::ENGINE_SKIPPED, 85),
    (m::ENGINE_DIRECT_COMPLETED, 85),
    (m::ENGINE_FALLBACK_COMPLETED, 85),
    (m::PARSING_RESULT, 90),
    (m::PIPELINE_COMPLETED, 100),
];

fn any_line(logs: &[String], prefixes: &[&str]) -> bool {
    logs.iter()
        .any(|line| prefixes.iter().any(|p| line.starts_with(p)))
}

pub fn infer_progress(logs: &[String], state: ExecutionStatus) -> u8 {
    if state == ExecutionStatus::Completed {
        return 100;
    }
    logs.iter()
        .filter_map(|line| {
            PROGRESS
                .iter()
                .find(|(prefix, _)| line.starts_with(prefix))
                .map(|(_, pct)| *pct)
        })
        .max()
        .unwrap_or(0)
}

pub fn infer_steps(logs: &[String], state: ExecutionStatus) -> Vec<StepView> {
    STEPS
        .iter()
        .map(|rule| {
            let status = if any_line(logs, rule.failed) {
                StepState::Failed
            } else if any_line(logs, rule.skipped) {
                StepState::Skipped
            } else if any_line(logs, rule.done) {
                StepState::Done
            } else if any_line(logs, rule.started) {
                if state == ExecutionStatus::Failed {
                    StepState::Failed
                } else {
                    StepState::Running
                }
            } else {
                StepState::Pending
            };
            StepView {
                name: rule.name,
                status,
            }
        })
        .collect()
}

impl StatusView {
    pub fn from_record(record: &ExecutionRecord) -> Self {
        let steps = infer_steps(&record.logs, record.status);
        let current_step = match record.status {
            ExecutionStatus::Running => steps
                .iter()
                .find(|s| s.status == StepState::Running)
                .map(|s| s.name.to_string()),
            status => Some(status.as_str().to_string()),
        };
        Self {
            execution_id: record.id.clone(),
            state: record.status,
            logs: record.logs.clone(),
            progress: infer_progress(&record.logs, record.status),
            current_step,
            steps,
            started_at: record.started_at,
            finished_at: record.finished_at,
        }
    }
}
