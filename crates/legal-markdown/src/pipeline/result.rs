use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use super::error::ProcessingError;
use crate::template::Metadata;
use crate::tracking::FieldReport;

/// Why a step did not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// Registered with `enabled = false`.
    Disabled,
    /// Switched off by its processor for the current options.
    OptionDisabled,
    /// Excluded by `only_steps` or `skip_steps`.
    Filtered,
    /// A dependency failed or was itself skipped because of a failure.
    DependencyFailed(String),
}

impl SkipReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, SkipReason::DependencyFailed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    pub duration: Duration,
    pub error: Option<ProcessingError>,
}

impl StepResult {
    pub fn completed(name: &str, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            status: StepStatus::Completed,
            duration,
            error: None,
        }
    }

    pub fn failed(name: &str, duration: Duration, error: ProcessingError) -> Self {
        Self {
            name: name.to_string(),
            status: StepStatus::Failed,
            duration,
            error: Some(error),
        }
    }

    pub fn skipped(name: &str, reason: SkipReason) -> Self {
        Self {
            name: name.to_string(),
            status: StepStatus::Skipped(reason),
            duration: Duration::ZERO,
            error: None,
        }
    }

    /// Dependents of this step may run.
    pub fn unblocks_dependents(&self) -> bool {
        match &self.status {
            StepStatus::Completed => true,
            StepStatus::Failed => false,
            StepStatus::Skipped(reason) => !reason.is_failure(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineMetrics {
    pub total_steps: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Completed over attempted (completed + failed); 1.0 when nothing ran.
    pub success_rate: f64,
    pub average_step_duration: Duration,
    pub fields_tracked: usize,
    pub fields_per_second: f64,
}

impl PipelineMetrics {
    pub fn compute(steps: &[StepResult], fields_tracked: usize, total: Duration) -> Self {
        let count = |f: fn(&StepStatus) -> bool| steps.iter().filter(|s| f(&s.status)).count();
        let completed = count(|s| matches!(s, StepStatus::Completed));
        let failed = count(|s| matches!(s, StepStatus::Failed));
        let skipped = count(|s| matches!(s, StepStatus::Skipped(_)));
        let attempted = completed + failed;

        let success_rate = if attempted == 0 {
            1.0
        } else {
            completed as f64 / attempted as f64
        };
        let run_time: Duration = steps
            .iter()
            .filter(|s| !matches!(s.status, StepStatus::Skipped(_)))
            .map(|s| s.duration)
            .sum();
        let average_step_duration = if attempted == 0 {
            Duration::ZERO
        } else {
            run_time / attempted as u32
        };
        let seconds = total.as_secs_f64();
        let fields_per_second = if seconds > 0.0 {
            fields_tracked as f64 / seconds
        } else {
            0.0
        };

        Self {
            total_steps: steps.len(),
            completed,
            failed,
            skipped,
            success_rate,
            average_step_duration,
            fields_tracked,
            fields_per_second,
        }
    }
}

/// Outcome of one run. Built once at the end of `execute`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub content: String,
    pub metadata: Metadata,
    pub success: bool,
    pub aborted: bool,
    pub step_results: Vec<StepResult>,
    pub field_report: Option<FieldReport>,
    pub exported_files: Vec<PathBuf>,
    pub total_duration: Duration,
    pub errors: Vec<ProcessingError>,
    pub warnings: Vec<String>,
    pub metrics: Option<PipelineMetrics>,
}

impl PipelineResult {
    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.step_results.iter().find(|s| s.name == name)
    }

    /// Names of steps that ran to completion, in execution order.
    pub fn completed_steps(&self) -> Vec<&str> {
        self.step_results
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.name.as_str())
            .collect()
    }
}
