use std::time::Duration;

use crossbeam_channel::Sender;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::ProcessingError;
use super::result::SkipReason;

/// Lifecycle events emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    PipelineStarted {
        run_id: Uuid,
        steps: Vec<String>,
    },
    StepStarted {
        run_id: Uuid,
        step: String,
    },
    StepCompleted {
        run_id: Uuid,
        step: String,
        duration: Duration,
    },
    StepSkipped {
        run_id: Uuid,
        step: String,
        reason: SkipReason,
    },
    StepFailed {
        run_id: Uuid,
        step: String,
        error: ProcessingError,
    },
    PipelineCompleted {
        run_id: Uuid,
        success: bool,
        duration: Duration,
    },
    PipelineAborted {
        run_id: Uuid,
        completed_steps: usize,
    },
}

pub trait PipelineListener: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Ignores everything.
pub struct NoopListener;

impl PipelineListener for NoopListener {
    fn on_event(&self, _event: &PipelineEvent) {}
}

/// Writes events to the tracing subscriber.
pub struct TracingListener;

impl PipelineListener for TracingListener {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::PipelineStarted { run_id, steps } => {
                info!(%run_id, "Pipeline started with {} step(s)", steps.len())
            }
            PipelineEvent::StepStarted { step, .. } => debug!("Step {} started", step),
            PipelineEvent::StepCompleted { step, duration, .. } => {
                debug!("Step {} completed in {:?}", step, duration)
            }
            PipelineEvent::StepSkipped { step, reason, .. } => {
                debug!("Step {} skipped: {:?}", step, reason)
            }
            PipelineEvent::StepFailed { step, error, .. } => {
                warn!("Step {} failed: {}", step, error.message)
            }
            PipelineEvent::PipelineCompleted {
                run_id,
                success,
                duration,
            } => info!(%run_id, success, "Pipeline finished in {:?}", duration),
            PipelineEvent::PipelineAborted {
                run_id,
                completed_steps,
            } => warn!(%run_id, "Pipeline aborted after {} step(s)", completed_steps),
        }
    }
}

/// Forwards events over a crossbeam channel. A disconnected receiver is
/// ignored.
pub struct ChannelListener {
    sender: Sender<PipelineEvent>,
}

impl ChannelListener {
    pub fn new(sender: Sender<PipelineEvent>) -> Self {
        Self { sender }
    }
}

impl PipelineListener for ChannelListener {
    fn on_event(&self, event: &PipelineEvent) {
        let _ = self.sender.send(event.clone());
    }
}
