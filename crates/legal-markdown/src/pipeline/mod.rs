//! Step orchestration: registration, dependency ordering, per-step
//! execution with timeouts, and run results.

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod graph;
pub mod result;
pub mod runner;
pub mod step;

pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::{ErrorCode, PipelineError, ProcessingError, Severity, StepError};
pub use events::{ChannelListener, NoopListener, PipelineEvent, PipelineListener, TracingListener};
pub use graph::DependencyGraph;
pub use result::{PipelineMetrics, PipelineResult, SkipReason, StepResult, StepStatus};
pub use runner::{AbortHandle, Pipeline, PipelineBuilder, RunState};
pub use step::{FnStep, PipelineStep, StepProcessor};
