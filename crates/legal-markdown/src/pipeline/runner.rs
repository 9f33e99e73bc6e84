use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use tracing::{debug, info_span, warn, Span};
use uuid::Uuid;

use crate::crossref::HeaderFormats;
use crate::options::ProcessingOptions;
use crate::template::{HelperRegistry, Metadata};

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::{PipelineError, ProcessingError, StepError};
use super::events::{PipelineEvent, PipelineListener};
use super::graph::DependencyGraph;
use super::result::{PipelineMetrics, PipelineResult, SkipReason, StepResult, StepStatus};
use super::step::PipelineStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Aborted,
}

/// Stops a running pipeline before its next step. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct PipelineBuilder {
    config: PipelineConfig,
    steps: Vec<PipelineStep>,
    listeners: Vec<Arc<dyn PipelineListener>>,
    helpers: Option<Arc<HelperRegistry>>,
    abort: AbortHandle,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            steps: Vec::new(),
            listeners: Vec::new(),
            helpers: None,
            abort: AbortHandle::default(),
        }
    }

    /// Adds a step. Names must be non-empty and unique.
    pub fn register(mut self, step: PipelineStep) -> Result<Self, PipelineError> {
        if step.name.trim().is_empty() {
            return Err(PipelineError::EmptyStepName);
        }
        if self.steps.iter().any(|s| s.name == step.name) {
            return Err(PipelineError::DuplicateStep(step.name));
        }
        self.steps.push(step);
        Ok(self)
    }

    pub fn listener(mut self, listener: impl PipelineListener + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub fn helpers(mut self, helpers: Arc<HelperRegistry>) -> Self {
        self.helpers = Some(helpers);
        self
    }

    /// Handle for the pipeline this builder will produce.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Orders the steps and checks dependencies and capabilities.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let mut graph = DependencyGraph::new();
        for step in &self.steps {
            graph.add_node(&step.name, step.order, &step.dependencies);
        }
        let order = graph.execution_order()?;

        let mut by_name: HashMap<String, PipelineStep> = self
            .steps
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();
        let steps: Vec<PipelineStep> = order.iter().filter_map(|n| by_name.remove(n)).collect();
        validate_capabilities(&steps)?;
        validate_filters(&steps, &self.config)?;

        debug!(
            "Pipeline built: {}",
            steps.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(" -> ")
        );

        let header_formats = Arc::new(self.config.header_formats.clone());
        Ok(Pipeline {
            steps,
            config: self.config,
            listeners: self.listeners,
            helpers: self
                .helpers
                .unwrap_or_else(|| Arc::new(HelperRegistry::with_builtins())),
            header_formats,
            abort: self.abort,
            state: Mutex::new(RunState::Idle),
        })
    }
}

/// Configured step filters must name registered steps.
fn validate_filters(steps: &[PipelineStep], config: &PipelineConfig) -> Result<(), PipelineError> {
    match config
        .only_steps
        .iter()
        .chain(&config.skip_steps)
        .find(|name| !steps.iter().any(|s| &s.name == *name))
    {
        Some(name) => Err(PipelineError::UnknownStep(name.clone())),
        None => Ok(()),
    }
}

/// Every required capability must be provided by an earlier enabled step.
fn validate_capabilities(steps: &[PipelineStep]) -> Result<(), PipelineError> {
    let mut provided: HashSet<&str> = HashSet::new();
    for step in steps {
        if let Some(missing) = step.requires.iter().find(|c| !provided.contains(c.as_str())) {
            return Err(PipelineError::MissingCapability {
                step: step.name.clone(),
                capability: missing.clone(),
            });
        }
        if step.enabled {
            provided.extend(step.provides.iter().map(String::as_str));
        }
    }
    Ok(())
}

/// An ordered, validated set of steps. Steps run strictly one after the
/// other against a single content string and metadata map.
pub struct Pipeline {
    steps: Vec<PipelineStep>,
    config: PipelineConfig,
    listeners: Vec<Arc<dyn PipelineListener>>,
    helpers: Arc<HelperRegistry>,
    header_formats: Arc<HeaderFormats>,
    abort: AbortHandle,
    state: Mutex<RunState>,
}

enum Outcome {
    Done(String, Metadata),
    Failed(StepError),
}

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn helpers(&self) -> &Arc<HelperRegistry> {
        &self.helpers
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn state(&self) -> RunState {
        self.state.lock().map(|s| *s).unwrap_or(RunState::Idle)
    }

    /// Every name in `only_steps` and `skip_steps` must be a registered step.
    pub fn check_filters(&self, options: &ProcessingOptions) -> Result<(), PipelineError> {
        for name in options.only_steps.iter().chain(&options.skip_steps) {
            if !self.steps.iter().any(|s| &s.name == name) {
                return Err(PipelineError::UnknownStep(name.clone()));
            }
        }
        Ok(())
    }

    fn set_state(&self, state: RunState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    fn emit(&self, event: PipelineEvent) {
        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }

    fn skip_reason(
        &self,
        step: &PipelineStep,
        options: &ProcessingOptions,
        blocked: &HashSet<String>,
    ) -> Option<SkipReason> {
        if !step.enabled {
            return Some(SkipReason::Disabled);
        }
        // per-run filters replace the configured `only` list and add to `skip`
        let only = if options.only_steps.is_empty() {
            &self.config.only_steps
        } else {
            &options.only_steps
        };
        let filtered_out = !only.is_empty() && !only.contains(&step.name);
        let skipped = options.skip_steps.contains(&step.name) || self.config.skip_steps.contains(&step.name);
        if filtered_out || skipped {
            return Some(SkipReason::Filtered);
        }
        if !step.processor.is_enabled(options) {
            return Some(SkipReason::OptionDisabled);
        }
        step.dependencies
            .iter()
            .find(|d| blocked.contains(*d))
            .map(|d| SkipReason::DependencyFailed(d.clone()))
    }

    /// Runs every step over `content`. Never panics and never returns an
    /// error: failures are recorded in the result.
    pub fn execute(
        &self,
        content: &str,
        metadata: Metadata,
        options: ProcessingOptions,
    ) -> PipelineResult {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let _pipeline_span = info_span!("pipeline", run_id = %run_id, steps = self.steps.len()).entered();

        self.abort.reset();
        self.set_state(RunState::Running);

        let ctx = PipelineContext::new(
            Arc::new(options),
            Arc::clone(&self.helpers),
            Arc::clone(&self.header_formats),
        );
        ctx.tracker.clear();

        let original_content = content.to_string();
        let original_metadata = metadata.clone();
        let mut content = original_content.clone();
        let mut metadata = metadata;
        let mut step_results = Vec::with_capacity(self.steps.len());
        let mut errors = Vec::new();
        let mut aborted = false;
        let mut critical = false;

        if let Err(e) = self.check_filters(&ctx.options) {
            warn!("Rejected run: {}", e);
            errors.push(ProcessingError::configuration(&e));
            self.set_state(RunState::Completed);
            return self.finish(
                run_id,
                started,
                &ctx,
                original_content,
                original_metadata,
                step_results,
                errors,
                false,
            );
        }

        self.emit(PipelineEvent::PipelineStarted {
            run_id,
            steps: self.steps.iter().map(|s| s.name.clone()).collect(),
        });

        let mut blocked: HashSet<String> = HashSet::new();
        for step in &self.steps {
            if self.abort.is_aborted() {
                aborted = true;
                break;
            }

            if let Some(reason) = self.skip_reason(step, &ctx.options, &blocked) {
                debug!("Skipping step {}: {:?}", step.name, reason);
                let result = StepResult::skipped(&step.name, reason.clone());
                if !result.unblocks_dependents() {
                    blocked.insert(step.name.clone());
                }
                self.emit(PipelineEvent::StepSkipped {
                    run_id,
                    step: step.name.clone(),
                    reason,
                });
                step_results.push(result);
                continue;
            }

            let _step_span = info_span!("step", name = %step.name).entered();
            self.emit(PipelineEvent::StepStarted {
                run_id,
                step: step.name.clone(),
            });

            let step_started = Instant::now();
            let outcome = self.run_step(step, &content, &metadata, &ctx);
            let duration = step_started.elapsed();

            match outcome {
                Outcome::Done(new_content, new_metadata) => {
                    content = new_content;
                    metadata = new_metadata;
                    self.emit(PipelineEvent::StepCompleted {
                        run_id,
                        step: step.name.clone(),
                        duration,
                    });
                    step_results.push(StepResult::completed(&step.name, duration));
                }
                Outcome::Failed(error) => {
                    warn!("Step {} failed: {}", step.name, error);
                    let recorded = ProcessingError::from_step(&step.name, &error);
                    self.emit(PipelineEvent::StepFailed {
                        run_id,
                        step: step.name.clone(),
                        error: recorded.clone(),
                    });
                    step_results.push(StepResult::failed(&step.name, duration, recorded.clone()));
                    errors.push(recorded);
                    blocked.insert(step.name.clone());

                    if !error.is_recoverable() {
                        critical = true;
                        break;
                    }
                    if !self.config.continue_on_error {
                        break;
                    }
                }
            }
        }

        if aborted {
            let completed_steps = step_results
                .iter()
                .filter(|r| r.status == StepStatus::Completed)
                .count();
            errors.push(ProcessingError::aborted());
            self.emit(PipelineEvent::PipelineAborted {
                run_id,
                completed_steps,
            });
            self.set_state(RunState::Aborted);
        } else {
            self.set_state(RunState::Completed);
        }

        let (content, metadata) = if critical {
            (original_content, original_metadata)
        } else {
            (content, metadata)
        };
        self.finish(
            run_id,
            started,
            &ctx,
            content,
            metadata,
            step_results,
            errors,
            aborted,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        run_id: Uuid,
        started: Instant,
        ctx: &PipelineContext,
        content: String,
        metadata: Metadata,
        step_results: Vec<StepResult>,
        errors: Vec<ProcessingError>,
        aborted: bool,
    ) -> PipelineResult {
        let total_duration = started.elapsed();
        let success = errors.is_empty() && !aborted;
        let field_report = ctx.options.tracks_fields().then(|| ctx.tracker.report());
        let fields_tracked = field_report.as_ref().map(|r| r.total).unwrap_or(0);
        let metrics = self
            .config
            .enable_metrics
            .then(|| PipelineMetrics::compute(&step_results, fields_tracked, total_duration));

        if !aborted {
            self.emit(PipelineEvent::PipelineCompleted {
                run_id,
                success,
                duration: total_duration,
            });
        }

        PipelineResult {
            run_id,
            content,
            metadata,
            success,
            aborted,
            step_results,
            field_report,
            exported_files: ctx.exported_files(),
            total_duration,
            errors,
            warnings: ctx.warnings(),
            metrics,
        }
    }

    /// A step works on its own copy of the metadata; the copy replaces the
    /// run's metadata only when the step succeeds.
    fn run_step(
        &self,
        step: &PipelineStep,
        content: &str,
        metadata: &Metadata,
        ctx: &PipelineContext,
    ) -> Outcome {
        match step.timeout.or(self.config.default_step_timeout) {
            Some(limit) => run_with_timeout(step, content, metadata, ctx, limit),
            None => {
                let mut working = metadata.clone();
                let result = catch_unwind(AssertUnwindSafe(|| {
                    step.processor.process(content, &mut working, ctx)
                }));
                match result {
                    Ok(Ok(output)) => Outcome::Done(output, working),
                    Ok(Err(e)) => Outcome::Failed(e),
                    Err(payload) => Outcome::Failed(StepError::Panic(panic_message(payload))),
                }
            }
        }
    }
}

/// Races the step against `limit` on a helper thread. The step reports
/// into a detached context that joins the run only when a result arrives
/// in time. A step that runs past the limit is abandoned: its context is
/// cancelled and whatever it produces later is dropped.
fn run_with_timeout(
    step: &PipelineStep,
    content: &str,
    metadata: &Metadata,
    ctx: &PipelineContext,
    limit: Duration,
) -> Outcome {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let processor = Arc::clone(&step.processor);
    let content = content.to_string();
    let mut working = metadata.clone();
    let detached = ctx.detached();
    let step_ctx = detached.clone();
    let span = Span::current();

    let spawned = thread::Builder::new()
        .name(format!("step-{}", step.name))
        .spawn(move || {
            let _entered = span.enter();
            let result = catch_unwind(AssertUnwindSafe(|| {
                processor.process(&content, &mut working, &step_ctx)
            }));
            let _ = tx.send((result, working));
        });
    if let Err(e) = spawned {
        return Outcome::Failed(StepError::Other(format!("Failed to spawn step thread: {e}")));
    }

    match rx.recv_timeout(limit) {
        Ok((result, working)) => {
            ctx.merge(&detached);
            match result {
                Ok(Ok(output)) => Outcome::Done(output, working),
                Ok(Err(e)) => Outcome::Failed(e),
                Err(payload) => Outcome::Failed(StepError::Panic(panic_message(payload))),
            }
        }
        Err(RecvTimeoutError::Timeout) => {
            detached.cancel();
            Outcome::Failed(StepError::Timeout(limit))
        }
        Err(RecvTimeoutError::Disconnected) => {
            detached.cancel();
            Outcome::Failed(StepError::Panic("step thread exited without a result".into()))
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::{ErrorCode, Severity};
    use crate::pipeline::events::ChannelListener;
    use crate::pipeline::step::{FnStep, StepProcessor};
    use serde_json::json;

    fn append(tag: &'static str) -> FnStep<impl Fn(&str, &mut Metadata, &PipelineContext) -> Result<String, StepError>> {
        FnStep(move |content: &str, _: &mut Metadata, _: &PipelineContext| Ok(format!("{content}{tag}")))
    }

    fn failing(message: &'static str) -> FnStep<impl Fn(&str, &mut Metadata, &PipelineContext) -> Result<String, StepError>> {
        FnStep(move |_: &str, _: &mut Metadata, _: &PipelineContext| Err(StepError::Other(message.into())))
    }

    fn run(pipeline: &Pipeline, content: &str) -> PipelineResult {
        pipeline.execute(content, Metadata::new(), ProcessingOptions::default())
    }

    #[test]
    fn test_steps_run_in_order_and_chain_content() {
        let pipeline = Pipeline::builder(PipelineConfig::default())
            .register(PipelineStep::new("b", 20, append("B"))).unwrap()
            .register(PipelineStep::new("a", 10, append("A"))).unwrap()
            .build()
            .unwrap();

        let result = run(&pipeline, ">");
        assert!(result.success);
        assert_eq!(result.content, ">AB");
        assert_eq!(pipeline.step_names(), vec!["a", "b"]);
        assert_eq!(pipeline.state(), RunState::Completed);
    }

    #[test]
    fn test_dependency_wins_over_order() {
        let pipeline = Pipeline::builder(PipelineConfig::default())
            .register(PipelineStep::new("early", 1, append("E")).depends_on(["late"])).unwrap()
            .register(PipelineStep::new("late", 50, append("L"))).unwrap()
            .build()
            .unwrap();
        assert_eq!(run(&pipeline, "").content, "LE");
    }

    #[test]
    fn test_metadata_mutations_persist_between_steps() {
        let set = FnStep(|c: &str, m: &mut Metadata, _: &PipelineContext| {
            m.insert("party".into(), json!("Acme"));
            Ok(c.to_string())
        });
        let read = FnStep(|c: &str, m: &mut Metadata, _: &PipelineContext| {
            Ok(format!("{c}{}", m.get("party").and_then(|v| v.as_str()).unwrap_or("?")))
        });
        let pipeline = Pipeline::builder(PipelineConfig::default())
            .register(PipelineStep::new("set", 1, set)).unwrap()
            .register(PipelineStep::new("read", 2, read)).unwrap()
            .build()
            .unwrap();

        let result = run(&pipeline, "Party: ");
        assert_eq!(result.content, "Party: Acme");
        assert_eq!(result.metadata["party"], json!("Acme"));
    }

    #[test]
    fn test_registration_rejects_duplicates_and_empty_names() {
        let builder = Pipeline::builder(PipelineConfig::default())
            .register(PipelineStep::new("a", 1, append("A")))
            .unwrap();
        assert!(matches!(
            builder.register(PipelineStep::new("a", 2, append("A"))),
            Err(PipelineError::DuplicateStep(name)) if name == "a"
        ));
        assert!(matches!(
            Pipeline::builder(PipelineConfig::default()).register(PipelineStep::new(" ", 1, append("A"))),
            Err(PipelineError::EmptyStepName)
        ));
    }

    #[test]
    fn test_cycle_is_a_build_error() {
        let result = Pipeline::builder(PipelineConfig::default())
            .register(PipelineStep::new("a", 1, append("A")).depends_on(["b"])).unwrap()
            .register(PipelineStep::new("b", 2, append("B")).depends_on(["a"])).unwrap()
            .build();
        assert!(matches!(result, Err(PipelineError::CircularDependency(_))));
    }

    #[test]
    fn test_missing_capability_is_a_build_error() {
        let result = Pipeline::builder(PipelineConfig::default())
            .register(PipelineStep::new("consumer", 1, append("C")).requires(["metadata"])).unwrap()
            .register(PipelineStep::new("producer", 2, append("P")).provides(["metadata"])).unwrap()
            .build();
        assert_eq!(
            result.err(),
            Some(PipelineError::MissingCapability {
                step: "consumer".into(),
                capability: "metadata".into()
            })
        );
    }

    #[test]
    fn test_failure_halts_and_keeps_earlier_output() {
        let pipeline = Pipeline::builder(PipelineConfig::default())
            .register(PipelineStep::new("a", 1, append("A"))).unwrap()
            .register(PipelineStep::new("bad", 2, failing("nope"))).unwrap()
            .register(PipelineStep::new("c", 3, append("C"))).unwrap()
            .build()
            .unwrap();

        let result = run(&pipeline, "");
        assert!(!result.success);
        assert_eq!(result.content, "A");
        assert_eq!(result.step_results.len(), 2);
        assert_eq!(result.errors[0].step_name.as_deref(), Some("bad"));
        assert_eq!(result.errors[0].code, ErrorCode::StepFailed);
        assert!(result.errors[0].recoverable);
    }

    #[test]
    fn test_continue_on_error_skips_dependents_only() {
        let config = PipelineConfig {
            continue_on_error: true,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::builder(config)
            .register(PipelineStep::new("bad", 1, failing("nope"))).unwrap()
            .register(PipelineStep::new("child", 2, append("X")).depends_on(["bad"])).unwrap()
            .register(PipelineStep::new("grandchild", 3, append("Y")).depends_on(["child"])).unwrap()
            .register(PipelineStep::new("other", 4, append("O"))).unwrap()
            .build()
            .unwrap();

        let result = run(&pipeline, "");
        assert!(!result.success);
        assert_eq!(result.content, "O");
        assert_eq!(
            result.step("child").unwrap().status,
            StepStatus::Skipped(SkipReason::DependencyFailed("bad".into()))
        );
        assert_eq!(
            result.step("grandchild").unwrap().status,
            StepStatus::Skipped(SkipReason::DependencyFailed("child".into()))
        );
        assert_eq!(result.step("other").unwrap().status, StepStatus::Completed);
    }

    #[test]
    fn test_failed_step_leaves_metadata_untouched() {
        let config = PipelineConfig {
            continue_on_error: true,
            ..PipelineConfig::default()
        };
        let dirty = FnStep(|_: &str, m: &mut Metadata, _: &PipelineContext| {
            m.insert("dirty".into(), json!(true));
            Err(StepError::Other("later".into()))
        });
        let pipeline = Pipeline::builder(config)
            .register(PipelineStep::new("dirty", 1, dirty)).unwrap()
            .build()
            .unwrap();
        assert!(run(&pipeline, "").metadata.get("dirty").is_none());
    }

    struct OnlyWithoutMixins;

    impl StepProcessor for OnlyWithoutMixins {
        fn process(&self, content: &str, _: &mut Metadata, _: &PipelineContext) -> Result<String, StepError> {
            Ok(format!("{content}M"))
        }

        fn is_enabled(&self, options: &ProcessingOptions) -> bool {
            !options.no_mixins
        }
    }

    #[test]
    fn test_skips_are_not_failures() {
        let pipeline = Pipeline::builder(PipelineConfig::default())
            .register(PipelineStep::new("off", 1, append("D")).disabled()).unwrap()
            .register(PipelineStep::new("opt", 2, OnlyWithoutMixins)).unwrap()
            .register(PipelineStep::new("after", 3, append("A")).depends_on(["off", "opt"])).unwrap()
            .build()
            .unwrap();

        let options = ProcessingOptions {
            no_mixins: true,
            ..ProcessingOptions::default()
        };
        let result = pipeline.execute("", Metadata::new(), options);
        assert!(result.success);
        assert_eq!(result.content, "A");
        assert_eq!(result.step("off").unwrap().status, StepStatus::Skipped(SkipReason::Disabled));
        assert_eq!(
            result.step("opt").unwrap().status,
            StepStatus::Skipped(SkipReason::OptionDisabled)
        );
    }

    #[test]
    fn test_only_and_skip_filters() {
        let pipeline = Pipeline::builder(PipelineConfig::default())
            .register(PipelineStep::new("a", 1, append("A"))).unwrap()
            .register(PipelineStep::new("b", 2, append("B"))).unwrap()
            .register(PipelineStep::new("c", 3, append("C"))).unwrap()
            .build()
            .unwrap();

        let only = ProcessingOptions {
            only_steps: vec!["a".into(), "c".into()],
            ..ProcessingOptions::default()
        };
        assert_eq!(pipeline.execute("", Metadata::new(), only).content, "AC");

        let skip = ProcessingOptions {
            skip_steps: vec!["a".into()],
            ..ProcessingOptions::default()
        };
        let result = pipeline.execute("", Metadata::new(), skip);
        assert_eq!(result.content, "BC");
        assert_eq!(result.step("a").unwrap().status, StepStatus::Skipped(SkipReason::Filtered));
    }

    #[test]
    fn test_configured_filters_apply_to_every_run() {
        let pipeline = Pipeline::builder(PipelineConfig {
            skip_steps: vec!["b".into()],
            ..PipelineConfig::default()
        })
        .register(PipelineStep::new("a", 1, append("A"))).unwrap()
        .register(PipelineStep::new("b", 2, append("B"))).unwrap()
        .register(PipelineStep::new("c", 3, append("C"))).unwrap()
        .build()
        .unwrap();
        assert_eq!(run(&pipeline, "").content, "AC");

        let skip_c = ProcessingOptions {
            skip_steps: vec!["c".into()],
            ..ProcessingOptions::default()
        };
        assert_eq!(pipeline.execute("", Metadata::new(), skip_c).content, "A");
    }

    #[test]
    fn test_unknown_configured_filter_fails_build() {
        for config in [
            PipelineConfig {
                only_steps: vec!["a".into(), "ghost".into()],
                ..PipelineConfig::default()
            },
            PipelineConfig {
                skip_steps: vec!["ghost".into()],
                ..PipelineConfig::default()
            },
        ] {
            let err = Pipeline::builder(config)
                .register(PipelineStep::new("a", 1, append("A"))).unwrap()
                .build()
                .err()
                .expect("unknown filter is rejected");
            assert_eq!(err, PipelineError::UnknownStep("ghost".into()));
        }
    }

    #[test]
    fn test_unknown_filter_name_rejects_run() {
        let pipeline = Pipeline::builder(PipelineConfig::default())
            .register(PipelineStep::new("a", 1, append("A"))).unwrap()
            .build()
            .unwrap();
        let options = ProcessingOptions {
            skip_steps: vec!["ghost".into()],
            ..ProcessingOptions::default()
        };
        let result = pipeline.execute("doc", Metadata::new(), options);
        assert!(!result.success);
        assert_eq!(result.content, "doc");
        assert_eq!(result.errors[0].code, ErrorCode::Configuration);
        assert!(result.step_results.is_empty());
    }

    #[test]
    fn test_timeout_fails_step() {
        let slow = FnStep(|c: &str, _: &mut Metadata, _: &PipelineContext| {
            thread::sleep(Duration::from_millis(300));
            Ok(format!("{c}slow"))
        });
        let pipeline = Pipeline::builder(PipelineConfig::default())
            .register(PipelineStep::new("slow", 1, slow).with_timeout(Duration::from_millis(20))).unwrap()
            .build()
            .unwrap();

        let result = run(&pipeline, "doc");
        assert!(!result.success);
        assert_eq!(result.content, "doc");
        assert_eq!(result.errors[0].code, ErrorCode::Timeout);
    }

    #[test]
    fn test_timed_out_step_cannot_write_into_run() {
        let slow = FnStep(|c: &str, _: &mut Metadata, ctx: &PipelineContext| {
            thread::sleep(Duration::from_millis(150));
            ctx.warn("late write");
            ctx.add_exported_file(std::path::PathBuf::from("late.json"));
            if let Some(tracker) = ctx.active_tracker() {
                tracker.track("late", Some(&json!("x")), false, crate::tracking::MixinKind::Variable);
            }
            Ok(c.to_string())
        });
        let idle = FnStep(|c: &str, _: &mut Metadata, _: &PipelineContext| {
            thread::sleep(Duration::from_millis(400));
            Ok(c.to_string())
        });
        let pipeline = Pipeline::builder(PipelineConfig {
            continue_on_error: true,
            ..PipelineConfig::default()
        })
        .register(PipelineStep::new("slow", 1, slow).with_timeout(Duration::from_millis(20))).unwrap()
        .register(PipelineStep::new("idle", 2, idle)).unwrap()
        .build()
        .unwrap();

        let options = ProcessingOptions {
            enable_field_tracking: true,
            ..ProcessingOptions::default()
        };
        let result = pipeline.execute("doc", Metadata::new(), options);
        assert_eq!(result.step("slow").unwrap().status, StepStatus::Failed);
        assert_eq!(result.step("idle").unwrap().status, StepStatus::Completed);
        assert!(result.warnings.is_empty());
        assert!(result.exported_files.is_empty());
        assert_eq!(result.field_report.unwrap().total, 0);
    }

    #[test]
    fn test_step_within_timeout_reports_into_run() {
        let noisy = FnStep(|c: &str, _: &mut Metadata, ctx: &PipelineContext| {
            ctx.warn("kept");
            Ok(c.to_string())
        });
        let pipeline = Pipeline::builder(PipelineConfig::default())
            .register(PipelineStep::new("noisy", 1, noisy).with_timeout(Duration::from_secs(5))).unwrap()
            .build()
            .unwrap();
        assert_eq!(run(&pipeline, "").warnings, vec!["kept".to_string()]);
    }

    #[test]
    fn test_step_within_timeout_succeeds() {
        let pipeline = Pipeline::builder(PipelineConfig {
            default_step_timeout: Some(Duration::from_secs(5)),
            ..PipelineConfig::default()
        })
        .register(PipelineStep::new("a", 1, append("A"))).unwrap()
        .build()
        .unwrap();
        assert_eq!(run(&pipeline, "").content, "A");
    }

    #[test]
    fn test_panic_returns_original_input() {
        let boom = FnStep(|_: &str, _: &mut Metadata, _: &PipelineContext| -> Result<String, StepError> {
            panic!("boom")
        });
        let pipeline = Pipeline::builder(PipelineConfig {
            continue_on_error: true,
            ..PipelineConfig::default()
        })
        .register(PipelineStep::new("a", 1, append("A"))).unwrap()
        .register(PipelineStep::new("boom", 2, boom)).unwrap()
        .register(PipelineStep::new("c", 3, append("C"))).unwrap()
        .build()
        .unwrap();

        let result = run(&pipeline, "doc");
        assert!(!result.success);
        assert_eq!(result.content, "doc");
        assert_eq!(result.errors[0].severity, Severity::Critical);
        assert!(result.errors[0].message.contains("boom"));
        assert!(result.step("c").is_none());
    }

    #[test]
    fn test_abort_stops_before_next_step() {
        let builder = Pipeline::builder(PipelineConfig::default());
        let handle = builder.abort_handle();
        let stopper = FnStep(move |c: &str, _: &mut Metadata, _: &PipelineContext| {
            handle.abort();
            Ok(format!("{c}S"))
        });
        let pipeline = builder
            .register(PipelineStep::new("stop", 1, stopper)).unwrap()
            .register(PipelineStep::new("never", 2, append("N"))).unwrap()
            .build()
            .unwrap();

        let result = run(&pipeline, "");
        assert!(result.aborted);
        assert!(!result.success);
        assert_eq!(result.content, "S");
        assert_eq!(result.errors, vec![ProcessingError::aborted()]);
        assert_eq!(pipeline.state(), RunState::Aborted);

        // The flag is cleared for the next run; the stopper sets it again.
        assert_eq!(run(&pipeline, "").content, "S");
    }

    #[test]
    fn test_events_reach_listeners() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let pipeline = Pipeline::builder(PipelineConfig::default())
            .listener(ChannelListener::new(tx))
            .register(PipelineStep::new("a", 1, append("A"))).unwrap()
            .register(PipelineStep::new("off", 2, append("B")).disabled()).unwrap()
            .build()
            .unwrap();
        run(&pipeline, "");

        let kinds: Vec<&'static str> = rx
            .try_iter()
            .map(|e| match e {
                PipelineEvent::PipelineStarted { .. } => "started",
                PipelineEvent::StepStarted { .. } => "step_started",
                PipelineEvent::StepCompleted { .. } => "step_completed",
                PipelineEvent::StepSkipped { .. } => "step_skipped",
                PipelineEvent::StepFailed { .. } => "step_failed",
                PipelineEvent::PipelineCompleted { .. } => "completed",
                PipelineEvent::PipelineAborted { .. } => "aborted",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["started", "step_started", "step_completed", "step_skipped", "completed"]
        );
    }

    #[test]
    fn test_metrics_and_field_report() {
        let track = FnStep(|c: &str, _: &mut Metadata, ctx: &PipelineContext| {
            if let Some(tracker) = ctx.active_tracker() {
                tracker.track("client", Some(&json!("Acme")), false, crate::tracking::MixinKind::Variable);
            }
            Ok(c.to_string())
        });
        let pipeline = Pipeline::builder(PipelineConfig::default())
            .register(PipelineStep::new("track", 1, track)).unwrap()
            .build()
            .unwrap();

        let options = ProcessingOptions {
            enable_field_tracking: true,
            ..ProcessingOptions::default()
        };
        let result = pipeline.execute("", Metadata::new(), options);
        let report = result.field_report.unwrap();
        assert_eq!((report.total, report.filled), (1, 1));
        let metrics = result.metrics.unwrap();
        assert_eq!(metrics.completed, 1);
        assert_eq!(metrics.fields_tracked, 1);

        // A second run starts with a fresh tracker.
        let second = run(&pipeline, "");
        assert!(second.field_report.is_none());
    }

    #[test]
    fn test_metrics_disabled() {
        let pipeline = Pipeline::builder(PipelineConfig {
            enable_metrics: false,
            ..PipelineConfig::default()
        })
        .register(PipelineStep::new("a", 1, append("A"))).unwrap()
        .build()
        .unwrap();
        assert!(run(&pipeline, "").metrics.is_none());
    }
}
