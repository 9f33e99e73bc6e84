use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::crossref::HeaderFormats;
use crate::options::ProcessingOptions;
use crate::template::{HelperEnv, HelperRegistry, Metadata, RenderContext};
use crate::tracking::FieldTracker;

/// Per-run state handed to every step. Cloning is cheap and clones share
/// the tracker, warnings and exported-file list. A step raced against a
/// timeout gets a [`detached`](Self::detached) context instead, merged
/// back only when the step finishes in time.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub options: Arc<ProcessingOptions>,
    pub helpers: Arc<HelperRegistry>,
    pub header_formats: Arc<HeaderFormats>,
    pub tracker: FieldTracker,
    pub env: HelperEnv,
    warnings: Arc<Mutex<Vec<String>>>,
    exported_files: Arc<Mutex<Vec<PathBuf>>>,
    cancelled: Arc<AtomicBool>,
}

impl PipelineContext {
    pub fn new(
        options: Arc<ProcessingOptions>,
        helpers: Arc<HelperRegistry>,
        header_formats: Arc<HeaderFormats>,
    ) -> Self {
        let env = options.helper_env();
        Self {
            options,
            helpers,
            header_formats,
            tracker: FieldTracker::new(),
            env,
            warnings: Arc::new(Mutex::new(Vec::new())),
            exported_files: Arc::new(Mutex::new(Vec::new())),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Same options and helpers, with its own tracker, warnings and
    /// exported-file list.
    pub fn detached(&self) -> Self {
        Self {
            options: Arc::clone(&self.options),
            helpers: Arc::clone(&self.helpers),
            header_formats: Arc::clone(&self.header_formats),
            tracker: FieldTracker::new(),
            env: self.env,
            warnings: Arc::new(Mutex::new(Vec::new())),
            exported_files: Arc::new(Mutex::new(Vec::new())),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Folds a detached context's records into this one.
    pub fn merge(&self, other: &PipelineContext) {
        self.tracker.absorb(&other.tracker);
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.extend(other.warnings());
        }
        if let Ok(mut files) = self.exported_files.lock() {
            files.extend(other.exported_files());
        }
    }

    /// Marks the context abandoned. Later warnings and exports are dropped.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Context for standalone step tests and one-off calls.
    pub fn with_options(options: ProcessingOptions) -> Self {
        Self::new(
            Arc::new(options),
            Arc::new(HelperRegistry::with_builtins()),
            Arc::new(HeaderFormats::default()),
        )
    }

    /// Resolver settings derived from the options. The reference date
    /// follows the document's `@today` when it sets one.
    pub fn render_context(&self, metadata: &Metadata) -> RenderContext<'_> {
        let env = self.env.with_metadata_override(metadata);
        let ctx = RenderContext::new(&self.helpers, env)
            .with_highlight(self.options.highlights_fields());
        if self.options.tracks_fields() {
            ctx.with_tracker(&self.tracker)
        } else {
            ctx
        }
    }

    /// The tracker, when field tracking is enabled.
    pub fn active_tracker(&self) -> Option<&FieldTracker> {
        self.options.tracks_fields().then_some(&self.tracker)
    }

    pub fn warn(&self, message: impl Into<String>) {
        if self.is_cancelled() {
            return;
        }
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(message.into());
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn add_exported_file(&self, path: PathBuf) {
        if self.is_cancelled() {
            return;
        }
        if let Ok(mut files) = self.exported_files.lock() {
            files.push(path);
        }
    }

    pub fn exported_files(&self) -> Vec<PathBuf> {
        self.exported_files.lock().map(|f| f.clone()).unwrap_or_default()
    }
}
