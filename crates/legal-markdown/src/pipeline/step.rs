use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::context::PipelineContext;
use super::error::StepError;
use crate::options::ProcessingOptions;
use crate::template::Metadata;

/// One transformation of the document. Implementations read the current
/// content, may mutate the shared metadata and return the new content.
pub trait StepProcessor: Send + Sync {
    fn process(
        &self,
        content: &str,
        metadata: &mut Metadata,
        ctx: &PipelineContext,
    ) -> Result<String, StepError>;

    /// Steps switched off by options are skipped, not failed.
    fn is_enabled(&self, _options: &ProcessingOptions) -> bool {
        true
    }
}

/// A registered step: processor plus scheduling data.
#[derive(Clone)]
pub struct PipelineStep {
    pub name: String,
    pub processor: Arc<dyn StepProcessor>,
    pub order: i32,
    pub enabled: bool,
    pub dependencies: Vec<String>,
    pub timeout: Option<Duration>,
    pub provides: Vec<String>,
    pub requires: Vec<String>,
}

impl fmt::Debug for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineStep")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("enabled", &self.enabled)
            .field("dependencies", &self.dependencies)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl PipelineStep {
    pub fn new(name: impl Into<String>, order: i32, processor: impl StepProcessor + 'static) -> Self {
        Self::from_arc(name, order, Arc::new(processor))
    }

    pub fn from_arc(name: impl Into<String>, order: i32, processor: Arc<dyn StepProcessor>) -> Self {
        Self {
            name: name.into(),
            processor,
            order,
            enabled: true,
            dependencies: Vec::new(),
            timeout: None,
            provides: Vec::new(),
            requires: Vec::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn provides<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provides.extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn requires<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Adapts a closure into a step; handy for ad-hoc transformations.
pub struct FnStep<F>(pub F);

impl<F> StepProcessor for FnStep<F>
where
    F: Fn(&str, &mut Metadata, &PipelineContext) -> Result<String, StepError> + Send + Sync,
{
    fn process(
        &self,
        content: &str,
        metadata: &mut Metadata,
        ctx: &PipelineContext,
    ) -> Result<String, StepError> {
        (self.0)(content, metadata, ctx)
    }
}
