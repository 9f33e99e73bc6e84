//! Test harness for isolated pipeline runs.
//!
//! The `TestHarness` owns a temporary directory used as the base path for
//! `@import` lines and as the target for metadata exports.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use legal_markdown::pipeline::{Pipeline, PipelineConfig, PipelineResult};
use legal_markdown::{default_pipeline, Metadata, ProcessingOptions};

use super::builders::OptionsBuilder;

pub struct TestHarness {
    temp_dir: TempDir,
    pipeline: Pipeline,
}

impl TestHarness {
    /// Harness over the default pipeline.
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let pipeline = default_pipeline(config).expect("default pipeline builds");
        Self { temp_dir, pipeline }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `content` to `name` under the harness directory.
    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.temp_dir.path().join(name)).expect("Failed to read file")
    }

    /// Options rooted at the harness directory.
    pub fn options(&self) -> OptionsBuilder {
        OptionsBuilder::new().base_path(self.temp_dir.path())
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn run(&self, content: &str, metadata: Metadata, options: ProcessingOptions) -> PipelineResult {
        self.pipeline.execute(content, metadata, options)
    }

    /// Runs with default harness options and no caller metadata.
    pub fn run_simple(&self, content: &str) -> PipelineResult {
        self.run(content, Metadata::new(), self.options().build())
    }
}
