//! Builders for test metadata and options.

#![allow(dead_code)]

use std::path::Path;

use chrono::NaiveDate;
use serde_json::Value;

use legal_markdown::{ExportFormat, Metadata, ProcessingOptions};

/// Builder for document metadata.
#[derive(Default)]
pub struct MetadataBuilder {
    metadata: Metadata,
}

impl MetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a JSON object literal.
    pub fn from_json(value: Value) -> Self {
        Self {
            metadata: value.as_object().cloned().expect("metadata must be a JSON object"),
        }
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> Metadata {
        self.metadata
    }
}

/// Builder for `ProcessingOptions` with a fixed `@today` so date output
/// is stable.
pub struct OptionsBuilder {
    options: ProcessingOptions,
}

impl Default for OptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: ProcessingOptions::default().with_today(test_today()),
        }
    }

    pub fn base_path(mut self, path: &Path) -> Self {
        self.options.base_path = Some(path.to_path_buf());
        self
    }

    pub fn field_tracking(mut self) -> Self {
        self.options.enable_field_tracking = true;
        self
    }

    pub fn highlight(mut self) -> Self {
        self.options.enable_field_tracking_in_markdown = true;
        self
    }

    pub fn no_headers(mut self) -> Self {
        self.options.no_headers = true;
        self
    }

    pub fn no_mixins(mut self) -> Self {
        self.options.no_mixins = true;
        self
    }

    pub fn no_references(mut self) -> Self {
        self.options.no_references = true;
        self
    }

    pub fn throw_on_yaml_error(mut self) -> Self {
        self.options.throw_on_yaml_error = true;
        self
    }

    pub fn export(mut self, format: ExportFormat, path: &Path) -> Self {
        self.options.export_metadata = true;
        self.options.export_format = format;
        self.options.export_path = Some(path.to_path_buf());
        self
    }

    pub fn only_steps(mut self, steps: &[&str]) -> Self {
        self.options.only_steps = steps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn skip_steps(mut self, steps: &[&str]) -> Self {
        self.options.skip_steps = steps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn build(self) -> ProcessingOptions {
        self.options
    }
}

pub fn test_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date")
}
