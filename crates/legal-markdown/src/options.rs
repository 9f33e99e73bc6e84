use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::template::HelperEnv;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Yaml,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Yaml => "yaml",
            ExportFormat::Json => "json",
        }
    }
}

/// Per-document switches passed to every step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingOptions {
    /// Directory `@import` paths are resolved against.
    pub base_path: Option<PathBuf>,
    pub disable_frontmatter: bool,
    /// Malformed front matter fails the step instead of warning.
    pub throw_on_yaml_error: bool,
    pub no_imports: bool,
    pub no_clauses: bool,
    pub no_references: bool,
    pub no_mixins: bool,
    pub no_headers: bool,
    pub enable_field_tracking: bool,
    /// Wrap resolved values in highlighting spans.
    pub enable_field_tracking_in_markdown: bool,
    pub export_metadata: bool,
    pub export_format: ExportFormat,
    pub export_path: Option<PathBuf>,
    /// When non-empty only these steps run.
    pub only_steps: Vec<String>,
    pub skip_steps: Vec<String>,
    /// Fixed date for `@today`; the local date otherwise.
    pub today: Option<NaiveDate>,
    /// Turn `- ` lines produced by loops into `<li>` elements.
    pub legacy_list_items_as_html: bool,
}

impl ProcessingOptions {
    pub fn helper_env(&self) -> HelperEnv {
        match self.today {
            Some(date) => HelperEnv::new(date),
            None => HelperEnv::from_clock(),
        }
    }

    /// Field tracking is on when either tracking switch is set.
    pub fn tracks_fields(&self) -> bool {
        self.enable_field_tracking || self.enable_field_tracking_in_markdown
    }

    pub fn highlights_fields(&self) -> bool {
        self.enable_field_tracking_in_markdown
    }

    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }
}
