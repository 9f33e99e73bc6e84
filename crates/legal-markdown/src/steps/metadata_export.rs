use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::options::{ExportFormat, ProcessingOptions};
use crate::pipeline::{PipelineContext, StepError, StepProcessor};
use crate::template::Metadata;

pub trait MetadataExporter: Send + Sync {
    /// Writes `metadata` to `path` and returns the written file.
    fn export(&self, metadata: &Metadata, format: ExportFormat, path: &Path) -> Result<PathBuf, StepError>;
}

/// Writes YAML or JSON files, creating parent directories as needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsMetadataExporter;

impl MetadataExporter for FsMetadataExporter {
    fn export(&self, metadata: &Metadata, format: ExportFormat, path: &Path) -> Result<PathBuf, StepError> {
        let value = Value::Object(metadata.clone());
        let body = match format {
            ExportFormat::Yaml => {
                serde_yaml::to_string(&value).map_err(|e| StepError::Export(e.to_string()))?
            }
            ExportFormat::Json => {
                serde_json::to_string_pretty(&value).map_err(|e| StepError::Export(e.to_string()))?
            }
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| StepError::Export(format!("{}: {}", parent.display(), e)))?;
        }
        fs::write(path, body).map_err(|e| StepError::Export(format!("{}: {}", path.display(), e)))?;
        Ok(path.to_path_buf())
    }
}

/// Exports metadata when the document asks for it (`meta-yaml-output`,
/// `meta-json-output`) or the `export_metadata` option is set. Internal
/// `_` keys and the `meta-*` directives themselves are left out.
pub struct MetadataExportStep {
    exporter: Box<dyn MetadataExporter>,
}

impl Default for MetadataExportStep {
    fn default() -> Self {
        Self::new(FsMetadataExporter)
    }
}

impl MetadataExportStep {
    pub fn new(exporter: impl MetadataExporter + 'static) -> Self {
        Self {
            exporter: Box::new(exporter),
        }
    }

    fn targets(metadata: &Metadata, options: &ProcessingOptions) -> Vec<(ExportFormat, PathBuf)> {
        let dir = metadata
            .get("meta-output-path")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .or_else(|| options.base_path.clone())
            .unwrap_or_else(|| PathBuf::from("."));

        let mut targets = Vec::new();
        for (key, format) in [
            ("meta-yaml-output", ExportFormat::Yaml),
            ("meta-json-output", ExportFormat::Json),
        ] {
            if let Some(name) = metadata.get(key).and_then(Value::as_str) {
                targets.push((format, dir.join(name)));
            }
        }
        if options.export_metadata {
            let format = options.export_format;
            let path = options
                .export_path
                .clone()
                .unwrap_or_else(|| dir.join(format!("metadata.{}", format.extension())));
            if !targets.iter().any(|(_, p)| *p == path) {
                targets.push((format, path));
            }
        }
        targets
    }
}

fn exportable(metadata: &Metadata) -> Metadata {
    metadata
        .iter()
        .filter(|(key, _)| !key.starts_with('_') && !key.starts_with("meta-"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

impl StepProcessor for MetadataExportStep {
    fn process(
        &self,
        content: &str,
        metadata: &mut Metadata,
        ctx: &PipelineContext,
    ) -> Result<String, StepError> {
        let targets = Self::targets(metadata, &ctx.options);
        if targets.is_empty() {
            return Ok(content.to_string());
        }
        let data = exportable(metadata);
        for (format, path) in targets {
            if ctx.is_cancelled() {
                warn!("Export to {} abandoned", path.display());
                break;
            }
            let written = self.exporter.export(&data, format, &path)?;
            info!("Exported metadata to {}", written.display());
            ctx.add_exported_file(written);
        }
        Ok(content.to_string())
    }
}
