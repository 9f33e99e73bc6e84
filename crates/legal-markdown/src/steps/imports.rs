use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use super::frontmatter::{FrontMatterParser, YamlFrontMatter};
use crate::options::ProcessingOptions;
use crate::pipeline::{PipelineContext, StepError, StepProcessor};
use crate::template::Metadata;

pub const MAX_IMPORT_DEPTH: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportOutput {
    pub content: String,
    pub imported_files: Vec<PathBuf>,
    /// Front matter collected from imported files, when any had some.
    pub merged_metadata: Option<Metadata>,
}

pub trait ImportResolver: Send + Sync {
    fn resolve(
        &self,
        content: &str,
        base_path: &Path,
        metadata: &Metadata,
        options: &ProcessingOptions,
    ) -> Result<ImportOutput, StepError>;
}

fn import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*@import\s+(?:"([^"]+)"|'([^']+)'|(\S+))\s*$"#)
            .expect("import pattern is valid")
    })
}

fn import_target(line: &str) -> Option<&str> {
    let caps = import_regex().captures(line)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
}

/// Inlines `@import <path>` lines from the filesystem. Paths are relative
/// to the importing file's directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsImportResolver;

struct ImportWalk {
    stack: Vec<PathBuf>,
    imported: Vec<PathBuf>,
    metadata: Metadata,
}

impl FsImportResolver {
    fn expand(&self, content: &str, dir: &Path, walk: &mut ImportWalk) -> Result<String, StepError> {
        let mut out = Vec::new();
        for line in content.split('\n') {
            let Some(target) = import_target(line) else {
                out.push(line.to_string());
                continue;
            };
            out.push(self.import_file(&dir.join(target), walk)?);
        }
        Ok(out.join("\n"))
    }

    fn import_file(&self, path: &Path, walk: &mut ImportWalk) -> Result<String, StepError> {
        let label = path.display().to_string();
        let fail = |reason: String| StepError::Import {
            path: label.clone(),
            reason,
        };

        if walk.stack.len() >= MAX_IMPORT_DEPTH {
            return Err(fail(format!("import depth exceeds {}", MAX_IMPORT_DEPTH)));
        }
        let canonical = fs::canonicalize(path).map_err(|e| fail(e.to_string()))?;
        if walk.stack.contains(&canonical) {
            return Err(fail("circular import".to_string()));
        }

        let raw = fs::read_to_string(&canonical).map_err(|e| fail(e.to_string()))?;
        let parsed = YamlFrontMatter.parse(&raw, false)?;
        for (key, value) in parsed.metadata {
            // outer documents were merged first and win
            walk.metadata.entry(key).or_insert(value);
        }
        debug!("Importing {}", label);

        walk.stack.push(canonical.clone());
        if !walk.imported.contains(&canonical) {
            walk.imported.push(canonical.clone());
        }
        let dir = canonical.parent().map(Path::to_path_buf).unwrap_or_default();
        let expanded = self.expand(&parsed.content, &dir, walk);
        walk.stack.pop();

        Ok(expanded?.trim_end_matches('\n').to_string())
    }
}

impl ImportResolver for FsImportResolver {
    fn resolve(
        &self,
        content: &str,
        base_path: &Path,
        _metadata: &Metadata,
        _options: &ProcessingOptions,
    ) -> Result<ImportOutput, StepError> {
        let mut walk = ImportWalk {
            stack: Vec::new(),
            imported: Vec::new(),
            metadata: Metadata::new(),
        };
        let content = self.expand(content, base_path, &mut walk)?;
        Ok(ImportOutput {
            content,
            imported_files: walk.imported,
            merged_metadata: (!walk.metadata.is_empty()).then_some(walk.metadata),
        })
    }
}

/// Resolves imports and merges their front matter. The importing
/// document's metadata wins on conflicts.
pub struct ImportsStep {
    resolver: Box<dyn ImportResolver>,
}

impl Default for ImportsStep {
    fn default() -> Self {
        Self::new(FsImportResolver)
    }
}

impl ImportsStep {
    pub fn new(resolver: impl ImportResolver + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
        }
    }
}

impl StepProcessor for ImportsStep {
    fn process(
        &self,
        content: &str,
        metadata: &mut Metadata,
        ctx: &PipelineContext,
    ) -> Result<String, StepError> {
        if !content.contains("@import") {
            return Ok(content.to_string());
        }
        let base = ctx
            .options
            .base_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let output = self.resolver.resolve(content, &base, metadata, &ctx.options)?;

        if let Some(imported) = output.merged_metadata {
            for (key, value) in imported {
                metadata.entry(key).or_insert(value);
            }
        }
        if !output.imported_files.is_empty() {
            let files: Vec<serde_json::Value> = output
                .imported_files
                .iter()
                .map(|p| serde_json::Value::String(p.display().to_string()))
                .collect();
            metadata.insert("_imported_files".to_string(), serde_json::Value::Array(files));
        }
        Ok(output.content)
    }

    fn is_enabled(&self, options: &ProcessingOptions) -> bool {
        !options.no_imports
    }
}
