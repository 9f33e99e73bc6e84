use serde_json::Value;
use tracing::{debug, warn};

use crate::options::ProcessingOptions;
use crate::pipeline::{PipelineContext, StepError, StepProcessor};
use crate::template::Metadata;

/// Document with its front matter split off.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    pub content: String,
    pub metadata: Metadata,
}

pub trait FrontMatterParser: Send + Sync {
    /// Strips the front matter block from `content`. With `throw_on_error`
    /// unset, malformed front matter yields the untouched content and no
    /// metadata.
    fn parse(&self, content: &str, throw_on_error: bool) -> Result<ParsedDocument, StepError>;
}

/// `---` fenced YAML at the very top of the document.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlFrontMatter;

impl YamlFrontMatter {
    /// Returns the YAML source and the remaining body.
    fn split(content: &str) -> Option<(&str, &str)> {
        let rest = content.strip_prefix('\u{feff}').unwrap_or(content);
        let rest = rest.strip_prefix("---")?;
        let rest = rest
            .strip_prefix("\r\n")
            .or_else(|| rest.strip_prefix('\n'))?;

        let mut offset = 0;
        for line in rest.split_inclusive('\n') {
            let trimmed = line.trim_end();
            if trimmed == "---" || trimmed == "..." {
                let yaml = &rest[..offset];
                let body = &rest[offset + line.len()..];
                return Some((yaml, body));
            }
            offset += line.len();
        }
        None
    }
}

impl FrontMatterParser for YamlFrontMatter {
    fn parse(&self, content: &str, throw_on_error: bool) -> Result<ParsedDocument, StepError> {
        let Some((yaml, body)) = Self::split(content) else {
            return Ok(ParsedDocument {
                content: content.to_string(),
                metadata: Metadata::new(),
            });
        };

        let parsed: Result<Value, serde_yaml::Error> = if yaml.trim().is_empty() {
            Ok(Value::Null)
        } else {
            serde_yaml::from_str(yaml)
        };

        match parsed {
            Ok(Value::Object(metadata)) => Ok(ParsedDocument {
                content: body.trim_start_matches(['\r', '\n']).to_string(),
                metadata,
            }),
            Ok(Value::Null) => Ok(ParsedDocument {
                content: body.trim_start_matches(['\r', '\n']).to_string(),
                metadata: Metadata::new(),
            }),
            Ok(_) => {
                let message = "front matter is not a mapping".to_string();
                if throw_on_error {
                    return Err(StepError::Yaml(message));
                }
                warn!("Ignoring front matter: {}", message);
                Ok(ParsedDocument {
                    content: content.to_string(),
                    metadata: Metadata::new(),
                })
            }
            Err(e) if throw_on_error => Err(e.into()),
            Err(e) => {
                warn!("Ignoring malformed front matter: {}", e);
                Ok(ParsedDocument {
                    content: content.to_string(),
                    metadata: Metadata::new(),
                })
            }
        }
    }
}

/// Parses front matter into the run's metadata. Keys already present in
/// the metadata passed to the run are kept.
pub struct FrontMatterStep {
    parser: Box<dyn FrontMatterParser>,
}

impl Default for FrontMatterStep {
    fn default() -> Self {
        Self::new(YamlFrontMatter)
    }
}

impl FrontMatterStep {
    pub fn new(parser: impl FrontMatterParser + 'static) -> Self {
        Self {
            parser: Box::new(parser),
        }
    }
}

impl StepProcessor for FrontMatterStep {
    fn process(
        &self,
        content: &str,
        metadata: &mut Metadata,
        ctx: &PipelineContext,
    ) -> Result<String, StepError> {
        let parsed = self.parser.parse(content, ctx.options.throw_on_yaml_error)?;
        debug!("Front matter supplied {} key(s)", parsed.metadata.len());
        for (key, value) in parsed.metadata {
            metadata.entry(key).or_insert(value);
        }
        Ok(parsed.content)
    }

    fn is_enabled(&self, options: &ProcessingOptions) -> bool {
        !options.disable_frontmatter
    }
}
