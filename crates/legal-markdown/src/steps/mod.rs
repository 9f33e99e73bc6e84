//! Built-in processing steps and the default Legal Markdown pipeline.

pub mod clauses;
pub mod field_tracking;
pub mod frontmatter;
pub mod headers;
pub mod imports;
pub mod metadata_export;
pub mod mixins;
pub mod references;
pub mod source_conversion;
pub mod template_loops;

pub use clauses::ClausesStep;
pub use field_tracking::FieldTrackingStep;
pub use frontmatter::{FrontMatterParser, FrontMatterStep, ParsedDocument, YamlFrontMatter};
pub use headers::HeadersStep;
pub use imports::{FsImportResolver, ImportOutput, ImportResolver, ImportsStep, MAX_IMPORT_DEPTH};
pub use metadata_export::{FsMetadataExporter, MetadataExportStep, MetadataExporter};
pub use mixins::MixinsStep;
pub use references::CrossReferencesStep;
pub use source_conversion::{SourceConversionStep, SourceConverter};
pub use template_loops::TemplateLoopsStep;

use crate::pipeline::{Pipeline, PipelineBuilder, PipelineConfig, PipelineError, PipelineStep};

pub const SOURCE_CONVERSION: &str = "source-conversion";
pub const FRONT_MATTER: &str = "yaml-front-matter";
pub const IMPORTS: &str = "imports";
pub const CLAUSES: &str = "optional-clauses";
pub const CROSS_REFERENCES: &str = "cross-references";
pub const TEMPLATE_LOOPS: &str = "template-loops";
pub const MIXINS: &str = "mixins";
pub const HEADERS: &str = "headers";
pub const METADATA_EXPORT: &str = "metadata-export";
pub const FIELD_TRACKING: &str = "field-tracking";

/// Names of the built-in steps in execution order.
pub const DEFAULT_STEP_NAMES: [&str; 10] = [
    SOURCE_CONVERSION,
    FRONT_MATTER,
    IMPORTS,
    CLAUSES,
    CROSS_REFERENCES,
    TEMPLATE_LOOPS,
    MIXINS,
    HEADERS,
    METADATA_EXPORT,
    FIELD_TRACKING,
];

/// The built-in steps, ready for further registrations and listeners.
pub fn default_builder(config: PipelineConfig) -> Result<PipelineBuilder, PipelineError> {
    Pipeline::builder(config)
        .register(PipelineStep::new(SOURCE_CONVERSION, 10, SourceConversionStep::new()).provides(["source-markdown"]))?
        .register(PipelineStep::new(FRONT_MATTER, 20, FrontMatterStep::default()).provides(["metadata"]))?
        .register(
            PipelineStep::new(IMPORTS, 30, ImportsStep::default())
                .depends_on([FRONT_MATTER])
                .requires(["metadata"])
                .provides(["imports-resolved"]),
        )?
        .register(
            PipelineStep::new(CLAUSES, 40, ClausesStep)
                .depends_on([IMPORTS])
                .requires(["metadata"]),
        )?
        .register(
            PipelineStep::new(CROSS_REFERENCES, 50, CrossReferencesStep)
                .depends_on([IMPORTS])
                .requires(["metadata"])
                .provides(["references-resolved"]),
        )?
        .register(
            PipelineStep::new(TEMPLATE_LOOPS, 60, TemplateLoopsStep)
                .depends_on([IMPORTS])
                .requires(["metadata"])
                .provides(["loops-expanded"]),
        )?
        .register(
            PipelineStep::new(MIXINS, 70, MixinsStep::new())
                .depends_on([TEMPLATE_LOOPS])
                .requires(["metadata"]),
        )?
        .register(
            PipelineStep::new(HEADERS, 80, HeadersStep)
                .depends_on([CROSS_REFERENCES])
                .requires(["references-resolved"]),
        )?
        .register(PipelineStep::new(METADATA_EXPORT, 90, MetadataExportStep::default()).requires(["metadata"]))?
        .register(PipelineStep::new(FIELD_TRACKING, 100, FieldTrackingStep).depends_on([MIXINS]))
}

pub fn default_pipeline(config: PipelineConfig) -> Result<Pipeline, PipelineError> {
    default_builder(config)?.build()
}
