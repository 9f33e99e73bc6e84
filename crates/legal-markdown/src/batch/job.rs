use serde::Serialize;
use uuid::Uuid;

use crate::options::ProcessingOptions;
use crate::pipeline::PipelineResult;
use crate::template::Metadata;

/// One document queued for batch processing.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub options: ProcessingOptions,
}

impl BatchJob {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            metadata: Metadata::new(),
            options: ProcessingOptions::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_options(mut self, options: ProcessingOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchJobResult {
    pub id: String,
    pub result: PipelineResult,
}

impl BatchJobResult {
    pub fn success(&self) -> bool {
        self.result.success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_ids_are_unique() {
        let a = BatchJob::new("a");
        let b = BatchJob::new("b");
        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
    }

    #[test]
    fn test_job_builders() {
        let mut metadata = Metadata::new();
        metadata.insert("client".into(), json!("Acme"));
        let job = BatchJob::new("{{client}}")
            .with_metadata(metadata)
            .with_options(ProcessingOptions {
                no_headers: true,
                ..ProcessingOptions::default()
            });
        assert_eq!(job.metadata["client"], json!("Acme"));
        assert!(job.options.no_headers);
    }
}
