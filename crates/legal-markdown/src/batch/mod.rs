//! Parallel processing of independent documents.

pub mod job;
pub mod pool;

pub use job::{BatchJob, BatchJobResult};
pub use pool::{BatchProcessor, PipelineFactory};
