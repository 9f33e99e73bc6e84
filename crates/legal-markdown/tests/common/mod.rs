//! Shared test utilities for legal-markdown integration tests.
//!
//! This module provides:
//! - `TestHarness` for running documents through the default pipeline with
//!   an isolated temp directory for imports and exports
//! - Builders for metadata and processing options

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
