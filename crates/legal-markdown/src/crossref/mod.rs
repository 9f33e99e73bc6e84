//! Header numbering and `|key|` cross-references.
//!
//! Headers are lines starting with `l.`, `ll.`, ... or `l1.`..`l9.`. Each
//! level has its own counter and format string; a trailing `|key|` on a
//! header makes its number referable from anywhere in the document.

pub mod counters;
pub mod format;
pub mod headers;
pub mod references;

pub use counters::{HeaderCounters, MAX_LEVEL};
pub use format::{render_format, to_alpha, to_roman};
pub use headers::{
    no_reset_levels, number_headers, parse_header_line, render_headers, HeaderFormats,
    HeaderLine, NumberedHeader,
};
pub use references::{resolve_key, CrossReferenceResolver, ReferenceSource};
