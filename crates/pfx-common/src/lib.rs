//! Prefixer common types, IDs, and errors.
//!
//! This crate provides foundational types shared across pfx-core modules:
//! - Session identifiers
//! - The install error taxonomy with stable codes
//! - Product version buckets
//! - Output format specifications

pub mod bucket;
pub mod error;
pub mod id;
pub mod output;

pub use bucket::VersionBucket;
pub use error::{format_error_human, Error, ErrorCategory, Result, StructuredError};
pub use id::SessionId;
pub use output::OutputFormat;
