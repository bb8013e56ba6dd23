//! # Document Store Interface
//!
//! The remote, paginated document store the pipeline reads from and writes back
//! to. The pipeline depends only on [`DocumentStore`]; the bundled
//! [`memory::InMemoryDocumentStore`] implements it over a local record set.

pub mod memory;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::{Filter, Record};

pub use memory::InMemoryDocumentStore;

/// Opaque pagination token marking the position after the last returned record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters of a single page fetch
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    /// Resume after this cursor; `None` starts from the beginning
    pub cursor: Option<&'a Cursor>,
    pub page_size: usize,
    pub filters: &'a [Filter],
    /// Fields to return; empty returns whole records
    pub fields: &'a [String],
}

/// One page of records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Record>,
    /// `None` once the source is exhausted
    pub next_cursor: Option<Cursor>,
}

/// A record the store refused to write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDocument {
    pub id: String,
    pub reason: String,
}

/// Outcome of a bulk write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkWriteResponse {
    pub written: usize,
    pub failed: Vec<FailedDocument>,
}

/// Errors reported by a document store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{operation} request failed: {message}")]
    Request { operation: String, message: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid store response: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    pub fn request(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Remote document store consumed by the pipeline
///
/// Implementations must be shareable across the puller and pusher threads.
pub trait DocumentStore: Send + Sync {
    /// Fetch up to `page_size` records after the cursor
    fn get_page(&self, request: PageRequest<'_>) -> StoreResult<Page>;

    /// Write a batch back, reporting per-record failures
    fn bulk_write(&self, batch: &[Record], ingest_in_background: bool)
        -> StoreResult<BulkWriteResponse>;

    /// Number of records matching the filters
    fn count(&self, filters: &[Filter]) -> StoreResult<u64>;

    /// Representative records used for size estimation
    fn sample(&self, n: usize, filters: &[Filter], fields: &[String]) -> StoreResult<Vec<Record>>;

    /// Field name to type name mapping of the stored records
    fn schema(&self) -> StoreResult<BTreeMap<String, String>>;
}
