#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # PullPush Core
//!
//! A bounded, multi-threaded pull-update-push pipeline for transforming records
//! held in a remote, paginated document store.
//!
//! ## Overview
//!
//! A run pages records out of a store, hands batches of them to a
//! caller-supplied transform and bulk-writes only the fields the transform
//! changed. The three stages run concurrently on OS threads joined by two
//! bounded queues, so memory use tracks the queue capacity instead of the size
//! of the dataset. Records the store rejects on write are requeued until they
//! land (or until an optional retry limit abandons them).
//!
//! ## Module Organization
//!
//! - [`pipeline`] - Stages, queues, sizing, progress and the run orchestrator
//! - [`store`] - The [`DocumentStore`] interface and an in-memory implementation
//! - [`models`] - Records, identifiers and store filters
//! - [`operation`] - Schema-checked "fill output fields" runs
//! - [`config`] - Run configuration, file and environment loading
//! - [`error`] - Structured error handling
//! - [`logging`] - Console and JSON file logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pullpush::{InMemoryDocumentStore, Pipeline, PipelineConfig, Record};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryDocumentStore::new("_id"));
//! let transform = |batch: Vec<Record>| -> anyhow::Result<Vec<Record>> {
//!     Ok(batch
//!         .into_iter()
//!         .map(|mut record| {
//!             record.insert("seen".into(), json!(true));
//!             record
//!         })
//!         .collect())
//! };
//!
//! let report = Pipeline::new(store, Arc::new(transform), PipelineConfig::default())?
//!     .run()?
//!     .wait()?;
//! println!("pushed {} records", report.progress.pushed);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod operation;
pub mod pipeline;
pub mod store;

pub use config::{ConfigManager, ConfigurationError, PipelineConfig, SizingConfig};
pub use error::{PipelineError, Result};
pub use models::{Batch, Condition, Filter, FilterType, Record, RecordId};
pub use operation::OperationRun;
pub use pipeline::{
    exclusive, Exclusive, Pipeline, ProgressObserver, ProgressSnapshot, RunHandle, RunOutcome,
    RunPlan, RunReport, Stage, Transform,
};
pub use store::{
    BulkWriteResponse, Cursor, DocumentStore, FailedDocument, InMemoryDocumentStore, Page,
    PageRequest, StoreError,
};
