//! # Data Model
//!
//! Records, batches and the filter values passed to the document store.

pub mod filter;
pub mod record;

pub use filter::{AnyOf, Condition, FieldFilter, Filter, FilterType};
pub use record::{field_value, project, record_id, Batch, Record, RecordId};
