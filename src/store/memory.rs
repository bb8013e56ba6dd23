//! # In-Memory Document Store
//!
//! A [`DocumentStore`] over an id-ordered record set. Pages resume after the id
//! of the previous page's last record, writes merge fields into the stored
//! records, and every page and write is logged so callers can inspect exactly
//! what the pipeline fetched and sent. Failures can be injected per record or
//! per call.

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tracing::debug;

use super::{
    BulkWriteResponse, Cursor, DocumentStore, FailedDocument, Page, PageRequest, StoreError,
    StoreResult,
};
use crate::models::{project, record_id, Filter, Record};

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    id_field: String,
    records: RwLock<BTreeMap<String, Record>>,
    /// Remaining rejected writes per record id
    pending_failures: Mutex<HashMap<String, u32>>,
    /// Remaining bulk write calls that fail outright
    pending_call_errors: Mutex<u32>,
    page_log: Mutex<Vec<usize>>,
    write_log: Mutex<Vec<Vec<Record>>>,
}

impl InMemoryDocumentStore {
    pub fn new(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            ..Self::default()
        }
    }

    /// Build a store from records; records without an identifier are skipped
    pub fn with_records(id_field: impl Into<String>, records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new(id_field);
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Insert or replace a record, returning its id
    pub fn insert(&self, record: Record) -> Option<String> {
        let id = record_id(&record, &self.id_field)?;
        self.records.write().insert(id.clone(), record);
        Some(id)
    }

    pub fn get(&self, id: &str) -> Option<Record> {
        self.records.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Reject the next `times` writes of each listed record
    pub fn fail_next_writes<I, S>(&self, ids: I, times: u32)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pending = self.pending_failures.lock();
        for id in ids {
            *pending.entry(id.into()).or_default() += times;
        }
    }

    /// Fail the next `calls` bulk writes entirely
    pub fn fail_next_bulk_writes(&self, calls: u32) {
        *self.pending_call_errors.lock() += calls;
    }

    /// Sizes of every page served, including the final empty page if one was requested
    pub fn page_sizes(&self) -> Vec<usize> {
        self.page_log.lock().clone()
    }

    /// Every batch received by `bulk_write`, in arrival order
    pub fn write_batches(&self) -> Vec<Vec<Record>> {
        self.write_log.lock().clone()
    }

    /// Identifiers of every record sent to `bulk_write`, in arrival order
    pub fn written_ids(&self) -> Vec<String> {
        self.write_log
            .lock()
            .iter()
            .flatten()
            .filter_map(|record| record_id(record, &self.id_field))
            .collect()
    }

    fn type_name(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "numeric",
            Value::String(_) => "text",
            Value::Array(_) => "array",
            Value::Object(_) => "dict",
        }
    }

    /// Adds every non-null field, nested objects included under dotted paths
    fn collect_schema(prefix: Option<&str>, record: &Record, schema: &mut BTreeMap<String, String>) {
        for (key, value) in record {
            if value.is_null() {
                continue;
            }
            let path = match prefix {
                Some(prefix) => format!("{prefix}.{key}"),
                None => key.clone(),
            };
            if let Value::Object(children) = value {
                Self::collect_schema(Some(&path), children, schema);
            }
            schema
                .entry(path)
                .or_insert_with(|| Self::type_name(value).to_string());
        }
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get_page(&self, request: PageRequest<'_>) -> StoreResult<Page> {
        let records = self.records.read();
        let lower = match request.cursor {
            Some(cursor) => Bound::Excluded(cursor.as_str().to_string()),
            None => Bound::Unbounded,
        };

        let mut matching = records
            .range((lower, Bound::Unbounded))
            .filter(|(_, record)| Filter::all_match(request.filters, record));

        let page: Vec<(&String, &Record)> = matching.by_ref().take(request.page_size).collect();
        let exhausted = matching.next().is_none();

        let next_cursor = match page.last() {
            Some((id, _)) if !exhausted => Some(Cursor::new(id.as_str())),
            _ => None,
        };
        let records: Vec<Record> = page
            .into_iter()
            .map(|(_, record)| project(record, request.fields, &self.id_field))
            .collect();

        self.page_log.lock().push(records.len());
        debug!(
            page_len = records.len(),
            exhausted = exhausted,
            "MEMORY_STORE: Served page"
        );

        Ok(Page {
            records,
            next_cursor,
        })
    }

    fn bulk_write(
        &self,
        batch: &[Record],
        _ingest_in_background: bool,
    ) -> StoreResult<BulkWriteResponse> {
        self.write_log.lock().push(batch.to_vec());

        {
            let mut call_errors = self.pending_call_errors.lock();
            if *call_errors > 0 {
                *call_errors -= 1;
                return Err(StoreError::Unavailable(
                    "injected bulk write failure".to_string(),
                ));
            }
        }

        let mut response = BulkWriteResponse::default();
        let mut pending = self.pending_failures.lock();
        let mut records = self.records.write();

        for update in batch {
            let Some(id) = record_id(update, &self.id_field) else {
                response.failed.push(FailedDocument {
                    id: String::new(),
                    reason: format!("missing '{}' field", self.id_field),
                });
                continue;
            };

            if let Some(remaining) = pending.get_mut(&id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    response.failed.push(FailedDocument {
                        id,
                        reason: "injected write failure".to_string(),
                    });
                    continue;
                }
            }

            match records.get_mut(&id) {
                Some(stored) => {
                    for (key, value) in update {
                        stored.insert(key.clone(), value.clone());
                    }
                    response.written += 1;
                }
                None => response.failed.push(FailedDocument {
                    id,
                    reason: "document not found".to_string(),
                }),
            }
        }

        Ok(response)
    }

    fn count(&self, filters: &[Filter]) -> StoreResult<u64> {
        let records = self.records.read();
        Ok(records
            .values()
            .filter(|record| Filter::all_match(filters, record))
            .count() as u64)
    }

    fn sample(&self, n: usize, filters: &[Filter], fields: &[String]) -> StoreResult<Vec<Record>> {
        let records = self.records.read();
        Ok(records
            .values()
            .filter(|record| Filter::all_match(filters, record))
            .take(n)
            .map(|record| project(record, fields, &self.id_field))
            .collect())
    }

    fn schema(&self) -> StoreResult<BTreeMap<String, String>> {
        let records = self.records.read();
        let mut schema = BTreeMap::new();
        for record in records.values() {
            Self::collect_schema(None, record, &mut schema);
        }
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: usize) -> Record {
        json!({"_id": format!("doc-{id:03}"), "n": id, "text": "hello"})
            .as_object()
            .cloned()
            .unwrap()
    }

    fn store(n: usize) -> InMemoryDocumentStore {
        InMemoryDocumentStore::with_records("_id", (0..n).map(doc))
    }

    #[test]
    fn test_pagination_follows_cursor_until_exhausted() {
        let store = store(25);
        let mut cursor: Option<Cursor> = None;
        let mut sizes = Vec::new();

        loop {
            let page = store
                .get_page(PageRequest {
                    cursor: cursor.as_ref(),
                    page_size: 10,
                    filters: &[],
                    fields: &[],
                })
                .unwrap();
            sizes.push(page.records.len());
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(store.page_sizes(), vec![10, 10, 5]);
    }

    #[test]
    fn test_filters_and_projection() {
        let store = store(10);
        let filters = vec![Filter::numeric("n", crate::models::Condition::Lt, 3.0)];

        assert_eq!(store.count(&filters).unwrap(), 3);

        let sample = store.sample(2, &filters, &["n".to_string()]).unwrap();
        assert_eq!(sample.len(), 2);
        assert!(sample[0].contains_key("_id"));
        assert!(!sample[0].contains_key("text"));
    }

    #[test]
    fn test_bulk_write_merges_and_injects_failures() {
        let store = store(3);
        store.fail_next_writes(["doc-001"], 1);

        let batch: Vec<Record> = (0..3)
            .map(|i| {
                json!({"_id": format!("doc-{i:03}"), "score": i})
                    .as_object()
                    .cloned()
                    .unwrap()
            })
            .collect();

        let response = store.bulk_write(&batch, false).unwrap();
        assert_eq!(response.written, 2);
        assert_eq!(response.failed.len(), 1);
        assert_eq!(response.failed[0].id, "doc-001");

        let stored = store.get("doc-000").unwrap();
        assert_eq!(stored["score"], json!(0));
        assert_eq!(stored["text"], json!("hello"));
        assert!(!store.get("doc-001").unwrap().contains_key("score"));

        // second attempt succeeds
        let response = store.bulk_write(&batch[1..2], false).unwrap();
        assert!(response.failed.is_empty());
        assert_eq!(store.written_ids().len(), 4);
    }

    #[test]
    fn test_call_failures_and_schema() {
        let store = store(2);
        store.fail_next_bulk_writes(1);

        assert!(store.bulk_write(&[doc(0)], true).is_err());
        assert!(store.bulk_write(&[doc(0)], true).is_ok());

        let schema = store.schema().unwrap();
        assert_eq!(schema.get("n").map(String::as_str), Some("numeric"));
        assert_eq!(schema.get("text").map(String::as_str), Some("text"));
    }

    #[test]
    fn test_schema_lists_nested_fields_under_dotted_paths() {
        let record = json!({"_id": "a", "meta": {"title": "x", "tags": {"lang": "en"}, "gone": null}})
            .as_object()
            .cloned()
            .unwrap();
        let store = InMemoryDocumentStore::with_records("_id", [record]);

        let schema = store.schema().unwrap();
        assert_eq!(schema.get("meta").map(String::as_str), Some("dict"));
        assert_eq!(schema.get("meta.title").map(String::as_str), Some("text"));
        assert_eq!(schema.get("meta.tags.lang").map(String::as_str), Some("text"));
        assert!(!schema.contains_key("meta.gone"));
        assert!(!schema.contains_key("title"));
    }
}
