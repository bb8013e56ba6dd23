use pullpush::{InMemoryDocumentStore, PipelineConfig, Record};
use serde_json::json;
use std::sync::Arc;

/// Record `doc-NNN` with a numeric field and some text
pub fn test_record(i: usize) -> Record {
    json!({
        "_id": format!("doc-{i:03}"),
        "n": i,
        "text": format!("record number {i}"),
    })
    .as_object()
    .cloned()
    .expect("json object")
}

pub fn test_store(count: usize) -> Arc<InMemoryDocumentStore> {
    Arc::new(InMemoryDocumentStore::with_records(
        "_id",
        (0..count).map(test_record),
    ))
}

/// Short timeouts and no progress logging, so tests settle quickly
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        timeout_seconds: 5,
        push_item_timeout_ms: 50,
        poll_interval_ms: 10,
        show_progress: false,
        ..PipelineConfig::default()
    }
}

/// Adds `score = n * 2` to every record
pub fn scoring_transform(batch: Vec<Record>) -> anyhow::Result<Vec<Record>> {
    Ok(batch
        .into_iter()
        .map(|mut record| {
            let n = record.get("n").and_then(|v| v.as_u64()).unwrap_or(0);
            record.insert("score".into(), json!(n * 2));
            record
        })
        .collect())
}

pub fn identity_transform(batch: Vec<Record>) -> anyhow::Result<Vec<Record>> {
    Ok(batch)
}
