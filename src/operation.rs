//! # Operation Runs
//!
//! A higher-level entry point for "compute output fields from select fields"
//! jobs. An [`OperationRun`] checks its select fields against the store schema,
//! narrows the run to records that carry at least one of them and, unless
//! refreshing, skips records that already hold the first output field. The
//! pipeline then runs with operation defaults: two updaters, two pushers,
//! updates of 32 and a transform that is not assumed to be concurrent-safe.

use std::sync::Arc;
use tracing::info;

use crate::config::{ConfigurationError, PipelineConfig};
use crate::constants::operation_defaults;
use crate::error::Result;
use crate::models::Filter;
use crate::pipeline::{Exclusive, Pipeline, RunReport, Transform};
use crate::store::DocumentStore;

/// Builder for an operation over one store
#[derive(Debug, Clone)]
pub struct OperationRun {
    select_fields: Vec<String>,
    output_fields: Vec<String>,
    filters: Vec<Filter>,
    refresh: bool,
    batched: bool,
    chunk_size: usize,
    multithreaded_update: bool,
    base: PipelineConfig,
}

impl OperationRun {
    pub fn new<I, S>(select_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let base = PipelineConfig {
            update_workers: operation_defaults::UPDATE_WORKERS,
            push_workers: operation_defaults::PUSH_WORKERS,
            update_batch_size: operation_defaults::UPDATE_BATCH_SIZE,
            ingest_in_background: true,
            ..PipelineConfig::default()
        };

        Self {
            select_fields: select_fields.into_iter().map(Into::into).collect(),
            output_fields: Vec::new(),
            filters: Vec::new(),
            refresh: false,
            batched: false,
            chunk_size: operation_defaults::CHUNK_SIZE,
            multithreaded_update: false,
            base,
        }
    }

    /// Fields the transform writes; the first one marks a record as processed
    pub fn output_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Extra filters applied before the operation's own
    pub fn filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    /// Reprocess records that already carry the output field
    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Feed the transform in update-sized batches instead of one batch
    pub fn batched(mut self, batched: bool) -> Self {
        self.batched = batched;
        self
    }

    /// Page and push size
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Allow several updaters to call the transform at once
    pub fn multithreaded_update(mut self, enabled: bool) -> Self {
        self.multithreaded_update = enabled;
        self
    }

    /// Override the remaining pipeline settings
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.base = config;
        self
    }

    /// Filters for the run after schema checks
    pub fn resolve_filters(&self, store: &dyn DocumentStore) -> Result<Vec<Filter>> {
        let schema = store.schema()?;
        if let Some(field) = self.select_fields.iter().find(|f| !schema.contains_key(*f)) {
            return Err(ConfigurationError::UnknownField {
                field: field.clone(),
            }
            .into());
        }

        let mut filters = self.filters.clone();
        if !self.select_fields.is_empty() {
            filters.push(Filter::any_of(
                self.select_fields.iter().map(|f| Filter::exists(f.as_str())),
            ));
        }
        if !self.refresh {
            if let Some(marker) = self.output_fields.first() {
                filters.push(Filter::missing(marker.as_str()));
            }
        }
        Ok(filters)
    }

    /// Pipeline configuration for the run
    pub fn pipeline_config(&self, filters: Vec<Filter>) -> PipelineConfig {
        PipelineConfig {
            pull_batch_size: self.chunk_size,
            push_batch_size: Some(self.chunk_size),
            update_all_at_once: !self.batched,
            background_execution: true,
            filters,
            select_fields: self.select_fields.clone(),
            ..self.base.clone()
        }
    }

    /// Run the operation to completion
    pub fn run<T>(&self, store: Arc<dyn DocumentStore>, transform: T) -> Result<RunReport>
    where
        T: Transform + 'static,
    {
        let filters = self.resolve_filters(store.as_ref())?;
        let config = self.pipeline_config(filters);

        info!(
            select_fields = ?self.select_fields,
            output_fields = ?self.output_fields,
            refresh = self.refresh,
            batched = self.batched,
            "OPERATION: Starting run"
        );

        let transform: Arc<dyn Transform> = if self.multithreaded_update {
            Arc::new(transform)
        } else {
            Arc::new(Exclusive(transform))
        };
        Pipeline::new(store, transform, config)?.run()?.wait()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::models::Record;
    use crate::store::InMemoryDocumentStore;
    use serde_json::json;

    fn store() -> InMemoryDocumentStore {
        let records = (0..6).map(|i| {
            let mut record = json!({"_id": format!("r{i}"), "text": format!("row {i}")});
            if i % 2 == 0 {
                record["label"] = json!("done");
            }
            record.as_object().cloned().unwrap_or_default()
        });
        InMemoryDocumentStore::with_records("_id", records)
    }

    #[test]
    fn test_unknown_select_field_is_rejected() {
        let store = store();
        let err = OperationRun::new(["vector"]).resolve_filters(&store).unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Configuration(ConfigurationError::UnknownField { ref field }) if field == "vector"
        ));
    }

    #[test]
    fn test_nested_select_field_passes_schema_check() {
        let record = json!({"_id": "a", "meta": {"title": "x"}}).as_object().cloned().unwrap();
        let store = InMemoryDocumentStore::with_records("_id", [record]);

        let filters = OperationRun::new(["meta.title"]).resolve_filters(&store).unwrap();
        assert_eq!(filters.len(), 1);
        assert!(filters[0].matches(store.get("a").as_ref().unwrap()));
    }

    #[test]
    fn test_filters_skip_processed_records_unless_refreshing() {
        let store = store();
        let op = OperationRun::new(["text"]).output_fields(["label"]);

        let filters = op.resolve_filters(&store).unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[1], Filter::missing("label"));

        let refreshed = op.clone().refresh(true).resolve_filters(&store).unwrap();
        assert_eq!(refreshed.len(), 1);
    }

    #[test]
    fn test_operation_defaults() {
        let op = OperationRun::new(["text"]);
        let config = op.pipeline_config(Vec::new());

        assert_eq!(config.update_workers, 2);
        assert_eq!(config.push_workers, 2);
        assert_eq!(config.update_batch_size, 32);
        assert_eq!(config.push_batch_size, Some(100));
        assert!(config.update_all_at_once);
        assert!(config.ingest_in_background);

        assert!(!op.batched(true).pipeline_config(Vec::new()).update_all_at_once);
    }

    #[test]
    fn test_run_labels_only_unprocessed_records() {
        let store = Arc::new(store());
        let op = OperationRun::new(["text"])
            .output_fields(["label"])
            .chunk_size(2);

        let report = op
            .run(store.clone(), |batch: Vec<Record>| -> anyhow::Result<Vec<Record>> {
                Ok(batch
                    .into_iter()
                    .map(|mut record| {
                        record.insert("label".into(), json!("new"));
                        record
                    })
                    .collect())
            })
            .unwrap();

        assert_eq!(report.progress.pushed, 3);
        for i in 0..6 {
            let expected = if i % 2 == 0 { "done" } else { "new" };
            let record = store.get(&format!("r{i}")).unwrap();
            assert_eq!(record["label"], json!(expected));
        }
    }
}
