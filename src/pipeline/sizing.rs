//! # Batch Sizing
//!
//! Derives how many records fit in one transfer from a small sample. Record
//! size is the length of the record's JSON encoding, the same bytes a store
//! client puts on the wire.

use crate::config::SizingConfig;
use crate::constants::BYTES_PER_MB;
use crate::models::Record;

/// Encoded size of one record in bytes (0 if it cannot be encoded)
pub fn record_size(record: &Record) -> usize {
    serde_json::to_vec(record).map(|bytes| bytes.len()).unwrap_or(0)
}

/// Encoded size of a whole batch in bytes
pub fn payload_size(batch: &[Record]) -> usize {
    batch.iter().map(record_size).sum()
}

/// Mean encoded record size of a sample; 0.0 for an empty sample
pub fn average_record_size(sample: &[Record]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    payload_size(sample) as f64 / sample.len() as f64
}

/// Computes batch cardinality from a payload target and a hard maximum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchSizer {
    target_bytes: f64,
    max_batch_size: usize,
}

impl BatchSizer {
    pub fn new(target_chunk_mb: f64, max_batch_size: usize) -> Self {
        Self {
            target_bytes: target_chunk_mb * BYTES_PER_MB,
            max_batch_size: max_batch_size.max(1),
        }
    }

    pub fn from_config(config: &SizingConfig) -> Self {
        Self::new(config.target_chunk_mb, config.max_chunk_size)
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// `floor(target / average)` clamped to `[1, max]`; `max` when the average is unusable
    pub fn batch_size_for_average(&self, average_bytes: f64) -> usize {
        if !(average_bytes > 0.0 && average_bytes.is_finite()) {
            return self.max_batch_size;
        }

        let fitted = (self.target_bytes / average_bytes).floor();
        if fitted >= self.max_batch_size as f64 {
            self.max_batch_size
        } else {
            (fitted as usize).max(1)
        }
    }

    pub fn batch_size(&self, sample: &[Record]) -> usize {
        self.batch_size_for_average(average_record_size(sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_of_len(len: usize) -> Record {
        json!({"_id": "x", "blob": "a".repeat(len)})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_record_size_matches_encoding() {
        let record = json!({"_id": "1"}).as_object().cloned().unwrap();
        assert_eq!(record_size(&record), r#"{"_id":"1"}"#.len());
    }

    #[test]
    fn test_empty_sample_falls_back_to_max() {
        let sizer = BatchSizer::new(1.0, 500);
        assert_eq!(sizer.batch_size(&[]), 500);
        assert_eq!(sizer.batch_size_for_average(0.0), 500);
        assert_eq!(sizer.batch_size_for_average(f64::NAN), 500);
    }

    #[test]
    fn test_target_divided_by_average() {
        // 1 MiB target, 1 KiB records
        let sizer = BatchSizer::new(1.0, 10_000);
        assert_eq!(sizer.batch_size_for_average(1024.0), 1024);
        assert_eq!(sizer.batch_size_for_average(1000.0), 1048);
    }

    #[test]
    fn test_clamped_to_bounds() {
        let sizer = BatchSizer::new(1.0, 100);
        assert_eq!(sizer.batch_size_for_average(1.0), 100);
        // records larger than the whole target still move one at a time
        assert_eq!(sizer.batch_size_for_average(4.0 * BYTES_PER_MB), 1);
    }

    #[test]
    fn test_sample_based_sizing() {
        let sample: Vec<Record> = (0..10).map(|_| record_of_len(1000)).collect();
        let average = average_record_size(&sample);
        let sizer = BatchSizer::new(0.1, 10_000);

        let expected = ((0.1 * BYTES_PER_MB) / average).floor() as usize;
        assert_eq!(sizer.batch_size(&sample), expected);
    }
}
