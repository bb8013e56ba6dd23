//! # Transforms
//!
//! The caller-supplied unit of work applied to each batch, plus the
//! post-processing the updater performs on its output: contract checks and
//! suppression of fields the transform left untouched.
//!
//! Any `Fn(Batch) -> anyhow::Result<Batch>` closure is a [`Transform`]; extra
//! arguments are captured by the closure. Wrap a transform in [`Exclusive`]
//! when it must never run concurrently (a single-GPU model, say).

use serde_json::Value;

use crate::models::{Batch, Record};

/// Batch transform applied by the updater pool
///
/// The output must have the same length as the input, in the same order, with
/// each record keeping the identifier of its input counterpart.
pub trait Transform: Send + Sync {
    fn transform(&self, batch: Batch) -> anyhow::Result<Batch>;

    /// Whether several updaters may call `transform` at the same time
    fn concurrent_safe(&self) -> bool {
        true
    }
}

impl<F> Transform for F
where
    F: Fn(Batch) -> anyhow::Result<Batch> + Send + Sync,
{
    fn transform(&self, batch: Batch) -> anyhow::Result<Batch> {
        self(batch)
    }
}

/// Marks a transform as unsafe for concurrent invocation
#[derive(Debug, Clone)]
pub struct Exclusive<T>(pub T);

impl<T: Transform> Transform for Exclusive<T> {
    fn transform(&self, batch: Batch) -> anyhow::Result<Batch> {
        self.0.transform(batch)
    }

    fn concurrent_safe(&self) -> bool {
        false
    }
}

pub fn exclusive<T: Transform>(transform: T) -> Exclusive<T> {
    Exclusive(transform)
}

/// Check that `output` lines up with `originals` record for record
pub fn check_contract(originals: &[Record], output: &[Record], id_field: &str) -> Result<(), String> {
    if originals.len() != output.len() {
        return Err(format!(
            "transform returned {} records for a batch of {}",
            output.len(),
            originals.len()
        ));
    }

    for (position, (original, updated)) in originals.iter().zip(output).enumerate() {
        let before = original.get(id_field);
        let after = updated.get(id_field);
        if before != after {
            return Err(format!(
                "record at position {position} changed '{id_field}' from {} to {}",
                before.map(Value::to_string).unwrap_or_else(|| "<missing>".to_string()),
                after.map(Value::to_string).unwrap_or_else(|| "<missing>".to_string()),
            ));
        }
    }

    Ok(())
}

/// Drop every field whose value equals the one it had before the transform
///
/// The identifier is always kept. Fields the transform added or changed
/// survive, so the write-back payload carries only real modifications.
/// Applying this twice against the same originals changes nothing further.
pub fn suppress_unchanged_fields(output: Batch, originals: &[Record], id_field: &str) -> Batch {
    output
        .into_iter()
        .zip(originals)
        .map(|(mut record, original)| {
            record.retain(|key, value| key == id_field || original.get(key) != Some(&*value));
            record
        })
        .collect()
}
