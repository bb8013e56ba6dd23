use proptest::prelude::*;
use pullpush::Record;
use serde_json::{json, Value};

/// Strategy for scalar JSON field values
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        "[a-z ]{0,40}".prop_map(Value::from),
        Just(Value::Null),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(|v| json!(v)),
    ]
}

/// Strategy for records with an `_id` and up to six extra fields
pub fn record_strategy() -> impl Strategy<Value = Record> {
    (
        "[a-z0-9]{1,12}",
        prop::collection::btree_map("[a-z]{1,8}", field_value_strategy(), 0..6),
    )
        .prop_map(|(id, fields)| {
            let mut record = Record::new();
            record.insert("_id".into(), Value::from(id));
            for (key, value) in fields {
                if key != "_id" {
                    record.insert(key, value);
                }
            }
            record
        })
}

pub fn batch_strategy() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(record_strategy(), 1..20)
}

/// A batch together with per-record edits: overwrite a field, add one, or leave as is
pub fn edited_batch_strategy() -> impl Strategy<Value = (Vec<Record>, Vec<Record>)> {
    batch_strategy().prop_flat_map(|batch| {
        let len = batch.len();
        (
            Just(batch),
            prop::collection::vec((0u8..3, field_value_strategy()), len),
        )
            .prop_map(|(batch, edits)| {
                let edited = batch
                    .iter()
                    .zip(edits)
                    .map(|(record, (kind, value))| {
                        let mut out = record.clone();
                        match kind {
                            0 => {}
                            1 => {
                                out.insert("added".into(), value);
                            }
                            _ => {
                                if let Some(key) = out.keys().find(|k| *k != "_id").cloned() {
                                    out.insert(key, value);
                                }
                            }
                        }
                        out
                    })
                    .collect();
                (batch, edited)
            })
    })
}
