//! # Record Filters
//!
//! Explicit filter values in the store's wire format:
//! `{field, filter_type, condition, condition_value}` for single-field filters
//! and `{filter_type: "or", condition_value: [...]}` for any-of groups.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use super::record::{field_value, Record};

/// How a single-field filter interprets its condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    /// Field presence; `==` means present, `!=` means absent
    Exists,
    ExactMatch,
    Numeric,
    /// Substring for strings, membership for arrays
    Contains,
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
}

impl Condition {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Condition::Eq => ordering == Ordering::Equal,
            Condition::Ne => ordering != Ordering::Equal,
            Condition::Gt => ordering == Ordering::Greater,
            Condition::Gte => ordering != Ordering::Less,
            Condition::Lt => ordering == Ordering::Less,
            Condition::Lte => ordering != Ordering::Greater,
        }
    }
}

/// Filter over a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub filter_type: FilterType,
    pub condition: Condition,
    pub condition_value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum GroupKind {
    Or,
}

/// Any-of group of field filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnyOf {
    filter_type: GroupKind,
    #[serde(rename = "condition_value")]
    filters: Vec<FieldFilter>,
}

impl AnyOf {
    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }
}

/// A filter as sent to the document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    Field(FieldFilter),
    AnyOf(AnyOf),
}

impl Filter {
    pub fn new(
        field: impl Into<String>,
        filter_type: FilterType,
        condition: Condition,
        condition_value: impl Into<Value>,
    ) -> Self {
        Filter::Field(FieldFilter {
            field: field.into(),
            filter_type,
            condition,
            condition_value: condition_value.into(),
        })
    }

    /// Records where `field` is present
    pub fn exists(field: impl Into<String>) -> Self {
        Self::new(field, FilterType::Exists, Condition::Eq, " ")
    }

    /// Records where `field` is absent
    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, FilterType::Exists, Condition::Ne, " ")
    }

    pub fn exact(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterType::ExactMatch, Condition::Eq, value)
    }

    pub fn numeric(field: impl Into<String>, condition: Condition, value: f64) -> Self {
        Self::new(field, FilterType::Numeric, condition, value)
    }

    /// Records matching at least one of `filters`; non-field filters are flattened in
    pub fn any_of(filters: impl IntoIterator<Item = Filter>) -> Self {
        let filters = filters
            .into_iter()
            .flat_map(|filter| match filter {
                Filter::Field(field) => vec![field],
                Filter::AnyOf(group) => group.filters,
            })
            .collect();
        Filter::AnyOf(AnyOf {
            filter_type: GroupKind::Or,
            filters,
        })
    }

    /// Wire representation of the filter
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Evaluate the filter against a record
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::Field(filter) => filter.matches(record),
            Filter::AnyOf(group) => group.filters.iter().any(|f| f.matches(record)),
        }
    }

    /// Whether a record passes every filter in `filters`
    pub fn all_match(filters: &[Filter], record: &Record) -> bool {
        filters.iter().all(|filter| filter.matches(record))
    }
}

impl FieldFilter {
    pub fn matches(&self, record: &Record) -> bool {
        let value = field_value(record, &self.field).filter(|v| !v.is_null());

        match self.filter_type {
            FilterType::Exists => match self.condition {
                Condition::Ne => value.is_none(),
                _ => value.is_some(),
            },
            FilterType::ExactMatch => {
                let Some(value) = value else {
                    return self.condition == Condition::Ne;
                };
                match compare_values(value, &self.condition_value) {
                    Some(ordering) => self.condition.accepts(ordering),
                    None => self.condition == Condition::Ne,
                }
            }
            FilterType::Numeric => {
                let (Some(left), Some(right)) = (
                    value.and_then(Value::as_f64),
                    self.condition_value.as_f64(),
                ) else {
                    return false;
                };
                left.partial_cmp(&right)
                    .is_some_and(|ordering| self.condition.accepts(ordering))
            }
            FilterType::Contains => {
                let contained = match (value, &self.condition_value) {
                    (Some(Value::String(haystack)), Value::String(needle)) => {
                        haystack.contains(needle.as_str())
                    }
                    (Some(Value::Array(items)), needle) => items.contains(needle),
                    _ => false,
                };
                match self.condition {
                    Condition::Ne => !contained,
                    _ => contained,
                }
            }
        }
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (a, b) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}
