//! Source snapshots: the raw, caller-supplied input records.
//!
//! A snapshot is either a flat array of records (single declared kind) or a
//! kind-name to array map. Records are JSON objects with a mandatory `id`
//! unique within their kind; every other field is caller-defined. The
//! engine never mutates a snapshot; successive snapshots are compared by
//! deep equality to skip no-op updates.

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::ArmillaError;

/// One generation's raw input.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// An array of records for the single declared kind.
    Flat(Vec<Value>),
    /// Records grouped by kind name.
    Kinds(IndexMap<String, Vec<Value>>),
}

impl Snapshot {
    /// Builds a flat snapshot from a record array.
    pub fn from_records(records: Vec<Value>) -> Self {
        Snapshot::Flat(records)
    }

    /// Builds a snapshot from a kind-name to record-array map.
    pub fn from_kinds(kinds: IndexMap<String, Vec<Value>>) -> Self {
        Snapshot::Kinds(kinds)
    }

    /// Resolves this snapshot into per-kind record lists.
    ///
    /// A flat snapshot maps onto the single declared kind; with several
    /// declared kinds it cannot be attributed and is a fatal error.
    pub fn per_kind(&self, declared: &[String]) -> Result<IndexMap<String, Vec<Value>>, ArmillaError> {
        match self {
            Snapshot::Flat(records) => {
                if declared.len() != 1 {
                    return Err(ArmillaError::AmbiguousSnapshot(declared.len()));
                }
                let mut map = IndexMap::new();
                map.insert(declared[0].clone(), records.clone());
                Ok(map)
            }
            Snapshot::Kinds(kinds) => Ok(kinds.clone()),
        }
    }

    fn records_mut(&mut self, kind: &str) -> Option<&mut Vec<Value>> {
        match self {
            Snapshot::Flat(records) => Some(records),
            Snapshot::Kinds(kinds) => kinds.get_mut(kind),
        }
    }

    /// Sets `field` on the record with the given id, returning false when
    /// the record does not exist.
    pub fn set_field(&mut self, kind: &str, id: &str, field: &str, value: Value) -> bool {
        let Some(records) = self.records_mut(kind) else {
            return false;
        };
        for record in records.iter_mut() {
            if record_id(record).as_deref() == Some(id) {
                if let Value::Object(map) = record {
                    map.insert(field.to_string(), value);
                    return true;
                }
            }
        }
        false
    }

    /// Removes `field` from the record with the given id.
    pub fn remove_field(&mut self, kind: &str, id: &str, field: &str) -> bool {
        let Some(records) = self.records_mut(kind) else {
            return false;
        };
        for record in records.iter_mut() {
            if record_id(record).as_deref() == Some(id) {
                if let Value::Object(map) = record {
                    return map.remove(field).is_some();
                }
            }
        }
        false
    }

    /// Removes the whole record with the given id.
    pub fn remove_record(&mut self, kind: &str, id: &str) -> bool {
        let Some(records) = self.records_mut(kind) else {
            return false;
        };
        let before = records.len();
        records.retain(|record| record_id(record).as_deref() != Some(id));
        records.len() != before
    }
}

impl From<Vec<Value>> for Snapshot {
    fn from(records: Vec<Value>) -> Self {
        Snapshot::Flat(records)
    }
}

/// Extracts the canonical string id of a record.
///
/// String ids are used verbatim; integer ids are canonicalized to their
/// decimal representation so `2` and `"2"` denote the same logical item.
pub fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                n.as_f64().map(|f| f.to_string())
            }
        }
        _ => None,
    }
}

/// Extracts the id a raw link/pointer target denotes: either a bare
/// scalar id or a descriptor object carrying an `id` field.
pub fn value_id(value: &Value) -> Option<String> {
    match value {
        Value::Object(_) => record_id(value),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                n.as_f64().map(|f| f.to_string())
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_value_id_scalar_and_descriptor() {
        assert_eq!(value_id(&json!(2)), Some("2".to_string()));
        assert_eq!(value_id(&json!("b")), Some("b".to_string()));
        assert_eq!(value_id(&json!({"id": 3, "weight": 1})), Some("3".to_string()));
        assert_eq!(value_id(&json!(null)), None);
    }

    #[test]
    fn test_record_id_string_and_number() {
        assert_eq!(record_id(&json!({"id": "a"})), Some("a".to_string()));
        assert_eq!(record_id(&json!({"id": 2})), Some("2".to_string()));
        assert_eq!(record_id(&json!({"id": true})), None);
        assert_eq!(record_id(&json!({"name": "x"})), None);
    }

    #[test]
    fn test_flat_snapshot_needs_single_kind() {
        let snapshot = Snapshot::from_records(vec![json!({"id": 1})]);

        let kinds = snapshot.per_kind(&["node".to_string()]).unwrap();
        assert_eq!(kinds.len(), 1);
        assert_eq!(kinds["node"].len(), 1);

        let err = snapshot
            .per_kind(&["node".to_string(), "edge".to_string()])
            .unwrap_err();
        assert!(matches!(err, ArmillaError::AmbiguousSnapshot(2)));
    }

    #[test]
    fn test_deep_equality() {
        let a = Snapshot::from_records(vec![json!({"id": 1, "next": 2}), json!({"id": 2})]);
        let b = Snapshot::from_records(vec![json!({"id": 1, "next": 2}), json!({"id": 2})]);
        let c = Snapshot::from_records(vec![json!({"id": 1, "next": 2})]);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_set_and_remove_field() {
        let mut snapshot = Snapshot::from_records(vec![json!({"id": 1, "label": "a"})]);

        assert!(snapshot.set_field("node", "1", "label", json!("b")));
        assert!(!snapshot.set_field("node", "9", "label", json!("b")));

        if let Snapshot::Flat(records) = &snapshot {
            assert_eq!(records[0]["label"], json!("b"));
        }

        assert!(snapshot.remove_field("node", "1", "label"));
        assert!(!snapshot.remove_field("node", "1", "label"));
    }

    #[test]
    fn test_remove_record() {
        let mut snapshot = Snapshot::from_records(vec![json!({"id": 1}), json!({"id": 2})]);

        assert!(snapshot.remove_record("node", "1"));
        if let Snapshot::Flat(records) = &snapshot {
            assert_eq!(records.len(), 1);
        }
        assert!(!snapshot.remove_record("node", "1"));
    }
}
