//! Change-set merging and path operations over JSON objects.
//!
//! Merge rules, applied per top-level key of the change-set:
//! - `null` removes the key from the result
//! - any other value replaces the existing value wholesale (no deep merge)
//! - keys absent from the change-set keep their fetched value

use deskgate_core::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Merges a partial change-set onto a fetched object.
///
/// # Example
///
/// ```
/// use deskgate_gateway::mutation::merge_changes;
/// use serde_json::json;
///
/// let fetched = json!({"email": "a@x.com", "note": "old", "tags": ["a"]});
/// let changes = json!({"note": null, "tags": ["b"]});
/// let merged = merge_changes(
///     fetched.as_object().unwrap(),
///     changes.as_object().unwrap(),
/// );
/// assert_eq!(serde_json::Value::Object(merged), json!({"email": "a@x.com", "tags": ["b"]}));
/// ```
#[must_use]
pub fn merge_changes(base: &Map<String, Value>, changes: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in changes {
        if value.is_null() {
            merged.remove(key);
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Kind of a path operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathOp {
    /// Set the value at the path, creating intermediate objects.
    Replace,
    /// Same as `Replace`; kept as a separate verb for callers.
    Add,
    /// Delete the value at the path; missing paths are ignored.
    Remove,
}

/// A single edit addressed by a dot-separated path such as `shipping.city`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathOperation {
    /// Operation kind.
    pub op: PathOp,
    /// Dot-separated object path.
    pub path: String,
    /// New value for `replace` and `add`.
    #[serde(default)]
    pub value: Value,
}

impl PathOperation {
    /// Creates a replace operation.
    #[must_use]
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PathOp::Replace,
            path: path.into(),
            value,
        }
    }

    /// Creates an add operation.
    #[must_use]
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PathOp::Add,
            path: path.into(),
            value,
        }
    }

    /// Creates a remove operation.
    #[must_use]
    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PathOp::Remove,
            path: path.into(),
            value: Value::Null,
        }
    }

    fn segments(&self) -> Result<Vec<&str>> {
        let segments: Vec<&str> = self.path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(GatewayError::invalid("path", format!("Invalid path: '{}'", self.path)));
        }
        Ok(segments)
    }

    /// Applies this operation to `target` in place.
    pub fn apply(&self, target: &mut Map<String, Value>) -> Result<()> {
        let segments = self.segments()?;
        let Some((last, parents)) = segments.split_last() else {
            return Err(GatewayError::invalid("path", "Path must not be empty"));
        };

        match self.op {
            PathOp::Replace | PathOp::Add => {
                let mut current = target;
                for segment in parents {
                    let entry = current
                        .entry((*segment).to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                    current = entry.as_object_mut().ok_or_else(|| {
                        GatewayError::invalid(
                            "path",
                            format!("'{segment}' in '{}' is not an object", self.path),
                        )
                    })?;
                }
                current.insert((*last).to_string(), self.value.clone());
            }
            PathOp::Remove => {
                let mut current = target;
                for segment in parents {
                    match current.get_mut(*segment).and_then(Value::as_object_mut) {
                        Some(next) => current = next,
                        None => return Ok(()),
                    }
                }
                current.remove(*last);
            }
        }
        Ok(())
    }
}

/// Applies operations in order.
pub fn apply_operations(target: &mut Map<String, Value>, operations: &[PathOperation]) -> Result<()> {
    operations.iter().try_for_each(|op| op.apply(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_null_removes_key() {
        let base = object(json!({"a": 1, "b": 2}));
        let merged = merge_changes(&base, &object(json!({"b": null})));
        assert_eq!(Value::Object(merged), json!({"a": 1}));
    }

    #[test]
    fn test_null_for_absent_key_is_noop() {
        let base = object(json!({"a": 1}));
        let merged = merge_changes(&base, &object(json!({"z": null})));
        assert_eq!(Value::Object(merged), json!({"a": 1}));
    }

    #[test]
    fn test_overwrite_is_shallow() {
        let base = object(json!({
            "shipping": {"city": "Oslo", "zip": "0150"},
            "order_items": [{"id": 1}, {"id": 2}]
        }));
        let changes = object(json!({
            "shipping": {"city": "Bergen"},
            "order_items": [{"id": 3}]
        }));
        let merged = merge_changes(&base, &changes);
        assert_eq!(
            Value::Object(merged),
            json!({"shipping": {"city": "Bergen"}, "order_items": [{"id": 3}]})
        );
    }

    #[test]
    fn test_absent_keys_preserved() {
        let base = object(json!({"a": 1, "b": {"c": 2}, "d": [1]}));
        let merged = merge_changes(&base, &object(json!({"e": false})));
        assert_eq!(Value::Object(merged), json!({"a": 1, "b": {"c": 2}, "d": [1], "e": false}));
    }

    #[test]
    fn test_falsy_values_are_not_removals() {
        let base = object(json!({"a": 1, "b": "x", "c": [1]}));
        let merged = merge_changes(&base, &object(json!({"a": 0, "b": "", "c": []})));
        assert_eq!(Value::Object(merged), json!({"a": 0, "b": "", "c": []}));
    }

    #[test]
    fn test_replace_creates_intermediates() {
        let mut target = object(json!({"id": "1"}));
        PathOperation::replace("shipping.address.city", json!("Oslo"))
            .apply(&mut target)
            .unwrap();
        assert_eq!(
            Value::Object(target),
            json!({"id": "1", "shipping": {"address": {"city": "Oslo"}}})
        );
    }

    #[test]
    fn test_replace_through_scalar_fails() {
        let mut target = object(json!({"shipping": "none"}));
        let err = PathOperation::add("shipping.city", json!("Oslo"))
            .apply(&mut target)
            .unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_remove_missing_path_is_noop() {
        let mut target = object(json!({"a": {"b": 1}}));
        PathOperation::remove("x.y").apply(&mut target).unwrap();
        PathOperation::remove("a.c").apply(&mut target).unwrap();
        assert_eq!(Value::Object(target.clone()), json!({"a": {"b": 1}}));

        PathOperation::remove("a.b").apply(&mut target).unwrap();
        assert_eq!(Value::Object(target), json!({"a": {}}));
    }

    #[test]
    fn test_invalid_paths() {
        let mut target = Map::new();
        assert!(PathOperation::remove("").apply(&mut target).is_err());
        assert!(PathOperation::replace("a..b", json!(1)).apply(&mut target).is_err());
    }

    #[test]
    fn test_operations_deserialize() {
        let ops: Vec<PathOperation> = serde_json::from_value(json!([
            {"op": "replace", "path": "email", "value": "b@x.com"},
            {"op": "remove", "path": "note"}
        ]))
        .unwrap();

        let mut target = object(json!({"email": "a@x.com", "note": "hi"}));
        apply_operations(&mut target, &ops).unwrap();
        assert_eq!(Value::Object(target), json!({"email": "b@x.com"}));
    }
}
