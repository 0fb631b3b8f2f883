//! semantic comparison and rfc-6902 patches over canonical specs.

use crate::types::{FieldChange, PatchOp};
use matlas_core::MASKED_SENTINEL;
use serde_json::{Map, Value};

/// structural equality where a masked secret on either side matches anything.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if is_masked(a) || is_masked(b) {
        return true;
    }
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, value)| b.get(key).is_some_and(|other| values_equal(value, other)))
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => a == b,
    }
}

fn is_masked(value: &Value) -> bool {
    value.as_str() == Some(MASKED_SENTINEL)
}

/// compute top-level changes for fields the desired side declares.
pub fn diff_fields(live: &Value, desired: &Value) -> Vec<FieldChange> {
    let empty = Map::new();
    let live = live.as_object().unwrap_or(&empty);
    let Some(desired) = desired.as_object() else {
        return Vec::new();
    };
    let mut changes = Vec::new();
    for (field, to) in desired {
        let from = live.get(field).cloned().unwrap_or(Value::Null);
        if !values_equal(&from, to) {
            changes.push(FieldChange {
                field: field.clone(),
                from,
                to: to.clone(),
            });
        }
    }
    changes
}

/// rfc-6902 patch turning `live` into `desired`, limited to desired fields
/// at the top level.
pub fn patch(live: &Value, desired: &Value) -> Vec<PatchOp> {
    let mut ops = Vec::new();
    for change in diff_fields(live, desired) {
        let path = format!("/{}", escape(&change.field));
        if change.from.is_null() {
            ops.push(PatchOp::Add {
                path,
                value: change.to,
            });
        } else if change.to.is_null() {
            ops.push(PatchOp::Remove { path });
        } else {
            diff_values(&path, &change.from, &change.to, &mut ops);
        }
    }
    ops
}

fn diff_values(path: &str, from: &Value, to: &Value, ops: &mut Vec<PatchOp>) {
    if values_equal(from, to) {
        return;
    }
    match (from, to) {
        (Value::Object(from), Value::Object(to)) => {
            for (key, value) in from {
                let child = format!("{path}/{}", escape(key));
                match to.get(key) {
                    Some(next) => diff_values(&child, value, next, ops),
                    None => ops.push(PatchOp::Remove { path: child }),
                }
            }
            for (key, value) in to {
                if !from.contains_key(key) {
                    ops.push(PatchOp::Add {
                        path: format!("{path}/{}", escape(key)),
                        value: value.clone(),
                    });
                }
            }
        }
        (Value::Array(from), Value::Array(to)) if from.len() == to.len() => {
            for (index, (a, b)) in from.iter().zip(to).enumerate() {
                diff_values(&format!("{path}/{index}"), a, b, ops);
            }
        }
        _ => ops.push(PatchOp::Replace {
            path: path.to_string(),
            value: to.clone(),
        }),
    }
}

/// json-pointer escaping for a single path segment.
fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
