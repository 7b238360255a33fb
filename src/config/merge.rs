//! Layer merge
//!
//! - Objects: merged key by key, recursively
//! - Arrays: replaced by the later layer
//! - Scalars and null: later layer wins

use serde_json::Value;

/// Overlay `overlay` onto `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut merged), Value::Object(top)) => {
            for (key, top_value) in top {
                let value = match merged.remove(&key) {
                    Some(below) => deep_merge(below, top_value),
                    None => top_value,
                };
                merged.insert(key, value);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers lowest-precedence first.
pub fn merge_layers(layers: impl IntoIterator<Item = Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}
