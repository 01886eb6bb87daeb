//! Recursive combination of untyped configuration values
//!
//! Two flavours share one function:
//! - configuration layering appends sequences,
//! - declaration deltas merge sequences element-wise by position.
//!
//! In both, mappings merge key-wise, scalars overwrite and an explicit
//! `null` in a mapping removes the key.

use serde_json::Value;

/// How sequences in the delta combine with sequences in the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceMerge {
    /// Delta elements are appended
    Append,
    /// Delta element `i` is combined onto target element `i`
    Positional,
}

/// Combine `delta` onto `target` in place
pub fn combine(target: &mut Value, delta: Value, mode: SequenceMerge) {
    match (target, delta) {
        (Value::Object(target), Value::Object(delta)) => {
            for (key, value) in delta {
                if value.is_null() {
                    target.shift_remove(&key);
                    continue;
                }
                match target.get_mut(&key) {
                    Some(existing) => combine(existing, value, mode),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(target), Value::Array(delta)) => match mode {
            SequenceMerge::Append => target.extend(delta),
            SequenceMerge::Positional => {
                for (index, value) in delta.into_iter().enumerate() {
                    match target.get_mut(index) {
                        Some(existing) => combine(existing, value, mode),
                        None => target.push(value),
                    }
                }
            }
        },
        (target, delta) => *target = delta,
    }
}

/// Apply a declaration delta (positional sequences), returning the result
pub fn combine_object(mut base: Value, delta: Value) -> Value {
    combine(&mut base, delta, SequenceMerge::Positional);
    base
}

/// Layer configuration values left to right (appended sequences)
pub fn merge_layers<I: IntoIterator<Item = Value>>(layers: I) -> Value {
    let mut merged = Value::Object(serde_json::Map::new());
    for layer in layers {
        combine(&mut merged, layer, SequenceMerge::Append);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mappings_merge_keywise() {
        let merged = combine_object(json!({"a": 1, "b": {"c": 2}}), json!({"b": {"d": 3}}));
        assert_eq!(merged, json!({"a": 1, "b": {"c": 2, "d": 3}}));
    }

    #[test]
    fn test_scalars_overwrite() {
        let merged = combine_object(json!({"a": 1, "b": "x"}), json!({"a": "one", "b": {"k": 1}}));
        assert_eq!(merged, json!({"a": "one", "b": {"k": 1}}));
    }

    #[test]
    fn test_null_deletes_key() {
        let merged = combine_object(json!({"a": 1, "b": 2}), json!({"a": null}));
        assert_eq!(merged, json!({"b": 2}));
    }

    #[test]
    fn test_positional_sequences() {
        let merged = combine_object(
            json!({"parameters": [{"name": "a", "type": "int"}, {"name": "b", "type": "int"}]}),
            json!({"parameters": [{}, {"type": "float"}, {"name": "c"}]}),
        );
        assert_eq!(
            merged,
            json!({"parameters": [
                {"name": "a", "type": "int"},
                {"name": "b", "type": "float"},
                {"name": "c"}
            ]})
        );
    }

    #[test]
    fn test_layers_append_sequences() {
        let merged = merge_layers(vec![
            json!({"prefixes": ["SDL_"], "files": {"a.h": {"ignoreEntries": ["X"]}}}),
            json!({"prefixes": ["IMG_"], "files": {"a.h": {"ignoreEntries": ["Y"]}}}),
        ]);
        assert_eq!(
            merged,
            json!({"prefixes": ["SDL_", "IMG_"], "files": {"a.h": {"ignoreEntries": ["X", "Y"]}}})
        );
    }

    #[test]
    fn test_key_order_is_preserved() {
        let merged = combine_object(json!({"z": 1, "a": 2}), json!({"m": 3}));
        let keys: Vec<&String> = merged.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }
}
