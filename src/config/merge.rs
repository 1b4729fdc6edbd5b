//! Layer merging for sweep configuration
//!
//! Layers are JSON values merged in precedence order:
//! - Objects: deep-merge by key
//! - Arrays: replace (last wins)
//! - Scalars and null: override (last wins)

use serde_json::Value;

/// Deep merge `overlay` onto `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers in order (first is base, last has highest precedence).
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_override() {
        let result = deep_merge(json!({"workers": 1}), json!({"workers": 8}));
        assert_eq!(result["workers"], 8);
    }

    #[test]
    fn test_untouched_keys_preserved() {
        let base = json!({"workers": 1, "dry_run": false});
        let result = deep_merge(base, json!({"dry_run": true}));
        assert_eq!(result["workers"], 1);
        assert_eq!(result["dry_run"], true);
    }

    #[test]
    fn test_nested_objects_merge() {
        let base = json!({"log": {"format": "compact", "quiet": false}});
        let result = deep_merge(base, json!({"log": {"quiet": true}}));
        assert_eq!(result["log"]["format"], "compact");
        assert_eq!(result["log"]["quiet"], true);
    }

    #[test]
    fn test_array_replaced() {
        let result = deep_merge(json!({"x": [1, 2]}), json!({"x": [3]}));
        assert_eq!(result["x"], json!([3]));
    }

    #[test]
    fn test_null_overrides() {
        let result = deep_merge(json!({"journal_path": "/a"}), json!({"journal_path": null}));
        assert!(result["journal_path"].is_null());
    }

    #[test]
    fn test_merge_layers_precedence() {
        let layers = vec![
            json!({"workers": 1, "cache_key_length": 32}),
            json!({"workers": 4}),
            json!({"workers": 2}),
        ];
        let result = merge_layers(layers);
        assert_eq!(result["workers"], 2);
        assert_eq!(result["cache_key_length"], 32);
    }
}
