//! Cache key derivation: `"<operation>:" + hex(sha256(canonical JSON))`.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use slurmrest_core::{SlurmError, SlurmResult};

use crate::config::Operation;

pub fn generate_key<P: Serialize + ?Sized>(op: Operation, params: &P) -> SlurmResult<String> {
    let value = serde_json::to_value(params).map_err(|e| SlurmError::conversion("cache params", e.to_string()))?;
    let mut canonical = String::new();
    write_canonical(&value, &mut canonical);
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(format!("{}:{}", op.as_str(), hex::encode(digest)))
}

/// JSON with object keys sorted at every level.
fn write_canonical(v: &Value, out: &mut String) {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(&map[k.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn key_ignores_map_order() {
        let pairs = [("user", "ana"), ("partition", "gpu"), ("account", "ml"), ("qos", "high")];
        let forward: HashMap<&str, &str> = pairs.iter().copied().collect();
        let backward: BTreeMap<&str, &str> = pairs.iter().rev().copied().collect();
        let a = generate_key(Operation::JobsList, &forward).unwrap();
        let b = generate_key(Operation::JobsList, &backward).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("jobs.list:"));
        assert_eq!(a.len(), "jobs.list:".len() + 64);
    }

    #[test]
    fn nested_objects_are_canonical_too() {
        let mut a = serde_json::Map::new();
        a.insert("z".into(), serde_json::json!({"b": 1, "a": [ {"y": 2, "x": 1} ]}));
        a.insert("a".into(), serde_json::json!(null));
        let b = serde_json::json!({"a": null, "z": {"a": [{"x": 1, "y": 2}], "b": 1}});
        assert_eq!(generate_key(Operation::NodesList, &a).unwrap(), generate_key(Operation::NodesList, &b).unwrap());
    }

    #[test]
    fn operation_and_params_both_matter() {
        let a = generate_key(Operation::JobsGet, &4101u32).unwrap();
        assert_eq!(a, generate_key(Operation::JobsGet, &4101u32).unwrap());
        assert_ne!(a, generate_key(Operation::JobsGet, &4102u32).unwrap());
        assert_ne!(a, generate_key(Operation::NodesGet, &4101u32).unwrap());
    }
}
