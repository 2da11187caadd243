//! Rewrites MCP input schemas into the JSON-schema dialect model APIs
//! accept for function declarations.

use serde_json::{Map, Value};

const STRIPPED_KEYS: [&str; 4] = ["title", "$schema", "additionalProperties", "additional_properties"];

const SCHEMA_MAP_KEYS: [&str; 2] = ["properties", "definitions"];

const SCHEMA_LIST_KEYS: [&str; 3] = ["allOf", "anyOf", "oneOf"];

/// Returns a cleaned copy of `schema`. The input is never mutated, and
/// values that are not objects or arrays come back unchanged.
pub fn adapt(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(adapt_object(map)),
        Value::Array(items) => Value::Array(items.iter().map(adapt).collect()),
        other => other.clone(),
    }
}

fn adapt_object(map: &Map<String, Value>) -> Map<String, Value> {
    let mut cleaned = Map::with_capacity(map.len());

    for (key, value) in map {
        let key = key.as_str();
        if STRIPPED_KEYS.contains(&key) {
            continue;
        }

        let value = if SCHEMA_MAP_KEYS.contains(&key) {
            match value {
                Value::Object(children) => Value::Object(
                    children
                        .iter()
                        .map(|(name, child)| (name.clone(), adapt(child)))
                        .collect(),
                ),
                other => other.clone(),
            }
        } else if SCHEMA_LIST_KEYS.contains(&key) {
            match value {
                Value::Array(children) => Value::Array(children.iter().map(adapt).collect()),
                other => other.clone(),
            }
        } else if key == "items" {
            adapt(value)
        } else {
            value.clone()
        };

        cleaned.insert(key.to_string(), value);
    }

    cleaned
}
