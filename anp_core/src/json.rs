//! JSON schema helpers for published method definitions.

use serde_json::Value;

pub use schemars::{schema_for, JsonSchema};

/// Derives a JSON schema for `T` and cleans it for publication.
pub fn schema_value<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_default();
    clean_json_schema(&mut value);
    value
}

/// Published interface documents have strict requirements for schemas,
/// use clean_json_schema to fix a derived one:
/// 1. Remove the $schema field
/// 2. Remove the title field (the parameter name carries it)
pub fn clean_json_schema(schema: &mut Value) {
    if let Value::Object(obj) = schema {
        obj.remove("$schema");
        obj.remove("title");
        if let Some(Value::Object(props)) = obj.get_mut("properties") {
            for v in props.values_mut() {
                clean_json_schema(v);
            }
        }
        if let Some(items) = obj.get_mut("items") {
            match items {
                Value::Array(arr) => {
                    for v in arr {
                        clean_json_schema(v);
                    }
                }
                v => clean_json_schema(v),
            }
        }
    }
}
