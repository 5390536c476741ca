//! OpenRPC 1.3.2 interface documents
//!
//! The interface document is the machine-readable face of a peer's method
//! registry. This module provides both directions:
//! - [`assemble_document`]: registered methods → an OpenRPC document
//! - [`OpenRpcDocument::parse`]: a remote document → callable method records
//!
//! Assembly emits `params` as an array of ContentDescriptors. Parsing accepts
//! both the array form and the single-object-schema form and normalizes each
//! method's parameters to one object schema for client-side binding.

use serde_json::{json, Map, Value};

use crate::method::{MethodDefinition, MethodProtocol};

/// The OpenRPC specification version this SDK emits.
pub const OPENRPC_VERSION: &str = "1.3.2";

/// Extension value marking payment-protocol methods.
pub const AP2_PROTOCOL: &str = "AP2/ANP";

/// Possible errors when ingesting a remote OpenRPC document.
#[derive(Debug, thiserror::Error)]
pub enum OpenRpcError {
    #[error("OpenRPC document is not a JSON object")]
    NotAnObject,

    #[error("OpenRPC document has no methods")]
    NoMethods,

    #[error("method {0} has no servers entry and the document has none either")]
    NoServerUrl(String),

    #[error("invalid OpenRPC document: {0}")]
    Invalid(String),
}

/// Assembles an OpenRPC document for the given methods.
///
/// Each declared parameter becomes one ContentDescriptor `{name, required,
/// schema}`; the result is a single ContentDescriptor. AP2 methods carry the
/// `x-protocol` extension.
pub fn assemble_document(
    title: &str,
    version: &str,
    methods: &[MethodDefinition],
    rpc_url: &str,
) -> Value {
    let methods: Vec<Value> = methods
        .iter()
        .map(|m| {
            let params: Vec<Value> = m
                .params
                .iter()
                .map(|p| {
                    json!({
                        "name": p.name,
                        "required": p.required,
                        "schema": p.schema,
                    })
                })
                .collect();
            let mut method = Map::new();
            method.insert("name".to_string(), json!(m.name));
            method.insert("description".to_string(), json!(m.description));
            method.insert("params".to_string(), Value::Array(params));
            method.insert(
                "result".to_string(),
                json!({"name": "result", "schema": m.result}),
            );
            if m.protocol == MethodProtocol::Ap2 {
                method.insert("x-protocol".to_string(), json!(AP2_PROTOCOL));
            }
            Value::Object(method)
        })
        .collect();

    json!({
        "openrpc": OPENRPC_VERSION,
        "info": {"title": title, "version": version},
        "methods": methods,
        "servers": [{"name": "anp", "url": rpc_url}],
    })
}

/// One callable method extracted from a remote OpenRPC document.
#[derive(Clone, Debug)]
pub struct ParsedMethod {
    pub name: String,
    pub description: String,
    /// Normalized to `{type: "object", properties, required[]}`.
    pub params_schema: Value,
    /// Where JSON-RPC calls for this method go.
    pub rpc_url: String,
    /// The `x-protocol` extension value, when present.
    pub x_protocol: Option<String>,
}

/// A parsed remote OpenRPC document.
#[derive(Clone, Debug)]
pub struct OpenRpcDocument {
    pub title: String,
    pub version: String,
    pub methods: Vec<ParsedMethod>,
}

impl OpenRpcDocument {
    /// Parses a remote OpenRPC document.
    ///
    /// Methods without a resolvable RPC URL (neither `method.servers[0].url`
    /// nor the document-level `servers[0].url`) are rejected.
    pub fn parse(value: &Value) -> Result<Self, OpenRpcError> {
        let obj = value.as_object().ok_or(OpenRpcError::NotAnObject)?;
        let info = obj.get("info").and_then(|v| v.as_object());
        let title = info
            .and_then(|i| i.get("title"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let version = info
            .and_then(|i| i.get("version"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let document_url = first_server_url(obj.get("servers"));
        let raw_methods = obj
            .get("methods")
            .and_then(|v| v.as_array())
            .ok_or(OpenRpcError::NoMethods)?;
        if raw_methods.is_empty() {
            return Err(OpenRpcError::NoMethods);
        }

        let mut methods = Vec::with_capacity(raw_methods.len());
        for raw in raw_methods {
            let m = raw
                .as_object()
                .ok_or_else(|| OpenRpcError::Invalid("method entry is not an object".into()))?;
            let name = m
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| OpenRpcError::Invalid("method entry has no name".into()))?
                .to_string();
            let rpc_url = first_server_url(m.get("servers"))
                .or_else(|| document_url.clone())
                .ok_or_else(|| OpenRpcError::NoServerUrl(name.clone()))?;

            methods.push(ParsedMethod {
                description: m
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                params_schema: normalize_params(m.get("params")),
                x_protocol: m
                    .get("x-protocol")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
                name,
                rpc_url,
            });
        }

        Ok(OpenRpcDocument {
            title,
            version,
            methods,
        })
    }
}

fn first_server_url(servers: Option<&Value>) -> Option<String> {
    servers?
        .as_array()?
        .first()?
        .get("url")?
        .as_str()
        .map(|s| s.to_string())
}

/// Normalizes a method's `params` to one object schema.
///
/// Accepts the ContentDescriptor array form and the single-object-schema
/// form; anything else yields an empty object schema.
fn normalize_params(params: Option<&Value>) -> Value {
    match params {
        Some(Value::Array(descriptors)) => {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for d in descriptors {
                let Some(name) = d.get("name").and_then(|v| v.as_str()) else {
                    continue;
                };
                let schema = d.get("schema").cloned().unwrap_or_else(|| json!({}));
                // ContentDescriptor.required defaults to false
                if d.get("required").and_then(|v| v.as_bool()).unwrap_or(false) {
                    required.push(json!(name));
                }
                properties.insert(name.to_string(), schema);
            }
            json!({
                "type": "object",
                "properties": properties,
                "required": required,
            })
        }
        Some(Value::Object(schema)) => {
            let mut schema = schema.clone();
            schema
                .entry("type".to_string())
                .or_insert_with(|| json!("object"));
            Value::Object(schema)
        }
        _ => json!({"type": "object", "properties": {}, "required": []}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::ParamDef;

    fn search_method() -> MethodDefinition {
        MethodDefinition::new("search", "Searches rooms.")
            .with_param(ParamDef::required("query", json!({"type": "string"})))
            .with_param(
                ParamDef::optional("limit", json!({"type": "integer"})).with_default(json!(10)),
            )
            .with_result(json!({"type": "object"}))
    }

    #[test]
    fn assemble_content_descriptor_form() {
        let doc = assemble_document(
            "Hotel Agent",
            "0.1.0",
            &[search_method()],
            "https://h.example/hotel/rpc",
        );
        assert_eq!(doc["openrpc"], OPENRPC_VERSION);
        assert_eq!(doc["info"]["title"], "Hotel Agent");
        assert_eq!(doc["servers"][0]["url"], "https://h.example/hotel/rpc");

        let m = &doc["methods"][0];
        assert_eq!(m["name"], "search");
        assert_eq!(m["params"][0]["name"], "query");
        assert_eq!(m["params"][0]["required"], true);
        assert_eq!(m["params"][1]["required"], false);
        assert_eq!(m["result"]["schema"]["type"], "object");
        assert!(m.get("x-protocol").is_none());
    }

    #[test]
    fn assemble_marks_ap2_methods() {
        let method = search_method().with_protocol(MethodProtocol::Ap2);
        let doc = assemble_document("Pay", "0.1.0", &[method], "https://h.example/rpc");
        assert_eq!(doc["methods"][0]["x-protocol"], AP2_PROTOCOL);
    }

    #[test]
    fn parse_roundtrips_assembled_document() {
        let doc = assemble_document(
            "Hotel Agent",
            "0.1.0",
            &[search_method()],
            "https://h.example/hotel/rpc",
        );
        let parsed = OpenRpcDocument::parse(&doc).unwrap();
        assert_eq!(parsed.title, "Hotel Agent");
        assert_eq!(parsed.methods.len(), 1);

        let m = &parsed.methods[0];
        assert_eq!(m.name, "search");
        assert_eq!(m.rpc_url, "https://h.example/hotel/rpc");
        assert_eq!(m.params_schema["properties"]["query"]["type"], "string");
        assert_eq!(m.params_schema["required"], json!(["query"]));
    }

    #[test]
    fn parse_accepts_single_object_schema_params() {
        let doc = json!({
            "openrpc": "1.3.2",
            "info": {"title": "T", "version": "1"},
            "servers": [{"name": "anp", "url": "https://a.example/rpc"}],
            "methods": [{
                "name": "echo",
                "params": {"properties": {"text": {"type": "string"}}, "required": ["text"]},
            }],
        });
        let parsed = OpenRpcDocument::parse(&doc).unwrap();
        let schema = &parsed.methods[0].params_schema;
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["text"]["type"], "string");
    }

    #[test]
    fn parse_prefers_method_level_server() {
        let doc = json!({
            "openrpc": "1.3.2",
            "info": {"title": "T", "version": "1"},
            "servers": [{"name": "anp", "url": "https://doc.example/rpc"}],
            "methods": [{
                "name": "echo",
                "params": [],
                "servers": [{"name": "anp", "url": "https://method.example/rpc"}],
            }],
        });
        let parsed = OpenRpcDocument::parse(&doc).unwrap();
        assert_eq!(parsed.methods[0].rpc_url, "https://method.example/rpc");
    }

    #[test]
    fn parse_rejects_methods_without_server() {
        let doc = json!({
            "openrpc": "1.3.2",
            "info": {"title": "T", "version": "1"},
            "methods": [{"name": "echo", "params": []}],
        });
        assert!(matches!(
            OpenRpcDocument::parse(&doc),
            Err(OpenRpcError::NoServerUrl(_))
        ));
    }
}
