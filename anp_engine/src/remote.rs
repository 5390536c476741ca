//! Discovery and the remote-agent proxy
//!
//! [`discover`] fetches a peer's `ad.json`, follows every callable interface
//! it advertises, and freezes the result into a [`RemoteAgent`] snapshot.
//! Calls go through [`RemoteAgent::call`] by method name; there is no
//! attribute magic, the snapshot's method table is the source of truth.

use anp_core::{AgentDescription, OpenRpcDocument, RpcError, RpcRequest, RpcResponse};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::http::{AnpClient, NetworkError};

/// Possible errors during discovery and proxied calls.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("invalid agent description: {0}")]
    Description(#[from] anp_core::description::DescriptionError),

    #[error("invalid interface document: {0}")]
    Interface(#[from] anp_core::openrpc::OpenRpcError),

    #[error("agent at {0} advertises no callable methods")]
    NoMethods(String),

    #[error("remote method {0} not found in snapshot")]
    MethodNotFound(String),

    #[error("remote call failed")]
    Rpc(#[source] RpcError),

    #[error("malformed RPC response: {0}")]
    Protocol(String),
}

/// One callable method of a discovered peer.
#[derive(Clone, Debug)]
pub struct RemoteMethod {
    pub name: String,
    pub description: String,
    /// Normalized object schema of the parameters, as published.
    pub params_schema: Value,
    pub rpc_url: String,
    pub x_protocol: Option<String>,
}

/// An immutable snapshot of a discovered peer.
pub struct RemoteAgent {
    pub url: String,
    pub name: String,
    pub description: String,
    methods: BTreeMap<String, RemoteMethod>,
    client: AnpClient,
}

impl std::fmt::Debug for RemoteAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAgent")
            .field("url", &self.url)
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .finish_non_exhaustive()
    }
}

/// Discovers a peer from its agent-description URL.
///
/// Fetches the description, then every linked callable interface, and
/// aggregates the methods. Zero discovered methods is an error.
pub async fn discover(client: AnpClient, ad_url: &str) -> Result<RemoteAgent, DiscoveryError> {
    let raw = client.get_json(ad_url).await?;
    let (description, interfaces) = AgentDescription::parse(&raw)?;

    let mut methods = BTreeMap::new();
    let mut fetched = BTreeSet::new();
    for interface in interfaces {
        // the same interface document may be advertised more than once
        if !fetched.insert(interface.url.clone()) {
            continue;
        }
        let raw = client.get_json(&interface.url).await?;
        let document = OpenRpcDocument::parse(&raw)?;
        for method in document.methods {
            methods.insert(
                method.name.clone(),
                RemoteMethod {
                    name: method.name,
                    description: method.description,
                    params_schema: method.params_schema,
                    rpc_url: method.rpc_url,
                    x_protocol: method.x_protocol,
                },
            );
        }
    }
    if methods.is_empty() {
        return Err(DiscoveryError::NoMethods(ad_url.to_string()));
    }

    log::info!(
        url = ad_url,
        name = description.name.as_str(),
        methods = methods.len();
        "discovered agent",
    );
    Ok(RemoteAgent {
        url: ad_url.to_string(),
        name: description.name,
        description: description.description,
        methods,
        client,
    })
}

impl RemoteAgent {
    /// The discovered method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        self.methods.keys().map(|k| k.as_str()).collect()
    }

    pub fn method(&self, name: &str) -> Option<&RemoteMethod> {
        self.methods.get(name)
    }

    /// Invokes a remote method with named params and returns its result.
    ///
    /// A JSON-RPC error body surfaces as [`DiscoveryError::Rpc`] carrying the
    /// structured code, message, and data.
    pub async fn call(&self, name: &str, params: Value) -> Result<Value, DiscoveryError> {
        let method = self
            .methods
            .get(name)
            .ok_or_else(|| DiscoveryError::MethodNotFound(name.to_string()))?;

        let request = RpcRequest::new(json!(uuid::Uuid::new_v4().to_string()), name, Some(params));
        let body = serde_json::to_value(&request)
            .map_err(|err| DiscoveryError::Protocol(err.to_string()))?;
        let raw = self.client.post_json(&method.rpc_url, &body).await?;
        let response: RpcResponse = serde_json::from_value(raw)
            .map_err(|err| DiscoveryError::Protocol(err.to_string()))?;

        if let Some(error) = response.error {
            return Err(DiscoveryError::Rpc(error));
        }
        response
            .result
            .ok_or_else(|| DiscoveryError::Protocol("response has neither result nor error".into()))
    }

    /// Exports every discovered method in the OpenAI tool shape, schemas
    /// passed through unmodified.
    pub fn open_ai_tools(&self) -> Vec<Value> {
        self.methods
            .values()
            .map(|m| {
                json!({
                    "type": "function",
                    "function": {
                        "name": m.name,
                        "description": m.description,
                        "parameters": m.params_schema,
                    }
                })
            })
            .collect()
    }
}

/// Traverses a paginated discovery collection exhaustively, following `next`
/// links and aggregating every page's `items`.
pub async fn fetch_collection(
    client: &AnpClient,
    url: &str,
) -> Result<Vec<Value>, DiscoveryError> {
    let mut items = Vec::new();
    let mut visited = BTreeSet::new();
    let mut next = Some(url.to_string());
    while let Some(page_url) = next {
        // a repeated link would loop forever
        if !visited.insert(page_url.clone()) {
            break;
        }
        let page = client.get_json(&page_url).await?;
        if let Some(page_items) = page.get("items").and_then(|v| v.as_array()) {
            items.extend(page_items.iter().cloned());
        }
        next = page
            .get("next")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> RemoteAgent {
        let mut methods = BTreeMap::new();
        methods.insert(
            "search".to_string(),
            RemoteMethod {
                name: "search".to_string(),
                description: "Searches rooms.".to_string(),
                params_schema: json!({
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"],
                }),
                rpc_url: "https://h.example/hotel/rpc".to_string(),
                x_protocol: None,
            },
        );
        RemoteAgent {
            url: "https://h.example/hotel/ad.json".to_string(),
            name: "Hotel Agent".to_string(),
            description: "Books rooms.".to_string(),
            methods,
            client: AnpClient::new(None),
        }
    }

    #[test]
    fn snapshot_is_a_method_table() {
        let agent = snapshot();
        assert_eq!(agent.method_names(), vec!["search"]);
        assert_eq!(
            agent.method("search").unwrap().rpc_url,
            "https://h.example/hotel/rpc"
        );
        assert!(agent.method("book").is_none());
    }

    #[test]
    fn tool_export_passes_schemas_through() {
        let agent = snapshot();
        let tools = agent.open_ai_tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "search");
        assert_eq!(
            tools[0]["function"]["parameters"],
            agent.method("search").unwrap().params_schema
        );
    }

    #[tokio::test]
    async fn call_rejects_unknown_methods_locally() {
        let agent = snapshot();
        let err = agent.call("book", json!({})).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::MethodNotFound(_)));
    }
}
