//! The runtime handle
//!
//! # Overview
//! [`Runtime`] is the owning handle for everything one peer shares across
//! requests: the frozen method registry, the session manager, the DID-WBA
//! verifier with its nonce store, the token issuer, and the peer's published
//! documents. Collaborators receive the handle explicitly; there are no
//! process globals.
//!
//! # Usage
//! ```rust,ignore
//! let runtime = Runtime::builder()
//!     .with_info(info)
//!     .with_base_url("https://h.example".to_string())
//!     .register_method(SearchMethod)?
//!     .build()?;
//! ```

use anp_core::{
    description::PeerInfo, openrpc, AgentDescription, BoxError, InformationEntry, InterfaceMode,
    Method, MethodDefinition, MethodSet, RpcResponse,
};
use anp_did::{AuthVerifier, DidIdentity, HttpResolver, ResolveDid, TokenIssuer};
use http::HeaderMap;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::dispatch;
use crate::session::SessionManager;

/// The shared peer runtime. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}

struct Inner {
    info: PeerInfo,
    base_url: String,
    methods: MethodSet<Context>,
    informations: Vec<InformationEntry>,
    sessions: SessionManager,
    verifier: AuthVerifier,
    tokens: TokenIssuer,
    identity: Option<Arc<DidIdentity>>,
    cancellation_token: CancellationToken,
}

impl Runtime {
    /// Creates a new RuntimeBuilder instance for constructing a Runtime.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn info(&self) -> &PeerInfo {
        &self.inner.info
    }

    /// The local identity, when the runtime was built with one.
    pub fn identity(&self) -> Option<&Arc<DidIdentity>> {
        self.inner.identity.as_ref()
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    pub fn verifier(&self) -> &AuthVerifier {
        &self.inner.verifier
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.inner.tokens
    }

    /// Creates and returns a child cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancellation_token.child_token()
    }

    /// Cancels all tasks tied to this runtime.
    pub fn cancel(&self) {
        self.inner.cancellation_token.cancel()
    }

    /// The RPC endpoint URL advertised in interface documents.
    pub fn rpc_url(&self) -> String {
        format!(
            "{}{}/rpc",
            self.inner.base_url.trim_end_matches('/'),
            self.inner.info.prefix
        )
    }

    /// The published agent description (`ad.json`).
    pub fn agent_description(&self) -> AgentDescription {
        AgentDescription::build(
            &self.inner.info,
            &self.inner.base_url,
            &self.inner.methods.definitions(None),
            &self.inner.informations,
        )
    }

    /// The shared OpenRPC document listing every content-mode method.
    pub fn interface_document(&self) -> Value {
        openrpc::assemble_document(
            &self.inner.info.name,
            &self.inner.info.version,
            &self.inner.methods.definitions(Some(InterfaceMode::Content)),
            &self.rpc_url(),
        )
    }

    /// The single-method OpenRPC document for a link-mode method.
    pub fn method_interface_document(&self, name: &str) -> Option<Value> {
        let definition = self.inner.methods.definition(name)?;
        if definition.mode != InterfaceMode::Link {
            return None;
        }
        Some(openrpc::assemble_document(
            &self.inner.info.name,
            &self.inner.info.version,
            std::slice::from_ref(&definition),
            &self.rpc_url(),
        ))
    }

    /// Every registered method in the OpenAI tool shape.
    pub fn open_ai_tools(&self) -> Vec<Value> {
        self.inner
            .methods
            .definitions(None)
            .iter()
            .map(|d| {
                json!({
                    "type": "function",
                    "function": {
                        "name": d.name,
                        "description": d.description,
                        "parameters": params_object_schema(d),
                    }
                })
            })
            .collect()
    }

    /// Dispatches one raw JSON-RPC request body.
    pub async fn handle_rpc(
        &self,
        caller: Option<&str>,
        headers: HeaderMap,
        body: &[u8],
    ) -> RpcResponse {
        dispatch::handle_request(&self.inner.methods, &self.inner.sessions, caller, headers, body)
            .await
    }
}

/// Collapses a definition's parameter list into one object schema.
pub(crate) fn params_object_schema(definition: &MethodDefinition) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in &definition.params {
        properties.insert(param.name.clone(), param.schema.clone());
        if param.required {
            required.push(json!(param.name));
        }
    }
    json!({"type": "object", "properties": properties, "required": required})
}

/// Builder pattern implementation for constructing a Runtime.
pub struct RuntimeBuilder {
    info: PeerInfo,
    base_url: String,
    methods: MethodSet<Context>,
    informations: Vec<InformationEntry>,
    resolver: Option<Arc<dyn ResolveDid>>,
    identity: Option<Arc<DidIdentity>>,
    cancellation_token: CancellationToken,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Creates a new RuntimeBuilder with default values.
    pub fn new() -> Self {
        RuntimeBuilder {
            info: PeerInfo {
                name: "ANP Agent".to_string(),
                did: String::new(),
                description: "An ANP peer".to_string(),
                prefix: "/agent".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            base_url: "http://127.0.0.1:8800".to_string(),
            methods: MethodSet::new(),
            informations: Vec::new(),
            resolver: None,
            identity: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Sets the peer information published in ad.json.
    pub fn with_info(mut self, info: PeerInfo) -> Self {
        self.info = info;
        self
    }

    /// Sets the public base URL the documents are served under.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Sets the DID resolver backing inbound authentication.
    pub fn with_resolver(mut self, resolver: Arc<dyn ResolveDid>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Sets the local identity. Its DID overrides `info.did` when set.
    pub fn with_identity(mut self, identity: Arc<DidIdentity>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Sets the cancellation token.
    pub fn with_cancellation_token(mut self, cancellation_token: CancellationToken) -> Self {
        self.cancellation_token = cancellation_token;
        self
    }

    /// Registers a single method with the runtime.
    /// Returns an error on a duplicate name.
    pub fn register_method<M>(mut self, method: M) -> Result<Self, BoxError>
    where
        M: Method<Context> + Send + Sync + 'static,
    {
        self.methods.add(method)?;
        Ok(self)
    }

    /// Adds an information record to the agent description.
    pub fn register_information(mut self, information: InformationEntry) -> Self {
        self.informations.push(information);
        self
    }

    /// Finalizes the builder and freezes the method registry.
    pub fn build(mut self) -> Result<Runtime, BoxError> {
        if let Some(identity) = &self.identity {
            self.info.did = identity.did.clone();
        }
        if self.info.did.is_empty() {
            return Err("runtime needs a DID: set info.did or provide an identity".into());
        }
        if !self.info.prefix.starts_with('/') {
            self.info.prefix = format!("/{}", self.info.prefix);
        }

        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(HttpResolver::new()));
        Ok(Runtime {
            inner: Arc::new(Inner {
                info: self.info,
                base_url: self.base_url,
                methods: self.methods,
                informations: self.informations,
                sessions: SessionManager::new(),
                verifier: AuthVerifier::new(resolver),
                tokens: TokenIssuer::new(),
                identity: self.identity,
                cancellation_token: self.cancellation_token,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anp_core::{CallContext, ParamDef};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct SearchArgs {
        query: String,
    }

    struct SearchMethod;

    impl Method<Context> for SearchMethod {
        type Args = SearchArgs;
        type Output = Value;

        fn name(&self) -> String {
            "search".to_string()
        }

        fn definition(&self) -> MethodDefinition {
            MethodDefinition::new("search", "Searches rooms.")
                .with_param(ParamDef::required("query", json!({"type": "string"})))
                .with_result(json!({"type": "object"}))
                .with_context()
        }

        async fn call(&self, _ctx: Context, args: Self::Args) -> Result<Self::Output, BoxError> {
            Ok(json!({"found": [args.query]}))
        }
    }

    struct BookMethod;

    impl Method<Context> for BookMethod {
        type Args = Value;
        type Output = Value;

        fn name(&self) -> String {
            "book".to_string()
        }

        fn definition(&self) -> MethodDefinition {
            MethodDefinition::new("book", "Books a room.").with_mode(InterfaceMode::Link)
        }

        async fn call(&self, ctx: Context, _args: Self::Args) -> Result<Self::Output, BoxError> {
            Ok(json!({"caller": ctx.caller()}))
        }
    }

    fn runtime() -> Runtime {
        Runtime::builder()
            .with_info(PeerInfo {
                name: "Hotel Agent".to_string(),
                did: "did:wba:h.example:hotel".to_string(),
                description: "Books rooms.".to_string(),
                prefix: "/hotel".to_string(),
                version: "0.1.0".to_string(),
            })
            .with_base_url("https://h.example".to_string())
            .register_method(SearchMethod)
            .unwrap()
            .register_method(BookMethod)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn documents_reflect_the_registry() {
        let runtime = runtime();
        let description = runtime.agent_description();
        assert_eq!(description.did, "did:wba:h.example:hotel");
        assert_eq!(description.interfaces.len(), 2);

        let interface = runtime.interface_document();
        let listed: Vec<&str> = interface["methods"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["name"].as_str().unwrap())
            .collect();
        // exactly the content-mode methods
        assert_eq!(listed, vec!["search"]);
        assert_eq!(interface["servers"][0]["url"], "https://h.example/hotel/rpc");

        // link-mode methods get their own document, content-mode ones do not
        let book = runtime.method_interface_document("book").unwrap();
        assert_eq!(book["methods"][0]["name"], "book");
        assert!(runtime.method_interface_document("search").is_none());
        assert!(runtime.method_interface_document("missing").is_none());
    }

    #[test]
    fn tools_export_the_full_registry() {
        let runtime = runtime();
        let tools = runtime.open_ai_tools();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[1]["type"], "function");
        assert_eq!(tools[1]["function"]["name"], "search");
        assert_eq!(
            tools[1]["function"]["parameters"]["required"],
            json!(["query"])
        );
    }

    #[tokio::test]
    async fn handle_rpc_end_to_end() {
        let runtime = runtime();
        let body = serde_json::to_vec(&json!({
            "jsonrpc": "2.0", "id": 1, "method": "search", "params": {"query": "Tokyo"},
        }))
        .unwrap();
        let res = runtime
            .handle_rpc(Some("did:wba:caller.example"), HeaderMap::new(), &body)
            .await;
        assert_eq!(res.result, Some(json!({"found": ["Tokyo"]})));
    }

    #[test]
    fn build_requires_a_did() {
        let err = Runtime::builder().build().unwrap_err();
        assert!(err.to_string().contains("DID"));
    }
}
