//! Per-invocation call context
//!
//! A [`Context`] is created by the dispatcher for one JSON-RPC call and
//! discarded with it. It carries the verified caller DID, a borrowed
//! reference to that DID's session, the request headers, and the raw request.

use anp_core::{CallContext, RpcRequest};
use http::HeaderMap;
use serde_json::Value;
use std::sync::Arc;

use crate::session::Session;

/// The context handed to method handlers.
#[derive(Clone)]
pub struct Context {
    caller: Option<String>,
    session: Option<Arc<Session>>,
    headers: Arc<HeaderMap>,
    request: Arc<RpcRequest>,
}

impl Context {
    pub(crate) fn new(
        caller: Option<String>,
        session: Option<Arc<Session>>,
        headers: Arc<HeaderMap>,
        request: Arc<RpcRequest>,
    ) -> Self {
        Self {
            caller,
            session,
            headers,
            request,
        }
    }

    /// The raw JSON-RPC request this context belongs to.
    pub fn request(&self) -> &RpcRequest {
        &self.request
    }

    /// The session of the authenticated caller, when one exists.
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }
}

impl CallContext for Context {
    fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    }

    fn session_get(&self, key: &str) -> Option<Value> {
        self.session.as_ref()?.get(key)
    }

    fn session_set(&self, key: &str, value: Value) {
        if let Some(session) = &self.session {
            session.set(key, value);
        }
    }

    fn session_delete(&self, key: &str) -> Option<Value> {
        self.session.as_ref()?.delete(key)
    }
}
