//! Method registry for the JSON-RPC dispatch core
//!
//! This module defines the traits and structures used to expose callable
//! methods from an ANP peer:
//! - The [`Method`] trait for defining methods with typed arguments and outputs
//! - Dynamic dispatch through the [`MethodDyn`] trait
//! - The [`MethodSet`] registry, assembled at startup and frozen afterwards
//!
//! A registered method carries a [`MethodDefinition`] describing its
//! parameters and result so the OpenRPC assembler and the agent-description
//! builder can publish it without touching the handler itself.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::{collections::BTreeMap, future::Future, marker::PhantomData, sync::Arc};

use crate::{BoxError, BoxPinFut};

/// Context visible to a method handler during one invocation.
///
/// The engine crate provides the concrete type; this trait keeps the registry
/// free of a dependency on it. Session access goes through the context so a
/// handler can only ever touch the session of the DID it was invoked by.
pub trait CallContext: Clone + Send + Sync + 'static {
    /// The authenticated DID of the caller, if the request was authenticated.
    fn caller(&self) -> Option<&str>;

    /// A request header value, looked up case-insensitively.
    fn header(&self, name: &str) -> Option<String>;

    /// Reads a value from the caller's session.
    fn session_get(&self, key: &str) -> Option<Value>;

    /// Writes a value into the caller's session.
    fn session_set(&self, key: &str, value: Value);

    /// Removes a value from the caller's session, returning it if present.
    fn session_delete(&self, key: &str) -> Option<Value>;
}

/// How a method is published in the agent description.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceMode {
    /// Listed in the shared `interface.json` document.
    #[default]
    Content,
    /// Published as its own `interface/<name>.json` document.
    Link,
}

/// The wire protocol family a method belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum MethodProtocol {
    /// A plain ANP JSON-RPC method.
    #[default]
    Anp,
    /// A payment-protocol method, marked `x-protocol: AP2/ANP` in OpenRPC.
    Ap2,
}

/// One declared parameter of a registered method.
///
/// The declaration order of a method's parameters is significant: positional
/// (array-form) JSON-RPC params bind in this order.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ParamDef {
    pub name: String,
    pub schema: Value,
    pub required: bool,
    /// Applied when an optional parameter is absent from the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamDef {
    /// A required parameter with the given JSON schema.
    pub fn required(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
            required: true,
            default: None,
        }
    }

    /// An optional parameter with the given JSON schema.
    pub fn optional(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
            required: false,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// The registry record describing one callable method.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MethodDefinition {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub protocol: MethodProtocol,
    /// Declared parameters, in positional-binding order. The context is never
    /// listed here and never appears in published schemas.
    pub params: Vec<ParamDef>,
    /// JSON schema of the result value.
    pub result: Value,
    #[serde(default)]
    pub mode: InterfaceMode,
    /// Whether the handler consumes the per-call context (caller, session,
    /// headers). Registration metadata; never published in schemas.
    #[serde(default)]
    pub needs_context: bool,
}

impl MethodDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            protocol: MethodProtocol::Anp,
            params: Vec::new(),
            result: json!({"type": "object"}),
            mode: InterfaceMode::Content,
            needs_context: false,
        }
    }

    pub fn with_param(mut self, param: ParamDef) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_result(mut self, schema: Value) -> Self {
        self.result = schema;
        self
    }

    pub fn with_mode(mut self, mode: InterfaceMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_protocol(mut self, protocol: MethodProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_context(mut self) -> Self {
        self.needs_context = true;
        self
    }
}

/// Validates a method name.
///
/// # Rules
/// - Must not be empty
/// - Length must be ≤ 64 characters
/// - Must consist of ASCII graphic characters (lookup is case-sensitive)
pub fn validate_method_name(name: &str) -> Result<(), BoxError> {
    if name.is_empty() {
        return Err("method name must not be empty".into());
    }
    if name.len() > 64 {
        return Err(format!("method name {name} exceeds 64 characters").into());
    }
    if !name.chars().all(|c| c.is_ascii_graphic()) {
        return Err(format!("method name {name} contains invalid characters").into());
    }
    Ok(())
}

/// Core trait for implementing methods callable over JSON-RPC.
///
/// # Type Parameters
/// - `C`: The context type that implements [`CallContext`]
pub trait Method<C>: Send + Sync
where
    C: CallContext,
{
    /// The arguments type of the method.
    type Args: DeserializeOwned + Send;
    /// The output type of the method.
    type Output: Serialize;

    /// Returns the method's name. Must be unique within a registry.
    fn name(&self) -> String;

    /// Provides the method's registry record including its parameter schemas.
    fn definition(&self) -> MethodDefinition;

    /// Executes the method with the given context and arguments.
    fn call(
        &self,
        ctx: C,
        args: Self::Args,
    ) -> impl Future<Output = Result<Self::Output, BoxError>> + Send;

    /// Executes the method from a bound JSON argument object, returning the
    /// output as a JSON value.
    fn call_value(
        &self,
        ctx: C,
        args: Value,
    ) -> impl Future<Output = Result<Value, BoxError>> + Send {
        async move {
            let args: Self::Args = serde_json::from_value(args)
                .map_err(|err| format!("method {}, invalid args: {}", self.name(), err))?;
            let output = self.call(ctx, args).await?;
            Ok(serde_json::to_value(&output)?)
        }
    }
}

/// Dynamic dispatch version of the [`Method`] trait.
pub trait MethodDyn<C>: Send + Sync
where
    C: CallContext,
{
    /// Returns the method's name as a String.
    fn name(&self) -> String;

    /// Provides the method's registry record.
    fn definition(&self) -> MethodDefinition;

    /// Executes the method with dynamic dispatch.
    fn call(&self, ctx: C, args: Value) -> BoxPinFut<Result<Value, BoxError>>;
}

/// Wrapper to convert a static Method implementation to dynamic dispatch.
struct MethodWrapper<M, C>(Arc<M>, PhantomData<C>)
where
    M: Method<C> + 'static,
    C: CallContext;

impl<M, C> MethodDyn<C> for MethodWrapper<M, C>
where
    M: Method<C> + 'static,
    C: CallContext,
{
    fn name(&self) -> String {
        self.0.name()
    }

    fn definition(&self) -> MethodDefinition {
        self.0.definition()
    }

    fn call(&self, ctx: C, args: Value) -> BoxPinFut<Result<Value, BoxError>> {
        let method = self.0.clone();
        Box::pin(async move { method.call_value(ctx, args).await })
    }
}

/// Collection of methods exposed by one ANP peer.
///
/// The registry is assembled during startup and frozen afterwards; lookup is
/// case-sensitive and duplicate registrations fail.
#[derive(Default)]
pub struct MethodSet<C: CallContext> {
    pub set: BTreeMap<String, Box<dyn MethodDyn<C>>>,
}

impl<C> MethodSet<C>
where
    C: CallContext,
{
    /// Creates a new empty MethodSet.
    pub fn new() -> Self {
        Self {
            set: BTreeMap::new(),
        }
    }

    /// Checks if a method with the given name exists in the set.
    pub fn contains(&self, name: &str) -> bool {
        self.set.contains_key(name)
    }

    /// Gets the definition of a specific method by name.
    pub fn definition(&self, name: &str) -> Option<MethodDefinition> {
        self.set.get(name).map(|m| m.definition())
    }

    /// Gets definitions for all methods, optionally filtered by publication mode.
    pub fn definitions(&self, mode: Option<InterfaceMode>) -> Vec<MethodDefinition> {
        self.set
            .values()
            .map(|m| m.definition())
            .filter(|d| mode.is_none_or(|m| d.mode == m))
            .collect()
    }

    /// Adds a new method to the set.
    /// Returns an error on an invalid name or a duplicate registration.
    pub fn add<M>(&mut self, method: M) -> Result<(), BoxError>
    where
        M: Method<C> + Send + Sync + 'static,
    {
        let name = method.name();
        validate_method_name(&name)?;
        if self.set.contains_key(&name) {
            return Err(format!("method {name} already exists").into());
        }

        let method_dyn = MethodWrapper(Arc::new(method), PhantomData);
        self.set.insert(name, Box::new(method_dyn));
        Ok(())
    }

    /// Calls a method by name with the given context and bound argument object.
    pub fn call(&self, name: &str, ctx: C, args: Value) -> BoxPinFut<Result<Value, BoxError>> {
        if let Some(method) = self.set.get(name) {
            method.call(ctx, args)
        } else {
            Box::pin(futures::future::ready(Err(format!(
                "method {name} not found"
            )
            .into())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // A tiny stand-in context so registry tests do not depend on the engine.
    #[derive(Clone, Default)]
    struct TestCtx {
        caller: Option<String>,
        store: Arc<Mutex<BTreeMap<String, Value>>>,
    }

    impl CallContext for TestCtx {
        fn caller(&self) -> Option<&str> {
            self.caller.as_deref()
        }

        fn header(&self, _name: &str) -> Option<String> {
            None
        }

        fn session_get(&self, key: &str) -> Option<Value> {
            self.store.lock().unwrap().get(key).cloned()
        }

        fn session_set(&self, key: &str, value: Value) {
            self.store.lock().unwrap().insert(key.to_string(), value);
        }

        fn session_delete(&self, key: &str) -> Option<Value> {
            self.store.lock().unwrap().remove(key)
        }
    }

    #[derive(Debug, Deserialize)]
    struct EchoArgs {
        text: String,
    }

    struct EchoMethod;

    impl Method<TestCtx> for EchoMethod {
        type Args = EchoArgs;
        type Output = String;

        fn name(&self) -> String {
            "echo".to_string()
        }

        fn definition(&self) -> MethodDefinition {
            MethodDefinition::new("echo", "Echoes the input text.")
                .with_param(ParamDef::required("text", json!({"type": "string"})))
                .with_result(json!({"type": "string"}))
        }

        async fn call(&self, _ctx: TestCtx, args: Self::Args) -> Result<Self::Output, BoxError> {
            Ok(args.text)
        }
    }

    #[tokio::test]
    async fn registry_add_and_call() {
        let mut set: MethodSet<TestCtx> = MethodSet::new();
        set.add(EchoMethod).unwrap();
        assert!(set.contains("echo"));
        assert!(set.add(EchoMethod).is_err());

        let out = set
            .call("echo", TestCtx::default(), json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(out, json!("hi"));

        let err = set
            .call("missing", TestCtx::default(), json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn name_validation() {
        assert!(validate_method_name("search").is_ok());
        assert!(validate_method_name("").is_err());
        assert!(validate_method_name("has space").is_err());
        assert!(validate_method_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn definitions_filter_by_mode() {
        let mut set: MethodSet<TestCtx> = MethodSet::new();
        set.add(EchoMethod).unwrap();

        assert_eq!(set.definitions(None).len(), 1);
        assert_eq!(set.definitions(Some(InterfaceMode::Content)).len(), 1);
        assert!(set.definitions(Some(InterfaceMode::Link)).is_empty());

        let def = set.definition("echo").unwrap();
        assert_eq!(def.params[0].name, "text");
        assert!(!def.needs_context);
    }
}
