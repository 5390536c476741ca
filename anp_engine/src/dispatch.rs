//! JSON-RPC 2.0 dispatch pipeline
//!
//! One request travels: parse → validate → method lookup → parameter binding
//! → context construction → invocation → error mapping. Responses always
//! echo the request id (including an explicit `null`) and are returned for
//! every request, notifications included; the transport layer wraps them in
//! HTTP 200 regardless of outcome.

use anp_core::rpc::code;
use anp_core::{MethodDefinition, MethodSet, ParamDef, RpcError, RpcRequest, RpcResponse};
use http::HeaderMap;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::context::Context;
use crate::session::SessionManager;

/// Runs one raw request body through the dispatch pipeline.
pub async fn handle_request(
    methods: &MethodSet<Context>,
    sessions: &SessionManager,
    caller: Option<&str>,
    headers: HeaderMap,
    body: &[u8],
) -> RpcResponse {
    // -32700: the body is not JSON at all
    let raw: Value = match serde_json::from_slice(body) {
        Ok(raw) => raw,
        Err(err) => {
            return RpcResponse::error(Value::Null, RpcError::parse_error(err.to_string()));
        }
    };
    // keep whatever id we can extract for error responses
    let id = raw.get("id").cloned().unwrap_or(Value::Null);

    // -32600: JSON, but not a JSON-RPC 2.0 request
    let request: RpcRequest = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(err) => {
            return RpcResponse::error(id, RpcError::invalid_request(err.to_string()));
        }
    };
    if let Err(err) = request.validate() {
        return RpcResponse::error(id, err);
    }

    let Some(definition) = methods.definition(&request.method) else {
        return RpcResponse::error(id, RpcError::method_not_found(&request.method));
    };

    let args = match bind_params(&definition, request.params.as_ref()) {
        Ok(args) => args,
        Err(err) => return RpcResponse::error(id, err),
    };

    let session = caller.map(|did| sessions.get(did));
    let request = Arc::new(request);
    let ctx = Context::new(
        caller.map(|did| did.to_string()),
        session,
        Arc::new(headers),
        request.clone(),
    );

    log::info!(
        method = request.method.as_str(),
        caller = caller.unwrap_or("anonymous");
        "dispatch",
    );

    match methods.call(&request.method, ctx, args).await {
        Ok(result) => RpcResponse::result(id, result),
        Err(err) => RpcResponse::error(id, map_handler_error(err)),
    }
}

/// Binds request params onto the declared parameter list.
///
/// Object params match by name; positional params by declaration order.
/// Missing required parameters are a −32602; declared defaults fill absent
/// optional ones. String values that look like structured JSON are re-parsed
/// best-effort when the declared schema wants an object or array.
pub fn bind_params(
    definition: &MethodDefinition,
    params: Option<&Value>,
) -> Result<Value, RpcError> {
    let mut bound = Map::new();
    match params {
        None => {}
        Some(Value::Object(named)) => {
            for param in &definition.params {
                if let Some(value) = named.get(&param.name) {
                    bound.insert(param.name.clone(), coerce_value(param, value));
                }
            }
        }
        Some(Value::Array(positional)) => {
            if positional.len() > definition.params.len() {
                return Err(RpcError::invalid_params(format!(
                    "method {} takes at most {} params, got {}",
                    definition.name,
                    definition.params.len(),
                    positional.len()
                )));
            }
            for (param, value) in definition.params.iter().zip(positional) {
                bound.insert(param.name.clone(), coerce_value(param, value));
            }
        }
        Some(other) => {
            return Err(RpcError::invalid_params(format!(
                "params must be an object or an array, got {other}"
            )));
        }
    }

    for param in &definition.params {
        if bound.contains_key(&param.name) {
            continue;
        }
        if let Some(default) = &param.default {
            bound.insert(param.name.clone(), default.clone());
        } else if param.required {
            return Err(RpcError::invalid_params(format!(
                "missing required param {}",
                param.name
            )));
        }
    }
    Ok(Value::Object(bound))
}

// Forgiving-client compatibility: a string that should be structured JSON is
// re-parsed when it parses as the expected shape.
fn coerce_value(param: &ParamDef, value: &Value) -> Value {
    if let Value::String(text) = value {
        let wants = param.schema.get("type").and_then(|t| t.as_str());
        if matches!(wants, Some("object") | Some("array")) {
            if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                if (wants == Some("object") && parsed.is_object())
                    || (wants == Some("array") && parsed.is_array())
                {
                    return parsed;
                }
            }
        }
    }
    value.clone()
}

/// Maps a handler failure onto the JSON-RPC error taxonomy.
fn map_handler_error(err: anp_core::BoxError) -> RpcError {
    let err = match err.downcast::<RpcError>() {
        // explicit RPC errors propagate code, message, and data unchanged
        Ok(rpc) => return *rpc,
        Err(err) => err,
    };
    if let Some(auth) = err.downcast_ref::<anp_did::AuthenticationError>() {
        return RpcError::authentication(auth.to_string());
    }
    let message = err.to_string();
    if message.contains("invalid args") {
        return RpcError::invalid_params(message);
    }
    RpcError::server_error(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anp_core::{BoxError, CallContext, Method};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct SearchArgs {
        query: String,
        #[serde(default)]
        limit: u32,
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
                .with_param(
                    ParamDef::optional("limit", json!({"type": "integer"})).with_default(json!(10)),
                )
                .with_context()
        }

        async fn call(&self, ctx: Context, args: Self::Args) -> Result<Self::Output, BoxError> {
            // remember the last query in the caller's session
            ctx.session_set("last_query", json!(args.query));
            Ok(json!({"query": args.query, "limit": args.limit}))
        }
    }

    struct FailingMethod;

    impl Method<Context> for FailingMethod {
        type Args = Value;
        type Output = Value;

        fn name(&self) -> String {
            "fail".to_string()
        }

        fn definition(&self) -> MethodDefinition {
            MethodDefinition::new("fail", "Always fails.")
        }

        async fn call(&self, _ctx: Context, _args: Self::Args) -> Result<Self::Output, BoxError> {
            Err(Box::new(RpcError::new(-32005, "teapot").with_data(json!({"hint": "kettle"}))))
        }
    }

    fn registry() -> MethodSet<Context> {
        let mut set = MethodSet::new();
        set.add(SearchMethod).unwrap();
        set.add(FailingMethod).unwrap();
        set
    }

    fn body(v: Value) -> Vec<u8> {
        serde_json::to_vec(&v).unwrap()
    }

    #[tokio::test]
    async fn happy_path_named_params() {
        let methods = registry();
        let sessions = SessionManager::new();
        let res = handle_request(
            &methods,
            &sessions,
            Some("did:wba:a.example"),
            HeaderMap::new(),
            &body(json!({"jsonrpc": "2.0", "id": 7, "method": "search",
                         "params": {"query": "Tokyo"}})),
        )
        .await;
        assert_eq!(res.id, json!(7));
        assert_eq!(res.result, Some(json!({"query": "Tokyo", "limit": 10})));

        // the session recorded the call for this DID only
        assert_eq!(
            sessions.get("did:wba:a.example").get("last_query"),
            Some(json!("Tokyo"))
        );
        assert_eq!(sessions.get("did:wba:b.example").get("last_query"), None);
    }

    #[tokio::test]
    async fn positional_params_bind_in_declared_order() {
        let methods = registry();
        let sessions = SessionManager::new();
        let res = handle_request(
            &methods,
            &sessions,
            None,
            HeaderMap::new(),
            &body(json!({"jsonrpc": "2.0", "id": 1, "method": "search",
                         "params": ["Osaka", 3]})),
        )
        .await;
        assert_eq!(res.result, Some(json!({"query": "Osaka", "limit": 3})));
    }

    #[tokio::test]
    async fn error_codes() {
        let methods = registry();
        let sessions = SessionManager::new();

        let res = handle_request(&methods, &sessions, None, HeaderMap::new(), b"{not json").await;
        assert_eq!(res.error.as_ref().unwrap().code, code::PARSE_ERROR);
        assert_eq!(res.id, Value::Null);

        let res = handle_request(
            &methods,
            &sessions,
            None,
            HeaderMap::new(),
            &body(json!({"jsonrpc": "1.0", "id": 2, "method": "search"})),
        )
        .await;
        assert_eq!(res.error.as_ref().unwrap().code, code::INVALID_REQUEST);
        assert_eq!(res.id, json!(2));

        let res = handle_request(
            &methods,
            &sessions,
            None,
            HeaderMap::new(),
            &body(json!({"jsonrpc": "2.0", "id": 3, "method": "nope"})),
        )
        .await;
        assert_eq!(res.error.as_ref().unwrap().code, code::METHOD_NOT_FOUND);

        let res = handle_request(
            &methods,
            &sessions,
            None,
            HeaderMap::new(),
            &body(json!({"jsonrpc": "2.0", "id": 4, "method": "search", "params": {}})),
        )
        .await;
        let err = res.error.unwrap();
        assert_eq!(err.code, code::INVALID_PARAMS);
        assert!(err.message.contains("query"));
    }

    #[tokio::test]
    async fn explicit_rpc_errors_propagate() {
        let methods = registry();
        let sessions = SessionManager::new();
        let res = handle_request(
            &methods,
            &sessions,
            None,
            HeaderMap::new(),
            &body(json!({"jsonrpc": "2.0", "id": null, "method": "fail"})),
        )
        .await;
        // an explicit null id is echoed back as null
        assert_eq!(res.id, Value::Null);
        let err = res.error.unwrap();
        assert_eq!(err.code, -32005);
        assert_eq!(err.message, "teapot");
        assert_eq!(err.data, Some(json!({"hint": "kettle"})));
    }

    #[test]
    fn binding_reparses_json_strings() {
        let definition = MethodDefinition::new("m", "")
            .with_param(ParamDef::required("filters", json!({"type": "object"})));
        let bound = bind_params(
            &definition,
            Some(&json!({"filters": "{\"city\": \"Tokyo\"}"})),
        )
        .unwrap();
        assert_eq!(bound["filters"], json!({"city": "Tokyo"}));

        // a plain string param stays a string
        let definition = MethodDefinition::new("m", "")
            .with_param(ParamDef::required("note", json!({"type": "string"})));
        let bound = bind_params(&definition, Some(&json!({"note": "{\"x\":1}"}))).unwrap();
        assert_eq!(bound["note"], json!("{\"x\":1}"));
    }

    #[test]
    fn binding_rejects_excess_positional_params() {
        let definition = MethodDefinition::new("m", "")
            .with_param(ParamDef::required("a", json!({"type": "string"})));
        let err = bind_params(&definition, Some(&json!(["x", "y"]))).unwrap_err();
        assert_eq!(err.code, code::INVALID_PARAMS);
    }
}
