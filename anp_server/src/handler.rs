//! HTTP handlers and the authentication middleware
//!
//! For a runtime mounted at prefix `P` the server exposes:
//! - `GET  P/ad.json`                — agent description, exempt from auth
//! - `GET  P/interface.json`         — shared OpenRPC document, exempt
//! - `GET  P/interface/<m>.json`     — per-method OpenRPC document, exempt
//! - `POST P/rpc`                    — JSON-RPC endpoint, authenticated
//! - `GET  P/tools`                  — OpenAI tool export, authenticated
//! - `GET  /health`                  — liveness, exempt
//!
//! Authentication accepts `DIDWba` headers (verified against the runtime's
//! resolver) and `Bearer` tokens minted by this instance. After a successful
//! DID-WBA verification the response carries a fresh bearer token so the
//! caller can skip the signature dance next time.

use anp_engine::Runtime;
use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use bytes::Bytes;
use serde_json::{json, Value};

use anp_core::{RpcError, RpcResponse};

#[derive(Clone)]
pub struct AppState {
    pub runtime: Runtime,
    pub start_time_ms: u64,
}

impl AppState {
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            start_time_ms: structured_logger::unix_ms(),
        }
    }
}

/// The authenticated caller DID for this request, `None` on exempt paths and
/// anonymous requests that were let through.
#[derive(Clone, Debug)]
pub struct Caller(pub Option<String>);

fn is_exempt(path: &str) -> bool {
    path == "/health"
        || path.ends_with("/ad.json")
        || path.ends_with("/interface.json")
        || path.contains("/interface/")
        || path.ends_with("/error")
}

fn host_domain(request: &Request) -> String {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|host| host.split(':').next().unwrap_or(host).to_string())
        .unwrap_or_default()
}

// RPC callers get their auth failures as JSON-RPC bodies over HTTP 200;
// everything else gets a plain 401.
fn unauthorized(path: &str, detail: String) -> Response {
    if path.ends_with("/rpc") {
        let body = RpcResponse::error(Value::Null, RpcError::authentication(detail));
        (StatusCode::OK, Json(body)).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, detail).into_response()
    }
}

/// Middleware enforcing the authorization policy on non-exempt paths.
pub async fn authenticate(
    State(app): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if is_exempt(&path) {
        request.extensions_mut().insert(Caller(None));
        return next.run(request).await;
    }

    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let Some(authorization) = authorization else {
        return unauthorized(&path, "missing Authorization header".to_string());
    };

    if let Some(token) = authorization.strip_prefix("Bearer ") {
        let status = app.runtime.tokens().verify(token);
        if !status.valid {
            return unauthorized(
                &path,
                status.error.unwrap_or_else(|| "invalid token".to_string()),
            );
        }
        request.extensions_mut().insert(Caller(status.did));
        return next.run(request).await;
    }

    let domain = host_domain(&request);
    match app.runtime.verifier().verify(&authorization, &domain).await {
        Ok(caller) => {
            log::info!(did = caller.did.as_str(), path = path.as_str(); "authenticated");
            let did = caller.did.clone();
            request.extensions_mut().insert(Caller(Some(caller.did)));
            let mut response = next.run(request).await;
            // hand out a bearer token so the caller can skip the handshake
            let token = app.runtime.tokens().generate(&did);
            if let Ok(value) = format!("Bearer {token}").parse() {
                response.headers_mut().insert(header::AUTHORIZATION, value);
            }
            response
        }
        Err(err) => {
            log::warn!(path = path.as_str(), reason = err.reason; "authentication rejected");
            unauthorized(&path, err.to_string())
        }
    }
}

/// GET {prefix}/ad.json
pub async fn get_agent_description(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.runtime.agent_description())
}

/// GET {prefix}/interface.json
pub async fn get_interface(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.runtime.interface_document())
}

/// GET {prefix}/interface/{method}.json
pub async fn get_method_interface(
    State(app): State<AppState>,
    Path(file): Path<String>,
) -> Response {
    let name = file.strip_suffix(".json").unwrap_or(&file);
    match app.runtime.method_interface_document(name) {
        Some(document) => Json(document).into_response(),
        None => (StatusCode::NOT_FOUND, format!("no interface for {name}")).into_response(),
    }
}

/// POST {prefix}/rpc — always HTTP 200, the JSON-RPC body carries the outcome.
pub async fn post_rpc(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let body: Bytes = match axum::body::to_bytes(body, 1024 * 1024).await {
        Ok(body) => body,
        Err(err) => {
            let response = RpcResponse::error(
                Value::Null,
                RpcError::invalid_request(format!("cannot read request body: {err}")),
            );
            return (StatusCode::OK, Json(response)).into_response();
        }
    };
    let response = app
        .runtime
        .handle_rpc(caller.0.as_deref(), parts.headers, &body)
        .await;
    (StatusCode::OK, Json(response)).into_response()
}

/// GET {prefix}/tools
pub async fn get_tools(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.runtime.open_ai_tools())
}

/// GET /health
pub async fn get_health(State(app): State<AppState>) -> impl IntoResponse {
    Json(json!({"status": "ok", "start_time_ms": app.start_time_ms}))
}
