//! Outbound HTTP client
//!
//! All client-side traffic (DID resolution aside, which the resolver owns)
//! goes through [`AnpClient`]: discovery fetches, interface fetches, and
//! JSON-RPC posts. Every request carries a deadline; network errors and 5xx
//! responses are retried with exponential backoff, 4xx never. When the
//! client holds an identity, a fresh `DIDWba` header is attached per attempt
//! so nonces are never reused.

use anp_did::{auth, DidIdentity};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Default per-request deadline.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);
/// Default number of attempts for retryable failures.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default initial backoff, doubled per retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

const USER_AGENT: &str = concat!("anp-sdk/", env!("CARGO_PKG_VERSION"));

/// Transport-level failure of an outbound call.
#[derive(Debug, thiserror::Error)]
#[error("request to {url} failed: {cause}")]
pub struct NetworkError {
    pub url: String,
    pub cause: String,
    /// Response status, when the failure was an HTTP error status.
    pub status_code: Option<u16>,
}

impl NetworkError {
    fn new(url: &str, cause: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            cause: cause.into(),
            status_code: None,
        }
    }
}

/// HTTP client for talking to other ANP peers.
#[derive(Clone)]
pub struct AnpClient {
    http: reqwest::Client,
    identity: Option<Arc<DidIdentity>>,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl AnpClient {
    /// Creates a client. With an identity, requests are authenticated via
    /// DID-WBA; without one they go out anonymous.
    pub fn new(identity: Option<Arc<DidIdentity>>) -> Self {
        Self::with_policy(identity, DEFAULT_DEADLINE, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_policy(
        identity: Option<Arc<DidIdentity>>,
        deadline: Duration,
        max_attempts: u32,
    ) -> Self {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(deadline)
            .timeout(deadline)
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            identity,
            max_attempts: max_attempts.max(1),
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }

    /// GETs a JSON document with auth and retry handling.
    pub async fn get_json(&self, url: &str) -> Result<Value, NetworkError> {
        self.execute(reqwest::Method::GET, url, None).await
    }

    /// POSTs a JSON body and returns the JSON response.
    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Value, NetworkError> {
        self.execute(reqwest::Method::POST, url, Some(body)).await
    }

    async fn execute(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, NetworkError> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.execute_once(method.clone(), url, body).await {
                Err(err) if retryable(&err) && attempt < self.max_attempts => {
                    log::warn!(
                        url = url,
                        attempt = attempt,
                        cause = err.cause.as_str();
                        "retrying request",
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                other => return other,
            }
        }
    }

    async fn execute_once(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, NetworkError> {
        let mut request = self.http.request(method, url);
        if let Some(identity) = &self.identity {
            // a fresh header per attempt, nonces are single-use
            let domain = service_domain(url)?;
            let header = auth::build_auth_header(identity, &domain)
                .map_err(|err| NetworkError::new(url, err.to_string()))?;
            request = request.header(reqwest::header::AUTHORIZATION, header);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| NetworkError::new(url, err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError {
                url: url.to_string(),
                cause: format!("status {status}"),
                status_code: Some(status.as_u16()),
            });
        }
        response
            .json()
            .await
            .map_err(|err| NetworkError::new(url, format!("invalid JSON response: {err}")))
    }
}

// Only transport failures and server-side errors are worth retrying.
fn retryable(err: &NetworkError) -> bool {
    match err.status_code {
        Some(status) => status >= 500,
        None => true,
    }
}

fn service_domain(url: &str) -> Result<String, NetworkError> {
    let parsed =
        url::Url::parse(url).map_err(|err| NetworkError::new(url, err.to_string()))?;
    parsed
        .host_str()
        .map(|h| h.to_string())
        .ok_or_else(|| NetworkError::new(url, "url has no host"))
}
