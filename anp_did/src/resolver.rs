//! DID document resolution
//!
//! [`HttpResolver`] fetches `did.json` from the location encoded in the
//! identifier, validates that the document's `id` matches, and keeps verified
//! documents in an in-memory TTL cache. The [`ResolveDid`] trait is the seam
//! the authentication engine depends on, so servers and tests can substitute
//! an in-memory [`LocalResolver`].

use async_trait::async_trait;
use moka::future::Cache;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::document::{did_to_url, DidDocument};

/// Default time-to-live for cached DID documents.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

const USER_AGENT: &str = concat!("anp-sdk/", env!("CARGO_PKG_VERSION"));

/// Failure to fetch, parse, or validate a DID document.
#[derive(Debug, thiserror::Error)]
#[error("failed to resolve {did}: {cause}")]
pub struct DidResolutionError {
    pub did: String,
    pub cause: String,
    /// HTTP status of the failed fetch, when one was received.
    pub status: Option<u16>,
}

impl DidResolutionError {
    pub fn new(did: &str, cause: impl Into<String>) -> Self {
        Self {
            did: did.to_string(),
            cause: cause.into(),
            status: None,
        }
    }
}

/// Resolves did:wba identifiers to their DID documents.
#[async_trait]
pub trait ResolveDid: Send + Sync {
    async fn resolve(&self, did: &str) -> Result<Arc<DidDocument>, DidResolutionError>;
}

/// HTTPS resolver with an in-memory TTL cache.
#[derive(Clone)]
pub struct HttpResolver {
    http: reqwest::Client,
    cache: Cache<String, Arc<DidDocument>>,
}

impl HttpResolver {
    /// Creates a resolver caching documents for [`DEFAULT_CACHE_TTL`].
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }

    /// Creates a resolver with a custom cache TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            cache: Cache::builder()
                .max_capacity(4096)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Fetches the document, bypassing and refreshing the cache.
    pub async fn resolve_fresh(
        &self,
        did: &str,
    ) -> Result<Arc<DidDocument>, DidResolutionError> {
        let document = self.fetch(did).await?;
        self.cache.insert(did.to_string(), document.clone()).await;
        Ok(document)
    }

    async fn fetch(&self, did: &str) -> Result<Arc<DidDocument>, DidResolutionError> {
        let url = did_to_url(did).map_err(|err| DidResolutionError::new(did, err.to_string()))?;
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| DidResolutionError::new(did, err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DidResolutionError {
                did: did.to_string(),
                cause: format!("{url} returned status {status}"),
                status: Some(status.as_u16()),
            });
        }

        let document: DidDocument = response
            .json()
            .await
            .map_err(|err| DidResolutionError::new(did, format!("invalid document: {err}")))?;
        if document.id != did {
            return Err(DidResolutionError::new(
                did,
                format!("document id {:?} does not match", document.id),
            ));
        }
        log::debug!(did = did, url = url.as_str(); "resolved DID document");
        Ok(Arc::new(document))
    }
}

impl Default for HttpResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResolveDid for HttpResolver {
    async fn resolve(&self, did: &str) -> Result<Arc<DidDocument>, DidResolutionError> {
        if let Some(document) = self.cache.get(did).await {
            return Ok(document);
        }
        self.resolve_fresh(did).await
    }
}

/// In-memory resolver for tests, local setups, and the CLI validator.
#[derive(Default)]
pub struct LocalResolver {
    documents: RwLock<BTreeMap<String, Arc<DidDocument>>>,
}

impl LocalResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document: DidDocument) {
        self.documents
            .write()
            .insert(document.id.clone(), Arc::new(document));
    }
}

#[async_trait]
impl ResolveDid for LocalResolver {
    async fn resolve(&self, did: &str) -> Result<Arc<DidDocument>, DidResolutionError> {
        self.documents
            .read()
            .get(did)
            .cloned()
            .ok_or_else(|| DidResolutionError::new(did, "document not found"))
    }
}
