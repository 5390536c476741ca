//! DID-WBA authorization headers
//!
//! The caller side builds an `Authorization: DIDWba …` header by signing a
//! canonical payload `{did, nonce, timestamp, <domain>}` with one of its
//! authentication keys; the callee side re-derives the payload, enforces the
//! timestamp window and single-use nonces, resolves the caller's DID
//! document, and verifies the signature against the published key.
//!
//! The name of the domain field is version-dependent: `service` at v1.0 and
//! `aud` from v1.1 on. A header only verifies when both sides agree on it.

use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parking_lot::Mutex;
use rand::RngCore;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::crypto;
use crate::document::DidIdentity;
use crate::jcs;
use crate::resolver::ResolveDid;

/// The authorization scheme name.
pub const SCHEME: &str = "DIDWba";
/// Header version emitted by default.
pub const DEFAULT_VERSION: &str = "1.0";
/// Default nonce length in bytes (hex-encoded on the wire).
pub const DEFAULT_NONCE_LEN: usize = 32;
/// Default acceptance window for timestamps, and the nonce replay window.
pub const DEFAULT_MAX_AGE_SECS: i64 = 300;

/// Authentication failure: a single kind with a distinct textual reason.
#[derive(Debug, thiserror::Error)]
#[error("authentication failed ({reason}): {detail}")]
pub struct AuthenticationError {
    pub reason: &'static str,
    pub detail: String,
}

impl AuthenticationError {
    fn new(reason: &'static str, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// Selects the canonical-payload domain field for a header version.
/// `service` at v1.0 and below, `aud` from v1.1 on.
pub fn domain_field(version: &str) -> &'static str {
    let mut parts = version.trim().split('.');
    let major: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(1);
    let minor: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    if (major, minor) <= (1, 0) {
        "service"
    } else {
        "aud"
    }
}

/// A parsed `DIDWba` authorization header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DidWbaHeader {
    pub version: String,
    pub did: String,
    pub nonce: String,
    pub timestamp: String,
    pub verification_method: String,
    pub signature: String,
}

impl DidWbaHeader {
    /// Parses a header value. Field order is free and keys are matched
    /// case-insensitively; all of `did`, `nonce`, `timestamp`,
    /// `verification_method`, and `signature` are required, `v` defaults
    /// to `1.0`.
    pub fn parse(header: &str) -> Result<Self, AuthenticationError> {
        let header = header.trim();
        let (scheme, rest) = header
            .split_once(char::is_whitespace)
            .ok_or_else(|| AuthenticationError::new("malformed", "missing header fields"))?;
        if !scheme.eq_ignore_ascii_case(SCHEME) {
            return Err(AuthenticationError::new(
                "malformed",
                format!("unexpected scheme {scheme:?}"),
            ));
        }

        let mut fields: HashMap<String, String> = HashMap::new();
        for part in rest.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            fields.insert(
                key.trim().to_ascii_lowercase(),
                value.trim().trim_matches('"').to_string(),
            );
        }

        let version = fields
            .remove("v")
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());
        let mut take = |key: &'static str| {
            fields
                .remove(key)
                .ok_or_else(|| AuthenticationError::new("missing field", key))
        };
        Ok(DidWbaHeader {
            version,
            did: take("did")?,
            nonce: take("nonce")?,
            timestamp: take("timestamp")?,
            verification_method: take("verification_method")?,
            signature: take("signature")?,
        })
    }
}

impl std::fmt::Display for DidWbaHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{SCHEME} v=\"{}\", did=\"{}\", nonce=\"{}\", timestamp=\"{}\", \
             verification_method=\"{}\", signature=\"{}\"",
            self.version,
            self.did,
            self.nonce,
            self.timestamp,
            self.verification_method,
            self.signature
        )
    }
}

fn signing_payload(
    did: &str,
    nonce: &str,
    timestamp: &str,
    version: &str,
    service_domain: &str,
) -> Value {
    let mut payload = Map::new();
    payload.insert("did".to_string(), Value::String(did.to_string()));
    payload.insert("nonce".to_string(), Value::String(nonce.to_string()));
    payload.insert("timestamp".to_string(), Value::String(timestamp.to_string()));
    payload.insert(
        domain_field(version).to_string(),
        Value::String(service_domain.to_string()),
    );
    Value::Object(payload)
}

/// Builds an authorization header for `service_domain` at the default
/// version, signing with the identity's first authentication key.
pub fn build_auth_header(
    identity: &DidIdentity,
    service_domain: &str,
) -> Result<String, AuthenticationError> {
    build_auth_header_versioned(identity, service_domain, DEFAULT_VERSION, DEFAULT_NONCE_LEN)
}

/// Builds an authorization header with an explicit version and nonce length.
pub fn build_auth_header_versioned(
    identity: &DidIdentity,
    service_domain: &str,
    version: &str,
    nonce_len: usize,
) -> Result<String, AuthenticationError> {
    build_header_at(identity, service_domain, version, nonce_len, Utc::now())
}

fn build_header_at(
    identity: &DidIdentity,
    service_domain: &str,
    version: &str,
    nonce_len: usize,
    now: DateTime<Utc>,
) -> Result<String, AuthenticationError> {
    let (_, fragment) = identity
        .document
        .select_authentication_method()
        .map_err(|err| AuthenticationError::new("verification method", err.to_string()))?;

    let mut nonce = vec![0u8; nonce_len];
    rand::rng().fill_bytes(&mut nonce);
    let nonce = hex::encode(nonce);
    let timestamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);

    let payload = signing_payload(&identity.did, &nonce, &timestamp, version, service_domain);
    let digest = jcs::canonical_sha256(&payload)
        .map_err(|err| AuthenticationError::new("signature", err.to_string()))?;
    let signature = identity
        .sign(&fragment, &digest)
        .map_err(|err| AuthenticationError::new("signature", err.to_string()))?;

    Ok(DidWbaHeader {
        version: version.to_string(),
        did: identity.did.clone(),
        nonce,
        timestamp,
        verification_method: fragment,
        signature: BASE64_URL_SAFE_NO_PAD.encode(signature),
    }
    .to_string())
}

/// Per-DID single-use nonce records, purged as their timestamps expire.
struct NonceStore {
    window: Duration,
    seen: Mutex<HashMap<String, HashMap<String, DateTime<Utc>>>>,
}

impl NonceStore {
    fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically records the nonce; returns false when it was already seen
    /// inside the replay window.
    fn check_and_insert(&self, did: &str, nonce: &str, now: DateTime<Utc>) -> bool {
        let mut seen = self.seen.lock();
        let nonces = seen.entry(did.to_string()).or_default();
        nonces.retain(|_, ts| *ts + self.window > now);
        if nonces.contains_key(nonce) {
            return false;
        }
        nonces.insert(nonce.to_string(), now);
        true
    }

    /// Drops every expired record. Safe to call from a periodic sweep.
    fn purge(&self, now: DateTime<Utc>) {
        let mut seen = self.seen.lock();
        seen.retain(|_, nonces| {
            nonces.retain(|_, ts| *ts + self.window > now);
            !nonces.is_empty()
        });
    }
}

/// The result of a successful header verification. Nothing but the nonce
/// record outlives the request this was produced for.
#[derive(Clone, Debug)]
pub struct VerifiedCaller {
    pub did: String,
    pub verified: bool,
    pub timestamp: DateTime<Utc>,
    pub nonce: String,
    pub verification_method: String,
}

/// Server-side verifier for `DIDWba` authorization headers.
pub struct AuthVerifier {
    resolver: Arc<dyn ResolveDid>,
    nonces: NonceStore,
    max_age: Duration,
}

impl AuthVerifier {
    pub fn new(resolver: Arc<dyn ResolveDid>) -> Self {
        Self::with_max_age(resolver, Duration::seconds(DEFAULT_MAX_AGE_SECS))
    }

    /// The replay window for nonces equals `max_age`.
    pub fn with_max_age(resolver: Arc<dyn ResolveDid>, max_age: Duration) -> Self {
        Self {
            resolver,
            nonces: NonceStore::new(max_age),
            max_age,
        }
    }

    /// Verifies a header against this server's domain.
    pub async fn verify(
        &self,
        header: &str,
        service_domain: &str,
    ) -> Result<VerifiedCaller, AuthenticationError> {
        self.verify_at(header, service_domain, Utc::now()).await
    }

    async fn verify_at(
        &self,
        header: &str,
        service_domain: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedCaller, AuthenticationError> {
        let header = DidWbaHeader::parse(header)?;

        let timestamp = DateTime::parse_from_rfc3339(&header.timestamp)
            .map_err(|err| AuthenticationError::new("timestamp", err.to_string()))?
            .with_timezone(&Utc);
        if (now - timestamp).abs() > self.max_age {
            return Err(AuthenticationError::new(
                "timestamp",
                format!("{} outside the acceptance window", header.timestamp),
            ));
        }

        if !self.nonces.check_and_insert(&header.did, &header.nonce, now) {
            return Err(AuthenticationError::new(
                "nonce",
                format!("nonce {} already used", header.nonce),
            ));
        }

        let document = self
            .resolver
            .resolve(&header.did)
            .await
            .map_err(|err| AuthenticationError::new("resolution", err.to_string()))?;
        let method = document
            .find_method(&header.verification_method)
            .ok_or_else(|| {
                AuthenticationError::new(
                    "verification method",
                    format!("{} not in document", header.verification_method),
                )
            })?;

        let payload = signing_payload(
            &header.did,
            &header.nonce,
            &header.timestamp,
            &header.version,
            service_domain,
        );
        let digest = jcs::canonical_sha256(&payload)
            .map_err(|err| AuthenticationError::new("signature", err.to_string()))?;
        let signature = BASE64_URL_SAFE_NO_PAD
            .decode(&header.signature)
            .map_err(|err| AuthenticationError::new("signature", err.to_string()))?;
        let key_type = method
            .key_type()
            .map_err(|err| AuthenticationError::new("verification method", err.to_string()))?;
        let public = method
            .public_key_bytes()
            .map_err(|err| AuthenticationError::new("verification method", err.to_string()))?;

        let valid = crypto::verify(key_type, &public, &digest, &signature)
            .map_err(|err| AuthenticationError::new("signature", err.to_string()))?;
        if !valid {
            return Err(AuthenticationError::new(
                "signature",
                "signature does not match the canonical payload",
            ));
        }

        Ok(VerifiedCaller {
            did: header.did,
            verified: true,
            timestamp,
            nonce: header.nonce,
            verification_method: header.verification_method,
        })
    }

    /// Drops expired nonce records.
    pub fn purge_nonces(&self) {
        self.nonces.purge(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::LocalResolver;

    fn identity_and_verifier() -> (DidIdentity, AuthVerifier) {
        let identity = DidIdentity::new_wba("example.com", None, &[], None).unwrap();
        let resolver = LocalResolver::new();
        resolver.insert(identity.document.clone());
        (identity, AuthVerifier::new(Arc::new(resolver)))
    }

    #[test]
    fn header_grammar_roundtrip() {
        let header = DidWbaHeader {
            version: "1.0".to_string(),
            did: "did:wba:example.com".to_string(),
            nonce: "abc123".to_string(),
            timestamp: "2026-08-01T00:00:00Z".to_string(),
            verification_method: "key-1".to_string(),
            signature: "c2ln".to_string(),
        };
        let parsed = DidWbaHeader::parse(&header.to_string()).unwrap();
        assert_eq!(parsed, header);

        // keys are case-insensitive and order-free
        let scrambled = "didwba signature=\"c2ln\", DID=\"did:wba:example.com\", \
                         Nonce=\"abc123\", TIMESTAMP=\"2026-08-01T00:00:00Z\", \
                         Verification_Method=\"key-1\", v=\"1.0\"";
        assert_eq!(DidWbaHeader::parse(scrambled).unwrap(), header);
    }

    #[test]
    fn parse_reports_missing_fields() {
        let err =
            DidWbaHeader::parse("DIDWba v=\"1.0\", did=\"did:wba:example.com\"").unwrap_err();
        assert_eq!(err.reason, "missing field");
        assert!(DidWbaHeader::parse("Bearer abc").is_err());
    }

    #[test]
    fn domain_field_version_rule() {
        assert_eq!(domain_field("1.0"), "service");
        assert_eq!(domain_field("1.1"), "aud");
        assert_eq!(domain_field("2.0"), "aud");
        assert_eq!(domain_field("0.9"), "service");
    }

    #[tokio::test]
    async fn verify_roundtrip_and_replay() {
        let (identity, verifier) = identity_and_verifier();
        let header = build_auth_header(&identity, "example.com").unwrap();

        let caller = verifier.verify(&header, "example.com").await.unwrap();
        assert!(caller.verified);
        assert_eq!(caller.did, identity.did);
        assert_eq!(caller.verification_method, "key-1");

        // the identical header replays the nonce
        let err = verifier.verify(&header, "example.com").await.unwrap_err();
        assert_eq!(err.reason, "nonce");
    }

    #[tokio::test]
    async fn verify_rejects_stale_timestamps() {
        let (identity, verifier) = identity_and_verifier();
        let old = Utc::now() - Duration::seconds(DEFAULT_MAX_AGE_SECS + 60);
        let header =
            build_header_at(&identity, "example.com", DEFAULT_VERSION, DEFAULT_NONCE_LEN, old)
                .unwrap();
        let err = verifier.verify(&header, "example.com").await.unwrap_err();
        assert_eq!(err.reason, "timestamp");
    }

    #[tokio::test]
    async fn verify_is_domain_bound() {
        let (identity, verifier) = identity_and_verifier();
        let header = build_auth_header(&identity, "example.com").unwrap();
        let err = verifier.verify(&header, "other.example").await.unwrap_err();
        assert_eq!(err.reason, "signature");
    }

    #[tokio::test]
    async fn verify_honors_versioned_domain_field() {
        let (identity, verifier) = identity_and_verifier();

        // v1.1 headers sign the domain under `aud` and verify as such
        let header =
            build_auth_header_versioned(&identity, "example.com", "1.1", DEFAULT_NONCE_LEN)
                .unwrap();
        verifier.verify(&header, "example.com").await.unwrap();

        // rewriting the version flips the domain field and breaks the digest
        let downgraded = header.replace("v=\"1.1\"", "v=\"1.0\"");
        let err = verifier.verify(&downgraded, "example.com").await.unwrap_err();
        assert_eq!(err.reason, "signature");
    }

    #[tokio::test]
    async fn verify_rejects_unknown_did() {
        let identity = DidIdentity::new_wba("example.com", None, &[], None).unwrap();
        let verifier = AuthVerifier::new(Arc::new(LocalResolver::new()));
        let header = build_auth_header(&identity, "example.com").unwrap();
        let err = verifier.verify(&header, "example.com").await.unwrap_err();
        assert_eq!(err.reason, "resolution");
    }

    #[test]
    fn nonce_store_expires_entries() {
        let store = NonceStore::new(Duration::seconds(60));
        let t0 = Utc::now();
        assert!(store.check_and_insert("did:wba:a.example", "n1", t0));
        assert!(!store.check_and_insert("did:wba:a.example", "n1", t0));
        // same nonce from another DID is unrelated
        assert!(store.check_and_insert("did:wba:b.example", "n1", t0));
        // after the window, the nonce may be seen again
        assert!(store.check_and_insert("did:wba:a.example", "n1", t0 + Duration::seconds(120)));

        store.purge(t0 + Duration::seconds(600));
        assert!(store.seen.lock().is_empty());
    }
}
