//! Bearer access tokens
//!
//! After a successful DID-WBA handshake a server may hand the caller an
//! opaque token so subsequent requests skip resolution and signature checks.
//! Tokens are signed with an Ed25519 key generated per [`TokenIssuer`], so
//! they are valid only against the instance that issued them and die with it.

use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use ed25519_dalek::{Signer, SigningKey, Verifier};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::jcs;

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Deserialize, Serialize)]
struct TokenClaims {
    did: String,
    expires_at: i64,
}

/// The outcome of a token verification.
#[derive(Clone, Debug, Default)]
pub struct TokenStatus {
    pub valid: bool,
    pub did: Option<String>,
    pub expires_at: Option<i64>,
    pub error: Option<String>,
}

impl TokenStatus {
    fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            did: None,
            expires_at: None,
            error: Some(error.into()),
        }
    }
}

/// Issues and verifies bearer tokens for one server instance.
pub struct TokenIssuer {
    key: SigningKey,
    ttl: Duration,
}

impl TokenIssuer {
    /// Creates an issuer with a fresh signing key and the default lifetime.
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(DEFAULT_TOKEN_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);
        Self {
            key: SigningKey::from_bytes(&seed),
            ttl,
        }
    }

    /// Issues a token binding the DID until `ttl` from now.
    pub fn generate(&self, did: &str) -> String {
        let claims = TokenClaims {
            did: did.to_string(),
            expires_at: (Utc::now() + self.ttl).timestamp(),
        };
        // claims are flat and string/number valued, so the canonical form is stable
        let payload = jcs::to_canonical_json(&claims).unwrap_or_default();
        let signature = self.key.sign(payload.as_bytes());
        format!(
            "{}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(payload.as_bytes()),
            BASE64_URL_SAFE_NO_PAD.encode(signature.to_bytes())
        )
    }

    /// Verifies a token issued by this instance.
    pub fn verify(&self, token: &str) -> TokenStatus {
        let Some((payload_b64, signature_b64)) = token.split_once('.') else {
            return TokenStatus::invalid("malformed token");
        };
        let Ok(payload) = BASE64_URL_SAFE_NO_PAD.decode(payload_b64) else {
            return TokenStatus::invalid("malformed token payload");
        };
        let Ok(signature) = BASE64_URL_SAFE_NO_PAD.decode(signature_b64) else {
            return TokenStatus::invalid("malformed token signature");
        };
        let Ok(signature) = ed25519_dalek::Signature::from_slice(&signature) else {
            return TokenStatus::invalid("malformed token signature");
        };
        if self
            .key
            .verifying_key()
            .verify(&payload, &signature)
            .is_err()
        {
            return TokenStatus::invalid("token signature mismatch");
        }

        let Ok(claims) = serde_json::from_slice::<TokenClaims>(&payload) else {
            return TokenStatus::invalid("malformed token claims");
        };
        if claims.expires_at <= Utc::now().timestamp() {
            return TokenStatus::invalid("token expired");
        }
        TokenStatus {
            valid: true,
            did: Some(claims.did),
            expires_at: Some(claims.expires_at),
            error: None,
        }
    }
}

impl Default for TokenIssuer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_verify_roundtrip() {
        let issuer = TokenIssuer::new();
        let token = issuer.generate("did:wba:example.com");
        let status = issuer.verify(&token);
        assert!(status.valid, "{:?}", status.error);
        assert_eq!(status.did.as_deref(), Some("did:wba:example.com"));
        assert!(status.expires_at.unwrap() > Utc::now().timestamp());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let issuer = TokenIssuer::with_ttl(Duration::seconds(-1));
        let token = issuer.generate("did:wba:example.com");
        let status = issuer.verify(&token);
        assert!(!status.valid);
        assert_eq!(status.error.as_deref(), Some("token expired"));
    }

    #[test]
    fn tokens_do_not_cross_instances() {
        let a = TokenIssuer::new();
        let b = TokenIssuer::new();
        let token = a.generate("did:wba:example.com");
        assert!(!b.verify(&token).valid);
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let issuer = TokenIssuer::new();
        let token = issuer.generate("did:wba:example.com");
        let mut tampered = token.clone();
        tampered.replace_range(0..1, if token.starts_with('A') { "B" } else { "A" });
        assert!(!issuer.verify(&tampered).valid);
        assert!(!issuer.verify("junk").valid);
    }
}
