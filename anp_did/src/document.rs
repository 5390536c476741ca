//! DID documents and the did:wba identifier grammar
//!
//! A did:wba identifier maps one-to-one onto the HTTPS location of its DID
//! document:
//!
//! ```text
//! did:wba:example.com                    -> https://example.com/.well-known/did.json
//! did:wba:example.com%3A8800:user:alice  -> https://example.com:8800/user/alice/did.json
//! ```
//!
//! `:` separates path segments inside the identifier, so `:`, `/`, and spaces
//! inside a segment are percent-encoded and the port rides behind `%3A`.
//!
//! [`DidIdentity`] is the locally held triple of identifier, public document,
//! and private keys. The keys map is deliberately unserializable; it never
//! leaves the process.

use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

use crate::crypto::{self, CryptoError, KeyType};

/// Characters percent-encoded inside a did:wba path segment.
const SEGMENT_SET: &AsciiSet = &CONTROLS.add(b':').add(b'/').add(b' ').add(b'%');

pub const SECP256K1_SUITE: &str = "EcdsaSecp256k1VerificationKey2019";
pub const SECP256R1_SUITE: &str = "EcdsaSecp256r1VerificationKey2019";
pub const ED25519_SUITE: &str = "Ed25519VerificationKey2020";
pub const X25519_SUITE: &str = "X25519KeyAgreementKey2019";

/// Maps a verification-method suite name to its key algorithm.
pub fn key_type_for_suite(suite: &str) -> Option<KeyType> {
    match suite {
        SECP256K1_SUITE => Some(KeyType::Secp256k1),
        SECP256R1_SUITE => Some(KeyType::Secp256r1),
        ED25519_SUITE => Some(KeyType::Ed25519),
        X25519_SUITE => Some(KeyType::X25519),
        _ => None,
    }
}

/// Possible errors when building, parsing, or using DID documents.
#[derive(Debug, thiserror::Error)]
pub enum DidDocumentError {
    #[error("invalid DID {0:?}: {1}")]
    InvalidDid(String, String),

    #[error("hostname {0:?} must be a domain name, not an IP literal")]
    IpHostname(String),

    #[error("unsupported verification method type {0:?}")]
    UnsupportedSuite(String),

    #[error("verification method {0:?} not found in document")]
    MethodNotFound(String),

    #[error("no resolvable authentication method in document")]
    NoAuthenticationMethod,

    #[error("verification method {0:?} carries no usable public key: {1}")]
    BadPublicKey(String, String),

    #[error("no private key for fragment {0:?}")]
    MissingKey(String),

    #[error("cannot read identity material: {0}")]
    Io(String),

    #[error("cannot parse identity material: {0}")]
    Parse(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// A JSON Web Key as embedded in verification methods.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// One entry of a document's `verificationMethod` array.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub controller: String,
    #[serde(rename = "publicKeyJwk", skip_serializing_if = "Option::is_none")]
    pub public_key_jwk: Option<Jwk>,
    #[serde(rename = "publicKeyHex", skip_serializing_if = "Option::is_none")]
    pub public_key_hex: Option<String>,
}

impl VerificationMethod {
    /// The fragment part of this method's id (without the `#`).
    pub fn fragment(&self) -> &str {
        self.id.rsplit_once('#').map_or(self.id.as_str(), |(_, f)| f)
    }

    pub fn key_type(&self) -> Result<KeyType, DidDocumentError> {
        key_type_for_suite(&self.method_type)
            .ok_or_else(|| DidDocumentError::UnsupportedSuite(self.method_type.clone()))
    }

    /// Raw public key bytes: uncompressed SEC1 for EC keys, the 32 raw bytes
    /// for OKP keys, or the decoded `publicKeyHex` value.
    pub fn public_key_bytes(&self) -> Result<Vec<u8>, DidDocumentError> {
        if let Some(jwk) = &self.public_key_jwk {
            let x = BASE64_URL_SAFE_NO_PAD
                .decode(&jwk.x)
                .map_err(|err| DidDocumentError::BadPublicKey(self.id.clone(), err.to_string()))?;
            return match jwk.kty.as_str() {
                "EC" => {
                    let y_b64 = jwk.y.as_ref().ok_or_else(|| {
                        DidDocumentError::BadPublicKey(self.id.clone(), "EC JWK without y".into())
                    })?;
                    let y = BASE64_URL_SAFE_NO_PAD.decode(y_b64).map_err(|err| {
                        DidDocumentError::BadPublicKey(self.id.clone(), err.to_string())
                    })?;
                    let mut sec1 = Vec::with_capacity(1 + x.len() + y.len());
                    sec1.push(0x04);
                    sec1.extend_from_slice(&x);
                    sec1.extend_from_slice(&y);
                    Ok(sec1)
                }
                "OKP" => Ok(x),
                other => Err(DidDocumentError::BadPublicKey(
                    self.id.clone(),
                    format!("unsupported kty {other:?}"),
                )),
            };
        }
        if let Some(hex_key) = &self.public_key_hex {
            return hex::decode(hex_key)
                .map_err(|err| DidDocumentError::BadPublicKey(self.id.clone(), err.to_string()));
        }
        Err(DidDocumentError::BadPublicKey(
            self.id.clone(),
            "neither publicKeyJwk nor publicKeyHex present".into(),
        ))
    }
}

/// One entry of a document's `service` array.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Service {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: String,
}

/// A did:wba DID document.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Value,
    pub id: String,
    #[serde(rename = "verificationMethod", default)]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default)]
    pub authentication: Vec<Value>,
    #[serde(rename = "keyAgreement", default, skip_serializing_if = "Vec::is_empty")]
    pub key_agreement: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<Service>,
}

impl DidDocument {
    /// Finds a verification method by fragment (with or without leading `#`)
    /// or by full id.
    pub fn find_method(&self, reference: &str) -> Option<&VerificationMethod> {
        let fragment = reference
            .rsplit_once('#')
            .map_or(reference, |(_, f)| f)
            .trim_start_matches('#');
        self.verification_method
            .iter()
            .find(|m| m.fragment() == fragment || m.id == reference)
    }

    /// Returns the first entry of `authentication` that resolves to a known
    /// verification method (embedded or by reference), plus its fragment.
    pub fn select_authentication_method(
        &self,
    ) -> Result<(VerificationMethod, String), DidDocumentError> {
        for entry in &self.authentication {
            match entry {
                Value::String(reference) => {
                    if let Some(method) = self.find_method(reference) {
                        return Ok((method.clone(), method.fragment().to_string()));
                    }
                }
                Value::Object(_) => {
                    if let Ok(method) =
                        serde_json::from_value::<VerificationMethod>(entry.clone())
                    {
                        let fragment = method.fragment().to_string();
                        return Ok((method, fragment));
                    }
                }
                _ => {}
            }
        }
        Err(DidDocumentError::NoAuthenticationMethod)
    }

    /// Structural validation: the id must be a well-formed did:wba identifier
    /// and every `authentication` reference must resolve.
    pub fn validate(&self) -> Result<(), DidDocumentError> {
        did_to_url(&self.id)?;
        if self.authentication.is_empty() {
            return Err(DidDocumentError::NoAuthenticationMethod);
        }
        for entry in &self.authentication {
            if let Value::String(reference) = entry {
                if self.find_method(reference).is_none() {
                    return Err(DidDocumentError::MethodNotFound(reference.clone()));
                }
            }
        }
        for method in &self.verification_method {
            method.key_type()?;
            method.public_key_bytes()?;
        }
        Ok(())
    }
}

/// Builds a did:wba identifier from its location parts.
pub fn build_did_wba(
    hostname: &str,
    port: Option<u16>,
    segments: &[&str],
) -> Result<String, DidDocumentError> {
    if hostname.is_empty() {
        return Err(DidDocumentError::InvalidDid(
            String::new(),
            "empty hostname".into(),
        ));
    }
    if hostname.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>().is_ok() {
        return Err(DidDocumentError::IpHostname(hostname.to_string()));
    }

    let mut did = format!("did:wba:{hostname}");
    if let Some(port) = port {
        did.push_str(&format!("%3A{port}"));
    }
    for segment in segments {
        did.push(':');
        did.push_str(&utf8_percent_encode(segment, SEGMENT_SET).to_string());
    }
    Ok(did)
}

/// Maps a did:wba identifier to the HTTPS URL of its DID document.
pub fn did_to_url(did: &str) -> Result<String, DidDocumentError> {
    let tail = did.strip_prefix("did:wba:").ok_or_else(|| {
        DidDocumentError::InvalidDid(did.to_string(), "missing did:wba prefix".into())
    })?;
    if tail.is_empty() {
        return Err(DidDocumentError::InvalidDid(
            did.to_string(),
            "empty host".into(),
        ));
    }

    let mut parts = tail.split(':');
    let host_part = parts.next().unwrap_or_default();
    let (host, port) = match host_part.split_once("%3A") {
        Some((host, port_str)) => {
            let port: u16 = port_str.parse().map_err(|_| {
                DidDocumentError::InvalidDid(did.to_string(), format!("bad port {port_str:?}"))
            })?;
            (host.to_string(), Some(port))
        }
        None => (host_part.to_string(), None),
    };
    if host.is_empty() {
        return Err(DidDocumentError::InvalidDid(
            did.to_string(),
            "empty host".into(),
        ));
    }

    let mut segments = Vec::new();
    for raw in parts {
        let decoded = percent_decode_str(raw)
            .decode_utf8()
            .map_err(|err| DidDocumentError::InvalidDid(did.to_string(), err.to_string()))?;
        segments.push(decoded.into_owned());
    }

    let authority = match port {
        Some(port) => format!("{host}:{port}"),
        None => host,
    };
    Ok(if segments.is_empty() {
        format!("https://{authority}/.well-known/did.json")
    } else {
        format!("https://{authority}/{}/did.json", segments.join("/"))
    })
}

/// A private key held by a local identity. Not serializable.
#[derive(Clone)]
struct PrivateKey {
    key_type: KeyType,
    secret: Vec<u8>,
}

/// A locally held DID identity: identifier, public document, private keys.
#[derive(Clone)]
pub struct DidIdentity {
    pub did: String,
    pub document: DidDocument,
    keys: BTreeMap<String, PrivateKey>,
}

impl std::fmt::Debug for DidIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // private keys stay out of any Debug output
        f.debug_struct("DidIdentity")
            .field("did", &self.did)
            .field("keys", &self.keys.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

fn ec_jwk(crv: &str, key_type: KeyType, public: &[u8]) -> Result<Jwk, DidDocumentError> {
    let uncompressed = crypto::sec1_uncompressed(key_type, public)?;
    // 0x04 || X || Y
    let (x, y) = uncompressed[1..].split_at(32);
    Ok(Jwk {
        kty: "EC".to_string(),
        crv: crv.to_string(),
        x: BASE64_URL_SAFE_NO_PAD.encode(x),
        y: Some(BASE64_URL_SAFE_NO_PAD.encode(y)),
    })
}

fn did_context() -> Value {
    json!([
        "https://www.w3.org/ns/did/v1",
        "https://w3id.org/security/suites/jws-2020/v1",
        "https://w3id.org/security/suites/secp256k1-2019/v1",
        "https://w3id.org/security/suites/ed25519-2020/v1",
        "https://w3id.org/security/suites/x25519-2019/v1",
    ])
}

fn ad_service(did: &str, ad_url: Option<&str>) -> Vec<Service> {
    match ad_url {
        Some(url) => vec![Service {
            id: format!("{did}#ad"),
            service_type: "AgentDescription".to_string(),
            service_endpoint: url.to_string(),
        }],
        None => Vec::new(),
    }
}

impl DidIdentity {
    /// Creates a fresh did:wba identity with one secp256k1 authentication key
    /// published as `#key-1`.
    pub fn new_wba(
        hostname: &str,
        port: Option<u16>,
        segments: &[&str],
        ad_url: Option<&str>,
    ) -> Result<Self, DidDocumentError> {
        let did = build_did_wba(hostname, port, segments)?;
        let pair = crypto::generate_keypair(KeyType::Secp256k1)?;
        let key_id = format!("{did}#key-1");

        let document = DidDocument {
            context: did_context(),
            id: did.clone(),
            verification_method: vec![VerificationMethod {
                id: key_id.clone(),
                method_type: SECP256K1_SUITE.to_string(),
                controller: did.clone(),
                public_key_jwk: Some(ec_jwk("secp256k1", KeyType::Secp256k1, &pair.public)?),
                public_key_hex: None,
            }],
            authentication: vec![json!(key_id)],
            key_agreement: Vec::new(),
            service: ad_service(&did, ad_url),
        };

        let mut keys = BTreeMap::new();
        keys.insert(
            "key-1".to_string(),
            PrivateKey {
                key_type: KeyType::Secp256k1,
                secret: pair.secret,
            },
        );
        Ok(DidIdentity {
            did,
            document,
            keys,
        })
    }

    /// Creates a fresh did:wba identity with an Ed25519 authentication key
    /// (`#key-1`) and an X25519 key-agreement key (`#key-2`). The identifier
    /// grammar and encoding rules are identical to [`DidIdentity::new_wba`].
    pub fn new_wba_ed25519(
        hostname: &str,
        port: Option<u16>,
        segments: &[&str],
        ad_url: Option<&str>,
    ) -> Result<Self, DidDocumentError> {
        let did = build_did_wba(hostname, port, segments)?;
        let auth_pair = crypto::generate_keypair(KeyType::Ed25519)?;
        let agree_pair = crypto::generate_keypair(KeyType::X25519)?;
        let auth_id = format!("{did}#key-1");
        let agree_id = format!("{did}#key-2");

        let document = DidDocument {
            context: did_context(),
            id: did.clone(),
            verification_method: vec![
                VerificationMethod {
                    id: auth_id.clone(),
                    method_type: ED25519_SUITE.to_string(),
                    controller: did.clone(),
                    public_key_jwk: Some(Jwk {
                        kty: "OKP".to_string(),
                        crv: "Ed25519".to_string(),
                        x: BASE64_URL_SAFE_NO_PAD.encode(&auth_pair.public),
                        y: None,
                    }),
                    public_key_hex: None,
                },
                VerificationMethod {
                    id: agree_id.clone(),
                    method_type: X25519_SUITE.to_string(),
                    controller: did.clone(),
                    public_key_jwk: Some(Jwk {
                        kty: "OKP".to_string(),
                        crv: "X25519".to_string(),
                        x: BASE64_URL_SAFE_NO_PAD.encode(&agree_pair.public),
                        y: None,
                    }),
                    public_key_hex: None,
                },
            ],
            authentication: vec![json!(auth_id)],
            key_agreement: vec![json!(agree_id)],
            service: ad_service(&did, ad_url),
        };

        let mut keys = BTreeMap::new();
        keys.insert(
            "key-1".to_string(),
            PrivateKey {
                key_type: KeyType::Ed25519,
                secret: auth_pair.secret,
            },
        );
        keys.insert(
            "key-2".to_string(),
            PrivateKey {
                key_type: KeyType::X25519,
                secret: agree_pair.secret,
            },
        );
        Ok(DidIdentity {
            did,
            document,
            keys,
        })
    }

    /// Loads an identity from a DID document file and a hex-encoded private
    /// key file for its first authentication method.
    pub fn from_files(
        document_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self, DidDocumentError> {
        let doc_text = std::fs::read_to_string(&document_path)
            .map_err(|err| DidDocumentError::Io(err.to_string()))?;
        let document: DidDocument =
            serde_json::from_str(&doc_text).map_err(|err| DidDocumentError::Parse(err.to_string()))?;
        document.validate()?;

        let key_text = std::fs::read_to_string(&key_path)
            .map_err(|err| DidDocumentError::Io(err.to_string()))?;
        let secret =
            hex::decode(key_text.trim()).map_err(|err| DidDocumentError::Parse(err.to_string()))?;

        let (method, fragment) = document.select_authentication_method()?;
        let mut keys = BTreeMap::new();
        keys.insert(
            fragment,
            PrivateKey {
                key_type: method.key_type()?,
                secret,
            },
        );
        Ok(DidIdentity {
            did: document.id.clone(),
            document,
            keys,
        })
    }

    /// Signs a message with the private key behind the given fragment.
    pub fn sign(&self, fragment: &str, message: &[u8]) -> Result<Vec<u8>, DidDocumentError> {
        let fragment = fragment.trim_start_matches('#');
        let key = self
            .keys
            .get(fragment)
            .ok_or_else(|| DidDocumentError::MissingKey(fragment.to_string()))?;
        Ok(crypto::sign(key.key_type, &key.secret, message)?)
    }

    /// The fragments this identity holds private keys for.
    pub fn key_fragments(&self) -> Vec<&str> {
        self.keys.keys().map(|k| k.as_str()).collect()
    }

    /// Hex encoding of one private key, for writing identity material to
    /// disk. Never log the result.
    pub fn secret_hex(&self, fragment: &str) -> Option<String> {
        self.keys
            .get(fragment.trim_start_matches('#'))
            .map(|k| hex::encode(&k.secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn did_grammar() {
        assert_eq!(
            build_did_wba("example.com", None, &[]).unwrap(),
            "did:wba:example.com"
        );
        assert_eq!(
            build_did_wba("example.com", Some(8800), &["user", "alice"]).unwrap(),
            "did:wba:example.com%3A8800:user:alice"
        );
        assert_eq!(
            build_did_wba("example.com", None, &["a/b", "c d"]).unwrap(),
            "did:wba:example.com:a%2Fb:c%20d"
        );
        assert!(matches!(
            build_did_wba("192.168.1.1", None, &[]),
            Err(DidDocumentError::IpHostname(_))
        ));
        assert!(matches!(
            build_did_wba("[2001:db8::1]", None, &[]),
            Err(DidDocumentError::IpHostname(_))
        ));
    }

    #[test]
    fn did_url_mapping() {
        assert_eq!(
            did_to_url("did:wba:example.com").unwrap(),
            "https://example.com/.well-known/did.json"
        );
        assert_eq!(
            did_to_url("did:wba:example.com%3A8800:user:alice").unwrap(),
            "https://example.com:8800/user/alice/did.json"
        );
        assert_eq!(
            did_to_url("did:wba:example.com:a%2Fb").unwrap(),
            "https://example.com/a/b/did.json"
        );
        assert!(did_to_url("did:web:example.com").is_err());
        assert!(did_to_url("did:wba:").is_err());
        assert!(did_to_url("did:wba:example.com%3Axyz").is_err());
    }

    #[test]
    fn new_wba_document_is_valid() {
        let identity =
            DidIdentity::new_wba("example.com", None, &[], Some("https://example.com/ad.json"))
                .unwrap();
        identity.document.validate().unwrap();

        let (method, fragment) = identity.document.select_authentication_method().unwrap();
        assert_eq!(fragment, "key-1");
        assert_eq!(method.method_type, SECP256K1_SUITE);
        assert_eq!(identity.document.service[0].service_type, "AgentDescription");

        // the published public key verifies what the private key signs
        let sig = identity.sign("key-1", b"probe").unwrap();
        let public = method.public_key_bytes().unwrap();
        assert!(crypto::verify(KeyType::Secp256k1, &public, b"probe", &sig).unwrap());
    }

    #[test]
    fn ed25519_variant_signs_and_agrees() {
        let identity = DidIdentity::new_wba_ed25519("example.com", None, &["bot"], None).unwrap();
        identity.document.validate().unwrap();
        assert_eq!(identity.key_fragments(), vec!["key-1", "key-2"]);

        let (method, _) = identity.document.select_authentication_method().unwrap();
        let sig = identity.sign("#key-1", b"probe").unwrap();
        let public = method.public_key_bytes().unwrap();
        assert!(crypto::verify(KeyType::Ed25519, &public, b"probe", &sig).unwrap());
        assert_eq!(identity.document.key_agreement.len(), 1);
    }

    #[test]
    fn validate_rejects_dangling_authentication() {
        let mut identity = DidIdentity::new_wba("example.com", None, &[], None).unwrap();
        identity
            .document
            .authentication
            .push(json!("did:wba:example.com#key-9"));
        assert!(matches!(
            identity.document.validate(),
            Err(DidDocumentError::MethodNotFound(_))
        ));
    }

    #[test]
    fn embedded_authentication_method_is_selected() {
        let doc: DidDocument = serde_json::from_value(json!({
            "@context": ["https://www.w3.org/ns/did/v1"],
            "id": "did:wba:example.com",
            "verificationMethod": [],
            "authentication": [{
                "id": "did:wba:example.com#embedded",
                "type": ED25519_SUITE,
                "controller": "did:wba:example.com",
                "publicKeyHex": "00",
            }],
        }))
        .unwrap();
        let (method, fragment) = doc.select_authentication_method().unwrap();
        assert_eq!(fragment, "embedded");
        assert_eq!(method.method_type, ED25519_SUITE);
    }
}
