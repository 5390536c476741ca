//! DID-WBA identity and authentication for the ANP SDK
//!
//! This crate covers the identity side of an ANP peer:
//! - [`crypto`]: key generation, signing, verification, ECDH, HKDF, AEAD
//! - [`document`]: the did:wba grammar, DID documents, and local identities
//! - [`resolver`]: fetching and caching remote DID documents
//! - [`auth`]: DIDWba authorization headers with nonce/timestamp policy
//! - [`token`]: locally signed bearer tokens issued after a handshake
//!
//! Private keys live inside [`document::DidIdentity`] and never leave the
//! process; nothing in this crate serializes them.

pub mod auth;
pub mod crypto;
pub mod document;
pub mod jcs;
pub mod resolver;
pub mod token;

pub use auth::{build_auth_header, AuthVerifier, AuthenticationError, DidWbaHeader, VerifiedCaller};
pub use crypto::{CryptoError, KeyPair, KeyType};
pub use document::{DidDocument, DidDocumentError, DidIdentity, VerificationMethod};
pub use resolver::{DidResolutionError, HttpResolver, LocalResolver, ResolveDid};
pub use token::{TokenIssuer, TokenStatus};
