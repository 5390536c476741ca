//! The ANP peer runtime
//!
//! # Overview
//! This crate wires the wire types from `anp_core` and the identity layer
//! from `anp_did` into a running peer:
//! - [`runtime::Runtime`]: owns the frozen method registry, the session
//!   manager, the auth verifier, and document generation — the explicit
//!   handle collaborators receive instead of process globals
//! - [`dispatch`]: the JSON-RPC 2.0 request pipeline
//! - [`session`]: per-DID session isolation
//! - [`http::AnpClient`]: the outbound HTTP client with signed headers,
//!   deadlines, and backoff
//! - [`remote`]: discovery of peers and the frozen remote-agent proxy
//! - [`meta`]: the meta-protocol negotiation state machine
//!
//! # Usage
//! 1. Build a [`runtime::Runtime`] with the builder pattern
//! 2. Register methods and information records
//! 3. Serve it over HTTP (see `anp_server`) or drive it directly

pub mod context;
pub mod dispatch;
pub mod http;
pub mod meta;
pub mod remote;
pub mod runtime;
pub mod session;

pub use context::Context;
pub use self::http::{AnpClient, NetworkError};
pub use remote::{discover, fetch_collection, DiscoveryError, RemoteAgent, RemoteMethod};
pub use runtime::{Runtime, RuntimeBuilder};
pub use session::{Session, SessionManager};
