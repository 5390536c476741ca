//! Meta-protocol negotiation
//!
//! Before two agents speak application traffic they can negotiate what to
//! speak: candidate protocols, generated code, test cases, and error fixing,
//! in a bounded message-driven choreography. This module provides:
//! - [`machine::NegotiationMachine`]: the per-session state machine
//! - [`message::MetaMessage`]: the action-discriminated wire messages
//!
//! Framing rides on [`anp_core::frame`]; one machine serves one negotiation
//! session and applies events sequentially.

pub mod machine;
pub mod message;

pub use machine::{MetaContext, NegotiationEvent, NegotiationMachine, NegotiationState};
pub use message::{MetaMessage, NegotiationStatus};

/// Possible errors in the negotiation layer.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("invalid meta-protocol message: {0}")]
    InvalidMessage(String),

    #[error("unexpected frame type {0:?}")]
    WrongFrameType(anp_core::ProtocolType),

    #[error(transparent)]
    Frame(#[from] anp_core::FrameError),
}
