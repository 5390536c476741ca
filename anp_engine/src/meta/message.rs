//! Meta-protocol wire messages
//!
//! Every message is a JSON object discriminated by its `action` field and
//! stamped with the sender's current `sequence_id`. On the wire a message
//! rides inside a [`anp_core::frame`] frame of type
//! [`anp_core::ProtocolType::Meta`].

use anp_core::{decode_frame, encode_frame, ProtocolType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::NegotiationError;

/// Status field of a protocol-negotiation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationStatus {
    Negotiating,
    Accepted,
    Rejected,
}

/// A meta-protocol message, discriminated by `action`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "action")]
pub enum MetaMessage {
    #[serde(rename = "protocolNegotiation")]
    ProtocolNegotiation {
        sequence_id: u64,
        round: u32,
        candidate_protocols: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        selected_protocol: Option<String>,
        status: NegotiationStatus,
    },

    #[serde(rename = "codeGeneration")]
    CodeGeneration {
        sequence_id: u64,
        ready: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    #[serde(rename = "testCasesNegotiation")]
    TestCasesNegotiation {
        sequence_id: u64,
        test_cases: Value,
        accepted: bool,
    },

    #[serde(rename = "fixErrorNegotiation")]
    FixErrorNegotiation {
        sequence_id: u64,
        error_description: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        proposed_fix: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        accepted: Option<bool>,
    },

    #[serde(rename = "naturalLanguageNegotiation")]
    NaturalLanguageNegotiation { sequence_id: u64, text: String },
}

impl MetaMessage {
    /// The sender's sequence id carried by this message.
    pub fn sequence_id(&self) -> u64 {
        match self {
            MetaMessage::ProtocolNegotiation { sequence_id, .. }
            | MetaMessage::CodeGeneration { sequence_id, .. }
            | MetaMessage::TestCasesNegotiation { sequence_id, .. }
            | MetaMessage::FixErrorNegotiation { sequence_id, .. }
            | MetaMessage::NaturalLanguageNegotiation { sequence_id, .. } => *sequence_id,
        }
    }

    pub(crate) fn set_sequence_id(&mut self, seq: u64) {
        match self {
            MetaMessage::ProtocolNegotiation { sequence_id, .. }
            | MetaMessage::CodeGeneration { sequence_id, .. }
            | MetaMessage::TestCasesNegotiation { sequence_id, .. }
            | MetaMessage::FixErrorNegotiation { sequence_id, .. }
            | MetaMessage::NaturalLanguageNegotiation { sequence_id, .. } => *sequence_id = seq,
        }
    }

    /// Parses a message payload. Unknown or missing `action` is an error.
    pub fn parse(payload: &[u8]) -> Result<Self, NegotiationError> {
        serde_json::from_slice(payload)
            .map_err(|err| NegotiationError::InvalidMessage(err.to_string()))
    }

    /// Encodes this message into a meta-protocol frame.
    pub fn encode(&self) -> Result<Vec<u8>, NegotiationError> {
        let payload = serde_json::to_vec(self)
            .map_err(|err| NegotiationError::InvalidMessage(err.to_string()))?;
        Ok(encode_frame(ProtocolType::Meta, &payload))
    }

    /// Decodes a meta-protocol frame into a message.
    pub fn decode(frame: &[u8]) -> Result<Self, NegotiationError> {
        let (protocol, payload) = decode_frame(frame)?;
        if protocol != ProtocolType::Meta {
            return Err(NegotiationError::WrongFrameType(protocol));
        }
        Self::parse(payload)
    }
}
