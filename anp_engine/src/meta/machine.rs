//! The negotiation state machine
//!
//! One machine drives one negotiation session. Events are applied
//! sequentially; sending and receiving may happen on different tasks, but
//! event application is single-actor. Unexpected events do not panic or
//! error: they transition the machine to `Failed` with the cause recorded in
//! its context, which is also where `agreed_protocol` and `test_cases` are
//! left for the application to consume.

use serde_json::Value;

use super::message::MetaMessage;
use super::NegotiationError;

/// Default negotiation round budget.
pub const DEFAULT_MAX_ROUNDS: u32 = 10;

/// States of a negotiation session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    Negotiating,
    CodeGeneration,
    TestCases,
    Testing,
    FixError,
    Ready,
    Communicating,
    Rejected,
    Failed,
    Completed,
}

impl NegotiationState {
    /// Terminal states accept no further events.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NegotiationState::Rejected | NegotiationState::Failed | NegotiationState::Completed
        )
    }
}

/// Events driving a negotiation session.
#[derive(Clone, Debug)]
pub enum NegotiationEvent {
    Initiate { candidate_protocols: Vec<String> },
    ReceiveRequest { candidate_protocols: Vec<String> },
    Negotiate { proposal: Option<String> },
    Accept { protocol: String },
    Reject { reason: Option<String> },
    Timeout,
    CodeReady,
    CodeError { error: String },
    TestsAgreed { test_cases: Value },
    SkipTests,
    TestsPassed,
    TestsFailed { error: String },
    FixAccepted,
    FixRejected,
    StartCommunication,
    ProtocolError { error: String },
    End,
}

impl NegotiationEvent {
    fn name(&self) -> &'static str {
        match self {
            NegotiationEvent::Initiate { .. } => "initiate",
            NegotiationEvent::ReceiveRequest { .. } => "receive_request",
            NegotiationEvent::Negotiate { .. } => "negotiate",
            NegotiationEvent::Accept { .. } => "accept",
            NegotiationEvent::Reject { .. } => "reject",
            NegotiationEvent::Timeout => "timeout",
            NegotiationEvent::CodeReady => "code_ready",
            NegotiationEvent::CodeError { .. } => "code_error",
            NegotiationEvent::TestsAgreed { .. } => "tests_agreed",
            NegotiationEvent::SkipTests => "skip_tests",
            NegotiationEvent::TestsPassed => "tests_passed",
            NegotiationEvent::TestsFailed { .. } => "tests_failed",
            NegotiationEvent::FixAccepted => "fix_accepted",
            NegotiationEvent::FixRejected => "fix_rejected",
            NegotiationEvent::StartCommunication => "start_communication",
            NegotiationEvent::ProtocolError { .. } => "protocol_error",
            NegotiationEvent::End => "end",
        }
    }
}

/// Mutable context of one negotiation session.
#[derive(Clone, Debug)]
pub struct MetaContext {
    /// Last sequence id stamped onto an outbound message.
    pub sequence_id: u64,
    pub candidate_protocols: Vec<String>,
    pub agreed_protocol: Option<String>,
    pub test_cases: Option<Value>,
    pub negotiation_round: u32,
    pub max_rounds: u32,
    pub remote_did: Option<String>,
    pub local_did: Option<String>,
    pub errors: Vec<String>,
}

impl MetaContext {
    fn new(max_rounds: u32) -> Self {
        Self {
            sequence_id: 0,
            candidate_protocols: Vec::new(),
            agreed_protocol: None,
            test_cases: None,
            negotiation_round: 0,
            max_rounds: max_rounds.max(1),
            remote_did: None,
            local_did: None,
            errors: Vec::new(),
        }
    }

    /// Advances and returns the outbound sequence id. Strictly increasing
    /// over the life of the session.
    pub fn next_sequence_id(&mut self) -> u64 {
        self.sequence_id += 1;
        self.sequence_id
    }
}

/// The per-session negotiation state machine.
#[derive(Debug)]
pub struct NegotiationMachine {
    state: NegotiationState,
    context: MetaContext,
    last_inbound: Option<u64>,
}

impl NegotiationMachine {
    pub fn new(max_rounds: u32) -> Self {
        Self {
            state: NegotiationState::Idle,
            context: MetaContext::new(max_rounds),
            last_inbound: None,
        }
    }

    pub fn with_peers(mut self, local_did: Option<String>, remote_did: Option<String>) -> Self {
        self.context.local_did = local_did;
        self.context.remote_did = remote_did;
        self
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn context(&self) -> &MetaContext {
        &self.context
    }

    /// Applies one event and returns the resulting state.
    ///
    /// Terminal states ignore events. An event with no transition from the
    /// current state moves the machine to `Failed` and records the cause.
    pub fn handle(&mut self, event: NegotiationEvent) -> NegotiationState {
        use NegotiationEvent as E;
        use NegotiationState as S;

        if self.state.is_terminal() {
            return self.state;
        }

        self.state = match (self.state, event) {
            (S::Idle, E::Initiate { candidate_protocols })
            | (S::Idle, E::ReceiveRequest { candidate_protocols }) => {
                self.context.candidate_protocols = candidate_protocols;
                S::Negotiating
            }
            (S::Negotiating, E::Negotiate { proposal }) => {
                if self.context.negotiation_round >= self.context.max_rounds {
                    self.context
                        .errors
                        .push("negotiation exceeded max rounds".to_string());
                    S::Rejected
                } else {
                    self.context.negotiation_round += 1;
                    if let Some(proposal) = proposal {
                        if !self.context.candidate_protocols.contains(&proposal) {
                            self.context.candidate_protocols.push(proposal);
                        }
                    }
                    S::Negotiating
                }
            }
            (S::Negotiating, E::Accept { protocol }) => {
                self.context.agreed_protocol = Some(protocol);
                S::CodeGeneration
            }
            (S::Negotiating, E::Reject { reason }) => {
                if let Some(reason) = reason {
                    self.context.errors.push(reason);
                }
                S::Rejected
            }
            (S::Negotiating, E::Timeout) => S::Rejected,
            (S::CodeGeneration, E::CodeReady) => S::TestCases,
            (S::CodeGeneration, E::CodeError { error }) => {
                self.context.errors.push(error);
                S::Failed
            }
            (S::TestCases, E::TestsAgreed { test_cases }) => {
                self.context.test_cases = Some(test_cases);
                S::Testing
            }
            (S::TestCases, E::SkipTests) => S::Ready,
            (S::Testing, E::TestsPassed) => S::Ready,
            (S::Testing, E::TestsFailed { error }) => {
                self.context.errors.push(error);
                S::FixError
            }
            (S::FixError, E::FixAccepted) => S::CodeGeneration,
            (S::FixError, E::FixRejected) => S::Failed,
            (S::Ready, E::StartCommunication) => S::Communicating,
            (S::Communicating, E::ProtocolError { error }) => {
                self.context.errors.push(error);
                S::FixError
            }
            (S::Communicating, E::End) => S::Completed,
            (state, E::Timeout) => {
                self.context.errors.push(format!("timeout in {state:?}"));
                S::Failed
            }
            (state, event) => {
                self.context
                    .errors
                    .push(format!("unexpected event {} in {state:?}", event.name()));
                S::Failed
            }
        };
        self.state
    }

    /// Stamps an outbound message with the next sequence id and frames it.
    pub fn encode_outbound(&mut self, mut message: MetaMessage) -> Result<Vec<u8>, NegotiationError> {
        message.set_sequence_id(self.context.next_sequence_id());
        message.encode()
    }

    /// Decodes an inbound frame. Out-of-order delivery is detected via the
    /// peer's sequence ids and the older message is dropped (`Ok(None)`).
    pub fn accept_inbound(
        &mut self,
        frame: &[u8],
    ) -> Result<Option<MetaMessage>, NegotiationError> {
        let message = MetaMessage::decode(frame)?;
        let sequence_id = message.sequence_id();
        if let Some(last) = self.last_inbound {
            if sequence_id <= last {
                log::debug!(
                    got = sequence_id,
                    last = last;
                    "dropping stale meta-protocol message",
                );
                return Ok(None);
            }
        }
        self.last_inbound = Some(sequence_id);
        Ok(Some(message))
    }
}
