//! Handshake state machine.
//!
//! One [`Handshake`] drives one connection attempt, as initiator or as
//! responder. It is used once: `Accepted` and `Rejected` are terminal.

use std::sync::Arc;

use super::message::{Message, Rejection};
use super::negotiate::{negotiate, AcceptAll, AcceptPolicy, Agreement};
use super::versions::VersionTable;
use crate::codec;
use crate::error::{HandshakeError, Result};

/// Handshake state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent or received yet
    Idle,
    /// PROPOSE sent, waiting for ACCEPT/REFUSE
    ProposalSent,
    /// PROPOSE received, negotiating
    ProposalReceived,
    /// Version agreed
    Accepted,
    /// Negotiation failed
    Rejected,
}

impl HandshakeState {
    /// Check if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected)
    }
}

/// Side of the connection a handshake runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sends the proposal
    Initiator,
    /// Answers the proposal
    Responder,
}

/// Version-negotiation handshake for one connection attempt
pub struct Handshake {
    /// Attempt ID for logs
    id: String,
    /// Current state
    state: HandshakeState,
    /// Role, fixed by the first operation
    role: Option<Role>,
    /// Local version table, shared between attempts
    local: Arc<VersionTable>,
    /// Responder-side policy
    policy: Arc<dyn AcceptPolicy>,
    /// Agreed version (after Accepted)
    agreement: Option<Agreement>,
    /// Rejection reason (after Rejected)
    rejection: Option<Rejection>,
    /// Local failure that ended the handshake without a rejection
    failure: Option<String>,
}

impl Handshake {
    /// Create a handshake over a local version table.
    ///
    /// The table must not be empty: a proposal always offers at least one
    /// version. Every catalog version must carry parameters of its own shape.
    pub fn new(local: impl Into<Arc<VersionTable>>) -> Result<Self> {
        let local = local.into();
        if local.is_empty() {
            return Err(HandshakeError::Config(
                "local version table is empty".to_string(),
            ));
        }
        if let Some(version) = local.misshapen() {
            return Err(HandshakeError::Config(format!(
                "parameters for version {version} have the wrong shape"
            )));
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: HandshakeState::Idle,
            role: None,
            local,
            policy: Arc::new(AcceptAll),
            agreement: None,
            rejection: None,
            failure: None,
        })
    }

    /// Use an acceptance policy when responding
    pub fn with_policy(mut self, policy: Arc<dyn AcceptPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Get attempt ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get current state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Get role, once known
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Local version table
    pub fn local_versions(&self) -> &VersionTable {
        &self.local
    }

    /// Agreed version, once accepted
    pub fn agreement(&self) -> Option<&Agreement> {
        self.agreement.as_ref()
    }

    /// Rejection reason, once rejected
    pub fn rejection(&self) -> Option<&Rejection> {
        self.rejection.as_ref()
    }

    /// Check if the handshake succeeded
    pub fn is_accepted(&self) -> bool {
        self.state == HandshakeState::Accepted
    }

    /// Final outcome, or `None` while the handshake is in progress
    pub fn outcome(&self) -> Option<Result<Agreement>> {
        match self.state {
            HandshakeState::Accepted => self.agreement.map(Ok),
            HandshakeState::Rejected => Some(Err(match (&self.rejection, &self.failure) {
                (Some(rejection), _) => HandshakeError::Rejected(rejection.clone()),
                (None, Some(failure)) => {
                    HandshakeError::Protocol(format!("handshake failed: {failure}"))
                },
                (None, None) => HandshakeError::Protocol(format!(
                    "handshake {} rejected without a reason",
                    self.id
                )),
            })),
            _ => None,
        }
    }

    /// Create PROPOSE message to initiate handshake
    pub fn propose(&mut self) -> Result<Message> {
        self.expect_state(HandshakeState::Idle, "PROPOSE")?;

        self.role = Some(Role::Initiator);
        self.state = HandshakeState::ProposalSent;
        tracing::debug!(
            handshake = %self.id,
            versions = ?self.local.versions(),
            "sending proposal"
        );
        Ok(Message::propose_versions(VersionTable::clone(&self.local)))
    }

    /// Process incoming PROPOSE and create ACCEPT/REFUSE response
    pub fn respond(&mut self, proposal: &Message) -> Result<Message> {
        self.expect_state(HandshakeState::Idle, proposal.name())?;

        let remote = proposal.get_versions().ok_or_else(|| {
            HandshakeError::Protocol(format!("expected PROPOSE, got {}", proposal.name()))
        })?;

        self.role = Some(Role::Responder);
        self.state = HandshakeState::ProposalReceived;

        match negotiate(&self.local, remote, self.policy.as_ref()) {
            Ok(agreed) => {
                tracing::debug!(
                    handshake = %self.id,
                    version = agreed.version,
                    params = %agreed.params,
                    "version accepted"
                );
                self.accept(agreed);
                Ok(Message::accept(agreed.version, agreed.params))
            },
            Err(rejection) => Ok(Message::refuse(self.reject(rejection))),
        }
    }

    /// Decode a proposal and respond to it.
    ///
    /// Parameters that fail to decode for a version are answered with a
    /// REFUSE carrying the decode error. Bytes that are not a handshake
    /// message at all are returned as an error.
    pub fn respond_bytes(&mut self, bytes: &[u8]) -> Result<Message> {
        self.expect_state(HandshakeState::Idle, "PROPOSE")?;

        match codec::decode(bytes) {
            Ok(proposal) => self.respond(&proposal),
            Err(HandshakeError::Rejected(rejection @ Rejection::DecodeError { .. })) => {
                self.role = Some(Role::Responder);
                self.state = HandshakeState::ProposalReceived;
                Ok(Message::refuse(self.reject(rejection)))
            },
            Err(e) => {
                self.role = Some(Role::Responder);
                Err(self.fail(e))
            },
        }
    }

    /// Process the reply to our PROPOSE.
    ///
    /// Returns the agreement on ACCEPT. A REFUSE ends the handshake with
    /// [`HandshakeError::Rejected`].
    pub fn receive_reply(&mut self, reply: &Message) -> Result<Agreement> {
        self.expect_state(HandshakeState::ProposalSent, reply.name())?;

        match reply {
            Message::Accept { version, params } => match self.local.get(*version) {
                Some(local_params) => {
                    let agreed = Agreement {
                        version: *version,
                        params: *local_params,
                    };
                    tracing::debug!(
                        handshake = %self.id,
                        version = agreed.version,
                        remote_params = %params,
                        "proposal accepted"
                    );
                    self.accept(agreed);
                    Ok(agreed)
                },
                None => Err(self.fail(HandshakeError::Protocol(format!(
                    "peer accepted version {version} which was not proposed"
                )))),
            },
            Message::Refuse(rejection) => {
                let rejection = self.reject(rejection.clone());
                Err(HandshakeError::Rejected(rejection))
            },
            Message::Propose(_) => Err(self.fail(HandshakeError::Protocol(
                "received PROPOSE while waiting for a reply".to_string(),
            ))),
        }
    }

    /// Decode and process the reply to our PROPOSE
    pub fn receive_reply_bytes(&mut self, bytes: &[u8]) -> Result<Agreement> {
        self.expect_state(HandshakeState::ProposalSent, "reply")?;

        match codec::decode(bytes) {
            Ok(reply) => self.receive_reply(&reply),
            Err(HandshakeError::Rejected(rejection)) => {
                Err(HandshakeError::Rejected(self.reject(rejection)))
            },
            Err(e) => Err(self.fail(e)),
        }
    }

    fn accept(&mut self, agreed: Agreement) {
        self.agreement = Some(agreed);
        self.state = HandshakeState::Accepted;
    }

    fn reject(&mut self, rejection: Rejection) -> Rejection {
        tracing::warn!(handshake = %self.id, role = ?self.role, "{}", rejection);
        self.rejection = Some(rejection.clone());
        self.state = HandshakeState::Rejected;
        rejection
    }

    fn fail(&mut self, err: HandshakeError) -> HandshakeError {
        tracing::warn!(handshake = %self.id, role = ?self.role, "{}", err);
        self.failure = Some(err.to_string());
        self.state = HandshakeState::Rejected;
        err
    }

    fn expect_state(&self, expected: HandshakeState, what: &str) -> Result<()> {
        if self.state != expected {
            return Err(HandshakeError::Protocol(format!(
                "Cannot process {what} in state {:?}",
                self.state
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("role", &self.role)
            .field("versions", &self.local.versions())
            .field("agreement", &self.agreement)
            .field("rejection", &self.rejection)
            .field("failure", &self.failure)
            .finish()
    }
}
