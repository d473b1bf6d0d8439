//! Handshake messages.
//!
//! Defines the PROPOSE, ACCEPT and REFUSE messages and the three
//! rejection reasons a REFUSE can carry. Each message and each rejection
//! reason has a stable wire tag; see [`crate::codec`] for the byte layout.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::versions::{default_versions, Magic, ParamValue, VersionNumber, VersionTable};

/// Message tags on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageTag {
    /// Version proposal
    Propose = 0,
    /// Version acceptance
    Accept = 1,
    /// Rejection
    Refuse = 2,
}

impl MessageTag {
    /// Parse a wire tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Propose),
            1 => Some(Self::Accept),
            2 => Some(Self::Refuse),
            _ => None,
        }
    }

    /// Raw wire value
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Rejection reason tags on the wire, nested under [`MessageTag::Refuse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RejectionTag {
    /// No shared version
    VersionMismatch = 0,
    /// Parameters could not be decoded
    DecodeError = 1,
    /// Rejected by policy
    Refused = 2,
}

impl RejectionTag {
    /// Parse a wire tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::VersionMismatch),
            1 => Some(Self::DecodeError),
            2 => Some(Self::Refused),
            _ => None,
        }
    }

    /// Raw wire value
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Handshake message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum Message {
    /// Every version the sender is willing to speak
    Propose(VersionTable),
    /// Version chosen by the responder and the parameters it applies
    Accept {
        /// Agreed version
        version: VersionNumber,
        /// Responder's parameters for that version
        params: ParamValue,
    },
    /// Negotiation failed
    Refuse(Rejection),
}

/// Why a handshake was rejected. All reasons are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// The proposal shares no version with the local table
    #[error("handshake version mismatch (valid versions: {})", join_versions(.valid_versions))]
    VersionMismatch {
        /// Versions the rejecting side supports, ascending
        valid_versions: Vec<VersionNumber>,
    },

    /// Data for a version could not be parsed
    #[error("handshake decode error for version {version}: {reason}")]
    DecodeError {
        /// Version whose data failed to decode (may be unknown locally)
        version: VersionNumber,
        /// Diagnostic
        reason: String,
    },

    /// Version is mutually supported but rejected by policy
    #[error("handshake refused version {version}: {reason}")]
    Refused {
        /// Refused version
        version: VersionNumber,
        /// Diagnostic
        reason: String,
    },
}

fn join_versions(versions: &[VersionNumber]) -> String {
    versions
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Rejection {
    /// Create a version mismatch listing the local table's versions
    pub fn version_mismatch(local: &VersionTable) -> Self {
        Self::VersionMismatch {
            valid_versions: local.versions(),
        }
    }

    /// Create a decode error for a version
    pub fn decode_error(version: VersionNumber, reason: impl Into<String>) -> Self {
        Self::DecodeError {
            version,
            reason: reason.into(),
        }
    }

    /// Create a policy refusal for a version
    pub fn refused(version: VersionNumber, reason: impl Into<String>) -> Self {
        Self::Refused {
            version,
            reason: reason.into(),
        }
    }

    /// Wire tag of this reason
    pub fn tag(&self) -> RejectionTag {
        match self {
            Self::VersionMismatch { .. } => RejectionTag::VersionMismatch,
            Self::DecodeError { .. } => RejectionTag::DecodeError,
            Self::Refused { .. } => RejectionTag::Refused,
        }
    }

    /// Version the rejection concerns, if it names one
    pub fn version(&self) -> Option<VersionNumber> {
        match self {
            Self::VersionMismatch { .. } => None,
            Self::DecodeError { version, .. } | Self::Refused { version, .. } => Some(*version),
        }
    }
}

impl Message {
    /// Create a PROPOSE message with the default versions for a network
    pub fn propose(magic: Magic) -> Self {
        Self::Propose(default_versions(magic))
    }

    /// Create a PROPOSE message from an explicit table
    pub fn propose_versions(versions: VersionTable) -> Self {
        Self::Propose(versions)
    }

    /// Create an ACCEPT message
    pub fn accept(version: VersionNumber, params: ParamValue) -> Self {
        Self::Accept { version, params }
    }

    /// Create a REFUSE message
    pub fn refuse(rejection: Rejection) -> Self {
        Self::Refuse(rejection)
    }

    /// Wire tag of this message
    pub fn tag(&self) -> MessageTag {
        match self {
            Self::Propose(_) => MessageTag::Propose,
            Self::Accept { .. } => MessageTag::Accept,
            Self::Refuse(_) => MessageTag::Refuse,
        }
    }

    /// Human-readable message name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Propose(_) => "PROPOSE",
            Self::Accept { .. } => "ACCEPT",
            Self::Refuse(_) => "REFUSE",
        }
    }

    /// Get the proposed versions
    pub fn get_versions(&self) -> Option<&VersionTable> {
        match self {
            Self::Propose(versions) => Some(versions),
            _ => None,
        }
    }

    /// Get rejection reason
    pub fn get_rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Refuse(rejection) => Some(rejection),
            _ => None,
        }
    }
}
