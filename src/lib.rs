//! # Handshake - Version Negotiation for Node-to-Node Connections
//!
//! The first exchange on a newly opened connection. Two peers agree on a
//! shared protocol version and the version-specific parameters that govern
//! everything sent afterwards. Every implementation on the wire must make
//! the same choice for the same inputs, so the selection rule and the
//! failure semantics are fixed.
//!
//! ## Features
//!
//! - **Version catalog**: versions 1-6 for a network magic
//! - **Negotiation**: highest shared version, local parameters
//! - **CBOR wire codec**: tagged messages, deterministic encoding
//! - **Acceptance policy**: magic check and disabled versions
//! - **Transport**: length-prefixed framing over TCP or any async stream
//!
//! ## Protocol Overview
//!
//! ```text
//! Initiator                          Responder
//!    |                                  |
//!    |------ PROPOSE {v => params} ---->|
//!    |<----- ACCEPT (v, params) --------|  v = max(local ∩ remote)
//!    |     or REFUSE (reason)           |
//! ```
//!
//! ### State Machine
//!
//! ```text
//!               propose()
//!     [Idle] ───────────────> [ProposalSent]
//!        │                          │
//!        │ respond()                │ receive_reply()
//!        v                          v
//!  [ProposalReceived] ──────> [Accepted] / [Rejected]
//! ```
//!
//! ### Message Types
//!
//! | Type    | Tag | Direction            | Purpose                          |
//! |---------|-----|----------------------|----------------------------------|
//! | PROPOSE | 0   | Initiator→Responder  | Offer every supported version    |
//! | ACCEPT  | 1   | Responder→Initiator  | Agreed version and parameters    |
//! | REFUSE  | 2   | Responder→Initiator  | Mismatch, decode error, refusal  |
//!
//! ## Quick Start
//!
//! ```rust
//! use handshake::{codec, default_versions, intersect, Handshake, MAINNET_MAGIC};
//!
//! // Pure negotiation
//! let local = default_versions(MAINNET_MAGIC);
//! let agreed = intersect(&local, &default_versions(MAINNET_MAGIC)).unwrap();
//! assert_eq!(agreed.version, 6);
//!
//! // Full exchange through the wire codec
//! let mut client = Handshake::new(local.clone()).unwrap();
//! let mut server = Handshake::new(local).unwrap();
//!
//! let bytes = codec::encode(&client.propose().unwrap()).unwrap();
//! let reply = server.respond_bytes(&bytes).unwrap();
//! let reply_bytes = codec::encode(&reply).unwrap();
//! assert_eq!(client.receive_reply_bytes(&reply_bytes).unwrap(), agreed);
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Catalog, messages, negotiation, state machine
//! - [`codec`]: CBOR wire codec
//! - [`transport`]: Framing, TCP server and client
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
pub use config::Config;
pub use error::{HandshakeError, Result};
pub use protocol::{
    default_versions, intersect, Agreement, Handshake, HandshakeState, Message, ParamValue,
    Rejection, VersionNumber, VersionTable, MAINNET_MAGIC,
};
pub use transport::{FramedStream, HandshakeServer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
