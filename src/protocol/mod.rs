//! Version-negotiation handshake.
//!
//! The first exchange on a new connection. Both peers agree on one
//! protocol version and the parameters that govern the rest of the
//! connection.
//!
//! # Protocol Overview
//!
//! ## Message Flow
//!
//! ```text
//! Initiator                          Responder
//!    |                                  |
//!    |------ PROPOSE (versions) ------->|  Every version we speak
//!    |                                  |
//!    |<----- ACCEPT (version, params) --|  Highest shared version
//!    |     or REFUSE (reason)           |  or terminal rejection
//! ```
//!
//! ## State Machine
//!
//! | State              | Description                    | Valid Transitions     |
//! |--------------------|--------------------------------|-----------------------|
//! | `Idle`             | Nothing exchanged              | → ProposalSent, ProposalReceived |
//! | `ProposalSent`     | PROPOSE sent, awaiting reply   | → Accepted, Rejected  |
//! | `ProposalReceived` | PROPOSE received, negotiating  | → Accepted, Rejected  |
//! | `Accepted`         | Version agreed                 | (terminal)            |
//! | `Rejected`         | Negotiation failed             | (terminal)            |
//!
//! ## Rejection Reasons
//!
//! | Reason            | Meaning                                     |
//! |-------------------|---------------------------------------------|
//! | `VersionMismatch` | No shared version; lists ours               |
//! | `DecodeError`     | Data for a version could not be parsed      |
//! | `Refused`         | Shared version rejected by policy           |
//!
//! # Usage
//!
//! ```rust
//! use handshake::protocol::{default_versions, Handshake, MAINNET_MAGIC};
//!
//! let mut client = Handshake::new(default_versions(MAINNET_MAGIC)).unwrap();
//! let mut server = Handshake::new(default_versions(MAINNET_MAGIC)).unwrap();
//!
//! let proposal = client.propose().unwrap();
//! let reply = server.respond(&proposal).unwrap();
//! let agreed = client.receive_reply(&reply).unwrap();
//! assert_eq!(agreed.version, 6);
//! ```

mod message;
mod negotiate;
mod session;
mod versions;

pub use message::{Message, MessageTag, Rejection, RejectionTag};
pub use negotiate::{
    intersect, negotiate, AcceptAll, AcceptPolicy, Agreement, NetworkPolicy, NoIntersection,
};
pub use session::{Handshake, HandshakeState, Role};
pub use versions::{
    default_versions, Magic, ParamShape, ParamValue, VersionNumber, VersionTable,
    FIRST_PAIR_VERSION, MAX_VERSION, MIN_VERSION,
};

/// Network magic of the main network
pub const MAINNET_MAGIC: Magic = 764824073;
