//! Transport layer for the handshake.
//!
//! Runs one [`Handshake`] over any async byte stream:
//! - **Framing**: [`FramedStream`] carries one message per frame
//! - **TCP**: [`HandshakeServer`] accepts connections, [`connect`] dials one
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Handshake (state machine)        │
//! └──────────────────┬──────────────────────┘
//!                    │ Message
//!          ┌─────────┴─────────┐
//!          ▼                   ▼
//!   codec::encode        codec::decode
//!          │                   ▲
//!          ▼                   │
//! ┌─────────────────────────────────────────┐
//! │   FramedStream (u32 length + CBOR)      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Deadlines are the caller's business; [`with_timeout`] is provided for
//! callers that want one.

mod framed;
mod tcp;

pub use framed::{FramedStream, DEFAULT_MAX_FRAME_SIZE};
pub use tcp::{connect, HandshakeServer};

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{HandshakeError, Result};
use crate::protocol::{Agreement, Handshake};

/// Run the initiator side: send PROPOSE, wait for the reply.
pub async fn initiate<S>(
    stream: &mut FramedStream<S>,
    handshake: &mut Handshake,
) -> Result<Agreement>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let proposal = handshake.propose()?;
    stream.send(&proposal).await?;

    let reply = stream.recv_frame().await?;
    handshake.receive_reply_bytes(&reply)
}

/// Run the responder side: wait for PROPOSE, send ACCEPT or REFUSE.
pub async fn accept<S>(
    stream: &mut FramedStream<S>,
    handshake: &mut Handshake,
) -> Result<Agreement>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let proposal = stream.recv_frame().await?;
    let reply = handshake.respond_bytes(&proposal)?;
    stream.send(&reply).await?;

    handshake.outcome().ok_or_else(|| {
        HandshakeError::Protocol(format!(
            "handshake {} did not complete (state {:?})",
            handshake.id(),
            handshake.state()
        ))
    })?
}

/// Bound a handshake future by a deadline in seconds
pub async fn with_timeout<T>(secs: u64, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(Duration::from_secs(secs), fut)
        .await
        .map_err(|_| HandshakeError::Timeout(secs))?
}
