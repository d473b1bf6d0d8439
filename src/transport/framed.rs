//! Length-prefixed framing over an async byte stream.
//!
//! Each frame is a big-endian `u32` length followed by that many bytes of
//! CBOR. One handshake message travels in one frame.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec;
use crate::error::{HandshakeError, Result};
use crate::protocol::Message;

/// Default maximum frame size (64 KiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Byte stream carrying framed handshake messages.
#[derive(Debug)]
pub struct FramedStream<S> {
    inner: S,
    max_frame_size: usize,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream with the default frame limit
    pub fn new(inner: S) -> Self {
        Self::with_max_frame_size(inner, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Wrap a stream with an explicit frame limit
    pub fn with_max_frame_size(inner: S, max_frame_size: usize) -> Self {
        Self {
            inner,
            max_frame_size,
        }
    }

    /// Write one frame
    pub async fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_frame_size {
            return Err(HandshakeError::FrameTooLarge {
                size: payload.len(),
                max: self.max_frame_size,
            });
        }

        let len = u32::try_from(payload.len()).map_err(|_| HandshakeError::FrameTooLarge {
            size: payload.len(),
            max: self.max_frame_size,
        })?;
        self.inner.write_u32(len).await?;
        self.inner.write_all(payload).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Read one frame
    pub async fn recv_frame(&mut self) -> Result<Vec<u8>> {
        let len = self.inner.read_u32().await? as usize;
        if len > self.max_frame_size {
            return Err(HandshakeError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }

        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Encode and send a message
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let bytes = codec::encode(message)?;
        tracing::trace!(msg = message.name(), bytes = bytes.len(), "send");
        self.send_frame(&bytes).await
    }

    /// Receive and decode a message
    pub async fn recv(&mut self) -> Result<Message> {
        let bytes = self.recv_frame().await?;
        codec::decode(&bytes)
    }

    /// Unwrap the underlying stream
    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MAINNET_MAGIC;

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let (a, b) = tokio::io::duplex(1024);
        let mut tx = FramedStream::new(a);
        let mut rx = FramedStream::new(b);

        let msg = Message::propose(MAINNET_MAGIC);
        tx.send(&msg).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), msg);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (a, b) = tokio::io::duplex(1024);
        let mut tx = FramedStream::new(a);
        let mut rx = FramedStream::with_max_frame_size(b, 4);

        tx.send_frame(&[0u8; 16]).await.unwrap();
        assert!(matches!(
            rx.recv_frame().await,
            Err(HandshakeError::FrameTooLarge { size: 16, max: 4 })
        ));

        let mut small = FramedStream::with_max_frame_size(tokio::io::duplex(64).0, 2);
        assert!(small.send_frame(&[1, 2, 3]).await.is_err());
    }

    #[tokio::test]
    async fn test_closed_stream_is_io_error() {
        let (a, b) = tokio::io::duplex(64);
        drop(a);
        let mut rx = FramedStream::new(b);
        assert!(matches!(rx.recv_frame().await, Err(HandshakeError::Io(_))));
    }
}
