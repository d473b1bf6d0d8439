//! TCP transport for the handshake.
//!
//! The server shares one immutable version table and one policy across
//! every connection; each connection gets its own [`Handshake`].

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

use super::{accept, initiate, with_timeout, FramedStream};
use crate::config::Config;
use crate::error::{HandshakeError, Result};
use crate::protocol::{AcceptPolicy, Agreement, Handshake, VersionTable};

/// Pause after a failed accept
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Responder that handshakes every accepted TCP connection.
#[derive(Clone)]
pub struct HandshakeServer {
    /// Local version table
    local: Arc<VersionTable>,
    /// Acceptance policy
    policy: Arc<dyn AcceptPolicy>,
    /// Maximum frame size
    max_frame_size: usize,
    /// Seconds to wait for a proposal
    timeout_secs: u64,
}

impl HandshakeServer {
    /// Create a server from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let local = config.versions();
        if local.is_empty() {
            return Err(HandshakeError::Config(
                "local version table is empty".to_string(),
            ));
        }

        Ok(Self {
            local: Arc::new(local),
            policy: config.policy(),
            max_frame_size: config.transport.max_frame_size,
            timeout_secs: config.transport.timeout_secs,
        })
    }

    /// Local version table
    pub fn versions(&self) -> &VersionTable {
        &self.local
    }

    /// Create the handshake for one connection
    pub fn handshake(&self) -> Result<Handshake> {
        Ok(Handshake::new(Arc::clone(&self.local))?.with_policy(Arc::clone(&self.policy)))
    }

    /// Run the responder side on one stream
    pub async fn handle<S>(&self, stream: S) -> Result<Agreement>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut handshake = self.handshake()?;
        let mut framed = FramedStream::with_max_frame_size(stream, self.max_frame_size);
        with_timeout(self.timeout_secs, accept(&mut framed, &mut handshake)).await
    }

    /// Accept connections forever.
    ///
    /// Each connection is handshaked on its own task; outcomes are logged.
    /// Accept errors (out of file descriptors, aborted connections) are
    /// logged and the loop keeps going after a short pause.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        tracing::info!("Handshake server listening on {}", listener.local_addr()?);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                },
            };
            let server = self.clone();

            tokio::spawn(async move {
                match server.handle(stream).await {
                    Ok(agreed) => tracing::info!(
                        %peer,
                        version = agreed.version,
                        params = %agreed.params,
                        "handshake accepted"
                    ),
                    Err(e) => tracing::warn!(%peer, "handshake failed: {}", e),
                }
            });
        }
    }
}

impl std::fmt::Debug for HandshakeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeServer")
            .field("versions", &self.local.versions())
            .field("max_frame_size", &self.max_frame_size)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Dial `addr` and run the initiator side.
pub async fn connect(addr: &str, config: &Config) -> Result<Agreement> {
    let stream = TcpStream::connect(addr).await?;
    tracing::debug!("Connected to {}", addr);

    let mut handshake = config.handshake()?;
    let mut framed = FramedStream::with_max_frame_size(stream, config.transport.max_frame_size);
    with_timeout(
        config.transport.timeout_secs,
        initiate(&mut framed, &mut handshake),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_from_default_config() {
        let server = HandshakeServer::from_config(&Config::default()).unwrap();
        assert_eq!(server.versions().len(), 6);
        assert_eq!(server.timeout_secs, 10);
    }

    #[test]
    fn test_handshakes_share_catalog() {
        let server = HandshakeServer::from_config(&Config::default()).unwrap();
        let a = server.handshake().unwrap();
        let b = server.handshake().unwrap();

        assert_ne!(a.id(), b.id());
        assert!(std::ptr::eq(a.local_versions(), b.local_versions()));
    }
}
