//! End-to-end handshake tests.
//!
//! These tests run complete handshakes over in-memory streams and real
//! TCP connections, including many peers at once against one server.

use std::time::Duration;

use handshake::config::Config;
use handshake::protocol::{default_versions, Handshake, ParamValue, Rejection, VersionTable};
use handshake::transport::{self, FramedStream, HandshakeServer};
use handshake::{HandshakeError, MAINNET_MAGIC};
use tokio::net::TcpListener;
use tokio::time::timeout;

/// Start a server on an ephemeral port and return its address
async fn start_server(config: Config) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = HandshakeServer::from_config(&config).unwrap();

    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    addr
}

#[tokio::test]
async fn test_tcp_handshake_accepts_highest_version() {
    let addr = start_server(Config::default()).await;

    let agreed = timeout(
        Duration::from_secs(5),
        transport::connect(&addr, &Config::default()),
    )
    .await
    .expect("handshake timed out")
    .expect("handshake failed");

    assert_eq!(agreed.version, 6);
    assert_eq!(agreed.params, ParamValue::Pair(MAINNET_MAGIC, false));
}

#[tokio::test]
async fn test_tcp_many_concurrent_peers() {
    let addr = start_server(Config::default()).await;

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let addr = addr.clone();
        tasks.push(tokio::spawn(async move {
            transport::connect(&addr, &Config::default()).await
        }));
    }

    for task in tasks {
        let agreed = task.await.unwrap().unwrap();
        assert_eq!(agreed.version, 6);
    }
}

#[tokio::test]
async fn test_tcp_refused_version() {
    let mut server_config = Config::default();
    server_config.policy.refused_versions = vec![6];
    let addr = start_server(server_config).await;

    let err = transport::connect(&addr, &Config::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err.rejection(),
        Some(Rejection::Refused { version: 6, .. })
    ));
}

#[tokio::test]
async fn test_tcp_magic_mismatch() {
    let mut server_config = Config::default();
    server_config.policy.enforce_magic = true;
    let addr = start_server(server_config).await;

    let mut client_config = Config::default();
    client_config.network.magic = 1097911063;

    let err = transport::connect(&addr, &client_config).await.unwrap_err();
    assert!(matches!(
        err.rejection(),
        Some(Rejection::Refused { version: 6, .. })
    ));

    // without the check any magic is accepted
    let addr = start_server(Config::default()).await;
    let agreed = transport::connect(&addr, &client_config).await.unwrap();
    assert_eq!(agreed.params.magic(), 1097911063);
}

#[tokio::test]
async fn test_older_peer_downgrades() {
    let (a, b) = tokio::io::duplex(1024);
    let mut client_stream = FramedStream::new(a);
    let server = HandshakeServer::from_config(&Config::default()).unwrap();

    // a peer that only speaks the scalar versions
    let old: VersionTable = (1..=3)
        .map(|v| (v, ParamValue::Scalar(MAINNET_MAGIC)))
        .collect();
    let mut client = Handshake::new(old).unwrap();

    let (client_result, server_result) = tokio::join!(
        transport::initiate(&mut client_stream, &mut client),
        server.handle(b),
    );

    assert_eq!(client_result.unwrap().version, 3);
    let agreed = server_result.unwrap();
    assert_eq!(agreed.version, 3);
    assert_eq!(agreed.params, ParamValue::Scalar(MAINNET_MAGIC));
}

#[tokio::test]
async fn test_newer_peer_with_unknown_versions() {
    let (a, b) = tokio::io::duplex(1024);
    let mut client_stream = FramedStream::new(a);
    let server = HandshakeServer::from_config(&Config::default()).unwrap();

    let newer = default_versions(MAINNET_MAGIC)
        .with(7, ParamValue::Pair(MAINNET_MAGIC, true))
        .with(8, ParamValue::Scalar(MAINNET_MAGIC));
    let mut client = Handshake::new(newer).unwrap();

    let (client_result, server_result) = tokio::join!(
        transport::initiate(&mut client_stream, &mut client),
        server.handle(b),
    );

    assert_eq!(client_result.unwrap().version, 6);
    assert_eq!(server_result.unwrap().version, 6);
}

#[tokio::test]
async fn test_garbage_proposal_fails_responder() {
    let (a, b) = tokio::io::duplex(1024);
    let mut client_stream = FramedStream::new(a);
    let server = HandshakeServer::from_config(&Config::default()).unwrap();

    client_stream.send_frame(&[0xff, 0x00]).await.unwrap();
    let result = server.handle(b).await;

    assert!(matches!(result, Err(HandshakeError::Codec(_))));
}

#[tokio::test]
async fn test_malformed_params_answered_with_decode_error() {
    let (a, b) = tokio::io::duplex(1024);
    let mut client_stream = FramedStream::new(a);
    let server = HandshakeServer::from_config(&Config::default()).unwrap();

    // [0, {6: 764824073}]: version 6 expects a pair
    let proposal = [0x82, 0x00, 0xa1, 0x06, 0x1a, 0x2d, 0x96, 0x4a, 0x09];

    let (sent, server_result) = tokio::join!(
        async {
            client_stream.send_frame(&proposal).await.unwrap();
            client_stream.recv().await
        },
        server.handle(b),
    );

    let reply = sent.unwrap();
    assert!(matches!(
        reply.get_rejection(),
        Some(Rejection::DecodeError { version: 6, .. })
    ));
    assert!(server_result.is_err());
}

#[tokio::test]
async fn test_server_timeout_when_peer_is_silent() {
    let mut config = Config::default();
    config.transport.timeout_secs = 0;
    let server = HandshakeServer::from_config(&config).unwrap();

    let (_a, b) = tokio::io::duplex(64);
    let result = server.handle(b).await;

    assert!(matches!(result, Err(HandshakeError::Timeout(0))));
}

#[tokio::test]
async fn test_truncated_params_answered_with_decode_error() {
    let (a, b) = tokio::io::duplex(1024);
    let mut client_stream = FramedStream::new(a);
    let server = HandshakeServer::from_config(&Config::default()).unwrap();

    // [0, {5: [764824073, <flag cut off>
    let proposal = [0x82, 0x00, 0xa1, 0x05, 0x82, 0x1a, 0x2d, 0x96, 0x4a, 0x09];

    let (sent, server_result) = tokio::join!(
        async {
            client_stream.send_frame(&proposal).await.unwrap();
            client_stream.recv().await
        },
        server.handle(b),
    );

    assert!(matches!(
        sent.unwrap().get_rejection(),
        Some(Rejection::DecodeError { version: 5, .. })
    ));
    assert!(server_result.is_err());
}

#[tokio::test]
async fn test_server_survives_dropped_peers() {
    let addr = start_server(Config::default()).await;

    for _ in 0..8 {
        let stream = tokio::net::TcpStream::connect(&addr).await.unwrap();
        drop(stream);
    }

    let agreed = timeout(
        Duration::from_secs(5),
        transport::connect(&addr, &Config::default()),
    )
    .await
    .expect("handshake timed out")
    .expect("handshake failed");
    assert_eq!(agreed.version, 6);
}
