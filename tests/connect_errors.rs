mod common;

use common::MockBroker;
use std::time::Duration;
use stomp_websocket::{ConnError, ConnectOptions, Frame, Transport};

fn options() -> ConnectOptions {
    ConnectOptions::default().with_heartbeat("0,0")
}

#[tokio::test]
async fn error_instead_of_connected_is_a_rejection() {
    let broker = MockBroker::bind().await;
    let url = broker.url();
    let client = tokio::spawn(async move {
        Transport::connect(&url, &options().with_credentials("guest", "wrong")).await
    });

    let mut conn = broker.accept().await;
    let connect = conn.next_frame().await;
    assert_eq!(connect.get_header("login"), Some("guest"));
    conn.send(
        Frame::new("ERROR")
            .header("message", "access refused")
            .set_body("bad credentials"),
    )
    .await;

    match client.await.unwrap() {
        Err(ConnError::ServerRejected(err)) => {
            assert_eq!(err.message, "access refused");
            assert_eq!(err.body.as_deref(), Some("bad credentials"));
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("handshake should have failed"),
    }
}

#[tokio::test]
async fn close_before_connected() {
    let broker = MockBroker::bind().await;
    let url = broker.url();
    let client = tokio::spawn(async move { Transport::connect(&url, &options()).await });

    let mut conn = broker.accept().await;
    conn.next_frame().await;
    conn.close().await;

    assert!(matches!(client.await.unwrap(), Err(ConnError::Closed)));
}

#[tokio::test]
async fn silent_broker_times_out() {
    let broker = MockBroker::bind().await;
    let url = broker.url();
    let opts = options().with_handshake_timeout(Duration::from_millis(200));
    let client = tokio::spawn(async move { Transport::connect(&url, &opts).await });

    let mut conn = broker.accept().await;
    conn.next_frame().await;

    match client.await.unwrap() {
        Err(ConnError::HandshakeTimeout(d)) => assert_eq!(d, Duration::from_millis(200)),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("handshake should have timed out"),
    }
    drop(conn);
}

#[tokio::test]
async fn connected_frame_sets_version_and_heartbeats() {
    let broker = MockBroker::bind().await;
    let url = broker.url();
    let opts = options().with_heartbeat("1000,0");
    let client = tokio::spawn(async move { Transport::connect(&url, &opts).await });

    let mut conn = broker.accept().await;
    conn.next_frame().await;
    conn.send(
        Frame::new("CONNECTED")
            .header("version", "1.2")
            .header("server", "mock/1.0")
            .header("heart-beat", "0,2000"),
    )
    .await;

    let transport = client.await.unwrap().expect("handshake");
    assert_eq!(transport.version(), "1.2");
    assert_eq!(transport.server(), Some("mock/1.0"));
    assert_eq!(
        transport.heartbeats(),
        (Some(Duration::from_millis(2000)), None)
    );
}

#[tokio::test]
async fn unreachable_endpoint_fails() {
    let broker = MockBroker::bind().await;
    let url = broker.url();
    drop(broker);
    let err = Transport::connect(&url, &options()).await.err().expect("must fail");
    assert!(matches!(err, ConnError::WebSocket(_)));
}
