use std::sync::Arc;

use serde_json::Value;

use signalr_perf::config::TargetEndpoint;
use signalr_perf::connection::{Connection, ConnectionState};
use signalr_perf::error::{ConnectError, SendError};
use signalr_perf::transport::Handlers;

mod common;

use common::{tokens, StubTransport};

fn endpoint() -> TargetEndpoint {
    TargetEndpoint::new("http://127.0.0.1", 5001, "chat").unwrap()
}

#[tokio::test]
async fn test_failed_handshake_marks_connection_failed() {
    let transport = StubTransport::new().refusing(|_| true);
    let mut conn = Connection::new(7, Handlers::new());

    assert_eq!(conn.state(), ConnectionState::Pending);

    let err = conn
        .connect(&endpoint(), Arc::new(tokens()), &transport)
        .await
        .unwrap_err();

    assert!(matches!(err, ConnectError::Handshake(_)));
    assert_eq!(conn.state(), ConnectionState::Failed);
    assert!(conn.last_error().unwrap().contains("7"));

    let err = conn.send("echo", vec![]).await.unwrap_err();
    assert!(matches!(err, SendError::NotConnected));
}

#[tokio::test]
async fn test_pending_connection_cannot_send() {
    let mut conn = Connection::new(0, Handlers::new());

    let err = conn.send("echo", vec![Value::from("id")]).await.unwrap_err();
    assert!(matches!(err, SendError::NotConnected));
}

#[tokio::test]
async fn test_open_send_and_close() {
    let transport = StubTransport::new();
    let mut conn = Connection::open(1, Handlers::new(), &endpoint(), Arc::new(tokens()), &transport)
        .await
        .unwrap();

    assert!(conn.is_connected());
    conn.send("echo", vec![Value::from("id"), Value::from("1")]).await.unwrap();
    assert_eq!(transport.sends_issued(), 1);

    // A connected handle is not reconnected.
    assert!(conn.connect(&endpoint(), Arc::new(tokens()), &transport).await.is_err());
    assert!(conn.is_connected());

    conn.close().await;
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert_eq!(transport.closed(), 1);

    let err = conn.send("echo", vec![]).await.unwrap_err();
    assert!(matches!(err, SendError::NotConnected));

    // Closing twice is harmless.
    conn.close().await;
    assert_eq!(transport.closed(), 1);
}
