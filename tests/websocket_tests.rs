use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{accept_async, tungstenite::Message};

use signalr_perf::error::{ConnectError, SendError};
use signalr_perf::transport::{
    websocket::WebSocketTransport, ConnectRequest, DuplexChannel, Handlers, Transport,
};

mod common;

use common::tokens;

const EARLY_ECHO: &str = "{\"type\":1,\"target\":\"echo\",\"arguments\":[\"id\",\"0\"]}\u{1e}";
const CLOSE: &str = "{\"type\":7}\u{1e}";

/// Answers one client's handshake with `reply`, then sends `then`. Keeps reading until the
/// client goes away unless `hang_up` is set, in which case the socket is dropped at once.
async fn scripted_hub(reply: String, then: Option<&'static str>, hang_up: bool) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        match ws.next().await {
            Some(Ok(Message::Text(handshake))) => assert!(handshake.contains("\"protocol\":\"json\"")),
            other => panic!("expected a handshake, got {:?}", other),
        }

        ws.send(Message::Text(reply)).await.unwrap();

        if let Some(frame) = then {
            ws.send(Message::Text(frame.to_string())).await.unwrap();
        }

        if hang_up {
            return;
        }

        while let Some(Ok(_)) = ws.next().await {}
    });

    port
}

async fn connect(port: u16, hits: Arc<AtomicUsize>) -> Box<dyn DuplexChannel> {
    let handlers = Handlers::new().on("echo", move |_| {
        hits.fetch_add(1, Ordering::SeqCst);
    });

    let request = ConnectRequest {
        id: 0,
        url: format!("http://127.0.0.1:{}/client/?hub=chat", port),
        tokens: Arc::new(tokens()),
        handlers,
    };

    WebSocketTransport::default().connect(request).await.unwrap()
}

async fn send_until_closed(channel: &mut Box<dyn DuplexChannel>) {
    timeout(Duration::from_secs(5), async {
        loop {
            match channel.send("echo", vec![Value::from("id"), Value::from("1")]).await {
                Err(SendError::Closed) => break,
                _ => sleep(Duration::from_millis(10)).await,
            }
        }
    })
    .await
    .expect("sends never reported a closed connection");
}

#[tokio::test]
async fn test_records_packed_into_handshake_are_dispatched() {
    let port = scripted_hub(format!("{{}}\u{1e}{}", EARLY_ECHO), None, false).await;
    let hits = Arc::new(AtomicUsize::new(0));

    let mut channel = connect(port, hits.clone()).await;

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    channel.send("echo", vec![Value::from("id"), Value::from("1")]).await.unwrap();
    channel.close().await.unwrap();
}

#[tokio::test]
async fn test_send_fails_closed_after_hub_close_message() {
    let port = scripted_hub(format!("{{}}\u{1e}{}", EARLY_ECHO), Some(CLOSE), false).await;
    let hits = Arc::new(AtomicUsize::new(0));

    let mut channel = connect(port, hits.clone()).await;
    send_until_closed(&mut channel).await;

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(matches!(
        channel.send("echo", vec![Value::from("id")]).await,
        Err(SendError::Closed)
    ));
}

#[tokio::test]
async fn test_send_fails_closed_after_hub_hangs_up() {
    let port = scripted_hub("{}\u{1e}".to_string(), None, true).await;
    let hits = Arc::new(AtomicUsize::new(0));

    let mut channel = connect(port, hits.clone()).await;
    send_until_closed(&mut channel).await;

    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_handshake_error_fails_the_connection() {
    let port = scripted_hub("{\"error\":\"unsupported protocol\"}\u{1e}".to_string(), None, false).await;

    let request = ConnectRequest {
        id: 0,
        url: format!("http://127.0.0.1:{}/client/?hub=chat", port),
        tokens: Arc::new(tokens()),
        handlers: Handlers::new(),
    };

    match WebSocketTransport::default().connect(request).await {
        Err(ConnectError::Handshake(reason)) => assert!(reason.contains("unsupported protocol"), "{}", reason),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("handshake error was accepted"),
    }
}
