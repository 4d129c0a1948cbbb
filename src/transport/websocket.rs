//! JSON hub protocol over a WebSocket, the transport the service exposes to clients.
//!
//! One connection is a split `tokio-tungstenite` stream: the write half lives in the
//! [`WebSocketChannel`] owned by the session task, and the read half is driven by a spawned
//! reader that dispatches inbound invocations to the registered handlers.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use log::{debug, warn};
use serde_json::Value;
use tokio::{net::TcpStream, task::JoinHandle, time::timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::{ConnectRequest, DuplexChannel, Handlers, Transport};
use crate::error::{ConnectError, SendError};
use crate::message::{records, HandshakeRequest, HandshakeResponse, HubMessage, RECORD_SEPARATOR};

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug)]
pub struct WebSocketTransport {
    handshake_timeout: Duration,
    send_timeout: Duration,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_SEND_TIMEOUT)
    }
}

impl WebSocketTransport {
    pub fn new(handshake_timeout: Duration, send_timeout: Duration) -> Self {
        Self {
            handshake_timeout,
            send_timeout,
        }
    }

    async fn handshake(
        &self,
        url: &Url,
        handlers: &Handlers,
        id: usize,
    ) -> Result<(SplitSink<Stream, Message>, SplitStream<Stream>), ConnectError> {
        let (stream, _) = connect_async(url.as_str()).await.map_err(|e| match e {
            tungstenite::Error::Http(response) => ConnectError::Rejected(response.status()),
            e => ConnectError::Transport(e),
        })?;

        let (mut write, mut read) = stream.split();

        let request = HandshakeRequest::default()
            .to_record()
            .map_err(|e| ConnectError::Handshake(e.to_string()))?;
        write.send(Message::Text(request)).await?;

        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    let (first, rest) = text
                        .split_once(RECORD_SEPARATOR)
                        .ok_or_else(|| ConnectError::Handshake("incomplete handshake response".to_string()))?;

                    let response: HandshakeResponse = first
                        .parse()
                        .map_err(|e| ConnectError::Handshake(format!("invalid handshake response: {}", e)))?;

                    if let Some(error) = response.error {
                        return Err(ConnectError::Handshake(error));
                    }

                    // The hub may pack its first messages into the handshake frame.
                    if !dispatch_frame(id, rest, handlers) {
                        return Err(ConnectError::Handshake("hub closed the connection".to_string()));
                    }

                    return Ok((write, read));
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(ConnectError::Handshake(
                        "connection closed during handshake".to_string(),
                    ));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, request: ConnectRequest) -> Result<Box<dyn DuplexChannel>, ConnectError> {
        let ConnectRequest {
            id,
            url,
            tokens,
            handlers,
        } = request;

        let token = tokens.generate_token(&url)?;
        let url = websocket_url(&url, &token)?;

        let (write, read) = timeout(self.handshake_timeout, self.handshake(&url, &handlers, id))
            .await
            .map_err(|_| ConnectError::HandshakeTimeout(self.handshake_timeout))??;

        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_loop(id, read, handlers, closed.clone()));

        Ok(Box::new(WebSocketChannel {
            id,
            write,
            closed,
            reader,
            send_timeout: self.send_timeout,
        }))
    }
}

pub struct WebSocketChannel {
    id: usize,
    write: SplitSink<Stream, Message>,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    send_timeout: Duration,
}

#[async_trait]
impl DuplexChannel for WebSocketChannel {
    async fn send(&mut self, method: &str, arguments: Vec<Value>) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }

        let record = HubMessage::invocation(method, arguments).to_record()?;

        timeout(self.send_timeout, self.write.send(Message::Text(record)))
            .await
            .map_err(|_| SendError::Timeout(self.send_timeout))??;

        Ok(())
    }

    async fn close(&mut self) -> Result<(), SendError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let record = HubMessage::Close {
                error: None,
                allow_reconnect: false,
            }
            .to_record()?;

            if let Err(e) = self.write.send(Message::Text(record)).await {
                debug!("Connection {}: failed to send close message: {}", self.id, e);
            }
        }

        let result = self.write.close().await;
        self.reader.abort();
        result.map_err(SendError::from)
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(id: usize, mut read: SplitStream<Stream>, handlers: Handlers, closed: Arc<AtomicBool>) {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if !dispatch_frame(id, &text, &handlers) {
                    break;
                }
            }
            Ok(Message::Close(frame)) => {
                debug!("Connection {} closed by hub: {:?}", id, frame);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!("Connection {} read error: {}", id, e);
                break;
            }
        }
    }

    closed.store(true, Ordering::Release);
}

/// Dispatches every record in `frame`. Returns false once the hub sent a close message.
fn dispatch_frame(id: usize, frame: &str, handlers: &Handlers) -> bool {
    for record in records(frame) {
        match record.parse::<HubMessage>() {
            Ok(HubMessage::Invocation {
                target, arguments, ..
            }) => {
                if !handlers.dispatch(&target, &arguments) {
                    debug!("Connection {}: no handler for `{}`", id, target);
                }
            }
            Ok(HubMessage::Close { error, .. }) => {
                debug!("Connection {} received close: {:?}", id, error);
                return false;
            }
            Ok(_) => {}
            Err(e) => warn!("Connection {} received an invalid message: {}", id, e),
        }
    }

    true
}

pub fn websocket_url(client_url: &str, token: &str) -> Result<Url, ConnectError> {
    let invalid = || ConnectError::InvalidUrl(client_url.to_string());

    let mut url = Url::parse(client_url).map_err(|_| invalid())?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(invalid()),
    };

    url.set_scheme(scheme).map_err(|_| invalid())?;
    url.query_pairs_mut().append_pair("access_token", token);

    Ok(url)
}
