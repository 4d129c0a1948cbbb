//! A minimal hub that speaks the JSON hub protocol and echoes every `echo` invocation back
//! to its sender. Used to exercise the harness end to end without the real service.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ws::{Message as WebSocketMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_channel::mpsc::{unbounded, UnboundedSender};
use futures_util::{future, pin_mut, StreamExt, TryStreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::task::JoinHandle;

use crate::auth::TokenProvider;
use crate::error::HarnessError;
use crate::message::{records, HandshakeRequest, HandshakeResponse, HubMessage, PROTOCOL_NAME, RECORD_SEPARATOR};
use crate::workload::ECHO_METHOD;

type Sender = UnboundedSender<WebSocketMessage>;

#[derive(Debug)]
struct HubState {
    hub: String,
    audience: String,
    tokens: TokenProvider,
}

#[derive(Deserialize, Debug)]
struct ClientQuery {
    hub: Option<String>,
    access_token: Option<String>,
}

pub struct EchoHub {
    state: Arc<HubState>,
}

impl EchoHub {
    /// `audience` is the client url tokens must have been minted for.
    pub fn new(hub: &str, audience: &str, tokens: TokenProvider) -> Self {
        Self {
            state: Arc::new(HubState {
                hub: hub.to_string(),
                audience: audience.to_string(),
                tokens,
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/client/", get(Self::client_handler))
            .with_state(self.state.clone())
    }

    pub async fn run(self, addr: SocketAddr) -> Result<(), HarnessError> {
        info!("Echo hub `{}` listening on: {}", self.state.hub, addr);

        axum::Server::try_bind(&addr)?
            .serve(self.router().into_make_service())
            .await?;

        Ok(())
    }

    pub fn spawn(self, listener: std::net::TcpListener) -> Result<(SocketAddr, JoinHandle<()>), HarnessError> {
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let server = axum::Server::from_tcp(listener)?.serve(self.router().into_make_service());

        info!("Echo hub `{}` listening on: {}", self.state.hub, addr);

        let handle = tokio::spawn(async move {
            if let Err(e) = server.await {
                warn!("Echo hub exited unexpectedly: {}", e);
            }
        });

        Ok((addr, handle))
    }

    async fn client_handler(
        ws: WebSocketUpgrade,
        Query(query): Query<ClientQuery>,
        State(state): State<Arc<HubState>>,
    ) -> Response {
        let hub_matches = query
            .hub
            .as_deref()
            .map_or(false, |hub| hub.eq_ignore_ascii_case(&state.hub));

        if !hub_matches {
            return (StatusCode::NOT_FOUND, "hub not found").into_response();
        }

        let token = match query.access_token {
            Some(token) => token,
            None => return (StatusCode::UNAUTHORIZED, "missing access token").into_response(),
        };

        if let Err(e) = state.tokens.verify(&token, &state.audience) {
            debug!("Rejected client: {}", e);
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }

        ws.on_upgrade(move |socket| async move {
            if let Err(e) = Self::handle_client(socket).await {
                debug!("Client connection ended with error: {}", e);
            }
        })
    }

    async fn handle_client(mut socket: WebSocket) -> Result<(), axum::Error> {
        let handshake = loop {
            match socket.recv().await {
                Some(Ok(WebSocketMessage::Text(text))) => break text,
                Some(Ok(WebSocketMessage::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e),
            }
        };

        let (request, rest) = handshake
            .split_once(RECORD_SEPARATOR)
            .unwrap_or((handshake.as_str(), ""));

        let response = match request.parse::<HandshakeRequest>() {
            Ok(req) if req.protocol == PROTOCOL_NAME => HandshakeResponse::default(),
            Ok(req) => HandshakeResponse {
                error: Some(format!("protocol `{}` is not supported", req.protocol)),
            },
            Err(e) => HandshakeResponse {
                error: Some(format!("invalid handshake: {}", e)),
            },
        };

        let accepted = response.error.is_none();
        let record = response.to_record().map_err(axum::Error::new)?;
        socket.send(WebSocketMessage::Text(record)).await?;

        if !accepted {
            return socket.close().await;
        }

        let (sender, receiver) = unbounded::<WebSocketMessage>();

        if !echo_records(rest, &sender) {
            return Ok(());
        }

        let (write, read) = socket.split();

        let echo_incoming = read.try_for_each(|msg| {
            let sender = sender.clone();

            async move {
                match msg {
                    WebSocketMessage::Text(text) => {
                        if !echo_records(&text, &sender) {
                            sender.close_channel();
                        }
                    }
                    WebSocketMessage::Close(_) => sender.close_channel(),
                    _ => {}
                }

                Ok(())
            }
        });

        let send_outgoing = receiver.map(Ok).forward(write);

        pin_mut!(echo_incoming, send_outgoing);
        future::select(echo_incoming, send_outgoing).await;

        Ok(())
    }
}

/// Queues an echo for every `echo` invocation in `frame`. Returns false once the client
/// asked to close.
fn echo_records(frame: &str, sender: &Sender) -> bool {
    for record in records(frame) {
        match record.parse::<HubMessage>() {
            Ok(HubMessage::Invocation { target, arguments, .. }) if target.eq_ignore_ascii_case(ECHO_METHOD) => {
                match HubMessage::invocation(ECHO_METHOD, arguments).to_record() {
                    Ok(echo) => {
                        if sender.unbounded_send(WebSocketMessage::Text(echo)).is_err() {
                            return false;
                        }
                    }
                    Err(e) => warn!("Failed to encode echo: {}", e),
                }
            }
            Ok(HubMessage::Close { .. }) => return false,
            Ok(_) => {}
            Err(e) => warn!("Received an invalid message: {}", e),
        }
    }

    true
}
