use std::sync::Arc;

use log::debug;
use serde_json::Value;

use crate::auth::TokenProvider;
use crate::config::TargetEndpoint;
use crate::error::{ConnectError, SendError};
use crate::transport::{ConnectRequest, DuplexChannel, Handlers, Transport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Pending,
    Connected,
    Failed,
    Closed,
}

/// One client connection to the hub. Owned by a single task at a time, so sends on it are
/// never interleaved.
pub struct Connection {
    pub id: usize,
    state: ConnectionState,
    handlers: Handlers,
    channel: Option<Box<dyn DuplexChannel>>,
    last_error: Option<String>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("handlers", &self.handlers)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(id: usize, handlers: Handlers) -> Self {
        Self {
            id,
            state: ConnectionState::Pending,
            handlers,
            channel: None,
            last_error: None,
        }
    }

    pub async fn open(
        id: usize,
        handlers: Handlers,
        endpoint: &TargetEndpoint,
        tokens: Arc<TokenProvider>,
        transport: &dyn Transport,
    ) -> Result<Self, ConnectError> {
        let mut conn = Self::new(id, handlers);
        conn.connect(endpoint, tokens, transport).await?;
        Ok(conn)
    }

    pub async fn connect(
        &mut self,
        endpoint: &TargetEndpoint,
        tokens: Arc<TokenProvider>,
        transport: &dyn Transport,
    ) -> Result<(), ConnectError> {
        if self.state != ConnectionState::Pending {
            return Err(ConnectError::Handshake(format!(
                "connection {} is {:?}, not pending",
                self.id, self.state
            )));
        }

        let request = ConnectRequest {
            id: self.id,
            url: endpoint.client_url.clone(),
            tokens,
            handlers: self.handlers.clone(),
        };

        match transport.connect(request).await {
            Ok(channel) => {
                self.channel = Some(channel);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Failed;
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn send(&mut self, method: &str, arguments: Vec<Value>) -> Result<(), SendError> {
        let channel = match (self.state, self.channel.as_mut()) {
            (ConnectionState::Connected, Some(channel)) => channel,
            _ => return Err(SendError::NotConnected),
        };

        let result = channel.send(method, arguments).await;
        if let Err(e) = &result {
            self.last_error = Some(e.to_string());
        }

        result
    }

    /// Best-effort graceful close. Errors are logged and swallowed.
    pub async fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                debug!("Connection {}: error while closing: {}", self.id, e);
            }
        }

        if self.state == ConnectionState::Connected {
            self.state = ConnectionState::Closed;
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
