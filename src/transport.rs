use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::TokenProvider;
use crate::error::{ConnectError, SendError};

pub mod websocket;

pub type Handler = Arc<dyn Fn(&[Value]) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Handlers {
    inner: HashMap<String, Handler>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `method`. It runs on the transport's reader, concurrently
    /// with whatever task owns the connection, so it must not block.
    pub fn on<F>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.inner.insert(method.to_ascii_lowercase(), Arc::new(handler));
        self
    }

    pub fn dispatch(&self, method: &str, arguments: &[Value]) -> bool {
        match self.inner.get(&method.to_ascii_lowercase()) {
            Some(handler) => {
                handler(arguments);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.inner.keys()).finish()
    }
}

pub struct ConnectRequest {
    pub id: usize,
    pub url: String,
    pub tokens: Arc<TokenProvider>,
    pub handlers: Handlers,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Performs the handshake. `request.handlers` are live before the first byte is read.
    async fn connect(&self, request: ConnectRequest) -> Result<Box<dyn DuplexChannel>, ConnectError>;
}

#[async_trait]
pub trait DuplexChannel: Send {
    async fn send(&mut self, method: &str, arguments: Vec<Value>) -> Result<(), SendError>;

    async fn close(&mut self) -> Result<(), SendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispatches_case_insensitively() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let handlers = Handlers::new().on("Echo", move |args| {
            counter.fetch_add(args.len(), Ordering::Relaxed);
        });

        assert!(handlers.dispatch("echo", &[Value::from("id"), Value::from("1")]));
        assert!(handlers.dispatch("ECHO", &[Value::from("id")]));
        assert!(!handlers.dispatch("broadcast", &[]));
        assert_eq!(hits.load(Ordering::Relaxed), 3);
        assert_eq!(handlers.len(), 1);
    }
}
