#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::{sleep, Instant};

use signalr_perf::auth::{Credential, TokenProvider};
use signalr_perf::config::{HarnessConfig, TargetEndpoint};
use signalr_perf::context::HarnessContext;
use signalr_perf::error::{ConnectError, SendError};
use signalr_perf::stats::Stats;
use signalr_perf::transport::{ConnectRequest, DuplexChannel, Handlers, Transport};

pub const ACCESS_KEY: &str = "perf-test-access-key";

pub fn tokens() -> TokenProvider {
    TokenProvider::new(
        Credential::from_access_key(ACCESS_KEY).unwrap(),
        chrono::Duration::hours(24),
    )
}

pub fn context(config: HarnessConfig) -> Arc<HarnessContext> {
    let endpoint = TargetEndpoint::new("http://127.0.0.1", 5001, "chat").unwrap();
    Arc::new(HarnessContext::new(config, endpoint, tokens(), Stats::new().unwrap()))
}

pub fn config(total: usize, concurrency: usize) -> HarnessConfig {
    HarnessConfig {
        total_connections: total,
        concurrency,
        burst_interval: Duration::ZERO,
        ..HarnessConfig::default()
    }
}

type Predicate = Box<dyn Fn(usize) -> bool + Send + Sync>;

/// In-memory transport. Connects instantly unless told to refuse an id, can fail every
/// n-th send of a channel, and can echo successful sends back after a delay.
pub struct StubTransport {
    refuse: Predicate,
    fail_every: Option<u64>,
    echo_delay: Option<Duration>,
    attempts: Mutex<Vec<(usize, Instant)>>,
    sends: Arc<AtomicU64>,
    closed: Arc<AtomicUsize>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self {
            refuse: Box::new(|_| false),
            fail_every: None,
            echo_delay: None,
            attempts: Mutex::new(Vec::new()),
            sends: Arc::new(AtomicU64::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn refusing<F>(mut self, refuse: F) -> Self
    where
        F: Fn(usize) -> bool + Send + Sync + 'static,
    {
        self.refuse = Box::new(refuse);
        self
    }

    pub fn failing_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n);
        self
    }

    pub fn echoing_after(mut self, delay: Duration) -> Self {
        self.echo_delay = Some(delay);
        self
    }

    pub fn attempts(&self) -> Vec<(usize, Instant)> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn sends_issued(&self) -> u64 {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn connect(&self, request: ConnectRequest) -> Result<Box<dyn DuplexChannel>, ConnectError> {
        self.attempts.lock().unwrap().push((request.id, Instant::now()));

        let token = request.tokens.generate_token(&request.url)?;
        assert!(request.tokens.verify(&token, &request.url).is_ok());

        if (self.refuse)(request.id) {
            return Err(ConnectError::Handshake(format!("stub refused connection {}", request.id)));
        }

        Ok(Box::new(StubChannel {
            handlers: request.handlers,
            fail_every: self.fail_every,
            echo_delay: self.echo_delay,
            count: 0,
            sends: self.sends.clone(),
            closed: self.closed.clone(),
        }))
    }
}

struct StubChannel {
    handlers: Handlers,
    fail_every: Option<u64>,
    echo_delay: Option<Duration>,
    count: u64,
    sends: Arc<AtomicU64>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl DuplexChannel for StubChannel {
    async fn send(&mut self, method: &str, arguments: Vec<Value>) -> Result<(), SendError> {
        self.count += 1;
        self.sends.fetch_add(1, Ordering::SeqCst);

        if let Some(n) = self.fail_every {
            if self.count % n == 0 {
                return Err(SendError::Timeout(Duration::from_secs(15)));
            }
        }

        if let Some(delay) = self.echo_delay {
            let handlers = self.handlers.clone();
            let method = method.to_string();

            tokio::spawn(async move {
                sleep(delay).await;
                handlers.dispatch(&method, &arguments);
            });
        }

        Ok(())
    }

    async fn close(&mut self) -> Result<(), SendError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
