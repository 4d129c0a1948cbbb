use std::{fmt, time::Duration};

use prometheus::{IntCounter, Registry};
use serde::Serialize;

#[derive(Clone)]
pub struct Stats {
    registry: Registry,
    attempted: IntCounter,
    connected: IntCounter,
    connect_failed: IntCounter,
    sent: IntCounter,
    send_errors: IntCounter,
    received: IntCounter,
}

impl Stats {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("signalr_perf".to_string()), None)?;

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let counter = IntCounter::new(name, help)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        Ok(Self {
            attempted: counter("connections_attempted_total", "Connection attempts issued")?,
            connected: counter("connections_established_total", "Connections that completed the handshake")?,
            connect_failed: counter("connections_failed_total", "Connection attempts that failed")?,
            sent: counter("messages_sent_total", "Messages sent successfully")?,
            send_errors: counter("message_send_errors_total", "Message sends that failed")?,
            received: counter("messages_received_total", "Echo messages received")?,
            registry,
        })
    }

    pub fn record_attempt(&self) {
        self.attempted.inc();
    }

    pub fn record_connected(&self) {
        self.connected.inc();
    }

    pub fn record_connect_failed(&self) {
        self.connect_failed.inc();
    }

    pub fn record_sent(&self) {
        self.sent.inc();
    }

    pub fn record_send_error(&self) {
        self.send_errors.inc();
    }

    pub fn record_received(&self) {
        self.received.inc();
    }

    /// Reads every counter. Exact once all writers have been joined; a best-effort view
    /// while the run is still in progress.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            attempted: self.attempted.get(),
            connected: self.connected.get(),
            connect_failed: self.connect_failed.get(),
            sent: self.sent.get(),
            send_errors: self.send_errors.get(),
            received: self.received.get(),
        }
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}

impl fmt::Debug for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Stats").field(&self.snapshot()).finish()
    }
}

#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub attempted: u64,
    pub connected: u64,
    pub connect_failed: u64,
    pub sent: u64,
    pub send_errors: u64,
    pub received: u64,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connected {}/{} (failed {}), sent {}, send errors {}, received {}",
            self.connected, self.attempted, self.connect_failed, self.sent, self.send_errors, self.received
        )
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub total: usize,
    pub ramp_up_ms: u64,
    pub workload_skipped: bool,
    #[serde(flatten)]
    pub counters: Snapshot,
}

impl Report {
    pub fn new(total: usize, ramp_up: Duration, workload_skipped: bool, counters: Snapshot) -> Self {
        Self {
            total,
            ramp_up_ms: u64::try_from(ramp_up.as_millis()).unwrap_or(u64::MAX),
            workload_skipped,
            counters,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Initiated       : {}", self.total)?;
        writeln!(f, "Connected       : {}", self.counters.connected)?;
        writeln!(f, "Failed          : {}", self.counters.connect_failed)?;
        writeln!(f, "Ramp-up         : {} ms", self.ramp_up_ms)?;
        writeln!(f, "Sent Count      : {}", self.counters.sent)?;
        writeln!(f, "Send Error      : {}", self.counters.send_errors)?;
        write!(f, "Received Count  : {}", self.counters.received)
    }
}
