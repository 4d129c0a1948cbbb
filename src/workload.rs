use std::{sync::Arc, time::Duration};

use log::{debug, error, info};
use rand::Rng;
use serde_json::Value;
use tokio::{
    task::JoinSet,
    time::{sleep, Instant},
};

use crate::connection::Connection;
use crate::context::HarnessContext;

pub const ECHO_METHOD: &str = "echo";
pub const MESSAGE_ID: &str = "id";

const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

#[derive(Debug, Clone, Copy)]
pub struct WorkloadSession {
    pub jitter: Duration,
    pub started: Instant,
    pub deadline: Instant,
}

impl WorkloadSession {
    fn begin(jitter: Duration, duration: Duration) -> Self {
        let started = Instant::now();
        let deadline = started
            .checked_add(duration)
            .unwrap_or_else(|| started + FAR_FUTURE);

        Self {
            jitter,
            started,
            deadline,
        }
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// What one session did. The connection is handed back still open so late echoes are
/// counted during the drain wait.
#[derive(Debug)]
pub struct SessionOutcome {
    pub connection: Connection,
    pub session: WorkloadSession,
    pub sent: u64,
    pub send_errors: u64,
    pub finished: Instant,
}

impl SessionOutcome {
    pub fn attempts(&self) -> u64 {
        self.sent + self.send_errors
    }
}

#[derive(Clone)]
pub struct WorkloadDriver {
    ctx: Arc<HarnessContext>,
}

impl WorkloadDriver {
    pub fn new(ctx: Arc<HarnessContext>) -> Self {
        Self { ctx }
    }

    pub async fn run_all(&self, connections: Vec<Connection>) -> Vec<SessionOutcome> {
        let count = connections.len();
        let mut sessions = JoinSet::new();

        for conn in connections {
            let driver = self.clone();
            sessions.spawn(async move { driver.run_session(conn).await });
        }

        info!(
            "Started {} sessions of {:?}, one message every {:?}",
            count, self.ctx.config.session_duration, self.ctx.config.send_interval
        );

        let mut outcomes = Vec::with_capacity(count);

        while let Some(joined) = sessions.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!("Workload session task failed: {}", e),
            }
        }

        outcomes
    }

    /// Sends on `connection` until the session deadline. Send failures are counted and the
    /// loop carries on at the same pace.
    pub async fn run_session(&self, mut connection: Connection) -> SessionOutcome {
        let config = &self.ctx.config;
        let stats = &self.ctx.stats;

        let jitter = self.jitter();
        sleep(jitter).await;

        let session = WorkloadSession::begin(jitter, config.session_duration);
        let mut sent = 0;
        let mut send_errors = 0;

        while !session.expired() {
            let arguments = vec![Value::from(MESSAGE_ID), Value::from(self.ctx.timestamp())];

            match connection.send(ECHO_METHOD, arguments).await {
                Ok(()) => {
                    stats.record_sent();
                    sent += 1;
                }
                Err(e) => {
                    stats.record_send_error();
                    send_errors += 1;
                    debug!("Connection {}: send failed: {}", connection.id, e);
                }
            }

            sleep(config.send_interval).await;
        }

        SessionOutcome {
            connection,
            session,
            sent,
            send_errors,
            finished: Instant::now(),
        }
    }

    fn jitter(&self) -> Duration {
        let micros = u64::try_from(self.ctx.config.max_jitter.as_micros()).unwrap_or(u64::MAX);
        if micros == 0 {
            return Duration::ZERO;
        }

        Duration::from_micros(rand::thread_rng().gen_range(0..micros))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn unbounded_session_never_overflows_the_deadline() {
        let session = WorkloadSession::begin(Duration::ZERO, Duration::MAX);

        assert!(session.deadline > session.started + Duration::from_secs(60 * 60 * 24 * 365));
        assert!(!session.expired());
    }

    #[tokio::test(start_paused = true)]
    async fn session_expires_at_its_deadline() {
        let session = WorkloadSession::begin(Duration::from_millis(3), Duration::from_secs(5));
        assert_eq!(session.deadline - session.started, Duration::from_secs(5));
        assert!(!session.expired());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(session.expired());
    }
}
