use std::{sync::Arc, time::Duration};

use log::{debug, error, info};
use tokio::{task::JoinSet, time::sleep};

use crate::connection::Connection;
use crate::context::HarnessContext;
use crate::transport::{Handlers, Transport};
use crate::workload::ECHO_METHOD;

pub struct ConnectionPool {
    ctx: Arc<HarnessContext>,
    transport: Arc<dyn Transport>,
}

impl ConnectionPool {
    pub fn new(ctx: Arc<HarnessContext>, transport: Arc<dyn Transport>) -> Self {
        Self { ctx, transport }
    }

    /// Launches `total` connection attempts, `concurrency` at a time with `burst_interval`
    /// between bursts, and waits for every one of them to finish. Only the connections whose
    /// handshake succeeded are returned, ordered by id.
    pub async fn ramp_up(&self, total: usize, concurrency: usize, burst_interval: Duration) -> Vec<Connection> {
        let concurrency = concurrency.max(1);
        let mut attempts = JoinSet::new();

        for id in 0..total {
            if id > 0 && id % concurrency == 0 {
                debug!("Launched {} of {} connection attempts", id, total);

                if !burst_interval.is_zero() {
                    sleep(burst_interval).await;
                }
            }

            self.ctx.stats.record_attempt();

            let ctx = self.ctx.clone();
            let transport = self.transport.clone();
            attempts.spawn(async move { Self::open(ctx, transport, id).await });
        }

        let mut live = Vec::with_capacity(total);

        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok(Some(conn)) => live.push(conn),
                Ok(None) => {}
                Err(e) => {
                    error!("Connection attempt task failed: {}", e);
                    self.ctx.stats.record_connect_failed();
                }
            }
        }

        live.sort_by_key(|conn| conn.id);

        info!("Ramp-up finished: {} of {} connections live", live.len(), total);

        live
    }

    async fn open(ctx: Arc<HarnessContext>, transport: Arc<dyn Transport>, id: usize) -> Option<Connection> {
        let stats = ctx.stats.clone();
        let handlers = Handlers::new().on(ECHO_METHOD, move |_| stats.record_received());

        match Connection::open(id, handlers, &ctx.endpoint, ctx.tokens.clone(), transport.as_ref()).await {
            Ok(conn) => {
                ctx.stats.record_connected();
                debug!("Connection {} established", id);
                Some(conn)
            }
            Err(e) => {
                ctx.stats.record_connect_failed();
                debug!("Connection {} failed: {}", id, e);
                None
            }
        }
    }
}
