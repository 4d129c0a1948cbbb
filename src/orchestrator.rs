use std::sync::Arc;

use futures::future::join_all;
use log::info;
use tokio::time::{sleep, Instant};

use crate::context::HarnessContext;
use crate::metrics::spawn_progress;
use crate::pool::ConnectionPool;
use crate::stats::Report;
use crate::transport::Transport;
use crate::workload::WorkloadDriver;

pub struct Orchestrator {
    ctx: Arc<HarnessContext>,
    transport: Arc<dyn Transport>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<HarnessContext>, transport: Arc<dyn Transport>) -> Self {
        Self { ctx, transport }
    }

    pub async fn run(&self) -> Report {
        let config = &self.ctx.config;
        let stats = &self.ctx.stats;

        let progress = config
            .report_interval
            .map(|every| spawn_progress(stats.clone(), every));

        info!(
            "Connecting {} clients to {}",
            config.total_connections, self.ctx.endpoint.client_url
        );

        let started = Instant::now();
        let live = ConnectionPool::new(self.ctx.clone(), self.transport.clone())
            .ramp_up(config.total_connections, config.concurrency, config.burst_interval)
            .await;
        let ramp_up = started.elapsed();

        info!(
            "{}/{} Connections established. Concurrency = {} per {:?}. Time elapsed: {} ms",
            live.len(),
            config.total_connections,
            config.concurrency,
            config.burst_interval,
            ramp_up.as_millis()
        );

        if live.is_empty() {
            info!("No connection is connected, skipping the workload");

            if let Some(progress) = progress {
                progress.abort();
            }

            return Report::new(config.total_connections, ramp_up, true, stats.snapshot());
        }

        let outcomes = WorkloadDriver::new(self.ctx.clone()).run_all(live).await;

        info!("Workload finished, waiting {:?} for in-flight messages", config.drain_wait);
        sleep(config.drain_wait).await;

        let report = Report::new(config.total_connections, ramp_up, false, stats.snapshot());

        if let Some(progress) = progress {
            progress.abort();
        }

        join_all(outcomes.into_iter().map(|outcome| {
            let mut conn = outcome.connection;
            async move { conn.close().await }
        }))
        .await;

        report
    }
}
