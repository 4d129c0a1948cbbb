use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use log::{error, info};
use prometheus::{Encoder, TextEncoder};
use tokio::task::JoinHandle;

use crate::error::HarnessError;
use crate::stats::Stats;

const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Serves the live counters at `/metrics`. Binds before returning so a bad address fails
/// the run up front.
pub fn serve(addr: SocketAddr, stats: Arc<Stats>) -> Result<(SocketAddr, JoinHandle<()>), HarnessError> {
    let listener = std::net::TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    let local_addr = listener.local_addr()?;

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(stats);

    let server = axum::Server::from_tcp(listener)?.serve(app.into_make_service());

    info!("Serving metrics on http://{}/metrics", local_addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server exited unexpectedly: {}", e);
        }
    });

    Ok((local_addr, handle))
}

async fn metrics_handler(State(stats): State<Arc<Stats>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&stats.gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn spawn_progress(stats: Arc<Stats>, every: Duration) -> JoinHandle<()> {
    let every = every.max(MIN_PROGRESS_INTERVAL);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick fires immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            info!("Progress: {}", stats.snapshot());
        }
    })
}
