use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use signalr_perf::config::Settings;
use signalr_perf::context::HarnessContext;
use signalr_perf::metrics;
use signalr_perf::orchestrator::Orchestrator;
use signalr_perf::transport::websocket::WebSocketTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info");
    env_logger::init_from_env(env);

    #[cfg(feature = "tracing")]
    console_subscriber::init();

    let settings = Settings::parse();

    let ctx = Arc::new(HarnessContext::from_settings(&settings)?);
    let transport = WebSocketTransport::new(
        Duration::from_secs(settings.handshake_timeout_secs),
        Duration::from_secs(settings.send_timeout_secs),
    );

    let metrics_server = match settings.metrics_addr {
        Some(addr) => Some(metrics::serve(addr, ctx.stats.clone())?),
        None => None,
    };

    let report = Orchestrator::new(ctx, Arc::new(transport)).run().await;

    if settings.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    if let Some((_, handle)) = metrics_server {
        handle.abort();
    }

    Ok(())
}
