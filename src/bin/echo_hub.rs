use std::net::SocketAddr;

use clap::Parser;

use signalr_perf::auth::{Credential, TokenProvider};
use signalr_perf::config::{ConnectionString, TargetEndpoint, CONNECTION_STRING_ENV, DEFAULT_CLIENT_PORT, DEFAULT_HUB};
use signalr_perf::hub::EchoHub;

/// Local stand-in for the service: accepts clients for one hub and echoes their messages.
#[derive(Parser, Debug)]
#[command(name = "echo-hub")]
struct Args {
    /// Connection string the clients use; tokens are verified against its access key
    #[arg(long, env = CONNECTION_STRING_ENV, hide_env_values = true)]
    connection_string: String,

    #[arg(long, default_value = DEFAULT_HUB)]
    hub: String,

    /// Client port advertised to the clients, used to rebuild the token audience
    #[arg(long, default_value_t = DEFAULT_CLIENT_PORT)]
    port: u16,

    #[arg(long, default_value = "0.0.0.0:5001")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info");
    env_logger::init_from_env(env);

    let args = Args::parse();

    let conn: ConnectionString = args.connection_string.parse()?;
    let endpoint = TargetEndpoint::new(&conn.endpoint, conn.port.unwrap_or(args.port), &args.hub)?;
    let tokens = TokenProvider::new(Credential::from_access_key(&conn.access_key)?, chrono::Duration::hours(24));

    EchoHub::new(&endpoint.hub, &endpoint.client_url, tokens)
        .run(args.listen)
        .await?;

    Ok(())
}
