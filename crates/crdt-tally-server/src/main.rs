use std::net::IpAddr;
use std::time::Duration;

use clap::{ArgAction, Parser};
use crdt_tally::SyncConfig;
use crdt_tally_server::{ServerConfig, DEFAULT_PORT};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// tally-node: one member of a gossip-synchronized counter cluster.
///
/// Starts unconfigured. POST the actor list to `/config` on every node, then
/// add to and read counters under `/counter/{name}`.
#[derive(Parser)]
#[command(name = "tally-node", version, about, long_about = None)]
struct Cli {
    /// Port to listen on.
    #[arg(short, long, env = "TALLY_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port of peers listed in the actor list without one.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    peer_port: u16,

    /// This node's entry in the actor list. Skips matching against the
    /// addresses of local network interfaces.
    #[arg(long, env = "TALLY_ADVERTISE")]
    advertise: Option<String>,

    /// Timeout of a single sync request, in milliseconds.
    #[arg(long, default_value = "2000")]
    request_timeout_ms: u64,

    /// Log more (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig {
        bind: cli.bind,
        port: cli.port,
        peer_port: cli.peer_port,
        advertise: cli.advertise,
        request_timeout: Duration::from_millis(cli.request_timeout_ms),
        sync: SyncConfig::default(),
    };
    crdt_tally_server::start(config).await?;
    Ok(())
}
