//! # crdt-tally-server
//!
//! HTTP node for [`crdt-tally`]: hosts any number of named counters for one
//! member of a fixed cluster and serves both clients and peers.
//!
//! | Method | Path | |
//! |--------|------|-|
//! | POST | `/config` | set the actor list (`{"actors": [...]}`) |
//! | POST | `/counter/{name}` | add (`{"addValue": n}`) |
//! | GET | `/counter/{name}/value` | local value |
//! | GET | `/counter/{name}/consistent_value` | value after syncing with every peer |
//! | GET | `/counter/{name}/getsync` | peer pull |
//! | POST | `/counter/{name}/setsync` | peer push |
//!
//! ## Quick Start
//!
//! ```no_run
//! #[tokio::main]
//! async fn main() {
//!     let config = crdt_tally_server::ServerConfig::default();
//!     crdt_tally_server::start(config).await.unwrap();
//! }
//! ```
//!
//! [`crdt-tally`]: crdt_tally

mod api;
mod config;
mod error;
mod http;
mod registry;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use crdt_tally::Transport;
use tracing::info;

pub use config::{
    find_host_index, local_addresses, locate_host, ServerConfig, DEFAULT_PORT,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use error::ServerError;
pub use http::HttpTransport;
pub use registry::{Cluster, Registry};

/// Shared state of the Axum handlers.
pub struct AppState {
    /// Counters hosted by this node.
    pub registry: Registry,
    advertise: Option<String>,
}

impl AppState {
    /// State for a node that reaches its peers through `transport`.
    pub fn new(config: &ServerConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry: Registry::new(transport, config.sync),
            advertise: config.advertise.clone(),
        }
    }
}

/// The node's routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/config", post(api::configure))
        .route("/counter/:name", post(api::add))
        .route("/counter/:name/value", get(api::local_value))
        .route("/counter/:name/consistent_value", get(api::consistent_value))
        .route("/counter/:name/getsync", get(api::get_sync))
        .route("/counter/:name/setsync", post(api::set_sync))
        .with_state(state)
}

/// Run a node until Ctrl-C (or SIGTERM on Unix).
///
/// On shutdown every counter stops first, so pending `consistent_value`
/// requests are answered with 503 instead of holding the server open.
pub async fn start(config: ServerConfig) -> Result<(), ServerError> {
    let transport = HttpTransport::new(config.peer_port, config.request_timeout)?;
    let state = Arc::new(AppState::new(&config, Arc::new(transport)));

    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
    info!(addr = %listener.local_addr()?, advertise = ?config.advertise, "tally node listening");

    let on_signal = Arc::clone(&state);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutting down");
            on_signal.registry.shutdown_all().await;
        })
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
