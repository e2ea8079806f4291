//! Node configuration and discovery of this host's place in the actor list.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crdt_tally::SyncConfig;

use crate::ServerError;

/// Port the node listens on, and assumed for peers given without one.
pub const DEFAULT_PORT: u16 = 7777;

/// Upper bound on one sync request to a peer.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Settings for one `tally-node` process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener on.
    pub bind: IpAddr,
    /// Port to listen on.
    pub port: u16,
    /// Port used to reach actors whose address carries no port.
    pub peer_port: u16,
    /// Actor address that identifies this host. When unset, the host is
    /// located by matching its interface addresses against the actor list.
    pub advertise: Option<String>,
    /// Timeout for a single push or pull request.
    pub request_timeout: Duration,
    /// Timing of the sync paths of every counter on this host.
    pub sync: SyncConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            peer_port: DEFAULT_PORT,
            advertise: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            sync: SyncConfig::default(),
        }
    }
}

impl ServerConfig {
    /// The socket address to listen on.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Find this host's index in `actors`.
///
/// With `advertise` set, only that address is looked for; otherwise every
/// non-loopback interface address is tried.
pub fn locate_host(actors: &[String], advertise: Option<&str>) -> Result<usize, ServerError> {
    let candidates = match advertise {
        Some(addr) => vec![addr.to_string()],
        None => local_addresses()?,
    };
    find_host_index(actors, &candidates).ok_or(ServerError::HostNotFound(candidates))
}

/// Addresses of every non-loopback interface.
pub fn local_addresses() -> Result<Vec<String>, ServerError> {
    let interfaces = local_ip_address::list_afinet_netifas()
        .map_err(|e| ServerError::Interfaces(e.to_string()))?;
    Ok(interfaces
        .into_iter()
        .filter(|(_, ip)| !ip.is_loopback())
        .map(|(_, ip)| ip.to_string())
        .collect())
}

/// Index of the first actor matching one of `candidates`, trying candidates
/// in order.
///
/// An actor matches when it equals the candidate, or when it is a socket
/// address whose IP equals the candidate.
pub fn find_host_index(actors: &[String], candidates: &[String]) -> Option<usize> {
    candidates.iter().find_map(|candidate| {
        actors
            .iter()
            .position(|actor| actor == candidate || actor_ip(actor).as_deref() == Some(candidate))
    })
}

fn actor_ip(actor: &str) -> Option<String> {
    actor
        .parse::<SocketAddr>()
        .ok()
        .map(|addr| addr.ip().to_string())
}
