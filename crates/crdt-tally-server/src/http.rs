//! Peer transport over HTTP.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use crdt_tally::message::SyncMsg;
use crdt_tally::{Snapshot, Transport, TransportError};
use reqwest::{Client, StatusCode, Url};

use crate::ServerError;

/// Talks to peers' `getsync` and `setsync` routes.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    peer_port: u16,
}

impl HttpTransport {
    /// A transport whose requests give up after `timeout`. Actors listed
    /// without a port are reached on `peer_port`.
    pub fn new(peer_port: u16, timeout: Duration) -> Result<Self, ServerError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, peer_port })
    }

    fn url(&self, peer: &str, counter: &str, action: &str) -> Result<Url, TransportError> {
        let authority = peer_authority(peer, self.peer_port);
        let mut url = Url::parse(&format!("http://{authority}/"))
            .map_err(|e| TransportError::Unreachable(format!("bad peer address {peer}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| TransportError::Unreachable(format!("bad peer address {peer}")))?
            .extend(["counter", counter, action]);
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_sync(
        &self,
        peer: &str,
        counter: &str,
        snapshot: &Snapshot,
    ) -> Result<(), TransportError> {
        let url = self.url(peer, counter, "setsync")?;
        let response = self
            .client
            .post(url)
            .json(&SyncMsg::from(snapshot.clone()))
            .send()
            .await
            .map_err(unreachable)?;
        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(TransportError::Status(status.as_u16())),
        }
    }

    async fn fetch_sync(&self, peer: &str, counter: &str) -> Result<Snapshot, TransportError> {
        let url = self.url(peer, counter, "getsync")?;
        let response = self.client.get(url).send().await.map_err(unreachable)?;
        if response.status() != StatusCode::OK {
            return Err(TransportError::Status(response.status().as_u16()));
        }
        let body = response.bytes().await.map_err(unreachable)?;
        Ok(SyncMsg::from_slice(&body)?.into())
    }
}

fn unreachable(e: reqwest::Error) -> TransportError {
    TransportError::Unreachable(e.to_string())
}

/// `host:port` for an actor address, appending `port` when it has none.
fn peer_authority(peer: &str, port: u16) -> String {
    if peer.parse::<SocketAddr>().is_ok() {
        return peer.to_string();
    }
    if let Ok(ip) = peer.parse::<IpAddr>() {
        return SocketAddr::new(ip, port).to_string();
    }
    if peer.contains(':') {
        peer.to_string()
    } else {
        format!("{peer}:{port}")
    }
}
