use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use crdt_tally::message::{AddMsg, ConfigMsg, SyncMsg};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::locate_host;
use crate::registry::Cluster;
use crate::{AppState, ServerError};

/// Bodies are JSON whatever `Content-Type` says, so plain `curl -d` works.
fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ServerError> {
    serde_json::from_slice(body).map_err(|e| ServerError::BadBody(e.to_string()))
}

// ── Configuration ───────────────────────────────────────────────────

pub async fn configure(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<&'static str, ServerError> {
    let msg: ConfigMsg = decode(&body)?;
    let host_id = locate_host(&msg.actors, state.advertise.as_deref())?;
    state.registry.configure(Cluster {
        actors: msg.actors,
        host_id,
    })?;
    Ok("OK")
}

// ── Client routes ───────────────────────────────────────────────────

pub async fn add(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<&'static str, ServerError> {
    state.registry.cluster()?;
    let delta = decode::<AddMsg>(&body)?.delta()?;
    let counter = state.registry.get_or_spawn(&name)?;
    debug!(counter = %name, delta, "adding to counter");
    counter.add(delta);
    Ok("OK")
}

pub async fn local_value(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<String, ServerError> {
    let value = state.registry.get(&name)?.local_value();
    debug!(counter = %name, value, "local value");
    Ok(value.to_string())
}

pub async fn consistent_value(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<String, ServerError> {
    let value = state.registry.get(&name)?.global_value().await?;
    debug!(counter = %name, value, "global value");
    Ok(value.to_string())
}

// ── Peer routes ─────────────────────────────────────────────────────

pub async fn get_sync(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<SyncMsg>, ServerError> {
    let counter = state.registry.get_or_spawn(&name)?;
    Ok(Json(counter.current_snapshot().into()))
}

pub async fn set_sync(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<&'static str, ServerError> {
    state.registry.cluster()?;
    let msg: SyncMsg = decode(&body)?;
    let counter = state.registry.get_or_spawn(&name)?;
    debug!(counter = %name, remote = ?msg.counter_values, "syncing with remote state");
    counter.apply_snapshot(&msg.into())?;
    Ok("OK")
}
