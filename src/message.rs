//! Wire messages exchanged between hosts and with clients.
//!
//! All messages are JSON. Field names are part of the wire contract.

use serde::{Deserialize, Serialize};

use crate::{CounterError, Snapshot, TransportError};

/// Payload of both push (`setsync`) and pull (`getsync`) calls.
///
/// ```
/// use crdt_tally::message::SyncMsg;
///
/// let msg = SyncMsg::from_slice(br#"{"CounterValues":[1,0,4]}"#).unwrap();
/// assert_eq!(msg.counter_values, vec![1, 0, 4]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncMsg {
    /// Per-actor counts, in actor order.
    #[serde(rename = "CounterValues")]
    pub counter_values: Vec<u64>,
}

impl SyncMsg {
    /// Encode as JSON bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>, TransportError> {
        serde_json::to_vec(self).map_err(|e| TransportError::Malformed(e.to_string()))
    }

    /// Decode from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TransportError> {
        serde_json::from_slice(bytes).map_err(|e| TransportError::Malformed(e.to_string()))
    }
}

impl From<Snapshot> for SyncMsg {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            counter_values: snapshot.into_counts(),
        }
    }
}

impl From<SyncMsg> for Snapshot {
    fn from(msg: SyncMsg) -> Self {
        Snapshot::from(msg.counter_values)
    }
}

/// Client request to increment a counter.
///
/// The value is signed on the wire so that a negative request can be
/// recognized and refused instead of failing to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddMsg {
    /// Amount to add. Missing means zero.
    #[serde(rename = "addValue", default)]
    pub add_value: i64,
}

impl AddMsg {
    /// The increment as an unsigned delta.
    pub fn delta(&self) -> Result<u64, CounterError> {
        u64::try_from(self.add_value).map_err(|_| CounterError::NegativeDelta(self.add_value))
    }
}

/// Cluster membership sent once to every host.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigMsg {
    /// Actor addresses; the position of an address is that actor's index.
    pub actors: Vec<String>,
}
