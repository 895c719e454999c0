//! Device and queue types shared with edge servers over the wire

use serde::{Deserialize, Serialize};

/// A physical machine exposed to users through at most one owning peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "machineID")]
    pub device_id: String,

    /// Base address of the peer currently owning the machine
    #[serde(rename = "server", default, with = "owner_peer")]
    pub owner_peer: Option<String>,

    /// Opaque session ids of external systems attached to this machine
    #[serde(rename = "correlationKeys", default)]
    pub correlation_keys: Vec<String>,

    /// Waiting users; the first entry is the active one
    #[serde(default)]
    pub queue: Vec<QueueEntry>,
}

impl Device {
    /// Create an ownerless device with an empty queue
    #[must_use]
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            owner_peer: None,
            correlation_keys: Vec::new(),
            queue: Vec::new(),
        }
    }

    /// The user currently in control, if anyone is queued
    #[must_use]
    pub fn active(&self) -> Option<&QueueEntry> {
        self.queue.first()
    }

    /// Index of a session within the queue
    #[must_use]
    pub fn position(&self, session: &str) -> Option<usize> {
        self.queue.iter().position(|e| e.session == session)
    }

    /// Whether a peer currently owns the machine
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.owner_peer.is_some()
    }

    /// Whether the machine carries the given correlation key
    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.correlation_keys.iter().any(|k| k == key)
    }
}

/// One user session waiting for (or using) a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub session: String,

    /// Peer the session is connected through
    #[serde(rename = "server", default)]
    pub origin_peer: String,

    /// Milliseconds since the Unix epoch, stamped by the hub
    #[serde(rename = "queueDate", default)]
    pub enqueued_at: i64,

    #[serde(rename = "machineID", default)]
    pub device_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl QueueEntry {
    /// Create an unstamped entry
    #[must_use]
    pub fn new(
        session: impl Into<String>,
        origin_peer: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            session: session.into(),
            origin_peer: origin_peer.into(),
            enqueued_at: 0,
            device_id: device_id.into(),
            email: None,
        }
    }

    /// Set the enqueue timestamp
    #[must_use]
    pub const fn at(mut self, enqueued_at: i64) -> Self {
        self.enqueued_at = enqueued_at;
        self
    }
}

/// Canonical form of a peer base address
#[must_use]
pub fn normalize_address(address: &str) -> &str {
    address.trim().trim_end_matches('/')
}

/// Compare two peer addresses ignoring surrounding whitespace and trailing slashes
#[must_use]
pub fn same_address(a: &str, b: &str) -> bool {
    normalize_address(a) == normalize_address(b)
}

/// `server` is an empty string on the wire when no peer owns the machine
mod owner_peer {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(value.as_deref().unwrap_or_default())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }
}
