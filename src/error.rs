//! Error types for the machine hub

use thiserror::Error;

/// Result type alias for hub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the machine hub
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed or incomplete inbound payload
    #[error("invalid request: {0}")]
    Invalid(String),

    /// No device with this id (or correlation key) is tracked
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Session is not queued on the device
    #[error("session {session} is not queued on {device_id}")]
    NotQueued { device_id: String, session: String },

    /// Device has no owning peer right now
    #[error("{0} is not connected to any server")]
    DeviceDisconnected(String),

    /// Peer address is not part of the configured peer set
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// Peer answered 404 for the addressed entity
    #[error("peer does not track {0}")]
    PeerNotFound(String),

    /// Peer answered with any other non-success status
    #[error("peer error {status} from {url}: {body}")]
    Peer {
        url: String,
        status: u16,
        body: String,
    },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether the caller sent something the hub cannot act on
    ///
    /// These are protocol violations on the caller's side and are always
    /// surfaced, never swallowed
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Invalid(_)
                | Self::DeviceNotFound(_)
                | Self::NotQueued { .. }
                | Self::DeviceDisconnected(_)
                | Self::UnknownPeer(_)
        )
    }

    /// Whether a peer reported that it does not track the entity
    #[must_use]
    pub const fn is_peer_not_found(&self) -> bool {
        matches!(self, Self::PeerNotFound(_))
    }
}
