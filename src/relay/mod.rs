//! Telemetry relay
//!
//! Vendor telemetry is posted to the hub without credentials and addressed
//! either by device id or by one of the device's correlation keys. The body is
//! forwarded untouched to the peer that owns the device.

use std::fmt;

use crate::peers::{Dispatch, PeerClient, Peers, detach};
use crate::registry::SharedRegistry;
use crate::{Error, Result};

/// How a telemetry payload addresses its device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayTarget {
    /// Device id
    Device(String),
    /// External session id attached to the device
    Key(String),
}

impl fmt::Display for RelayTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(id) => write!(f, "device {id}"),
            Self::Key(key) => write!(f, "key {key}"),
        }
    }
}

/// Forwards telemetry to owning peers
#[derive(Debug, Clone)]
pub struct TelemetryRelay {
    registry: SharedRegistry,
    peers: Peers,
    client: PeerClient,
}

impl TelemetryRelay {
    #[must_use]
    pub const fn new(registry: SharedRegistry, peers: Peers, client: PeerClient) -> Self {
        Self {
            registry,
            peers,
            client,
        }
    }

    /// Peer that should receive telemetry for the target
    ///
    /// # Errors
    ///
    /// Returns error if no device matches, the device has no owner, or the
    /// owner is not a configured peer
    pub async fn resolve(&self, target: &RelayTarget) -> Result<String> {
        let registry = self.registry.lock().await;
        let device = match target {
            RelayTarget::Device(id) => registry.get(id),
            RelayTarget::Key(key) => registry.find_by_key(key),
        }
        .ok_or_else(|| Error::DeviceNotFound(target.to_string()))?;

        let owner = device
            .owner_peer
            .as_deref()
            .ok_or_else(|| Error::DeviceDisconnected(device.device_id.clone()))?;

        self.peers
            .resolve(owner)
            .map(String::from)
            .ok_or_else(|| Error::UnknownPeer(owner.to_string()))
    }

    /// Forward a payload to `{owner}/{path}` in the background
    ///
    /// # Errors
    ///
    /// Returns error if the target cannot be resolved to a live peer
    pub async fn forward(
        &self,
        target: &RelayTarget,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<Dispatch> {
        let peer = self.resolve(target).await?;
        tracing::debug!(relay_target = %target, peer = %peer, path, "relaying telemetry");

        let client = self.client.clone();
        let path = path.to_string();
        let address = peer.clone();

        let mut dispatch = Dispatch::none();
        dispatch.push(detach("telemetry relay", peer, async move {
            client.relay(&address, &path, &payload).await
        }));
        Ok(dispatch)
    }
}
