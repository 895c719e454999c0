//! Pushes device state to the peers that need it
//!
//! A device owned by a configured peer is sent only to that peer. A device
//! whose owner is unknown could be shown by anyone, so it goes to every peer.

use crate::peers::{Dispatch, PeerClient, Peers, detach};
use crate::registry::{Device, SharedRegistry};

/// Peers that should receive a device's state
#[must_use]
pub fn targets<'a>(device: &Device, peers: &'a Peers) -> Vec<&'a str> {
    if let Some(owner) = device.owner_peer.as_deref().and_then(|o| peers.resolve(o)) {
        return vec![owner];
    }
    peers.addresses().iter().map(String::as_str).collect()
}

/// Fire-and-forget fan-out of device records
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: SharedRegistry,
    peers: Peers,
    client: PeerClient,
}

impl Broadcaster {
    #[must_use]
    pub const fn new(registry: SharedRegistry, peers: Peers, client: PeerClient) -> Self {
        Self {
            registry,
            peers,
            client,
        }
    }

    /// Broadcast the current state of a device
    ///
    /// Does nothing if the device is unknown or its queue is empty
    pub async fn broadcast(&self, device_id: &str) -> Dispatch {
        let snapshot = self.registry.lock().await.get(device_id).cloned();
        match snapshot {
            Some(device) => self.dispatch(device),
            None => {
                tracing::debug!(device_id, "skipping broadcast of unknown device");
                Dispatch::none()
            }
        }
    }

    /// Broadcast several devices
    pub async fn broadcast_many<I, S>(&self, device_ids: I) -> Dispatch
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut dispatch = Dispatch::none();
        for id in device_ids {
            dispatch.join(self.broadcast(id.as_ref()).await);
        }
        dispatch
    }

    /// Send a snapshot already taken under the registry lock
    #[must_use]
    pub fn dispatch(&self, device: Device) -> Dispatch {
        if device.queue.is_empty() {
            tracing::debug!(device_id = %device.device_id, "queue empty, nothing to broadcast");
            return Dispatch::none();
        }

        let targets = targets(&device, &self.peers);
        tracing::debug!(
            device_id = %device.device_id,
            peers = targets.len(),
            queued = device.queue.len(),
            "broadcasting device"
        );

        let mut dispatch = Dispatch::none();
        for peer in targets {
            let client = self.client.clone();
            let device = device.clone();
            let address = peer.to_string();
            dispatch.push(detach("broadcast", peer.to_string(), async move {
                client.push_device(&address, &device).await
            }));
        }
        dispatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peers() -> Peers {
        Peers::new(["http://a:8000", "http://b:8000", "http://c:8000"])
    }

    #[test]
    fn owned_device_targets_owner_only() {
        let mut device = Device::new("M1");
        device.owner_peer = Some("http://b:8000/".to_string());
        let peers = peers();

        assert_eq!(targets(&device, &peers), vec!["http://b:8000"]);
    }

    #[test]
    fn ownerless_device_targets_everyone() {
        let device = Device::new("M2");
        let peers = peers();
        assert_eq!(targets(&device, &peers).len(), 3);
    }

    #[test]
    fn unconfigured_owner_targets_everyone() {
        let mut device = Device::new("M3");
        device.owner_peer = Some("http://elsewhere:9000".to_string());
        let peers = peers();
        assert_eq!(
            targets(&device, &peers),
            vec!["http://a:8000", "http://b:8000", "http://c:8000"]
        );
    }

    #[tokio::test]
    async fn empty_queue_dispatches_nothing() {
        let registry = SharedRegistry::default();
        let broadcaster = Broadcaster::new(registry.clone(), peers(), PeerClient::new());

        registry.lock().await.upsert_device("M1", None, Vec::new());
        assert!(broadcaster.broadcast("M1").await.is_empty());
        assert!(broadcaster.broadcast("unknown").await.is_empty());

        assert!(broadcaster.dispatch(Device::new("M1")).is_empty());
    }
}
