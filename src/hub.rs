//! The hub: registry mutations and the peer traffic they trigger
//!
//! Every operation mutates the registry under its lock, takes snapshots of the
//! affected devices, releases the lock and only then talks to peers. The
//! returned [`Dispatch`] holds the detached calls; request handlers drop it.

use tokio::task::JoinHandle;

use crate::broadcast::Broadcaster;
use crate::handoff::{ControlAction, ControlHandoff, RequestOutcome};
use crate::peers::{Dispatch, PeerClient, Peers};
use crate::registry::{Device, QueueEntry, Registry, SharedRegistry};
use crate::relay::{RelayTarget, TelemetryRelay};
use crate::snapshot::SnapshotStore;
use crate::sync::{ReconcileSummary, Reconciler};
use crate::{Error, Result};

/// Coordination hub shared by all request handlers
#[derive(Debug, Clone)]
pub struct Hub {
    registry: SharedRegistry,
    peers: Peers,
    broadcaster: Broadcaster,
    reconciler: Reconciler,
    handoff: ControlHandoff,
    relay: TelemetryRelay,
    snapshot: Option<SnapshotStore>,
}

impl Hub {
    /// Create a hub with an empty registry
    #[must_use]
    pub fn new(peers: Peers, snapshot: Option<SnapshotStore>) -> Self {
        Self::with_client(peers, snapshot, PeerClient::new())
    }

    /// Create a hub using a specific peer client
    #[must_use]
    pub fn with_client(peers: Peers, snapshot: Option<SnapshotStore>, client: PeerClient) -> Self {
        let registry = SharedRegistry::default();
        let broadcaster = Broadcaster::new(registry.clone(), peers.clone(), client.clone());

        Self {
            reconciler: Reconciler::new(registry.clone(), peers.clone(), client.clone()),
            handoff: ControlHandoff::new(registry.clone(), broadcaster.clone(), client.clone()),
            relay: TelemetryRelay::new(registry.clone(), peers.clone(), client),
            broadcaster,
            registry,
            peers,
            snapshot,
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn peers(&self) -> &Peers {
        &self.peers
    }

    /// Seed device metadata from the snapshot file
    ///
    /// # Errors
    ///
    /// Returns error if the snapshot exists but cannot be read
    pub async fn restore_snapshot(&self) -> Result<usize> {
        let Some(store) = &self.snapshot else {
            return Ok(0);
        };
        let devices = store.load().await?;
        let restored = self.registry.lock().await.restore(devices);
        tracing::info!(devices = restored, path = %store.path().display(), "snapshot restored");
        Ok(restored)
    }

    /// Rebuild queues from every peer
    pub async fn reconcile(&self) -> ReconcileSummary {
        self.reconciler.run().await
    }

    /// Run a full reconciliation in the background
    #[must_use]
    pub fn spawn_reconciliation(&self) -> JoinHandle<ReconcileSummary> {
        let reconciler = self.reconciler.clone();
        tokio::spawn(async move { reconciler.run().await })
    }

    /// A peer (re)connected
    ///
    /// Everything it previously contributed is dropped, affected devices are
    /// broadcast, and the peer is rescanned in the background.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPeer`] if the address is not configured
    pub async fn server_connect(&self, address: &str) -> Result<Dispatch> {
        let peer = self
            .peers
            .resolve(address)
            .ok_or_else(|| Error::UnknownPeer(address.to_string()))?
            .to_string();

        let snapshots = {
            let mut registry = self.registry.lock().await;
            let changed = registry.purge_by_peer(&peer);
            snapshot_of(&registry, &changed)
        };
        tracing::info!(peer = %peer, purged_devices = snapshots.len(), "peer connected");

        let mut dispatch = self.dispatch_all(snapshots);
        dispatch.push(self.spawn_rescan(peer));
        Ok(dispatch)
    }

    /// A peer connected or updated a device
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] if the device id is empty
    pub async fn device_connect(&self, device: Device) -> Result<Dispatch> {
        require("machineID", &device.device_id)?;

        let snapshot = self
            .registry
            .lock()
            .await
            .upsert_device(&device.device_id, device.owner_peer, device.correlation_keys)
            .clone();
        tracing::info!(
            device_id = %snapshot.device_id,
            peer = snapshot.owner_peer.as_deref().unwrap_or_default(),
            "device connected"
        );

        self.persist().await;
        Ok(self.broadcaster.dispatch(snapshot))
    }

    /// A device lost its peer; its queue is kept and nothing is broadcast
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] if the device id is empty
    pub async fn device_disconnect(&self, device_id: &str) -> Result<()> {
        require("machineID", device_id)?;

        if self.registry.lock().await.mark_disconnected(device_id) {
            tracing::info!(device_id, "device disconnected");
            self.persist().await;
        } else {
            tracing::debug!(device_id, "disconnect for unknown device ignored");
        }
        Ok(())
    }

    /// A user joined a device's queue
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] if the device id or session is empty
    pub async fn user_connect(&self, entry: QueueEntry) -> Result<Dispatch> {
        require("machineID", &entry.device_id)?;
        require("session", &entry.session)?;

        let device_id = entry.device_id.clone();
        let session = entry.session.clone();

        let (outcome, snapshots) = {
            let mut registry = self.registry.lock().await;
            let outcome = registry.enqueue_user(&device_id, entry);
            let mut ids = vec![device_id.clone()];
            ids.extend(outcome.moved_from.clone());
            (outcome, snapshot_of(&registry, &ids))
        };

        if let Some(previous) = &outcome.moved_from {
            tracing::info!(
                device_id = %device_id,
                session = %session,
                previous = %previous,
                "user moved between devices"
            );
        } else if outcome.already_queued {
            tracing::debug!(device_id = %device_id, session = %session, "user already queued");
        } else {
            tracing::info!(device_id = %device_id, session = %session, "user connected");
        }

        if outcome.created_device {
            tracing::info!(device_id = %device_id, "placeholder device created");
            self.persist().await;
        }
        Ok(self.dispatch_all(snapshots))
    }

    /// A user left; unknown sessions are ignored
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] if the session is empty
    pub async fn user_disconnect(&self, session: &str) -> Result<Dispatch> {
        require("session", session)?;

        let snapshots = {
            let mut registry = self.registry.lock().await;
            let left = registry.dequeue_user(session);
            snapshot_of(&registry, left.as_slice())
        };

        match snapshots.first() {
            Some(device) => tracing::info!(device_id = %device.device_id, session, "user disconnected"),
            None => tracing::debug!(session, "disconnect for unknown session ignored"),
        }
        Ok(self.dispatch_all(snapshots))
    }

    /// Replace a device's queue as reported by its peer
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] if the device id is empty
    pub async fn queue_replace(&self, device_id: &str, entries: Vec<QueueEntry>) -> Result<Dispatch> {
        require("machineID", device_id)?;

        let (created, snapshots) = {
            let mut registry = self.registry.lock().await;
            let created = registry.get(device_id).is_none();
            let mut ids = vec![device_id.to_string()];
            ids.extend(registry.replace_queue(device_id, entries));
            (created, snapshot_of(&registry, &ids))
        };
        tracing::info!(device_id, affected = snapshots.len(), "queue replaced");

        if created {
            self.persist().await;
        }
        Ok(self.dispatch_all(snapshots))
    }

    /// See [`ControlHandoff::request`]
    ///
    /// # Errors
    ///
    /// Returns error if the handoff preconditions do not hold
    pub async fn control_request(&self, device_id: &str, session: &str) -> Result<RequestOutcome> {
        self.handoff.request(device_id, session).await
    }

    /// See [`ControlHandoff::respond`]
    ///
    /// # Errors
    ///
    /// Returns error if the handoff preconditions do not hold
    pub async fn control_response(
        &self,
        device_id: &str,
        session: &str,
        action: ControlAction,
    ) -> Result<Dispatch> {
        self.handoff.respond(device_id, session, action).await
    }

    /// See [`ControlHandoff::force`]
    ///
    /// # Errors
    ///
    /// Returns error if the handoff preconditions do not hold
    pub async fn control_force(&self, device_id: &str, session: &str) -> Result<Dispatch> {
        self.handoff.force(device_id, session).await
    }

    /// See [`TelemetryRelay::forward`]
    ///
    /// # Errors
    ///
    /// Returns error if the target has no reachable owner
    pub async fn relay(
        &self,
        target: &RelayTarget,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<Dispatch> {
        self.relay.forward(target, path, payload).await
    }

    /// All devices, ordered by id
    pub async fn devices(&self) -> Vec<Device> {
        self.registry.lock().await.list().into_iter().cloned().collect()
    }

    /// One device
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if the device is unknown
    pub async fn device(&self, device_id: &str) -> Result<Device> {
        self.registry
            .lock()
            .await
            .get(device_id)
            .cloned()
            .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))
    }

    fn dispatch_all(&self, devices: Vec<Device>) -> Dispatch {
        let mut dispatch = Dispatch::none();
        for device in devices {
            dispatch.join(self.broadcaster.dispatch(device));
        }
        dispatch
    }

    /// Rescan one peer, then broadcast whatever its report changed
    fn spawn_rescan(&self, peer: String) -> JoinHandle<()> {
        let reconciler = self.reconciler.clone();
        let broadcaster = self.broadcaster.clone();

        tokio::spawn(async move {
            match reconciler.reconcile_peer(&peer).await {
                Ok(touched) => broadcaster.broadcast_many(&touched).await.settled().await,
                Err(e) => tracing::warn!(peer = %peer, error = %e, "peer rescan failed"),
            }
        })
    }

    async fn persist(&self) {
        if let Some(store) = &self.snapshot {
            store.persist(&self.registry).await;
        }
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Invalid(format!("{field} is required")));
    }
    Ok(())
}

fn snapshot_of(registry: &Registry, ids: &[String]) -> Vec<Device> {
    ids.iter().filter_map(|id| registry.get(id).cloned()).collect()
}
