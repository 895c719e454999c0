//! Control handoff between users queued on the same device
//!
//! The state of a handoff is not stored. It follows from the queue (who is
//! first) and from the calls in flight. That is sound only because every
//! registry mutation runs under the one registry lock.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::broadcast::Broadcaster;
use crate::peers::{Dispatch, PeerClient, detach};
use crate::registry::{QueueEntry, SharedRegistry};
use crate::{Error, Result};

/// How the active user answered a control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Accept,
    Reject,
}

impl ControlAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "accept" => Ok(Self::Accept),
            "reject" => Ok(Self::Reject),
            other => Err(Error::Invalid(format!("unknown control action: {other}"))),
        }
    }
}

/// Result of asking for control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    /// The owning peer has the request; wait for a response
    Forwarded,
    /// The requester already has control; state was re-broadcast
    AlreadyActive,
    /// The owning peer could not be reached; the caller should force
    ResolveUnilaterally,
}

/// Body shared by the request, response and force endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ControlRequest {
    #[serde(rename = "machineID", default)]
    pub device_id: String,
    #[serde(default)]
    pub session: String,
}

impl ControlRequest {
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] if either id is empty
    pub fn validate(&self) -> Result<()> {
        if self.device_id.is_empty() {
            return Err(Error::Invalid("machineID is required".to_string()));
        }
        if self.session.is_empty() {
            return Err(Error::Invalid("session is required".to_string()));
        }
        Ok(())
    }
}

/// Coordinates request, response and force
#[derive(Debug, Clone)]
pub struct ControlHandoff {
    registry: SharedRegistry,
    broadcaster: Broadcaster,
    client: PeerClient,
}

impl ControlHandoff {
    #[must_use]
    pub const fn new(registry: SharedRegistry, broadcaster: Broadcaster, client: PeerClient) -> Self {
        Self {
            registry,
            broadcaster,
            client,
        }
    }

    /// A queued user asks the active user for control
    ///
    /// The forward to the owning peer is awaited since its result decides the
    /// outcome. It is not retried.
    ///
    /// # Errors
    ///
    /// Returns error if the device is unknown, the requester is not queued on
    /// it, or the device has no owning peer
    pub async fn request(&self, device_id: &str, session: &str) -> Result<RequestOutcome> {
        let (owner, requester, already_active) = {
            let registry = self.registry.lock().await;
            let device = registry
                .get(device_id)
                .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))?;
            let index = device.position(session).ok_or_else(|| Error::NotQueued {
                device_id: device_id.to_string(),
                session: session.to_string(),
            })?;
            let owner = device
                .owner_peer
                .clone()
                .ok_or_else(|| Error::DeviceDisconnected(device_id.to_string()))?;
            (owner, device.queue[index].clone(), index == 0)
        };

        if already_active {
            tracing::info!(device_id, session, "requester already active, re-broadcasting");
            drop(self.broadcaster.broadcast(device_id).await);
            return Ok(RequestOutcome::AlreadyActive);
        }

        match self.client.forward_request(&owner, &requester).await {
            Ok(()) => {
                tracing::info!(device_id, session, peer = %owner, "control request forwarded");
                Ok(RequestOutcome::Forwarded)
            }
            Err(e) => {
                tracing::warn!(
                    device_id,
                    session,
                    peer = %owner,
                    error = %e,
                    "control request not delivered, requester must force"
                );
                Ok(RequestOutcome::ResolveUnilaterally)
            }
        }
    }

    /// The active user answered a control request
    ///
    /// The answer goes to the requester's own peer. On accept the requester
    /// takes the front of the queue.
    ///
    /// # Errors
    ///
    /// Returns error if the device is unknown or the requester is not queued on it
    pub async fn respond(
        &self,
        device_id: &str,
        session: &str,
        action: ControlAction,
    ) -> Result<Dispatch> {
        let (requester, snapshot) = {
            let mut registry = self.registry.lock().await;
            let requester = queued_entry(&registry, device_id, session)?;
            let snapshot = if action == ControlAction::Accept {
                registry.reorder_to_front(device_id, session)?;
                registry.get(device_id).cloned()
            } else {
                None
            };
            (requester, snapshot)
        };

        tracing::info!(device_id, session, action = %action, "control response");

        let mut dispatch = Dispatch::none();
        if !requester.origin_peer.is_empty() {
            let client = self.client.clone();
            let peer = requester.origin_peer.clone();
            dispatch.push(detach("control response", peer.clone(), async move {
                client.forward_response(&peer, action, &requester).await
            }));
        }
        if let Some(device) = snapshot {
            dispatch.join(self.broadcaster.dispatch(device));
        }
        Ok(dispatch)
    }

    /// The requester takes control without an answer
    ///
    /// Nothing is forwarded; this path exists because communication failed.
    ///
    /// # Errors
    ///
    /// Returns error if the device is unknown or the requester is not queued on it
    pub async fn force(&self, device_id: &str, session: &str) -> Result<Dispatch> {
        let snapshot = {
            let mut registry = self.registry.lock().await;
            registry.reorder_to_front(device_id, session)?;
            registry.get(device_id).cloned()
        };

        tracing::info!(device_id, session, "control forced");
        Ok(snapshot.map_or_else(Dispatch::none, |device| self.broadcaster.dispatch(device)))
    }
}

fn queued_entry(
    registry: &crate::registry::Registry,
    device_id: &str,
    session: &str,
) -> Result<QueueEntry> {
    let device = registry
        .get(device_id)
        .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))?;
    device
        .position(session)
        .map(|i| device.queue[i].clone())
        .ok_or_else(|| Error::NotQueued {
            device_id: device_id.to_string(),
            session: session.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_actions() {
        assert_eq!("accept".parse::<ControlAction>().unwrap(), ControlAction::Accept);
        assert_eq!("reject".parse::<ControlAction>().unwrap(), ControlAction::Reject);
        assert!(matches!(
            "maybe".parse::<ControlAction>(),
            Err(Error::Invalid(_))
        ));
        assert_eq!(ControlAction::Accept.to_string(), "accept");
    }

    #[test]
    fn control_request_requires_ids() {
        let body: ControlRequest = serde_json::from_str(r#"{"machineID":"M1"}"#).unwrap();
        assert!(body.validate().is_err());

        let body: ControlRequest =
            serde_json::from_str(r#"{"machineID":"M1","session":"u1"}"#).unwrap();
        assert!(body.validate().is_ok());
    }
}
