//! HTTP client for calls into edge servers

use reqwest::{Client, Response, StatusCode};
use serde::Serialize;

use crate::handoff::ControlAction;
use crate::registry::{Device, QueueEntry, normalize_address};
use crate::{Error, Result};

/// Client for the hub-facing endpoints every edge server exposes
#[derive(Debug, Clone, Default)]
pub struct PeerClient {
    client: Client,
}

impl PeerClient {
    /// Create a new peer client
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch every device the peer knows, with its current queue
    ///
    /// # Errors
    ///
    /// Returns error if the peer is unreachable, answers non-success, or sends
    /// a body that is not a device list
    pub async fn scan(&self, peer: &str) -> Result<Vec<Device>> {
        let url = endpoint(peer, "hub/scan");
        let response = self.client.get(&url).send().await?;
        let response = check(&url, "scan", response).await?;

        let devices = response.json().await?;
        Ok(devices)
    }

    /// Push a full device record
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeerNotFound`] if the peer does not track the device,
    /// or another error if the call fails
    pub async fn push_device(&self, peer: &str, device: &Device) -> Result<()> {
        self.post(peer, "hub/broadcast", &device.device_id, device)
            .await
    }

    /// Ask the owning peer to put a control request to its active user
    ///
    /// # Errors
    ///
    /// Returns error if the peer is unreachable or answers non-success
    pub async fn forward_request(&self, peer: &str, requester: &QueueEntry) -> Result<()> {
        self.post(peer, "hub/control/request", &requester.session, requester)
            .await
    }

    /// Tell the requester's peer how its control request was answered
    ///
    /// # Errors
    ///
    /// Returns error if the peer is unreachable or answers non-success
    pub async fn forward_response(
        &self,
        peer: &str,
        action: ControlAction,
        requester: &QueueEntry,
    ) -> Result<()> {
        let path = format!("hub/control/response/{action}");
        self.post(peer, &path, &requester.session, requester).await
    }

    /// Forward an opaque telemetry payload to `{peer}/{path}`
    ///
    /// # Errors
    ///
    /// Returns error if the peer is unreachable or answers non-success
    pub async fn relay(&self, peer: &str, path: &str, payload: &serde_json::Value) -> Result<()> {
        self.post(peer, path, path, payload).await
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        peer: &str,
        path: &str,
        entity: &str,
        body: &T,
    ) -> Result<()> {
        let url = endpoint(peer, path);
        let response = self.client.post(&url).json(body).send().await?;
        check(&url, entity, response).await?;
        Ok(())
    }
}

/// Join a peer base address and a relative path
fn endpoint(peer: &str, path: &str) -> String {
    format!("{}/{}", normalize_address(peer), path.trim_start_matches('/'))
}

/// Map a non-success response to an error
async fn check(url: &str, entity: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(Error::PeerNotFound(entity.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::Peer {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}
