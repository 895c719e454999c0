//! On-disk snapshot of device metadata
//!
//! Only owners and correlation keys survive a restart. Queues are always
//! written empty and rebuilt from the peers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::Result;
use crate::registry::{Device, SharedRegistry};

/// JSON file holding the device list
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot, with every queue emptied
    ///
    /// A missing file is an empty snapshot.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a device list
    pub async fn load(&self) -> Result<Vec<Device>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no snapshot found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let mut devices: Vec<Device> = serde_json::from_str(&contents)?;
        for device in &mut devices {
            device.queue.clear();
        }

        tracing::debug!(path = %self.path.display(), devices = devices.len(), "snapshot loaded");
        Ok(devices)
    }

    /// Write device metadata, creating the parent directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub async fn save(&self, devices: &[Device]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(devices).await
    }

    /// Persist the registry's current metadata, logging any failure
    ///
    /// The registry is read after the write lock is taken so a slower writer
    /// never replaces a newer snapshot with an older one.
    pub async fn persist(&self, registry: &SharedRegistry) {
        let _guard = self.write_lock.lock().await;
        let devices = registry.lock().await.persisted();

        if let Err(e) = self.write(&devices).await {
            tracing::error!(path = %self.path.display(), error = %e, "failed to write snapshot");
        }
    }

    async fn write(&self, devices: &[Device]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let emptied: Vec<Device> = devices
            .iter()
            .map(|d| Device {
                queue: Vec::new(),
                ..d.clone()
            })
            .collect();
        let json = serde_json::to_string_pretty(&emptied)?;
        tokio::fs::write(&self.path, json).await?;

        tracing::trace!(path = %self.path.display(), devices = devices.len(), "snapshot written");
        Ok(())
    }
}
