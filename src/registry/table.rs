//! In-memory table of machines and their user queues

use std::collections::{BTreeMap, HashSet};

use super::types::{Device, QueueEntry, same_address};
use crate::{Error, Result};

/// Outcome of placing a session in a machine's queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueued {
    /// A placeholder machine was created for the session
    pub created_device: bool,
    /// The session was moved here from another machine's queue
    pub moved_from: Option<String>,
    /// The session was already queued on this machine; nothing changed
    pub already_queued: bool,
}

/// Registry of every machine the hub knows about
///
/// Machines are created lazily and never removed. All methods are
/// synchronous so callers can hold the shared lock for a whole
/// find-then-mutate sequence without awaiting.
#[derive(Debug, Default)]
pub struct Registry {
    devices: BTreeMap<String, Device>,
    /// Last timestamp handed out, keeps stamps strictly increasing
    last_stamp: i64,
}

impl Registry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed machine metadata from a snapshot
    ///
    /// Queues are always discarded; they are rebuilt from peers. Returns the
    /// number of machines restored.
    pub fn restore(&mut self, devices: Vec<Device>) -> usize {
        let mut restored = 0;
        for mut device in devices {
            if device.device_id.is_empty() {
                continue;
            }
            device.queue.clear();
            self.devices.insert(device.device_id.clone(), device);
            restored += 1;
        }
        restored
    }

    /// Get a machine by id
    #[must_use]
    pub fn get(&self, device_id: &str) -> Option<&Device> {
        self.devices.get(device_id)
    }

    /// All machines, ordered by id
    #[must_use]
    pub fn list(&self) -> Vec<&Device> {
        self.devices.values().collect()
    }

    /// Find the machine carrying an external correlation key
    #[must_use]
    pub fn find_by_key(&self, key: &str) -> Option<&Device> {
        self.devices.values().find(|d| d.has_key(key))
    }

    /// Find the machine a session is queued on, with its index
    #[must_use]
    pub fn find_session(&self, session: &str) -> Option<(&Device, usize)> {
        self.devices
            .values()
            .find_map(|d| d.position(session).map(|i| (d, i)))
    }

    /// Machine metadata as it should be persisted (queues emptied)
    #[must_use]
    pub fn persisted(&self) -> Vec<Device> {
        self.devices
            .values()
            .map(|d| Device {
                queue: Vec::new(),
                ..d.clone()
            })
            .collect()
    }

    /// Number of known machines
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no machine is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Create or update a machine's owner and correlation keys
    ///
    /// The queue is left untouched
    pub fn upsert_device(
        &mut self,
        device_id: &str,
        owner_peer: Option<String>,
        correlation_keys: Vec<String>,
    ) -> &Device {
        let device = self.device_entry(device_id);
        device.owner_peer = owner_peer;
        device.correlation_keys = correlation_keys;
        device
    }

    /// Clear a machine's owner, keeping its queue and keys
    ///
    /// Returns false if the machine is unknown
    pub fn mark_disconnected(&mut self, device_id: &str) -> bool {
        self.devices.get_mut(device_id).is_some_and(|device| {
            device.owner_peer = None;
            true
        })
    }

    /// Append a session to a machine's queue
    ///
    /// Creates an ownerless placeholder if the machine is unknown. A session
    /// queued elsewhere is moved; a session already queued here keeps its place.
    pub fn enqueue_user(&mut self, device_id: &str, mut entry: QueueEntry) -> Enqueued {
        if self
            .get(device_id)
            .is_some_and(|d| d.position(&entry.session).is_some())
        {
            return Enqueued {
                created_device: false,
                moved_from: None,
                already_queued: true,
            };
        }

        let moved_from = self.dequeue_user(&entry.session);
        let created_device = !self.devices.contains_key(device_id);

        entry.device_id = device_id.to_string();
        entry.enqueued_at = self.stamp();
        self.device_entry(device_id).queue.push(entry);

        Enqueued {
            created_device,
            moved_from,
            already_queued: false,
        }
    }

    /// Remove a session from whichever queue holds it
    ///
    /// Returns the id of the machine it was removed from
    pub fn dequeue_user(&mut self, session: &str) -> Option<String> {
        let device = self
            .devices
            .values_mut()
            .find(|d| d.position(session).is_some())?;
        device.queue.retain(|e| e.session != session);
        Some(device.device_id.clone())
    }

    /// Move a session to the front; the rest stays ordered by enqueue time
    ///
    /// # Errors
    ///
    /// Returns error if the machine is unknown or the session is not queued on it
    pub fn reorder_to_front(&mut self, device_id: &str, session: &str) -> Result<()> {
        let device = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))?;

        if device.position(session).is_none() {
            return Err(Error::NotQueued {
                device_id: device_id.to_string(),
                session: session.to_string(),
            });
        }

        device
            .queue
            .sort_by_key(|e| (e.session != session, e.enqueued_at));
        Ok(())
    }

    /// Drop every entry that came in through a peer
    ///
    /// Returns the ids of machines whose queue changed
    pub fn purge_by_peer(&mut self, peer: &str) -> Vec<String> {
        let mut changed = Vec::new();
        for device in self.devices.values_mut() {
            let before = device.queue.len();
            device.queue.retain(|e| !same_address(&e.origin_peer, peer));
            if device.queue.len() != before {
                changed.push(device.device_id.clone());
            }
        }
        changed
    }

    /// Replace a machine's queue wholesale
    ///
    /// Duplicate sessions keep their first occurrence and sessions queued on
    /// other machines are taken off those machines. Returns the ids of the
    /// other machines that lost a session.
    pub fn replace_queue(&mut self, device_id: &str, entries: Vec<QueueEntry>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut queue = Vec::with_capacity(entries.len());
        for mut entry in entries {
            if entry.session.is_empty() || !seen.insert(entry.session.clone()) {
                continue;
            }
            entry.device_id = device_id.to_string();
            self.observe_stamp(&mut entry);
            queue.push(entry);
        }

        let mut others = Vec::new();
        for device in self.devices.values_mut() {
            if device.device_id == device_id {
                continue;
            }
            let before = device.queue.len();
            device.queue.retain(|e| !seen.contains(&e.session));
            if device.queue.len() != before {
                others.push(device.device_id.clone());
            }
        }

        self.device_entry(device_id).queue = queue;
        others
    }

    /// Merge one machine as reported by a peer's scan
    ///
    /// Unknown machines are inserted; known ones get the reported entries
    /// appended after their own. Sessions already queued anywhere are skipped
    /// and an existing owner is never overwritten. Returns whether anything
    /// changed.
    pub fn absorb(&mut self, reported: Device) -> bool {
        if reported.device_id.is_empty() {
            return false;
        }

        let Device {
            device_id,
            owner_peer,
            correlation_keys,
            queue,
        } = reported;

        let mut changed = false;
        if let Some(existing) = self.devices.get_mut(&device_id) {
            if existing.owner_peer.is_none() && owner_peer.is_some() {
                existing.owner_peer = owner_peer;
                changed = true;
            }
        } else {
            self.devices.insert(
                device_id.clone(),
                Device {
                    device_id: device_id.clone(),
                    owner_peer,
                    correlation_keys,
                    queue: Vec::new(),
                },
            );
            changed = true;
        }

        for mut entry in queue {
            if entry.session.is_empty() || self.find_session(&entry.session).is_some() {
                continue;
            }
            entry.device_id.clone_from(&device_id);
            self.observe_stamp(&mut entry);
            self.device_entry(&device_id).queue.push(entry);
            changed = true;
        }

        changed
    }

    /// Session at the head of every non-empty queue, keyed by machine id
    #[must_use]
    pub fn front_sessions(&self) -> BTreeMap<String, String> {
        self.devices
            .values()
            .filter_map(|d| d.queue.first().map(|e| (d.device_id.clone(), e.session.clone())))
            .collect()
    }

    /// Stable-sort the given machines' queues by enqueue time
    ///
    /// A session recorded in `fronts` for a machine stays at index 0, so a
    /// completed handoff survives the sort
    pub fn sort_queues<'a>(
        &mut self,
        device_ids: impl IntoIterator<Item = &'a String>,
        fronts: &BTreeMap<String, String>,
    ) {
        for id in device_ids {
            let Some(device) = self.devices.get_mut(id) else {
                continue;
            };
            match fronts.get(id) {
                Some(front) => device
                    .queue
                    .sort_by_key(|e| (&e.session != front, e.enqueued_at)),
                None => device.queue.sort_by_key(|e| e.enqueued_at),
            }
        }
    }

    /// Stable-sort every queue by enqueue time
    pub fn sort_all_queues(&mut self) {
        for device in self.devices.values_mut() {
            device.queue.sort_by_key(|e| e.enqueued_at);
        }
    }

    fn device_entry(&mut self, device_id: &str) -> &mut Device {
        self.devices
            .entry(device_id.to_string())
            .or_insert_with(|| Device::new(device_id))
    }

    /// Next strictly increasing millisecond timestamp
    fn stamp(&mut self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        self.last_stamp = now.max(self.last_stamp + 1);
        self.last_stamp
    }

    /// Keep a reported timestamp, stamping it if missing
    fn observe_stamp(&mut self, entry: &mut QueueEntry) {
        if entry.enqueued_at <= 0 {
            entry.enqueued_at = self.stamp();
        } else {
            self.last_stamp = self.last_stamp.max(entry.enqueued_at);
        }
    }
}
