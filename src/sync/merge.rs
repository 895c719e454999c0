//! Union merge of peer scan reports into the registry

use std::collections::BTreeSet;

use crate::registry::{Device, Registry};

/// Merge one peer's scan report
///
/// - Unknown devices are inserted with their reported queue
/// - Known devices keep their entries; reported ones are appended after them
/// - A session already queued anywhere is skipped (first copy wins)
/// - An existing owner is never overwritten
///
/// Queues are left unsorted; callers sort once all reports are in. Returns the
/// ids of devices that changed.
pub fn merge_report(registry: &mut Registry, devices: Vec<Device>) -> BTreeSet<String> {
    let mut touched = BTreeSet::new();
    for device in devices {
        let id = device.device_id.clone();
        if registry.absorb(device) {
            touched.insert(id);
        }
    }
    touched
}
