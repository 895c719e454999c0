//! Rebuilds queues from what the peers report

use std::collections::BTreeSet;

use crate::Result;
use crate::peers::{PeerClient, Peers};
use crate::registry::SharedRegistry;

use super::merge::merge_report;

/// Outcome of a full reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Peers whose report was merged
    pub scanned: usize,
    /// Peers that could not be scanned
    pub failed: usize,
    /// Devices created or changed by the run
    pub touched: BTreeSet<String>,
}

/// Loads peer scan reports into the registry
#[derive(Debug, Clone)]
pub struct Reconciler {
    registry: SharedRegistry,
    peers: Peers,
    client: PeerClient,
}

impl Reconciler {
    #[must_use]
    pub const fn new(registry: SharedRegistry, peers: Peers, client: PeerClient) -> Self {
        Self {
            registry,
            peers,
            client,
        }
    }

    /// Scan every configured peer in turn, then restore FIFO order
    ///
    /// Failing peers are logged and skipped
    pub async fn run(&self) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for peer in self.peers.addresses() {
            match self.ingest(peer).await {
                Ok(touched) => {
                    summary.scanned += 1;
                    summary.touched.extend(touched);
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(peer = %peer, error = %e, "failed to scan peer");
                }
            }
        }

        self.registry.lock().await.sort_all_queues();

        tracing::info!(
            scanned = summary.scanned,
            failed = summary.failed,
            devices = summary.touched.len(),
            "reconciliation complete"
        );
        summary
    }

    /// Scan a single peer and sort the devices it touched
    ///
    /// Whoever holds a machine when the report lands keeps it; only the
    /// entries behind the head are put back in FIFO order.
    ///
    /// # Errors
    ///
    /// Returns error if the peer cannot be scanned
    pub async fn reconcile_peer(&self, peer: &str) -> Result<BTreeSet<String>> {
        let devices = self.client.scan(peer).await?;
        tracing::debug!(peer, devices = devices.len(), "peer scan received");

        let mut registry = self.registry.lock().await;
        let fronts = registry.front_sessions();
        let touched = merge_report(&mut registry, devices);
        registry.sort_queues(&touched, &fronts);
        drop(registry);

        tracing::debug!(peer, devices = touched.len(), "peer rescanned");
        Ok(touched)
    }

    /// Fetch one report and merge it; the lock is not held during the scan
    async fn ingest(&self, peer: &str) -> Result<BTreeSet<String>> {
        let devices = self.client.scan(peer).await?;
        tracing::debug!(peer, devices = devices.len(), "peer scan received");

        let mut registry = self.registry.lock().await;
        Ok(merge_report(&mut registry, devices))
    }
}
