//! Edge servers the hub talks to
//!
//! The peer set is fixed at startup. Outbound calls other than the control
//! request forward run as detached tasks: their errors are logged here and
//! never reach the request that triggered them.

pub mod client;

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

pub use client::PeerClient;

use crate::Result;
use crate::registry::{normalize_address, same_address};

/// Configured peer base addresses, normalized and deduplicated
#[derive(Debug, Clone, Default)]
pub struct Peers {
    addresses: Arc<[String]>,
}

impl Peers {
    /// Build the peer set, keeping first occurrences in order
    #[must_use]
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for address in addresses {
            let address = normalize_address(address.as_ref());
            if !address.is_empty() && !unique.iter().any(|a| a == address) {
                unique.push(address.to_string());
            }
        }
        Self {
            addresses: unique.into(),
        }
    }

    /// All configured addresses
    #[must_use]
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// The configured form of an address, if it is a known peer
    #[must_use]
    pub fn resolve(&self, address: &str) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| same_address(a, address))
            .map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, address: &str) -> bool {
        self.resolve(address).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Handles of detached outbound calls
///
/// Callers in the request path drop this; tests await [`Dispatch::settled`]
/// to observe delivery.
#[derive(Debug, Default)]
pub struct Dispatch(Vec<JoinHandle<()>>);

impl Dispatch {
    /// No calls were issued
    #[must_use]
    pub const fn none() -> Self {
        Self(Vec::new())
    }

    /// Number of calls issued
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add one detached call
    pub fn push(&mut self, handle: JoinHandle<()>) {
        self.0.push(handle);
    }

    /// Merge another set of calls into this one
    pub fn join(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Wait until every call has completed or failed
    pub async fn settled(self) {
        futures::future::join_all(self.0).await;
    }
}

/// Run an outbound peer call in the background
///
/// A peer answering "not found" is expected and logged at debug; any other
/// failure is logged as a warning. Nothing is retried.
pub fn detach<F>(what: &'static str, peer: String, call: F) -> JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        match call.await {
            Ok(()) => tracing::trace!(peer = %peer, "{what} delivered"),
            Err(e) if e.is_peer_not_found() => {
                tracing::debug!(peer = %peer, error = %e, "{what}: peer does not track entity");
            }
            Err(e) => tracing::warn!(peer = %peer, error = %e, "{what} failed"),
        }
    })
}
