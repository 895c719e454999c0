//! Queue reconciliation against the edge servers
//!
//! Queues are never persisted. At startup, and whenever a peer reconnects,
//! the hub asks peers for their view of every device and merges the reports.
//! Merging is append-only and skips sessions already queued, so it is safe to
//! run alongside live traffic.

pub mod merge;
pub mod reconciler;

pub use merge::merge_report;
pub use reconciler::{ReconcileSummary, Reconciler};
