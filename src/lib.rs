//! Machine Hub - coordination point for edge servers sharing machines
//!
//! Users reach shared measurement machines through edge servers. The hub keeps
//! one authoritative queue per machine, tells every interested server when a
//! queue changes, and brokers control handoffs between queued users.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                   Edge servers                     │
//! │     peer A     │     peer B     │     peer C       │
//! └───────┬────────────────▲───────────────────────────┘
//!         │ connect /      │ scan / broadcast /
//!         │ control        │ control forwards
//! ┌───────▼────────────────┴───────────────────────────┐
//! │                   Machine Hub                      │
//! │  Registry │ Reconciler │ Broadcaster │ Handoff     │
//! └───────────────────────┬────────────────────────────┘
//!                         │
//!                  machines.json (metadata only)
//! ```

pub mod api;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod handoff;
pub mod hub;
pub mod peers;
pub mod registry;
pub mod relay;
pub mod snapshot;
pub mod sync;

pub use config::Config;
pub use error::{Error, Result};
pub use hub::Hub;
pub use registry::{Device, QueueEntry, Registry, SharedRegistry};
