//! Machine registry
//!
//! The hub's single source of truth for which machines exist, which peer
//! owns each one, and the ordered queue of users waiting on it. Every
//! queue mutation happens under one lock so a session is never in two
//! queues at once.

pub mod table;
pub mod types;

use std::sync::Arc;

use tokio::sync::Mutex;

pub use table::{Enqueued, Registry};
pub use types::{Device, QueueEntry, normalize_address, same_address};

/// Registry shared between request handlers and background tasks
pub type SharedRegistry = Arc<Mutex<Registry>>;
