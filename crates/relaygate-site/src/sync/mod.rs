//! Relay configuration sync.
//!
//! A watcher publishes the site's current config serial; the producer
//! enqueues one relay-config task per relay whenever it changes.

mod producer;
mod serial;

pub use producer::{ConfigSyncTaskProducer, SyncReport};
pub use serial::{read_config_serial, spawn_serial_watcher};
