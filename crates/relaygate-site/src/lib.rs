//! relaygate site library
//!
//! Control and data plane for remote monitoring relays:
//! - SQLite registry of relays and the client certificates issued to them
//! - Bounded, TTL-evicting in-memory task queues per relay
//! - Client certificate issuance from relay CSRs
//! - mTLS identity checks for relay-facing endpoints
//! - Forwarding of relay-fetched data to the monitoring core socket
//! - Config-serial driven relay config sync

pub mod auth;
pub mod certs;
pub mod forward;
pub mod plane;
pub mod relays;
pub mod server;
pub mod storage;
pub mod sync;
pub mod tasks;
pub mod tls;

pub use plane::{ControlPlane, PlaneError};
