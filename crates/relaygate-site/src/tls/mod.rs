//! TLS termination for the site endpoints.

pub mod config;

pub use config::{TlsConfigError, TlsMode};
