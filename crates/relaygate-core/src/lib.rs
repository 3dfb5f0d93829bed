//! relaygate Core Library
//!
//! Shared functionality for relaygate components:
//! - Site configuration loading and validation
//! - SQLite pool helpers and the `define_database!` macro
//! - Tracing initialisation
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use config::SiteConfig;
pub use error::{Error, Result};
