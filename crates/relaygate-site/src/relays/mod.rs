//! Durable registry of relays and the registration flow.

mod registration;
mod repository;

pub use registration::{RegistrationError, RegistrationOutcome, register_relay, renew_certificate};
pub use repository::{RelayRepoError, RelaysRepository, validate_relay_id};
