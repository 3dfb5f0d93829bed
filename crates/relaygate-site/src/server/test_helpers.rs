//! Shared setup for the endpoint test modules.

use std::sync::Arc;

use tonic::Request;

use crate::auth::VerifiedIdentity;
use crate::certs::CertRetriever;
use crate::relays::RelaysRepository;
use crate::storage::SiteDatabase;
use crate::tasks::{ManualClock, TaskLimits, TasksRepository};

pub const START: i64 = 1_700_000_000;

pub struct Fixture {
    pub relays: RelaysRepository,
    pub tasks: Arc<TasksRepository>,
    pub certs: Arc<CertRetriever>,
    pub clock: Arc<ManualClock>,
}

/// In-memory site with a fresh CA and a manual clock.
pub async fn fixture(max_tasks: usize) -> Fixture {
    let db = SiteDatabase::open_in_memory().await.unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let limits = TaskLimits {
        ttl_secs: 120,
        max_tasks_per_relay: max_tasks,
        completed_retention_secs: 120,
    };
    let tasks = Arc::new(TasksRepository::new(db.clone(), limits, clock.clone()).unwrap());
    let certs = Arc::new(CertRetriever::new(
        relaygate_crypto::generate_ca("Test Site").unwrap(),
    ));
    Fixture {
        relays: RelaysRepository::new(db, Arc::clone(&tasks)),
        tasks,
        certs,
        clock,
    }
}

/// A request as it looks after the transport verified `cn`.
pub fn as_relay<T>(inner: T, cn: &str) -> Request<T> {
    let mut req = Request::new(inner);
    req.extensions_mut()
        .insert(VerifiedIdentity::from_trusted_header(cn).unwrap());
    req
}
