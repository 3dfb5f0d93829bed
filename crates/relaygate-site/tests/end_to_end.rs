//! Registration, task round trip and cascade removal through the public
//! endpoints, with relay identity supplied the way a trusted proxy would.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use tonic::metadata::MetadataValue;
use tonic::{Code, Request};

use relaygate_core::SiteConfig;
use relaygate_crypto::{generate_ca, generate_csr, inspect_certificate};
use relaygate_site::ControlPlane;
use relaygate_site::auth::trusted_header_interceptor;
use relaygate_site::server::messages::{
    CreateTaskRequest, PollTasksRequest, RegisterRelayRequest, TaskResultRequest,
    UnregisterRelayRequest,
};
use relaygate_site::storage::SiteDatabase;
use relaygate_site::tasks::{ManualClock, TaskSpec, TaskStatus};

const IDENTITY_HEADER: &str = "x-relay-cn";

/// Run `inner` through the trusted-header interceptor as if sent by `cn`.
fn from_relay<T>(inner: T, cn: &'static str) -> Request<T> {
    let mut carrier = Request::new(());
    carrier
        .metadata_mut()
        .insert(IDENTITY_HEADER, MetadataValue::from_static(cn));
    let carrier = trusted_header_interceptor(IDENTITY_HEADER)(carrier).unwrap();

    let (metadata, extensions, ()) = carrier.into_parts();
    Request::from_parts(metadata, extensions, inner)
}

async fn plane() -> ControlPlane {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SiteConfig::default();
    config.forwarding.monitoring_socket_path = Some(dir.path().join("core.sock"));

    let db = SiteDatabase::open_in_memory().await.unwrap();
    let ca = generate_ca("E2E Site").unwrap();
    ControlPlane::from_parts(config, db, ca, Arc::new(ManualClock::new(1_700_000_000))).unwrap()
}

fn fetch() -> TaskSpec {
    TaskSpec::Fetch {
        payload: serde_json::json!({"host": "db01", "service": "CPU load"}),
        timeout_secs: 30,
    }
}

#[tokio::test]
async fn register_poll_complete() {
    let plane = plane().await;
    let registration = plane.registration_service();
    let tasks = plane.task_service();

    let (csr, _key) = generate_csr("r1").unwrap();
    let cert = registration
        .register(Request::new(RegisterRelayRequest {
            relay_id: "r1".to_string(),
            alias: "Relay One".to_string(),
            csr,
            requested_not_after: None,
        }))
        .await
        .unwrap()
        .into_inner();
    let info = inspect_certificate(&cert.client_cert).unwrap();
    assert_eq!(info.common_name.as_deref(), Some("r1"));
    assert!(info.client_auth);

    let created = tasks
        .create_task(Request::new(CreateTaskRequest {
            relay_id: "r1".to_string(),
            spec: fetch(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(created.status, TaskStatus::Pending);

    let poll = || PollTasksRequest {
        relay_id: "r1".to_string(),
    };
    let polled = tasks
        .poll_tasks(from_relay(poll(), "r1"))
        .await
        .unwrap()
        .into_inner()
        .tasks;
    assert_eq!(polled.len(), 1);
    assert_eq!(polled[0].id, created.task_id);

    tasks
        .complete_task(from_relay(
            TaskResultRequest {
                relay_id: "r1".to_string(),
                task_id: created.task_id.clone(),
                result: "ok".to_string(),
            },
            "r1",
        ))
        .await
        .unwrap();

    let polled = tasks
        .poll_tasks(from_relay(poll(), "r1"))
        .await
        .unwrap()
        .into_inner()
        .tasks;
    assert!(polled.is_empty());
}

#[tokio::test]
async fn other_relay_cannot_poll() {
    let plane = plane().await;
    plane.relays().add_relay(Some("r1"), "one").await.unwrap();
    plane.relays().add_relay(Some("r2"), "two").await.unwrap();

    let err = plane
        .task_service()
        .poll_tasks(from_relay(
            PollTasksRequest {
                relay_id: "r1".to_string(),
            },
            "r2",
        ))
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::PermissionDenied);
    assert!(err.message().contains("r1"));
    assert!(err.message().contains("r2"));
}

#[tokio::test]
async fn unregister_drops_pending_tasks() {
    let plane = plane().await;
    plane.relays().add_relay(Some("r1"), "one").await.unwrap();
    let tasks = plane.task_service();
    for _ in 0..3 {
        tasks
            .create_task(Request::new(CreateTaskRequest {
                relay_id: "r1".to_string(),
                spec: fetch(),
            }))
            .await
            .unwrap();
    }

    plane
        .registration_service()
        .unregister(Request::new(UnregisterRelayRequest {
            relay_id: "r1".to_string(),
        }))
        .await
        .unwrap();

    assert_eq!(plane.tasks().purge_relay("r1").await, 0);
    assert_eq!(plane.tasks().queue_count().await, 0);

    let err = tasks
        .poll_tasks(from_relay(
            PollTasksRequest {
                relay_id: "r1".to_string(),
            },
            "r1",
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
}
