use tonic::{Code, Request};

use super::messages::{
    ListRelaysRequest, RegisterRelayRequest, RenewCertificateRequest, UnregisterRelayRequest,
};
use super::registration_svc::RelayRegistrationService;
use super::test_helpers::{as_relay, fixture};
use relaygate_crypto::{generate_csr, inspect_certificate};

fn register_request(relay_id: &str, cn: &str) -> RegisterRelayRequest {
    let (csr, _key) = generate_csr(cn).unwrap();
    RegisterRelayRequest {
        relay_id: relay_id.to_string(),
        alias: format!("{relay_id} alias"),
        csr,
        requested_not_after: None,
    }
}

#[tokio::test]
async fn register_returns_certificate_for_relay() {
    let f = fixture(10).await;
    let svc = RelayRegistrationService::new(f.relays.clone(), f.certs.clone());

    let resp = svc
        .register(Request::new(register_request("r1", "r1")))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(resp.relay_id, "r1");
    assert_eq!(resp.ca_cert, f.certs.ca_cert_pem());
    let info = inspect_certificate(&resp.client_cert).unwrap();
    assert_eq!(info.common_name.as_deref(), Some("r1"));
    assert_eq!(info.not_after, resp.not_valid_after);
}

#[tokio::test]
async fn register_with_foreign_csr_is_denied_and_rolled_back() {
    let f = fixture(10).await;
    let svc = RelayRegistrationService::new(f.relays.clone(), f.certs.clone());

    let err = svc
        .register(Request::new(register_request("r1", "r2")))
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::PermissionDenied);
    assert!(!f.relays.exists("r1").await.unwrap());
}

#[tokio::test]
async fn register_twice_is_already_exists() {
    let f = fixture(10).await;
    let svc = RelayRegistrationService::new(f.relays.clone(), f.certs.clone());
    svc.register(Request::new(register_request("r1", "r1")))
        .await
        .unwrap();

    let err = svc
        .register(Request::new(register_request("r1", "r1")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::AlreadyExists);
}

#[tokio::test]
async fn past_validity_request_is_invalid_argument() {
    let f = fixture(10).await;
    let svc = RelayRegistrationService::new(f.relays.clone(), f.certs.clone());
    let mut req = register_request("r1", "r1");
    req.requested_not_after = Some(1);

    let err = svc.register(Request::new(req)).await.unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
    assert!(!f.relays.exists("r1").await.unwrap());
}

#[tokio::test]
async fn renew_requires_matching_identity() {
    let f = fixture(10).await;
    let svc = RelayRegistrationService::new(f.relays.clone(), f.certs.clone());
    svc.register(Request::new(register_request("r1", "r1")))
        .await
        .unwrap();
    let (csr, _key) = generate_csr("r1").unwrap();
    let renew = RenewCertificateRequest {
        relay_id: "r1".to_string(),
        csr,
        requested_not_after: None,
    };

    let err = svc
        .renew(as_relay(renew.clone(), "r2"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::PermissionDenied);

    let err = svc.renew(Request::new(renew.clone())).await.unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);

    let resp = svc.renew(as_relay(renew, "r1")).await.unwrap().into_inner();
    assert_eq!(resp.relay_id, "r1");
}

#[tokio::test]
async fn unregister_and_list() {
    let f = fixture(10).await;
    let svc = RelayRegistrationService::new(f.relays.clone(), f.certs.clone());
    svc.register(Request::new(register_request("r1", "r1")))
        .await
        .unwrap();
    svc.register(Request::new(register_request("r2", "r2")))
        .await
        .unwrap();

    svc.unregister(Request::new(UnregisterRelayRequest {
        relay_id: "r1".to_string(),
    }))
    .await
    .unwrap();

    let listed = svc
        .list_relays(Request::new(ListRelaysRequest::default()))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(listed.relays.len(), 1);
    assert_eq!(listed.relays[0].relay_id, "r2");
    assert_eq!(listed.relays[0].alias, "r2 alias");

    let err = svc
        .unregister(Request::new(UnregisterRelayRequest {
            relay_id: "r1".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
}
