#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the connection-admission pipeline.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use async_trait::async_trait;

use {
    petrel_protocol::{
        AppStatus, AppStatusPayload, EVENT_TYPE_APP_STATUS, MIME_APP_METADATA, MIME_BEARER_TOKEN,
        SetupPayload, metadata::encode_entry,
    },
    petrel_registry::{
        AUTH_METHOD_JWT, AuthenticationService, FilterChain, FilterRejected, HandlerRegistry,
        Principal, RegistryConfig, RegistryServices, RequesterSocket, ServiceRoutingSelector,
        accept, derive_instance_id,
    },
};

const UUID_A: &str = "00000000000000000000000000000000-abc";

fn descriptor(uuid: &str, name: &str) -> serde_json::Value {
    serde_json::json!({ "uuid": uuid, "name": name, "ip": "10.0.0.1" })
}

fn setup(descriptor: Option<&serde_json::Value>, token: Option<&str>) -> SetupPayload {
    let mut buf = Vec::new();
    if let Some(token) = token {
        encode_entry(&mut buf, MIME_BEARER_TOKEN, token.as_bytes());
    }
    if let Some(descriptor) = descriptor {
        encode_entry(&mut buf, MIME_APP_METADATA, descriptor.to_string().as_bytes());
    }
    SetupPayload::from_metadata(buf)
}

fn registry_without_auth() -> Arc<HandlerRegistry> {
    HandlerRegistry::new(
        "broker-test",
        RegistryConfig {
            auth_required: false,
            ..RegistryConfig::default()
        },
        RegistryServices::noop(),
    )
}

/// Accepts exactly one bearer token, with a fixed principal.
struct StaticAuth {
    principal: Principal,
}

impl StaticAuth {
    fn principal() -> Principal {
        Principal {
            subject: "svc-a".into(),
            organizations: BTreeSet::from(["acme".to_string(), "zeta".to_string()]),
            roles: BTreeSet::from(["ops".to_string()]),
            service_accounts: BTreeSet::from(["deployer".to_string()]),
            authorities: BTreeSet::new(),
        }
    }
}

#[async_trait]
impl AuthenticationService for StaticAuth {
    async fn auth(&self, method: &str, credentials: &str) -> Option<Principal> {
        (method == AUTH_METHOD_JWT && credentials == "good-token")
            .then(|| self.principal.clone())
    }
}

fn registry_with_auth() -> Arc<HandlerRegistry> {
    HandlerRegistry::new(
        "broker-test",
        RegistryConfig::default(),
        RegistryServices::noop().with_auth(Arc::new(StaticAuth {
            principal: StaticAuth::principal(),
        })),
    )
}

#[tokio::test]
async fn happy_path_with_auth_disabled() {
    let registry = registry_without_auth();
    let mut events = registry.bus.subscribe_events();
    let (socket, _rx) = RequesterSocket::channel();

    let handler = accept(&registry, setup(Some(&descriptor(UUID_A, "svc-a")), None), socket)
        .await
        .unwrap();

    assert_eq!(handler.uuid(), UUID_A);
    assert_eq!(handler.app_name(), "svc-a");
    assert_ne!(handler.instance_id(), 0);
    assert!(handler.app().connected_at.is_some());

    let replicas = registry.directory.find_by_app_name("svc-a").await;
    assert_eq!(replicas.len(), 1);
    assert!(Arc::ptr_eq(&replicas[0], &handler));

    let envelope = events.recv().await.unwrap();
    assert_eq!(envelope.r#type, EVENT_TYPE_APP_STATUS);
    assert_eq!(envelope.source, format!("app://{UUID_A}"));
    let payload: AppStatusPayload = serde_json::from_value(envelope.data).unwrap();
    assert_eq!(payload.status, AppStatus::Connected);
    assert_eq!(payload.id, UUID_A);

    // The mock principal's identity is on the descriptor.
    assert_eq!(handler.app().metadata["_orgs"], "default");
    assert_eq!(handler.app().metadata["_roles"], "admin");
}

#[tokio::test]
async fn missing_bearer_token_is_rejected_when_auth_required() {
    let registry = registry_with_auth();
    let (socket, _rx) = RequesterSocket::channel();

    let err = accept(
        &registry,
        setup(Some(&descriptor(UUID_A, "svc-a")), None),
        socket.clone(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), "RST-500405");
    assert!(socket.is_disposed());
    assert!(registry.directory.is_empty().await);
}

#[tokio::test]
async fn unverifiable_token_is_rejected() {
    let registry = registry_with_auth();
    let (socket, _rx) = RequesterSocket::channel();

    let err = accept(
        &registry,
        setup(Some(&descriptor(UUID_A, "svc-a")), Some("forged")),
        socket.clone(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), "RST-500405");
    assert!(socket.is_disposed());
    assert!(registry.directory.is_empty().await);
}

#[tokio::test]
async fn verified_token_admits_and_principal_wins_over_client_metadata() {
    let registry = registry_with_auth();
    let (socket, _rx) = RequesterSocket::channel();

    let mut spoofed = descriptor(UUID_A, "svc-a");
    spoofed["metadata"] =
        serde_json::json!({ "_orgs": "spoofed", "_roles": "root", "_serviceAccounts": "sa" });

    let handler = accept(&registry, setup(Some(&spoofed), Some("good-token")), socket)
        .await
        .unwrap();

    assert_eq!(handler.app().metadata["_orgs"], "acme,zeta");
    assert_eq!(handler.app().metadata["_roles"], "ops");
    assert_eq!(handler.app().metadata["_serviceAccounts"], "deployer");
    assert_eq!(handler.principal().subject, "svc-a");
    // The routing slot is the digest of the verified credentials and uuid.
    assert_eq!(
        handler.instance_id(),
        derive_instance_id("good-token", UUID_A)
    );
}

#[tokio::test]
async fn short_uuid_is_rejected_and_echoed() {
    let registry = registry_without_auth();
    let (socket, _rx) = RequesterSocket::channel();

    let err = accept(
        &registry,
        setup(Some(&descriptor("short", "svc-a")), None),
        socket.clone(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), "RST-500410");
    assert!(err.to_string().contains("'short'"));
    assert!(socket.is_disposed());
    assert!(registry.directory.is_empty().await);
}

#[tokio::test]
async fn missing_app_descriptor_is_rejected() {
    let registry = registry_without_auth();
    let (socket, _rx) = RequesterSocket::channel();

    let err = accept(&registry, setup(None, None), socket.clone())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "RST-500411");
    assert!(socket.is_disposed());
}

#[tokio::test]
async fn garbage_metadata_is_rejected_as_parse_failure() {
    let registry = registry_without_auth();
    let (socket, _rx) = RequesterSocket::channel();

    // A lone custom-mime length byte with nothing behind it.
    let err = accept(&registry, SetupPayload::from_metadata(vec![0x04]), socket.clone())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "RST-500402");
    assert!(socket.is_disposed());
}

#[tokio::test]
async fn malformed_descriptor_json_is_rejected_as_parse_failure() {
    let registry = registry_without_auth();
    let (socket, _rx) = RequesterSocket::channel();

    let mut buf = Vec::new();
    encode_entry(&mut buf, MIME_APP_METADATA, b"{not json");
    let err = accept(&registry, SetupPayload::from_metadata(buf), socket.clone())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "RST-500402");
    assert!(socket.is_disposed());
}

struct EverythingLive;

impl ServiceRoutingSelector for EverythingLive {
    fn contains_instance(&self, _instance_id: i32) -> bool {
        true
    }
}

#[tokio::test]
async fn instance_already_known_to_routing_is_rejected() {
    let registry = HandlerRegistry::new(
        "broker-test",
        RegistryConfig {
            auth_required: false,
            ..RegistryConfig::default()
        },
        RegistryServices::noop().with_routing(Arc::new(EverythingLive)),
    );
    let (socket, _rx) = RequesterSocket::channel();

    let err = accept(
        &registry,
        setup(Some(&descriptor(UUID_A, "svc-a")), None),
        socket.clone(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), "RST-500409");
    assert!(socket.is_disposed());
    assert!(registry.directory.is_empty().await);
}

#[tokio::test]
async fn racing_admissions_of_the_same_identity_admit_exactly_one() {
    // Auth on: both sessions present the same token and uuid, so both derive
    // the same instance id and only the directory lock decides the winner.
    let registry = registry_with_auth();
    let (socket_a, _rx_a) = RequesterSocket::channel();
    let (socket_b, _rx_b) = RequesterSocket::channel();

    let (first, second) = tokio::join!(
        accept(
            &registry,
            setup(Some(&descriptor(UUID_A, "svc-a")), Some("good-token")),
            socket_a,
        ),
        accept(
            &registry,
            setup(Some(&descriptor(UUID_A, "svc-a")), Some("good-token")),
            socket_b,
        ),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = outcomes.iter().find(|r| r.is_err()).unwrap();
    assert_eq!(loser.as_ref().unwrap_err().code(), "RST-500409");
    assert_eq!(registry.directory.len().await, 1);
}

struct RejectAll;

impl FilterChain for RejectAll {
    fn on_setup(&self, _app: &petrel_protocol::AppMetadata) -> Result<(), FilterRejected> {
        Err(FilterRejected("tenant quota exhausted".into()))
    }
}

#[tokio::test]
async fn filter_rejection_surfaces_as_construction_failure() {
    let registry = HandlerRegistry::new(
        "broker-test",
        RegistryConfig {
            auth_required: false,
            ..RegistryConfig::default()
        },
        RegistryServices::noop().with_filters(Arc::new(RejectAll)),
    );
    let (socket, _rx) = RequesterSocket::channel();

    let err = accept(
        &registry,
        setup(Some(&descriptor(UUID_A, "svc-a")), None),
        socket.clone(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), "RST-500406");
    assert!(err.to_string().contains("tenant quota exhausted"));
    assert!(socket.is_disposed());
    assert!(registry.directory.is_empty().await);
}

#[tokio::test]
async fn rejection_publishes_no_events() {
    let registry = registry_with_auth();
    let mut events = registry.bus.subscribe_events();
    let mut notices = registry.bus.subscribe_notices();
    let (socket, _rx) = RequesterSocket::channel();

    let _ = accept(&registry, setup(Some(&descriptor(UUID_A, "svc-a")), None), socket).await;

    assert!(events.try_recv().is_err());
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn socket_close_runs_disposal_and_publishes_stopped() {
    let registry = registry_without_auth();
    let (socket, _rx) = RequesterSocket::channel();

    let handler = accept(&registry, setup(Some(&descriptor(UUID_A, "svc-a")), None), socket)
        .await
        .unwrap();
    let mut events = registry.bus.subscribe_events();

    handler.socket().dispose();

    let envelope = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    let payload: AppStatusPayload = serde_json::from_value(envelope.data).unwrap();
    assert_eq!(payload.status, AppStatus::Stopped);
    assert_eq!(payload.id, UUID_A);

    assert!(registry.directory.is_empty().await);
    assert!(registry.directory.find_by_uuid(UUID_A).await.is_none());
}

#[tokio::test]
async fn reconnect_with_same_identity_lands_on_same_routing_slot() {
    let registry = registry_with_auth();

    let (socket, _rx) = RequesterSocket::channel();
    let handler = accept(
        &registry,
        setup(Some(&descriptor(UUID_A, "svc-a")), Some("good-token")),
        socket,
    )
    .await
    .unwrap();
    let first_instance = handler.instance_id();

    handler.socket().dispose();
    // Wait for the disposal hook to clear the directory.
    tokio::time::timeout(Duration::from_secs(5), async {
        while !registry.directory.is_empty().await {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    let (socket, _rx) = RequesterSocket::channel();
    let reconnected = accept(
        &registry,
        setup(Some(&descriptor(UUID_A, "svc-a")), Some("good-token")),
        socket,
    )
    .await
    .unwrap();
    assert_eq!(reconnected.instance_id(), first_instance);
}
