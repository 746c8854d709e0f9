//! Collaborator contracts the registry consumes.
//!
//! Each trait has a `Noop` implementation so the core can be exercised
//! standalone before the surrounding broker subsystems are wired in.

use std::sync::Arc;

use {
    async_trait::async_trait,
    futures::stream::{self, BoxStream},
    petrel_protocol::AppMetadata,
};

use crate::auth::{AuthenticationService, Principal};

/// Live-instance view of the routing subsystem, consulted by the admission
/// uniqueness gate.
pub trait ServiceRoutingSelector: Send + Sync {
    fn contains_instance(&self, instance_id: i32) -> bool;
}

/// Service-mesh policy evaluation. Opaque to the registry; handed to each
/// responder for per-request checks.
pub trait ServiceMeshInspector: Send + Sync {
    fn is_allowed(&self, principal: &Principal, app_name: &str, service: &str) -> bool;
}

/// Setup rejection raised by a connection filter.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct FilterRejected(pub String);

/// Connection filter chain, run while the responder is constructed. An error
/// fails admission with a construction rejection.
pub trait FilterChain: Send + Sync {
    fn on_setup(&self, app: &AppMetadata) -> Result<(), FilterRejected>;
}

/// Services exported by the broker process itself rather than a connected
/// app. Opaque here; handed to each responder for call dispatch.
pub trait LocalServiceCaller: Send + Sync {
    fn contains(&self, service: &str) -> bool;
}

// ── Cluster membership ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerInfo {
    pub url: String,
    pub active: bool,
}

/// Cluster membership view.
pub trait BrokerManager: Send + Sync {
    fn is_standalone(&self) -> bool;
    fn current_brokers(&self) -> Vec<BrokerInfo>;
    /// Emits the full active-broker set on every membership change. Ordering
    /// within one emission is the membership source's ordering.
    fn membership(&self) -> BoxStream<'static, Vec<BrokerInfo>>;
}

// ── Bundle ───────────────────────────────────────────────────────────────────

/// Everything external the registry needs, injected at construction.
#[derive(Clone)]
pub struct RegistryServices {
    pub auth: Arc<dyn AuthenticationService>,
    pub routing: Arc<dyn ServiceRoutingSelector>,
    pub mesh: Arc<dyn ServiceMeshInspector>,
    pub filters: Arc<dyn FilterChain>,
    pub local_caller: Arc<dyn LocalServiceCaller>,
    pub broker_manager: Arc<dyn BrokerManager>,
}

impl RegistryServices {
    /// All-noop wiring: rejects every token, knows no instances, allows all
    /// mesh calls, and reports a standalone broker.
    pub fn noop() -> Self {
        Self {
            auth: Arc::new(NoopAuthenticationService),
            routing: Arc::new(NoopRoutingSelector),
            mesh: Arc::new(NoopMeshInspector),
            filters: Arc::new(NoopFilterChain),
            local_caller: Arc::new(NoopLocalServiceCaller),
            broker_manager: Arc::new(StandaloneBrokerManager),
        }
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthenticationService>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_routing(mut self, routing: Arc<dyn ServiceRoutingSelector>) -> Self {
        self.routing = routing;
        self
    }

    pub fn with_filters(mut self, filters: Arc<dyn FilterChain>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_broker_manager(mut self, broker_manager: Arc<dyn BrokerManager>) -> Self {
        self.broker_manager = broker_manager;
        self
    }
}

// ── Noop implementations ─────────────────────────────────────────────────────

struct NoopAuthenticationService;

#[async_trait]
impl AuthenticationService for NoopAuthenticationService {
    async fn auth(&self, _method: &str, _credentials: &str) -> Option<Principal> {
        None
    }
}

struct NoopRoutingSelector;

impl ServiceRoutingSelector for NoopRoutingSelector {
    fn contains_instance(&self, _instance_id: i32) -> bool {
        false
    }
}

struct NoopMeshInspector;

impl ServiceMeshInspector for NoopMeshInspector {
    fn is_allowed(&self, _principal: &Principal, _app_name: &str, _service: &str) -> bool {
        true
    }
}

struct NoopFilterChain;

impl FilterChain for NoopFilterChain {
    fn on_setup(&self, _app: &AppMetadata) -> Result<(), FilterRejected> {
        Ok(())
    }
}

struct NoopLocalServiceCaller;

impl LocalServiceCaller for NoopLocalServiceCaller {
    fn contains(&self, _service: &str) -> bool {
        false
    }
}

/// Standalone broker: no peers, membership stream never emits.
pub struct StandaloneBrokerManager;

impl BrokerManager for StandaloneBrokerManager {
    fn is_standalone(&self) -> bool {
        true
    }

    fn current_brokers(&self) -> Vec<BrokerInfo> {
        Vec::new()
    }

    fn membership(&self) -> BoxStream<'static, Vec<BrokerInfo>> {
        Box::pin(stream::pending())
    }
}
