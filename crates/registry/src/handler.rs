//! Per-connection responder handler.

use std::{collections::HashSet, sync::Arc};

use petrel_protocol::{AppMetadata, EventEnvelope};

use crate::{
    auth::Principal,
    services::{FilterRejected, LocalServiceCaller, RegistryServices, ServiceMeshInspector},
    socket::RequesterSocket,
};

/// Role bit: the app calls services through the broker.
pub const ROLE_CONSUMER: u8 = 0b01;
/// Role bit: the app exposes services to the broker.
pub const ROLE_PUBLISHER: u8 = 0b10;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("requester socket already closed")]
    SocketClosed,

    #[error(transparent)]
    Filter(#[from] FilterRejected),
}

/// Broker-side object servicing one connected app: owns the requester
/// socket, the frozen descriptor and principal, and the app's service sets.
/// Lives from successful admission until socket disposal; owned exclusively
/// by the directory.
pub struct ResponderHandler {
    app: AppMetadata,
    principal: Principal,
    published_services: HashSet<String>,
    consumed_services: HashSet<String>,
    roles: u8,
    socket: RequesterSocket,
    mesh: Arc<dyn ServiceMeshInspector>,
    local_caller: Arc<dyn LocalServiceCaller>,
}

impl ResponderHandler {
    /// Construct from an enriched descriptor. Runs the connection filter
    /// chain; fails if a filter rejects the setup or the socket is already
    /// closed.
    pub(crate) fn build(
        app: AppMetadata,
        principal: Principal,
        socket: RequesterSocket,
        services: &RegistryServices,
    ) -> Result<Arc<Self>, HandlerError> {
        if socket.is_disposed() {
            return Err(HandlerError::SocketClosed);
        }
        services.filters.on_setup(&app)?;

        let published_services: HashSet<String> = app.published_services.iter().cloned().collect();
        let consumed_services: HashSet<String> = app.consumed_services.iter().cloned().collect();
        let mut roles = 0;
        if !consumed_services.is_empty() {
            roles |= ROLE_CONSUMER;
        }
        if !published_services.is_empty() {
            roles |= ROLE_PUBLISHER;
        }

        Ok(Arc::new(Self {
            app,
            principal,
            published_services,
            consumed_services,
            roles,
            socket,
            mesh: Arc::clone(&services.mesh),
            local_caller: Arc::clone(&services.local_caller),
        }))
    }

    pub fn app(&self) -> &AppMetadata {
        &self.app
    }

    /// Canonical uuid for this session: always the descriptor's, on both the
    /// registration and the disposal path.
    pub fn uuid(&self) -> &str {
        &self.app.uuid
    }

    pub fn app_name(&self) -> &str {
        &self.app.name
    }

    pub fn instance_id(&self) -> i32 {
        self.app.instance_id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn published_services(&self) -> &HashSet<String> {
        &self.published_services
    }

    pub fn consumed_services(&self) -> &HashSet<String> {
        &self.consumed_services
    }

    /// Role bitmask: [`ROLE_PUBLISHER`] | [`ROLE_CONSUMER`].
    pub fn roles(&self) -> u8 {
        self.roles
    }

    pub fn socket(&self) -> &RequesterSocket {
        &self.socket
    }

    /// Queue an envelope onto this session's write loop.
    pub fn send(&self, envelope: EventEnvelope) -> bool {
        self.socket.send(envelope)
    }

    /// Mesh policy view for this session's request dispatch.
    pub fn mesh(&self) -> &Arc<dyn ServiceMeshInspector> {
        &self.mesh
    }

    /// Broker-local services reachable from this session.
    pub fn local_caller(&self) -> &Arc<dyn LocalServiceCaller> {
        &self.local_caller
    }
}

impl std::fmt::Debug for ResponderHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderHandler")
            .field("uuid", &self.app.uuid)
            .field("name", &self.app.name)
            .field("instance_id", &self.app.instance_id)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}
