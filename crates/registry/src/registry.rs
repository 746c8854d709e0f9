//! Shared registry state and handler lifecycle.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use {
    petrel_protocol::{AppStatus, EventEnvelope, codes},
    tokio::sync::RwLock,
    tracing::{debug, info},
};

use crate::{
    config::RegistryConfig,
    directory::{DirectoryError, HandlerDirectory},
    error::AdmissionError,
    events::EventBus,
    handler::ResponderHandler,
    services::RegistryServices,
};

/// The broker handler registry: admission target, live-handler directory,
/// and event fan-out. Wrapped in `Arc` for use across async tasks.
pub struct HandlerRegistry {
    pub directory: HandlerDirectory,
    pub bus: EventBus,
    pub services: RegistryServices,
    pub config: RegistryConfig,
    /// Process-wide broker identity, assigned once at startup; event source
    /// for broker-originated envelopes.
    broker_id: String,
    /// Latest topology announcement, replayed to handlers admitted later.
    topology: RwLock<Option<EventEnvelope>>,
    topology_version: AtomicU64,
}

impl HandlerRegistry {
    pub fn new(
        broker_id: impl Into<String>,
        config: RegistryConfig,
        services: RegistryServices,
    ) -> Arc<Self> {
        let bus = EventBus::new(config.event_capacity, config.notice_capacity);
        Arc::new(Self {
            directory: HandlerDirectory::new(),
            bus,
            services,
            config,
            broker_id: broker_id.into(),
            topology: RwLock::new(None),
            topology_version: AtomicU64::new(0),
        })
    }

    pub fn broker_id(&self) -> &str {
        &self.broker_id
    }

    /// Insert a freshly admitted handler into the directory and announce it.
    ///
    /// Uniqueness is re-checked under the directory write lock; a racing
    /// admission of the same identity loses here with a duplicate rejection
    /// and no index or event side effects.
    pub async fn on_handler_registered(
        &self,
        handler: &Arc<ResponderHandler>,
    ) -> Result<(), AdmissionError> {
        self.directory
            .register(Arc::clone(handler))
            .await
            .map_err(|err| match err {
                DirectoryError::DuplicateInstance(id) => AdmissionError::DuplicateInstance(id),
                DirectoryError::DuplicateUuid(uuid) => AdmissionError::DuplicateUuid(uuid),
            })?;

        info!(
            code = codes::APP_CONNECTED,
            app = %handler.app_name(),
            instance_id = handler.instance_id(),
            "registry: responder registered"
        );
        self.bus
            .publish_event(EventEnvelope::app_status(handler.uuid(), AppStatus::Connected));
        self.bus.publish_notice(format!(
            "{}: app '{}' ({}) connected from {}",
            codes::NOTICE_CONNECTED,
            handler.app_name(),
            handler.uuid(),
            handler.app().ip
        ));

        // In cluster mode a newcomer must learn the current topology without
        // waiting for the next membership change.
        if !self.services.broker_manager.is_standalone()
            && let Some(topology) = self.current_topology().await
        {
            handler.send(topology);
        }
        Ok(())
    }

    /// Remove a handler from the directory and announce the stop. Idempotent;
    /// runs off the accept path. Announce failures are swallowed: the handler
    /// is gone from the directory regardless.
    pub async fn on_handler_disposed(&self, handler: &Arc<ResponderHandler>) {
        if !self.directory.remove(handler).await {
            debug!(
                app = %handler.app_name(),
                instance_id = handler.instance_id(),
                "registry: disposal for unregistered handler ignored"
            );
            return;
        }

        info!(
            code = codes::APP_STOPPED,
            app = %handler.app_name(),
            instance_id = handler.instance_id(),
            "registry: responder disposed"
        );
        self.bus
            .publish_event(EventEnvelope::app_status(handler.uuid(), AppStatus::Stopped));
        self.bus.publish_notice(format!(
            "{}: app '{}' ({}) stopped",
            codes::NOTICE_STOPPED,
            handler.app_name(),
            handler.uuid()
        ));
    }

    pub async fn current_topology(&self) -> Option<EventEnvelope> {
        self.topology.read().await.clone()
    }

    pub(crate) async fn set_topology(&self, envelope: EventEnvelope) {
        *self.topology.write().await = Some(envelope);
    }

    pub(crate) fn next_topology_version(&self) -> u64 {
        self.topology_version.fetch_add(1, Ordering::Relaxed) + 1
    }
}
