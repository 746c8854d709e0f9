//! Cluster-topology announcements.

use std::{sync::Arc, time::Duration};

use {
    futures::StreamExt,
    petrel_protocol::{EventEnvelope, UpstreamClusterChangedPayload},
    tokio::task::JoinHandle,
    tracing::{debug, info},
};

use crate::{
    handler::{ROLE_CONSUMER, ROLE_PUBLISHER},
    registry::HandlerRegistry,
    services::BrokerInfo,
};

/// Service interface announced in topology-change events.
const BROKER_SERVICE_INTERFACE: &str = "petrel.broker.BrokerService";

/// Subscribe to the broker-manager membership stream and fan each change out
/// to the live handlers. Runs until the membership stream ends.
pub fn spawn_cluster_announcer(registry: &Arc<HandlerRegistry>) -> JoinHandle<()> {
    let registry = Arc::clone(registry);
    tokio::spawn(async move {
        let mut membership = registry.services.broker_manager.membership();
        while let Some(brokers) = membership.next().await {
            announce(&registry, &brokers).await;
        }
        debug!("cluster: membership stream ended");
    })
}

/// Build the topology envelope for one membership emission, remember it for
/// handlers admitted later, and fan it out with role-staggered delays.
///
/// Publishers are told first so they are reachable on peer brokers before
/// any consumer starts routing there: publish-only handlers get the envelope
/// immediately, publish+consume handlers after the short delay, everything
/// else after the long one.
pub async fn announce(registry: &Arc<HandlerRegistry>, brokers: &[BrokerInfo]) {
    let uris: Vec<String> = brokers
        .iter()
        .filter(|broker| broker.active)
        .map(|broker| broker.url.clone())
        .collect();
    let payload = UpstreamClusterChangedPayload {
        group: registry.config.cluster_group.clone(),
        interface_name: BROKER_SERVICE_INTERFACE.to_string(),
        version: registry.next_topology_version(),
        uris,
    };
    let envelope = EventEnvelope::upstream_cluster_changed(registry.broker_id(), &payload);
    registry.set_topology(envelope.clone()).await;
    registry.bus.publish_event(envelope.clone());

    let handlers = registry.directory.find_all().await;
    info!(
        brokers = payload.uris.len(),
        version = payload.version,
        handlers = handlers.len(),
        "cluster: announcing topology change"
    );

    for handler in handlers {
        let delay = announce_delay(handler.roles(), registry);
        let envelope = envelope.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if !handler.send(envelope) {
                debug!(
                    app = %handler.app_name(),
                    instance_id = handler.instance_id(),
                    "cluster: session closed before announce"
                );
            }
        });
    }
}

fn announce_delay(roles: u8, registry: &HandlerRegistry) -> Duration {
    if roles == ROLE_PUBLISHER {
        Duration::ZERO
    } else if roles == ROLE_PUBLISHER | ROLE_CONSUMER {
        registry.config.publish_consume_announce_delay()
    } else {
        registry.config.consume_announce_delay()
    }
}
