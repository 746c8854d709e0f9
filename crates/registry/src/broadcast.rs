//! Event dispatch over the directory.

use std::sync::Arc;

use {petrel_protocol::EventEnvelope, tracing::debug};

use crate::registry::HandlerRegistry;

/// Deliver an envelope to every handler registered under `app_name`, or to
/// every live handler when `app_name` is `"*"`. Unknown names are a no-op.
///
/// Each target gets the envelope exactly once, fire-and-forget on its own
/// send queue; a dead session is skipped and never aborts the sweep.
pub async fn broadcast(registry: &Arc<HandlerRegistry>, app_name: &str, envelope: &EventEnvelope) {
    let targets = if app_name == "*" {
        registry.directory.find_all().await
    } else {
        registry.directory.find_by_app_name(app_name).await
    };
    if targets.is_empty() {
        debug!(app = %app_name, event = %envelope.r#type, "broadcast: no targets");
        return;
    }

    for handler in &targets {
        if !handler.send(envelope.clone()) {
            debug!(
                app = %handler.app_name(),
                instance_id = handler.instance_id(),
                "broadcast: session closed, skipping"
            );
        }
    }
    debug!(
        app = %app_name,
        event = %envelope.r#type,
        targets = targets.len(),
        "broadcast: dispatched"
    );
}
