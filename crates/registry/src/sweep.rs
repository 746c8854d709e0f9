//! Stale-handler reaping.
//!
//! Normally a handler leaves the directory through the disposal hook spawned
//! at admission. If that hook is lost (task aborted, close signal raced with
//! a runtime shutdown), the handler would sit in the directory with a dead
//! socket forever. The sweeper catches those: a handler whose socket has
//! signaled close but which is still registered after a grace window is
//! force-disposed through the normal path.

use std::{collections::HashMap, sync::Arc};

use {
    tokio::{
        task::JoinHandle,
        time::{Instant, MissedTickBehavior},
    },
    tracing::warn,
};

use crate::registry::HandlerRegistry;

/// Run the sweep on the configured interval. The task runs for the broker
/// lifetime; abort the handle to stop it.
pub fn spawn_stale_sweeper(registry: &Arc<HandlerRegistry>) -> JoinHandle<()> {
    let registry = Arc::clone(registry);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(registry.config.stale_sweep_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut first_seen_closed: HashMap<i32, Instant> = HashMap::new();
        loop {
            ticker.tick().await;
            sweep_once(&registry, &mut first_seen_closed).await;
        }
    })
}

async fn sweep_once(registry: &Arc<HandlerRegistry>, first_seen_closed: &mut HashMap<i32, Instant>) {
    let now = Instant::now();
    let handlers = registry.directory.find_all().await;

    // Drop bookkeeping for handlers that already left the directory.
    let live: Vec<i32> = handlers.iter().map(|h| h.instance_id()).collect();
    first_seen_closed.retain(|instance_id, _| live.contains(instance_id));

    for handler in handlers {
        if !handler.socket().is_disposed() {
            first_seen_closed.remove(&handler.instance_id());
            continue;
        }
        let seen = *first_seen_closed
            .entry(handler.instance_id())
            .or_insert(now);
        if now.duration_since(seen) >= registry.config.stale_grace() {
            warn!(
                app = %handler.app_name(),
                instance_id = handler.instance_id(),
                "sweep: disposing stale handler"
            );
            registry.on_handler_disposed(&handler).await;
            first_seen_closed.remove(&handler.instance_id());
        }
    }
}
