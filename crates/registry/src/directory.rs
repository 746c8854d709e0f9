//! Live-handler directory: three indices over one handler set.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::handler::ResponderHandler;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("instance {0} is already registered")]
    DuplicateInstance(i32),

    #[error("app uuid '{0}' is already registered")]
    DuplicateUuid(String),
}

/// The three indices live behind one lock and are only ever written
/// together, so a reader sees a handler in all of them or in none.
#[derive(Default)]
struct DirectoryInner {
    by_instance: HashMap<i32, Arc<ResponderHandler>>,
    by_uuid: HashMap<String, Arc<ResponderHandler>>,
    by_name: HashMap<String, Vec<Arc<ResponderHandler>>>,
}

/// Directory of live responder handlers, keyed by instance id, app uuid,
/// and (1:N) app name.
#[derive(Default)]
pub struct HandlerDirectory {
    inner: RwLock<DirectoryInner>,
}

impl HandlerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert into all three indices, or none. Uniqueness of both the
    /// instance id and the uuid is re-checked under the write lock, so two
    /// racing admissions of the same identity cannot both land.
    pub async fn register(&self, handler: Arc<ResponderHandler>) -> Result<(), DirectoryError> {
        let mut inner = self.inner.write().await;
        if inner.by_instance.contains_key(&handler.instance_id()) {
            return Err(DirectoryError::DuplicateInstance(handler.instance_id()));
        }
        if inner.by_uuid.contains_key(handler.uuid()) {
            return Err(DirectoryError::DuplicateUuid(handler.uuid().to_string()));
        }

        inner
            .by_instance
            .insert(handler.instance_id(), Arc::clone(&handler));
        inner
            .by_uuid
            .insert(handler.uuid().to_string(), Arc::clone(&handler));
        inner
            .by_name
            .entry(handler.app_name().to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    /// Remove from all three indices, keyed off the descriptor uuid. Returns
    /// false when the handler was not (or no longer) registered.
    pub async fn remove(&self, handler: &Arc<ResponderHandler>) -> bool {
        let mut inner = self.inner.write().await;
        let Some(registered) = inner.by_uuid.get(handler.uuid()) else {
            return false;
        };
        // A reconnect may have re-registered the uuid with a new handler;
        // only remove the entry this handler owns.
        if !Arc::ptr_eq(registered, handler) {
            return false;
        }

        inner.by_uuid.remove(handler.uuid());
        inner.by_instance.remove(&handler.instance_id());
        if let Some(replicas) = inner.by_name.get_mut(handler.app_name()) {
            replicas.retain(|h| !Arc::ptr_eq(h, handler));
            if replicas.is_empty() {
                inner.by_name.remove(handler.app_name());
            }
        }
        true
    }

    /// Snapshot of every live handler.
    pub async fn find_all(&self) -> Vec<Arc<ResponderHandler>> {
        self.inner.read().await.by_uuid.values().cloned().collect()
    }

    pub async fn find_by_uuid(&self, uuid: &str) -> Option<Arc<ResponderHandler>> {
        self.inner.read().await.by_uuid.get(uuid).cloned()
    }

    pub async fn find_by_instance(&self, instance_id: i32) -> Option<Arc<ResponderHandler>> {
        self.inner.read().await.by_instance.get(&instance_id).cloned()
    }

    /// Snapshot of the replicas registered under one app name; the live set
    /// may change right after the call returns.
    pub async fn find_by_app_name(&self, name: &str) -> Vec<Arc<ResponderHandler>> {
        self.inner
            .read()
            .await
            .by_name
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn app_names(&self) -> Vec<String> {
        self.inner.read().await.by_name.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_uuid.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.by_uuid.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{auth::Principal, services::RegistryServices, socket::RequesterSocket},
        petrel_protocol::AppMetadata,
    };

    fn handler(uuid: &str, name: &str, instance_id: i32) -> Arc<ResponderHandler> {
        let (socket, _rx) = RequesterSocket::channel();
        let app = AppMetadata {
            uuid: uuid.into(),
            name: name.into(),
            ip: "10.0.0.1".into(),
            sdk: None,
            device: None,
            published_services: vec![],
            consumed_services: vec![],
            metadata: Default::default(),
            connected_at: None,
            instance_id,
        };
        ResponderHandler::build(app, Principal::default(), socket, &RegistryServices::noop())
            .unwrap()
    }

    #[tokio::test]
    async fn handler_lands_in_all_three_indices() {
        let dir = HandlerDirectory::new();
        let h = handler("uuid-a", "svc-a", 1);
        dir.register(Arc::clone(&h)).await.unwrap();

        assert!(Arc::ptr_eq(&dir.find_by_uuid("uuid-a").await.unwrap(), &h));
        assert!(Arc::ptr_eq(&dir.find_by_instance(1).await.unwrap(), &h));
        assert_eq!(dir.find_by_app_name("svc-a").await.len(), 1);
        assert_eq!(dir.len().await, 1);
    }

    #[tokio::test]
    async fn remove_clears_all_three_indices() {
        let dir = HandlerDirectory::new();
        let h = handler("uuid-a", "svc-a", 1);
        dir.register(Arc::clone(&h)).await.unwrap();

        assert!(dir.remove(&h).await);
        assert!(dir.find_by_uuid("uuid-a").await.is_none());
        assert!(dir.find_by_instance(1).await.is_none());
        assert!(dir.find_by_app_name("svc-a").await.is_empty());
        assert!(dir.is_empty().await);

        // Second removal is a no-op.
        assert!(!dir.remove(&h).await);
    }

    #[tokio::test]
    async fn duplicate_instance_or_uuid_is_rejected_whole() {
        let dir = HandlerDirectory::new();
        dir.register(handler("uuid-a", "svc-a", 1)).await.unwrap();

        let same_instance = handler("uuid-b", "svc-b", 1);
        assert!(matches!(
            dir.register(Arc::clone(&same_instance)).await,
            Err(DirectoryError::DuplicateInstance(1))
        ));
        // The losing handler is absent from every index.
        assert!(dir.find_by_uuid("uuid-b").await.is_none());
        assert!(dir.find_by_app_name("svc-b").await.is_empty());

        let same_uuid = handler("uuid-a", "svc-c", 2);
        assert!(matches!(
            dir.register(same_uuid).await,
            Err(DirectoryError::DuplicateUuid(_))
        ));
        assert!(dir.find_by_instance(2).await.is_none());
        assert_eq!(dir.len().await, 1);
    }

    #[tokio::test]
    async fn app_name_multiset_holds_replicas() {
        let dir = HandlerDirectory::new();
        let first = handler("uuid-a", "svc-a", 1);
        let second = handler("uuid-b", "svc-a", 2);
        dir.register(Arc::clone(&first)).await.unwrap();
        dir.register(Arc::clone(&second)).await.unwrap();

        assert_eq!(dir.find_by_app_name("svc-a").await.len(), 2);
        assert_eq!(dir.app_names().await, vec!["svc-a".to_string()]);

        dir.remove(&first).await;
        let remaining = dir.find_by_app_name("svc-a").await;
        assert_eq!(remaining.len(), 1);
        assert!(Arc::ptr_eq(&remaining[0], &second));
    }

    #[tokio::test]
    async fn find_by_app_name_returns_a_snapshot() {
        let dir = HandlerDirectory::new();
        let h = handler("uuid-a", "svc-a", 1);
        dir.register(Arc::clone(&h)).await.unwrap();

        let snapshot = dir.find_by_app_name("svc-a").await;
        dir.remove(&h).await;
        // The snapshot is unaffected by the removal.
        assert_eq!(snapshot.len(), 1);
        assert!(dir.find_by_app_name("svc-a").await.is_empty());
    }
}
