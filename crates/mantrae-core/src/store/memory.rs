// # Memory Store
//
// In-memory implementation of Store.
//
// ## Purpose
//
// Provides a simple, fast store that doesn't persist across restarts.
// Useful for testing and for embedding the engine behind an API layer that
// seeds declared state itself.
//
// ## Crash Behavior
//
// - All rows and instance snapshots are lost on restart
// - The first poll after a restart recreates each snapshot

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::StoreData;
use crate::Error;
use crate::model::{
    DnsProviderRow, InstanceEndpoint, InstanceSnapshot, InstanceUpdate, Profile, Protocol,
    ResourceKind, ResourceRow, RouterDnsBinding, RouterDnsLink,
};
use crate::traits::Store;

/// In-memory store implementation
///
/// All rows live in one [`StoreData`] protected by a RwLock. Clones share
/// the same data.
///
/// # Example
///
/// ```rust,no_run
/// use mantrae_core::store::MemoryStore;
/// use mantrae_core::model::Profile;
/// use mantrae_core::traits::Store;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new();
///     store.insert_profile(Profile { id: 1, name: "default".into() }).await;
///
///     let profile = store.get_profile_by_name("default").await?;
///     assert_eq!(profile.map(|p| p.id), Some(1));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<StoreData>>,
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with existing rows
    pub fn with_data(data: StoreData) -> Self {
        Self {
            inner: Arc::new(RwLock::new(data)),
        }
    }

    /// Copy of every row currently held
    pub async fn snapshot(&self) -> StoreData {
        self.inner.read().await.clone()
    }

    pub async fn insert_profile(&self, profile: Profile) {
        self.inner.write().await.insert_profile(profile);
    }

    pub async fn upsert_resource(&self, row: ResourceRow) {
        self.inner.write().await.upsert_resource(row);
    }

    pub async fn remove_resource(&self, id: i64) -> Option<ResourceRow> {
        self.inner.write().await.remove_resource(id)
    }

    /// Insert or replace a DNS provider; at most one stays default
    pub async fn upsert_dns_provider(&self, row: DnsProviderRow) {
        self.inner.write().await.upsert_dns_provider(row);
    }

    pub async fn link_router_dns(&self, link: RouterDnsLink) {
        self.inner.write().await.link_router_dns(link);
    }

    pub async fn unlink_router_dns(&self, protocol: Protocol, router_id: i64) {
        self.inner
            .write()
            .await
            .unlink_router_dns(protocol, router_id);
    }

    pub async fn upsert_instance_endpoint(&self, endpoint: InstanceEndpoint) {
        self.inner.write().await.upsert_instance_endpoint(endpoint);
    }

    /// Number of instance snapshots held
    pub async fn instance_count(&self) -> usize {
        self.inner.read().await.instances.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_profile(&self, id: i64) -> Result<Option<Profile>, Error> {
        Ok(self.inner.read().await.profile(id))
    }

    async fn get_profile_by_name(&self, name: &str) -> Result<Option<Profile>, Error> {
        Ok(self.inner.read().await.profile_by_name(name))
    }

    async fn list_enabled(
        &self,
        profile_id: i64,
        protocol: Protocol,
        kind: ResourceKind,
    ) -> Result<Vec<ResourceRow>, Error> {
        Ok(self
            .inner
            .read()
            .await
            .list_enabled(profile_id, protocol, kind))
    }

    async fn get_dns_provider(&self, id: i64) -> Result<Option<DnsProviderRow>, Error> {
        Ok(self.inner.read().await.dns_provider(id))
    }

    async fn list_router_dns_bindings(&self) -> Result<Vec<RouterDnsBinding>, Error> {
        Ok(self.inner.read().await.router_dns_bindings())
    }

    async fn list_instance_endpoints(&self, name: &str) -> Result<Vec<InstanceEndpoint>, Error> {
        Ok(self.inner.read().await.instance_endpoints(name))
    }

    async fn list_all_instance_endpoints(&self) -> Result<Vec<InstanceEndpoint>, Error> {
        Ok(self.inner.read().await.instance_endpoints.clone())
    }

    async fn get_instance(
        &self,
        profile_id: i64,
        name: &str,
    ) -> Result<Option<InstanceSnapshot>, Error> {
        Ok(self.inner.read().await.instance(profile_id, name))
    }

    async fn upsert_instance(&self, update: InstanceUpdate) -> Result<InstanceSnapshot, Error> {
        Ok(self.inner.write().await.upsert_instance(update, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, name: &str, protocol: Protocol, enabled: bool) -> ResourceRow {
        ResourceRow {
            id,
            profile_id: 1,
            agent_id: None,
            name: name.to_string(),
            protocol,
            kind: ResourceKind::Service,
            config: serde_json::json!({}),
            enabled,
        }
    }

    #[tokio::test]
    async fn test_list_enabled_filters_and_orders() {
        let store = MemoryStore::new();
        store.upsert_resource(row(1, "zeta", Protocol::Http, true)).await;
        store.upsert_resource(row(2, "alpha", Protocol::Http, true)).await;
        store.upsert_resource(row(3, "off", Protocol::Http, false)).await;
        store.upsert_resource(row(4, "tcp", Protocol::Tcp, true)).await;

        let rows = store
            .list_enabled(1, Protocol::Http, ResourceKind::Service)
            .await
            .unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);

        assert!(
            store
                .list_enabled(2, Protocol::Http, ResourceKind::Service)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_clones_share_data() {
        let store = MemoryStore::new();
        let clone = store.clone();
        clone
            .upsert_instance(InstanceUpdate {
                profile_id: 1,
                name: "edge".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(store.instance_count().await, 1);
        assert!(store.get_instance(1, "edge").await.unwrap().is_some());
        assert!(store.get_instance(2, "edge").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_endpoints_by_name() {
        let store = MemoryStore::new();
        for (profile_id, name) in [(1, "edge"), (2, "edge"), (1, "core")] {
            store
                .upsert_instance_endpoint(InstanceEndpoint {
                    profile_id,
                    name: name.to_string(),
                    url: format!("http://{name}:8080"),
                    username: None,
                    password: None,
                    tls: false,
                })
                .await;
        }

        assert_eq!(store.list_instance_endpoints("edge").await.unwrap().len(), 2);
        assert_eq!(store.list_all_instance_endpoints().await.unwrap().len(), 3);
    }
}
