// # Store Trait
//
// Defines the slice of the relational store the engine consumes.
//
// ## Purpose
//
// Declared state (profiles, routers, services, middlewares, servers
// transports, DNS providers and router→provider links) is owned by the API
// layer and read-only here. The only write is the instance snapshot upsert
// performed after a successful poll.
//
// ## Implementations
//
// - Memory: `MemoryStore` (tests, ephemeral deployments)
// - File: `FileStore` (one JSON document with atomic writes)

use async_trait::async_trait;

use crate::model::{
    DnsProviderRow, InstanceEndpoint, InstanceSnapshot, InstanceUpdate, Profile, Protocol,
    ResourceKind, ResourceRow, RouterDnsBinding,
};

/// Trait for storage implementations
///
/// All methods must be safe to call concurrently from multiple tasks. The
/// store serializes conflicting writes itself; callers add no locking.
#[async_trait]
pub trait Store: Send + Sync {
    /// Get a profile by id
    async fn get_profile(&self, id: i64) -> Result<Option<Profile>, crate::Error>;

    /// Get a profile by name
    async fn get_profile_by_name(&self, name: &str) -> Result<Option<Profile>, crate::Error>;

    /// List enabled entities of one kind and protocol within a profile
    ///
    /// Rows are returned ordered by name.
    async fn list_enabled(
        &self,
        profile_id: i64,
        protocol: Protocol,
        kind: ResourceKind,
    ) -> Result<Vec<ResourceRow>, crate::Error>;

    /// Get a DNS provider row (credentials still encrypted)
    async fn get_dns_provider(&self, id: i64) -> Result<Option<DnsProviderRow>, crate::Error>;

    /// List every HTTP/TCP router that has a DNS provider assigned
    ///
    /// Disabled routers are included with `enabled = false`.
    async fn list_router_dns_bindings(&self) -> Result<Vec<RouterDnsBinding>, crate::Error>;

    /// List the admin API endpoints registered under an instance name
    async fn list_instance_endpoints(
        &self,
        name: &str,
    ) -> Result<Vec<InstanceEndpoint>, crate::Error>;

    /// List every registered admin API endpoint
    async fn list_all_instance_endpoints(&self) -> Result<Vec<InstanceEndpoint>, crate::Error>;

    /// Get the latest snapshot of an instance
    async fn get_instance(
        &self,
        profile_id: i64,
        name: &str,
    ) -> Result<Option<InstanceSnapshot>, crate::Error>;

    /// Insert or replace the snapshot keyed by (profile, instance name)
    async fn upsert_instance(
        &self,
        update: InstanceUpdate,
    ) -> Result<InstanceSnapshot, crate::Error>;
}
