// # Store Implementations
//
// This module provides implementations of the Store trait for different
// persistence strategies. Both share `StoreData`, which holds the rows and
// answers the queries; the stores only differ in how they guard and persist
// it.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    DnsProviderRow, InstanceEndpoint, InstanceSnapshot, InstanceUpdate, Profile, Protocol,
    ResourceKind, ResourceRow, RouterDnsBinding, RouterDnsLink,
};

/// Rows held by the in-process stores
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreData {
    pub profiles: Vec<Profile>,
    pub resources: Vec<ResourceRow>,
    pub dns_providers: Vec<DnsProviderRow>,
    pub router_dns: Vec<RouterDnsLink>,
    pub instance_endpoints: Vec<InstanceEndpoint>,
    pub instances: Vec<InstanceSnapshot>,
}

impl StoreData {
    pub fn insert_profile(&mut self, profile: Profile) {
        self.profiles.retain(|p| p.id != profile.id);
        self.profiles.push(profile);
    }

    /// Insert or replace a resource row by id
    pub fn upsert_resource(&mut self, row: ResourceRow) {
        self.resources.retain(|r| r.id != row.id);
        self.resources.push(row);
    }

    pub fn remove_resource(&mut self, id: i64) -> Option<ResourceRow> {
        let pos = self.resources.iter().position(|r| r.id == id)?;
        Some(self.resources.remove(pos))
    }

    /// Insert or replace a DNS provider; a new default clears the old one
    pub fn upsert_dns_provider(&mut self, row: DnsProviderRow) {
        if row.is_default {
            for existing in &mut self.dns_providers {
                existing.is_default = false;
            }
        }
        self.dns_providers.retain(|p| p.id != row.id);
        self.dns_providers.push(row);
    }

    /// Assign a DNS provider to a router, replacing any previous assignment
    pub fn link_router_dns(&mut self, link: RouterDnsLink) {
        self.unlink_router_dns(link.protocol, link.router_id);
        self.router_dns.push(link);
    }

    pub fn unlink_router_dns(&mut self, protocol: Protocol, router_id: i64) {
        self.router_dns
            .retain(|l| !(l.protocol == protocol && l.router_id == router_id));
    }

    /// Insert or replace admin API connection data keyed by (profile, name)
    pub fn upsert_instance_endpoint(&mut self, endpoint: InstanceEndpoint) {
        self.instance_endpoints
            .retain(|e| !(e.profile_id == endpoint.profile_id && e.name == endpoint.name));
        self.instance_endpoints.push(endpoint);
    }

    pub fn profile(&self, id: i64) -> Option<Profile> {
        self.profiles.iter().find(|p| p.id == id).cloned()
    }

    pub fn profile_by_name(&self, name: &str) -> Option<Profile> {
        self.profiles.iter().find(|p| p.name == name).cloned()
    }

    pub fn list_enabled(
        &self,
        profile_id: i64,
        protocol: Protocol,
        kind: ResourceKind,
    ) -> Vec<ResourceRow> {
        let mut rows: Vec<ResourceRow> = self
            .resources
            .iter()
            .filter(|r| {
                r.enabled && r.profile_id == profile_id && r.protocol == protocol && r.kind == kind
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    pub fn dns_provider(&self, id: i64) -> Option<DnsProviderRow> {
        self.dns_providers.iter().find(|p| p.id == id).cloned()
    }

    pub fn router_dns_bindings(&self) -> Vec<RouterDnsBinding> {
        self.router_dns
            .iter()
            .filter(|link| link.protocol.has_rule())
            .filter_map(|link| {
                let router = self.resources.iter().find(|r| {
                    r.id == link.router_id
                        && r.protocol == link.protocol
                        && r.kind == ResourceKind::Router
                })?;
                let profile_name = self
                    .profiles
                    .iter()
                    .find(|p| p.id == router.profile_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_default();
                Some(RouterDnsBinding {
                    profile_id: router.profile_id,
                    profile_name,
                    protocol: link.protocol,
                    router_id: router.id,
                    router_name: router.name.clone(),
                    rule: router.rule().unwrap_or_default().to_string(),
                    enabled: router.enabled,
                    provider_id: link.provider_id,
                })
            })
            .collect()
    }

    pub fn instance_endpoints(&self, name: &str) -> Vec<InstanceEndpoint> {
        self.instance_endpoints
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    pub fn instance(&self, profile_id: i64, name: &str) -> Option<InstanceSnapshot> {
        self.instances
            .iter()
            .find(|i| i.profile_id == profile_id && i.name == name)
            .cloned()
    }

    /// Replace the snapshot for (profile, name), creating it on first poll
    pub fn upsert_instance(
        &mut self,
        update: InstanceUpdate,
        now: DateTime<Utc>,
    ) -> InstanceSnapshot {
        if let Some(existing) = self
            .instances
            .iter_mut()
            .find(|i| i.profile_id == update.profile_id && i.name == update.name)
        {
            existing.url = update.url;
            existing.tls = update.tls;
            existing.entrypoints = update.entrypoints;
            existing.overview = update.overview;
            existing.config = update.config;
            existing.version = update.version;
            existing.updated_at = now;
            return existing.clone();
        }

        let id = self.instances.iter().map(|i| i.id).max().unwrap_or(0) + 1;
        let snapshot = InstanceSnapshot {
            id,
            profile_id: update.profile_id,
            name: update.name,
            url: update.url,
            tls: update.tls,
            entrypoints: update.entrypoints,
            overview: update.overview,
            config: update.config,
            version: update.version,
            created_at: now,
            updated_at: now,
        };
        self.instances.push(snapshot.clone());
        snapshot
    }
}
