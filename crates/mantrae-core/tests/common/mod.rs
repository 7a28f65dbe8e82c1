//! Test doubles and common utilities for contract tests
//!
//! The doubles keep just enough state to observe what the engine did:
//! an in-memory zone that counts vendor calls, a refresher that counts
//! polls, and a fixed public IP source.

#![allow(dead_code)]

use async_trait::async_trait;
use mantrae_core::error::{Error, Result};
use mantrae_core::instance::InstanceRefresher;
use mantrae_core::model::{
    DnsProviderRow, InstanceEndpoint, InstanceSnapshot, InstanceUpdate, Profile, Protocol,
    ProviderKind, ProviderSettings, ResourceKind, ResourceRow, RouterDnsBinding, RouterDnsLink,
};
use mantrae_core::traits::{
    DnsProvider, DnsProviderFactory, DnsRecord, PublicIpSource, RecordType, ResolvedProvider,
    Store, normalize_name,
};
use mantrae_core::{MemoryStore, ProviderRegistry, SecretCipher};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Vendor-side records shared between a test and its mock providers
///
/// Like a real vendor account it only holds names inside its registered
/// zones; calls for any other name fail.
#[derive(Clone, Default)]
pub struct MockZone {
    zones: Arc<Vec<String>>,
    records: Arc<Mutex<Vec<DnsRecord>>>,
    next_id: Arc<AtomicUsize>,
    list_calls: Arc<AtomicUsize>,
    create_calls: Arc<AtomicUsize>,
    update_calls: Arc<AtomicUsize>,
    delete_calls: Arc<AtomicUsize>,
    /// Targets seen by the factory, one per resolved provider
    resolved: Arc<Mutex<Vec<String>>>,
}

impl MockZone {
    /// Account holding the single zone `example.com`
    pub fn new() -> Self {
        Self::with_zones(&["example.com"])
    }

    pub fn with_zones(zones: &[&str]) -> Self {
        Self {
            zones: Arc::new(zones.iter().map(|z| normalize_name(z)).collect()),
            ..Self::default()
        }
    }

    /// Longest registered zone containing `name`
    fn zone_of(&self, name: &str) -> Result<&str> {
        let name = normalize_name(name);
        self.zones
            .iter()
            .filter(|zone| name == **zone || name.ends_with(&format!(".{zone}")))
            .max_by_key(|zone| zone.len())
            .map(String::as_str)
            .ok_or_else(|| Error::provider("mock", format!("No zone found for {name}")))
    }

    /// Put a record into the zone without counting it as a call
    pub fn seed(&self, name: &str, record_type: RecordType, content: &str) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().push(DnsRecord::new(
            format!("seed-{id}"),
            name,
            record_type,
            content,
        ));
    }

    pub fn records(&self) -> Vec<DnsRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Records with exactly this name and type
    pub fn find(&self, name: &str, record_type: RecordType) -> Vec<DnsRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.name == name && r.record_type == record_type)
            .collect()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Every create, update or delete call
    pub fn mutation_calls(&self) -> usize {
        self.create_calls() + self.update_calls() + self.delete_calls()
    }

    pub fn resolved_targets(&self) -> Vec<String> {
        self.resolved.lock().unwrap().clone()
    }

    pub fn provider(&self) -> MockDnsProvider {
        MockDnsProvider {
            zone: self.clone(),
            fail_on: None,
        }
    }
}

/// A DnsProvider backed by a [`MockZone`]
pub struct MockDnsProvider {
    zone: MockZone,
    /// Fail every call that touches this name
    fail_on: Option<String>,
}

impl MockDnsProvider {
    pub fn failing_on(zone: &MockZone, name: &str) -> Self {
        Self {
            zone: zone.clone(),
            fail_on: Some(normalize_name(name)),
        }
    }

    fn check(&self, name: &str) -> Result<()> {
        self.zone.zone_of(name)?;
        match &self.fail_on {
            Some(bad) if normalize_name(name).ends_with(bad.as_str()) => {
                Err(Error::provider("mock", format!("injected failure for {name}")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    async fn list_records(&self, domain: &str) -> Result<Vec<DnsRecord>> {
        self.zone.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check(domain)?;
        let domain = normalize_name(domain);
        Ok(self
            .zone
            .records()
            .into_iter()
            .filter(|r| normalize_name(&r.name).ends_with(&domain))
            .collect())
    }

    async fn create_record(
        &self,
        name: &str,
        record_type: RecordType,
        content: &str,
    ) -> Result<()> {
        self.zone.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check(name)?;
        let id = self.zone.next_id.fetch_add(1, Ordering::SeqCst);
        self.zone.records.lock().unwrap().push(DnsRecord::new(
            format!("rec-{id}"),
            name,
            record_type,
            content,
        ));
        Ok(())
    }

    async fn update_record(
        &self,
        record: &DnsRecord,
        record_type: RecordType,
        content: &str,
    ) -> Result<()> {
        self.zone.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check(&record.name)?;
        let mut records = self.zone.records.lock().unwrap();
        let existing = records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| Error::provider("mock", "no such record"))?;
        existing.record_type = record_type;
        existing.content = content.to_string();
        Ok(())
    }

    async fn delete_record(&self, record: &DnsRecord) -> Result<()> {
        self.zone.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check(&record.name)?;
        self.zone.records.lock().unwrap().retain(|r| r.id != record.id);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Factory handing out providers over one shared zone
pub struct MockFactory {
    zone: MockZone,
}

impl MockFactory {
    pub fn new(zone: &MockZone) -> Self {
        Self { zone: zone.clone() }
    }
}

impl DnsProviderFactory for MockFactory {
    fn create(&self, config: &ResolvedProvider) -> Result<Box<dyn DnsProvider>> {
        self.zone.resolved.lock().unwrap().push(config.ip.clone());
        Ok(Box::new(self.zone.provider()))
    }
}

/// Registry with the mock zone registered as the Cloudflare vendor
pub fn registry_with(zone: &MockZone) -> Arc<ProviderRegistry> {
    let registry = ProviderRegistry::new();
    registry.register_provider(
        ProviderKind::Cloudflare,
        Box::new(MockFactory::new(zone)),
    );
    Arc::new(registry)
}

/// Fixed key so tests can encrypt credentials the engine will decrypt
pub fn test_cipher() -> SecretCipher {
    SecretCipher::new([7u8; 32])
}

pub fn provider_row(id: i64, name: &str, ip: &str, auto_update: bool) -> DnsProviderRow {
    DnsProviderRow {
        id,
        name: name.to_string(),
        kind: ProviderKind::Cloudflare,
        settings: ProviderSettings {
            api_key: test_cipher().encrypt("token").unwrap(),
            api_url: None,
            ip: ip.to_string(),
            proxied: false,
            auto_update,
            zone_type: None,
        },
        is_default: false,
    }
}

pub async fn seed_profile(store: &MemoryStore, id: i64, name: &str) {
    store
        .insert_profile(Profile {
            id,
            name: name.to_string(),
        })
        .await;
}

pub fn resource(
    id: i64,
    profile_id: i64,
    name: &str,
    protocol: Protocol,
    kind: ResourceKind,
    config: serde_json::Value,
) -> ResourceRow {
    ResourceRow {
        id,
        profile_id,
        agent_id: None,
        name: name.to_string(),
        protocol,
        kind,
        config,
        enabled: true,
    }
}

/// Insert an enabled router and bind it to a DNS provider
pub async fn seed_router(
    store: &MemoryStore,
    id: i64,
    name: &str,
    protocol: Protocol,
    rule: &str,
    provider_id: i64,
) {
    store
        .upsert_resource(resource(
            id,
            1,
            name,
            protocol,
            ResourceKind::Router,
            serde_json::json!({ "rule": rule, "service": "svc" }),
        ))
        .await;
    store
        .link_router_dns(RouterDnsLink {
            protocol,
            router_id: id,
            provider_id,
        })
        .await;
}

/// A refresher that counts polls per name
#[derive(Default)]
pub struct CountingRefresher {
    calls: AtomicUsize,
    names: Mutex<Vec<String>>,
    delay: Duration,
}

impl CountingRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each refresh takes `delay` to complete
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn names(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }
}

#[async_trait]
impl InstanceRefresher for CountingRefresher {
    async fn refresh(&self, name: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.names.lock().unwrap().push(name.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }
}

/// Public IP source returning a fixed address
pub struct StaticIpSource {
    ip: IpAddr,
    calls: AtomicUsize,
}

impl StaticIpSource {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PublicIpSource for StaticIpSource {
    async fn current(&self) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ip)
    }
}

/// A store that counts snapshot upserts on top of a [`MemoryStore`]
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    upserts: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            upserts: AtomicUsize::new(0),
        }
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for CountingStore {
    async fn get_profile(&self, id: i64) -> Result<Option<Profile>> {
        self.inner.get_profile(id).await
    }

    async fn get_profile_by_name(&self, name: &str) -> Result<Option<Profile>> {
        self.inner.get_profile_by_name(name).await
    }

    async fn list_enabled(
        &self,
        profile_id: i64,
        protocol: Protocol,
        kind: ResourceKind,
    ) -> Result<Vec<ResourceRow>> {
        self.inner.list_enabled(profile_id, protocol, kind).await
    }

    async fn get_dns_provider(&self, id: i64) -> Result<Option<DnsProviderRow>> {
        self.inner.get_dns_provider(id).await
    }

    async fn list_router_dns_bindings(&self) -> Result<Vec<RouterDnsBinding>> {
        self.inner.list_router_dns_bindings().await
    }

    async fn list_instance_endpoints(&self, name: &str) -> Result<Vec<InstanceEndpoint>> {
        self.inner.list_instance_endpoints(name).await
    }

    async fn list_all_instance_endpoints(&self) -> Result<Vec<InstanceEndpoint>> {
        self.inner.list_all_instance_endpoints().await
    }

    async fn get_instance(&self, profile_id: i64, name: &str) -> Result<Option<InstanceSnapshot>> {
        self.inner.get_instance(profile_id, name).await
    }

    async fn upsert_instance(&self, update: InstanceUpdate) -> Result<InstanceSnapshot> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_instance(update).await
    }
}

/// Admin API endpoint of a test instance
pub fn endpoint(name: &str, url: &str) -> InstanceEndpoint {
    InstanceEndpoint {
        profile_id: 1,
        name: name.to_string(),
        url: url.to_string(),
        username: None,
        password: None,
        tls: false,
    }
}
