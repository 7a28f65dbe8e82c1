//! DNS sync scheduler
//!
//! Derives the managed domains from router rules and drives the record
//! manager for every (domain, provider) pair.
//!
//! ## Pass
//!
//! ```text
//! Store::list_router_dns_bindings()
//!        │  enabled HTTP/TCP routers with a provider
//!        ▼
//! DomainExtractor::extract_domains(rule)
//!        │
//!        ▼
//! (domain, provider id) ──► resolve provider once per pass
//!        │                   (decrypt key, public IP if auto-update)
//!        ▼
//! RecordManager::upsert_record(domain)
//! ```
//!
//! One pair failing never stops the others. The periodic loop only logs;
//! the manual trigger additionally returns the first configuration error,
//! or else the first ownership violation, once the pass is done.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::model::{Protocol, RouterDnsBinding};
use crate::ownership::{RecordManager, UpsertOutcome};
use crate::registry::ProviderRegistry;
use crate::rule::RuleDomainExtractor;
use crate::secret::SecretCipher;
use crate::traits::{DomainExtractor, PublicIpSource, ResolvedProvider, Store};

/// Result of one (domain, provider) pair
#[derive(Debug)]
pub struct SyncEntry {
    pub domain: String,
    pub provider_id: i64,
    /// Routers (as `profile/router`) whose rules name this domain
    pub routers: Vec<String>,
    pub outcome: Result<UpsertOutcome>,
}

/// Summary of one sync pass
#[derive(Debug, Default)]
pub struct SyncReport {
    pub entries: Vec<SyncEntry>,
}

impl SyncReport {
    fn count(&self, wanted: UpsertOutcome) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(&e.outcome, Ok(o) if *o == wanted))
            .count()
    }

    pub fn created(&self) -> usize {
        self.count(UpsertOutcome::Created)
    }

    pub fn updated(&self) -> usize {
        self.count(UpsertOutcome::Updated)
    }

    pub fn unchanged(&self) -> usize {
        self.count(UpsertOutcome::Unchanged)
    }

    pub fn failed(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_err()).count()
    }

    /// Take the error a manual trigger must report out of the report
    ///
    /// The first configuration error wins, then the first ownership
    /// violation. Transport and vendor errors stay in the report.
    pub fn take_surfaced_error(&mut self) -> Option<Error> {
        let pos = self
            .entries
            .iter()
            .position(|e| matches!(&e.outcome, Err(err) if err.is_configuration()))
            .or_else(|| {
                self.entries
                    .iter()
                    .position(|e| matches!(&e.outcome, Err(err) if err.is_ownership()))
            })?;
        self.entries.remove(pos).outcome.err()
    }
}

/// Why a provider could not be resolved this pass
#[derive(Debug, Clone)]
struct ResolveFailure {
    message: String,
    configuration: bool,
}

impl ResolveFailure {
    fn from_error(err: &Error) -> Self {
        Self {
            message: err.to_string(),
            configuration: err.is_configuration(),
        }
    }

    fn to_error(&self, context: &str) -> Error {
        let message = format!("{context}: {}", self.message);
        if self.configuration {
            Error::config(message)
        } else {
            Error::Other(message)
        }
    }
}

/// State that lives for exactly one pass
#[derive(Default)]
struct Pass {
    managers: HashMap<i64, std::result::Result<Arc<RecordManager>, ResolveFailure>>,
    public_ip: Option<std::result::Result<IpAddr, ResolveFailure>>,
}

/// Periodic and manual DNS reconciliation
pub struct DnsSync {
    store: Arc<dyn Store>,
    registry: Arc<ProviderRegistry>,
    cipher: SecretCipher,
    extractor: Arc<dyn DomainExtractor>,
    ip_source: Option<Arc<dyn PublicIpSource>>,
    interval: Duration,
}

impl std::fmt::Debug for DnsSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsSync")
            .field("vendors", &self.registry.list_providers())
            .field("dry_run", &self.registry.is_dry_run())
            .field("public_ip", &self.ip_source.is_some())
            .field("interval", &self.interval)
            .finish()
    }
}

impl DnsSync {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ProviderRegistry>,
        cipher: SecretCipher,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            cipher,
            extractor: Arc::new(RuleDomainExtractor),
            ip_source: None,
            interval: config.dns_sync_interval(),
        }
    }

    /// Replace the routing-rule parser
    pub fn with_extractor(mut self, extractor: Arc<dyn DomainExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Public IP lookup for providers with auto-update enabled
    pub fn with_ip_source(mut self, source: Arc<dyn PublicIpSource>) -> Self {
        self.ip_source = Some(source);
        self
    }

    /// Manual trigger
    ///
    /// Runs a full pass and, once every pair has been attempted, returns the
    /// first configuration error or else the first ownership violation.
    /// Transport failures only show in the report's `failed()` count.
    pub async fn update_dns(&self) -> Result<SyncReport> {
        let mut report = self.sync_once().await?;
        match report.take_surfaced_error() {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// One best-effort pass over every managed domain
    ///
    /// Only a failure to read the bindings fails the pass itself.
    pub async fn sync_once(&self) -> Result<SyncReport> {
        let bindings = self.store.list_router_dns_bindings().await?;
        let targets = self.managed_domains(&bindings);

        let mut pass = Pass::default();
        let mut report = SyncReport::default();

        for ((domain, provider_id), routers) in targets {
            let outcome = match self.manager(provider_id, &mut pass).await {
                Ok(manager) => manager.upsert_record(&domain).await,
                Err(e) => Err(e),
            };

            if let Err(e) = &outcome {
                warn!(
                    domain = %domain,
                    provider_id,
                    routers = ?routers,
                    "DNS upsert failed: {}",
                    e
                );
            }

            report.entries.push(SyncEntry {
                domain,
                provider_id,
                routers,
                outcome,
            });
        }

        info!(
            created = report.created(),
            updated = report.updated(),
            unchanged = report.unchanged(),
            failed = report.failed(),
            "DNS sync pass finished"
        );
        Ok(report)
    }

    /// Remove the records of a router that is about to be deleted
    ///
    /// Call this before the router's row and provider link are removed.
    /// Domains still named by another enabled router on the same provider
    /// are left alone. The first hard error is returned.
    pub async fn delete_dns(&self, protocol: Protocol, router_id: i64) -> Result<()> {
        let bindings = self.store.list_router_dns_bindings().await?;
        let Some(target) = bindings
            .iter()
            .find(|b| b.protocol == protocol && b.router_id == router_id)
        else {
            debug!(%protocol, router_id, "Router has no DNS provider, nothing to delete");
            return Ok(());
        };

        let domains = self.extractor.extract_domains(&target.rule)?;
        if domains.is_empty() {
            return Ok(());
        }

        let mut still_used = BTreeSet::new();
        for other in bindings.iter().filter(|b| {
            b.enabled
                && b.provider_id == target.provider_id
                && !(b.protocol == protocol && b.router_id == router_id)
        }) {
            match self.extractor.extract_domains(&other.rule) {
                Ok(d) => still_used.extend(d),
                Err(e) => warn!(router = %other.router_name, "Skipping unparsable rule: {}", e),
            }
        }

        let mut pass = Pass::default();
        let manager = self.manager(target.provider_id, &mut pass).await?;

        for domain in domains {
            if still_used.contains(&domain) {
                info!(domain = %domain, "Domain still used by another router, keeping records");
                continue;
            }
            manager.delete_record(&domain).await?;
        }
        Ok(())
    }

    /// Run the periodic sync until `shutdown` fires
    ///
    /// The first pass runs immediately.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.interval.as_secs(),
            "DNS sync loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("DNS sync loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_once().await {
                        error!("DNS sync pass failed: {}", e);
                    }
                }
            }
        }
    }

    /// Map each (domain, provider id) to the routers naming it
    fn managed_domains(
        &self,
        bindings: &[RouterDnsBinding],
    ) -> BTreeMap<(String, i64), Vec<String>> {
        let mut targets: BTreeMap<(String, i64), Vec<String>> = BTreeMap::new();

        for binding in bindings.iter().filter(|b| b.enabled && b.protocol.has_rule()) {
            let domains = match self.extractor.extract_domains(&binding.rule) {
                Ok(domains) => domains,
                Err(e) => {
                    warn!(
                        router = %binding.router_name,
                        profile = %binding.profile_name,
                        "Skipping router with unparsable rule: {}",
                        e
                    );
                    continue;
                }
            };

            for domain in domains {
                targets
                    .entry((domain, binding.provider_id))
                    .or_default()
                    .push(format!("{}/{}", binding.profile_name, binding.router_name));
            }
        }
        targets
    }

    /// Record manager for a provider, resolved at most once per pass
    async fn manager(&self, provider_id: i64, pass: &mut Pass) -> Result<Arc<RecordManager>> {
        if let Some(cached) = pass.managers.get(&provider_id) {
            return cached
                .clone()
                .map_err(|f| f.to_error(&format!("DNS provider {provider_id}")));
        }

        let resolved = match self.resolve(provider_id, pass).await {
            Ok(manager) => Ok(Arc::new(manager)),
            Err(e) => Err(ResolveFailure::from_error(&e)),
        };
        pass.managers.insert(provider_id, resolved.clone());
        resolved.map_err(|f| f.to_error(&format!("DNS provider {provider_id}")))
    }

    async fn resolve(&self, provider_id: i64, pass: &mut Pass) -> Result<RecordManager> {
        let row = self
            .store
            .get_dns_provider(provider_id)
            .await?
            .ok_or_else(|| Error::config(format!("DNS provider {provider_id} not found")))?;

        let api_key = self.cipher.decrypt(&row.settings.api_key)?;
        if api_key.is_empty() {
            return Err(Error::config(format!(
                "DNS provider {} has no credentials",
                row.name
            )));
        }

        let ip = if row.settings.auto_update {
            self.public_ip(pass).await?.to_string()
        } else {
            row.settings.ip.clone()
        };

        let resolved = ResolvedProvider {
            id: row.id,
            name: row.name.clone(),
            kind: row.kind,
            api_key,
            api_url: row.settings.api_url.clone(),
            ip: ip.clone(),
            proxied: row.settings.proxied,
            zone_type: row.settings.zone_type.clone(),
        };

        let provider = self.registry.create_provider(&resolved)?;
        let manager = RecordManager::from_target(provider, &ip)?;
        debug!(
            provider = %row.name,
            vendor = %row.kind,
            target = %manager.target(),
            "Resolved DNS provider"
        );
        Ok(manager)
    }

    /// Current public IP, looked up at most once per pass
    async fn public_ip(&self, pass: &mut Pass) -> Result<IpAddr> {
        if let Some(cached) = &pass.public_ip {
            return cached.clone().map_err(|f| f.to_error("Public IP lookup"));
        }

        let result = match &self.ip_source {
            Some(source) => source.current().await,
            None => Err(Error::config(
                "Provider has auto-update enabled but no public IP source is configured",
            )),
        };

        match result {
            Ok(ip) => {
                debug!(ip = %ip, "Resolved public IP");
                pass.public_ip = Some(Ok(ip));
                Ok(ip)
            }
            Err(e) => {
                pass.public_ip = Some(Err(ResolveFailure::from_error(&e)));
                Err(e)
            }
        }
    }
}
