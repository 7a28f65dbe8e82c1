//! Vendor-tagged provider registry
//!
//! Each stored provider carries a [`ProviderKind`] tag. The registry maps
//! the tag to the factory that constructs the vendor adapter, so adding a
//! vendor is one `register()` call instead of another match arm.
//!
//! ## Registration
//!
//! Adapter crates expose a `register` function:
//!
//! ```rust,ignore
//! // In mantrae-provider-cloudflare
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider(ProviderKind::Cloudflare, Box::new(CloudflareFactory));
//! }
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::info;

use crate::error::{Error, Result};
use crate::model::ProviderKind;
use crate::traits::{DnsProvider, DnsProviderFactory, DnsRecord, RecordType, ResolvedProvider};

/// Provider registry for vendor-tagged DNS provider creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS provider factories
    providers: RwLock<HashMap<ProviderKind, Box<dyn DnsProviderFactory>>>,

    /// Wrap created providers so mutations are only logged
    dry_run: bool,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry whose providers never mutate vendor state
    pub fn dry_run() -> Self {
        Self {
            providers: RwLock::default(),
            dry_run: true,
        }
    }

    /// Whether created providers run in dry-run mode
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Register a DNS provider factory for a vendor
    pub fn register_provider(&self, kind: ProviderKind, factory: Box<dyn DnsProviderFactory>) {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        providers.insert(kind, factory);
    }

    /// Create a DNS provider from resolved settings
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error::Config)`: If the vendor is not registered or creation fails
    pub fn create_provider(&self, config: &ResolvedProvider) -> Result<Box<dyn DnsProvider>> {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = providers.get(&config.kind).ok_or_else(|| {
            Error::config(format!("Unknown provider type: {}", config.kind))
        })?;

        let provider = factory.create(config)?;
        if self.dry_run {
            return Ok(Box::new(DryRunProvider { inner: provider }));
        }
        Ok(provider)
    }

    /// List all registered vendors
    pub fn list_providers(&self) -> Vec<ProviderKind> {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        providers.keys().copied().collect()
    }

    /// Check if a vendor is registered
    pub fn has_provider(&self, kind: ProviderKind) -> bool {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(&kind)
    }
}

/// Passes reads through to the vendor and logs mutations instead of sending
/// them
struct DryRunProvider {
    inner: Box<dyn DnsProvider>,
}

#[async_trait]
impl DnsProvider for DryRunProvider {
    async fn list_records(&self, domain: &str) -> Result<Vec<DnsRecord>> {
        self.inner.list_records(domain).await
    }

    async fn create_record(
        &self,
        name: &str,
        record_type: RecordType,
        content: &str,
    ) -> Result<()> {
        info!(
            provider = self.inner.provider_name(),
            "[DRY-RUN] Would create {} {} -> {}",
            record_type,
            name,
            content
        );
        Ok(())
    }

    async fn update_record(
        &self,
        record: &DnsRecord,
        record_type: RecordType,
        content: &str,
    ) -> Result<()> {
        info!(
            provider = self.inner.provider_name(),
            "[DRY-RUN] Would update {} {} ({}) -> {} {}",
            record.record_type,
            record.name,
            record.content,
            record_type,
            content
        );
        Ok(())
    }

    async fn delete_record(&self, record: &DnsRecord) -> Result<()> {
        info!(
            provider = self.inner.provider_name(),
            "[DRY-RUN] Would delete {} {}",
            record.record_type,
            record.name
        );
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        mutations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DnsProvider for CountingProvider {
        async fn list_records(&self, _domain: &str) -> Result<Vec<DnsRecord>> {
            Ok(Vec::new())
        }

        async fn create_record(&self, _: &str, _: RecordType, _: &str) -> Result<()> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn update_record(&self, _: &DnsRecord, _: RecordType, _: &str) -> Result<()> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn delete_record(&self, _: &DnsRecord) -> Result<()> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn provider_name(&self) -> &'static str {
            "counting"
        }
    }

    struct CountingFactory {
        mutations: Arc<AtomicUsize>,
    }

    impl DnsProviderFactory for CountingFactory {
        fn create(&self, _config: &ResolvedProvider) -> Result<Box<dyn DnsProvider>> {
            Ok(Box::new(CountingProvider {
                mutations: Arc::clone(&self.mutations),
            }))
        }
    }

    fn resolved(kind: ProviderKind) -> ResolvedProvider {
        ResolvedProvider {
            id: 1,
            name: "p".to_string(),
            kind,
            api_key: "token".to_string(),
            api_url: None,
            ip: "1.2.3.4".to_string(),
            proxied: false,
            zone_type: None,
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = ProviderRegistry::new();
        assert!(!registry.has_provider(ProviderKind::Cloudflare));

        registry.register_provider(
            ProviderKind::Cloudflare,
            Box::new(CountingFactory {
                mutations: Arc::new(AtomicUsize::new(0)),
            }),
        );

        assert!(registry.has_provider(ProviderKind::Cloudflare));
        assert_eq!(registry.list_providers(), vec![ProviderKind::Cloudflare]);
    }

    #[test]
    fn test_unknown_vendor_is_config_error() {
        let registry = ProviderRegistry::new();
        let err = registry
            .create_provider(&resolved(ProviderKind::Technitium))
            .err().expect("expected configuration error");
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_dry_run_swallows_mutations() {
        let mutations = Arc::new(AtomicUsize::new(0));
        let registry = ProviderRegistry::dry_run();
        registry.register_provider(
            ProviderKind::PowerDns,
            Box::new(CountingFactory {
                mutations: Arc::clone(&mutations),
            }),
        );

        let provider = registry
            .create_provider(&resolved(ProviderKind::PowerDns))
            .unwrap();
        provider
            .create_record("app.example.com", RecordType::A, "1.2.3.4")
            .await
            .unwrap();

        assert_eq!(mutations.load(Ordering::SeqCst), 0);
        assert_eq!(provider.provider_name(), "counting");
    }

    #[test]
    fn test_live_registry_passes_mutations_through() {
        let mutations = Arc::new(AtomicUsize::new(0));
        let registry = ProviderRegistry::new();
        registry.register_provider(
            ProviderKind::Cloudflare,
            Box::new(CountingFactory {
                mutations: Arc::clone(&mutations),
            }),
        );
        let provider = registry
            .create_provider(&resolved(ProviderKind::Cloudflare))
            .unwrap();
        let record = DnsRecord::new("r1", "app.example.com", RecordType::A, "1.2.3.4");

        tokio_test::block_on(async {
            provider.delete_record(&record).await.unwrap();
        });

        assert!(!registry.is_dry_run());
        assert_eq!(mutations.load(Ordering::SeqCst), 1);
    }
}
