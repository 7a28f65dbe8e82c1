//! Core traits for the reconciliation engine
//!
//! This module defines the seams to the outside world.
//!
//! - [`DnsProvider`]: Vendor DNS record primitives
//! - [`Store`]: Declared state and instance snapshots
//! - [`PublicIpSource`]: Public IP lookup for auto-updating providers
//! - [`DomainExtractor`]: Routing-rule → domain parsing

pub mod dns_provider;
pub mod ip_source;
pub mod store;

pub use dns_provider::{
    DnsProvider, DnsProviderFactory, DnsRecord, RecordType, ResolvedProvider, longest_zone_match,
    normalize_name,
};
pub use ip_source::{IpVersion, PublicIpSource};
pub use store::Store;

/// Parses a routing-rule expression into the literal domains it matches
pub trait DomainExtractor: Send + Sync {
    /// Extract domains from a rule; an empty list means the rule names none
    fn extract_domains(&self, rule: &str) -> Result<Vec<String>, crate::Error>;
}
