// # DNS Provider Trait
//
// Defines the vendor primitives the ownership manager drives.
//
// ## Implementations
//
// - Cloudflare: `mantrae-provider-cloudflare` crate
// - PowerDNS: `mantrae-provider-powerdns` crate
// - Technitium: `mantrae-provider-technitium` crate
//
// ## Usage
//
// Providers are never called directly by the sync scheduler. They are
// wrapped in a [`crate::ownership::RecordManager`], which decides whether a
// mutation is safe and which primitive to issue:
//
// ```rust,ignore
// use mantrae_core::ownership::RecordManager;
//
// let manager = RecordManager::new(provider, "1.2.3.4".parse()?);
// manager.upsert_record("app.example.com").await?;
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// DNS record types the engine reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
    #[serde(rename = "TXT")]
    Txt,
}

impl RecordType {
    /// Record type matching the family of an IP address
    pub fn for_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::Aaaa,
        }
    }

    /// Wire name of the type
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Txt => "TXT",
        }
    }

    /// Parse a vendor type string; other types are not managed
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Some(RecordType::A),
            "AAAA" => Some(RecordType::Aaaa),
            "TXT" => Some(RecordType::Txt),
            _ => None,
        }
    }

    /// Whether this is an address (data) record
    pub fn is_address(self) -> bool {
        matches!(self, RecordType::A | RecordType::Aaaa)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vendor-returned DNS record, valid for one reconciliation pass
///
/// `content` is the logical value: TXT content is unquoted regardless of how
/// the vendor encodes it on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    /// Vendor record id (synthesised by vendors without ids)
    pub id: String,
    /// Fully qualified name without trailing dot
    pub name: String,
    pub record_type: RecordType,
    pub content: String,
}

impl DnsRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        record_type: RecordType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            record_type,
            content: content.into(),
        }
    }
}

/// Trait for DNS vendor implementations
///
/// Each call is a single-shot vendor interaction. Implementations resolve
/// the zone for a name themselves (longest registered zone that is a
/// suffix of the name) and fail hard when no zone matches.
///
/// # Constraints
///
/// - No retry logic: the next sync tick is the retry.
/// - No ownership decisions: that belongs to the record manager.
/// - No caching beyond one call.
/// - Never log credentials.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List every A, AAAA and TXT record whose name matches or is scoped to
    /// `domain`
    ///
    /// The result must include the ownership marker record for `domain`.
    /// Over-matching is fine; the record manager filters by exact name.
    async fn list_records(&self, domain: &str) -> Result<Vec<DnsRecord>, crate::Error>;

    /// Create a record
    async fn create_record(
        &self,
        name: &str,
        record_type: RecordType,
        content: &str,
    ) -> Result<(), crate::Error>;

    /// Replace an existing record's type and content
    async fn update_record(
        &self,
        record: &DnsRecord,
        record_type: RecordType,
        content: &str,
    ) -> Result<(), crate::Error>;

    /// Delete an existing record
    async fn delete_record(&self, record: &DnsRecord) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Credentials and settings of a provider, decrypted for one sync pass
#[derive(Clone)]
pub struct ResolvedProvider {
    pub id: i64,
    pub name: String,
    pub kind: crate::model::ProviderKind,
    /// Plaintext API key. ⚠️ NEVER log this value
    pub api_key: String,
    pub api_url: Option<String>,
    /// Target IP after auto-update substitution
    pub ip: String,
    pub proxied: bool,
    pub zone_type: Option<String>,
}

impl fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("api_key", &"<REDACTED>")
            .field("api_url", &self.api_url)
            .field("ip", &self.ip)
            .field("proxied", &self.proxied)
            .field("zone_type", &self.zone_type)
            .finish()
    }
}

/// Helper trait for constructing DNS providers from resolved settings
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance
    fn create(&self, config: &ResolvedProvider) -> Result<Box<dyn DnsProvider>, crate::Error>;
}

/// Pick the longest zone name that `domain` equals or is a subdomain of
///
/// Zone names may carry a trailing dot; comparison is case-insensitive.
/// Returns the index into `zones`.
pub fn longest_zone_match<S: AsRef<str>>(domain: &str, zones: &[S]) -> Option<usize> {
    let domain = normalize_name(domain);
    zones
        .iter()
        .enumerate()
        .filter_map(|(i, zone)| {
            let zone = normalize_name(zone.as_ref());
            let matches = !zone.is_empty()
                && (domain == zone || domain.ends_with(&format!(".{zone}")));
            matches.then_some((i, zone.len()))
        })
        .max_by_key(|(_, len)| *len)
        .map(|(i, _)| i)
}

/// Lower-case a DNS name and strip its trailing dot
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}
