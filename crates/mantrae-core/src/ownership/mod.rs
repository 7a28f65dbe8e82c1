//! Record ownership manager
//!
//! Vendor-agnostic logic that decides whether the records of a name are
//! safe to mutate and which mutation is needed.
//!
//! ## Ownership marker
//!
//! A TXT record named `_mantrae.<domain>` with content `mantrae-managed`
//! proves that this system created the A/AAAA records of `<domain>`. The
//! engine never creates, updates or deletes an address record unless either
//! no A/AAAA/TXT record exists for the name yet, or the marker is present.
//!
//! ## Flow
//!
//! ```text
//! list_records(domain)
//!        │
//!        ▼
//!  records exist && no marker ──► Error::Ownership (nothing mutated)
//!        │
//!        ▼
//!  no data records ──► create data record, then marker      (Created)
//!                      marker fails ──► delete data record again
//!  stale data      ──► update every data record             (Updated)
//!  data matches    ──► nothing                              (Unchanged)
//! ```

use std::net::IpAddr;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsRecord, RecordType, normalize_name};

/// Name prefix of the ownership marker record
pub const MARKER_PREFIX: &str = "_mantrae.";

/// Content of the ownership marker record
pub const MARKER_CONTENT: &str = "mantrae-managed";

/// Name of the ownership marker for a domain
pub fn marker_name(domain: &str) -> String {
    format!("{MARKER_PREFIX}{}", normalize_name(domain))
}

/// Strip one layer of surrounding double quotes from TXT content
pub fn unquote_txt(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
}

/// Whether `record` is the ownership marker of `domain`
pub fn is_marker(record: &DnsRecord, domain: &str) -> bool {
    record.record_type == RecordType::Txt
        && normalize_name(&record.name) == marker_name(domain)
        && unquote_txt(&record.content) == MARKER_CONTENT
}

/// Parse a target IP, rejecting anything that is not IPv4 or IPv6
pub fn parse_target(ip: &str) -> Result<IpAddr> {
    ip.trim()
        .parse()
        .map_err(|_| Error::config(format!("Invalid target IP address: {ip:?}")))
}

/// Outcome of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Data record (and marker) created
    Created,
    /// Stale data records rewritten
    Updated,
    /// Records already correct
    Unchanged,
}

/// Records of one name, partitioned for an ownership decision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    /// A/AAAA records at the domain itself
    pub data: Vec<DnsRecord>,
    /// Ownership marker records
    pub markers: Vec<DnsRecord>,
    /// Other TXT records at the domain or marker name
    pub foreign: Vec<DnsRecord>,
}

impl RecordSet {
    /// Partition `records` by exact name; records of other names are dropped
    pub fn partition(domain: &str, records: Vec<DnsRecord>) -> Self {
        let domain_name = normalize_name(domain);
        let marker = marker_name(domain);
        let mut set = RecordSet::default();

        for record in records {
            let name = normalize_name(&record.name);
            if name != domain_name && name != marker {
                continue;
            }
            if is_marker(&record, domain) {
                set.markers.push(record);
            } else if name == domain_name && record.record_type.is_address() {
                set.data.push(record);
            } else {
                set.foreign.push(record);
            }
        }
        set
    }

    /// Whether the ownership marker is present
    pub fn is_owned(&self) -> bool {
        !self.markers.is_empty()
    }

    /// Whether any record exists for the name at all
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.markers.is_empty() && self.foreign.is_empty()
    }

    /// Fail unless the records are provably ours or absent
    pub fn ensure_mutable(&self, domain: &str) -> Result<()> {
        if self.is_owned() || self.is_empty() {
            Ok(())
        } else {
            Err(Error::ownership(domain))
        }
    }
}

/// Whether a data record already carries the target type and content
fn matches_target(record: &DnsRecord, record_type: RecordType, target: IpAddr) -> bool {
    record.record_type == record_type
        && record
            .content
            .trim()
            .parse::<IpAddr>()
            .map(|ip| ip == target)
            .unwrap_or(false)
}

/// Upsert/delete/list capability over one vendor provider
///
/// Resolved once per provider id and sync pass; carries the provider's
/// target IP.
pub struct RecordManager {
    provider: Box<dyn DnsProvider>,
    target: IpAddr,
}

impl std::fmt::Debug for RecordManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordManager")
            .field("provider", &self.provider.provider_name())
            .field("target", &self.target)
            .finish()
    }
}

impl RecordManager {
    /// Wrap a provider with the IP its managed names should point to
    pub fn new(provider: Box<dyn DnsProvider>, target: IpAddr) -> Self {
        Self { provider, target }
    }

    /// Build from a provider and an unparsed target IP
    pub fn from_target(provider: Box<dyn DnsProvider>, ip: &str) -> Result<Self> {
        Ok(Self::new(provider, parse_target(ip)?))
    }

    /// Target IP
    pub fn target(&self) -> IpAddr {
        self.target
    }

    /// Vendor name
    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// List the records the vendor holds for a domain
    pub async fn list_records(&self, domain: &str) -> Result<Vec<DnsRecord>> {
        self.provider.list_records(domain).await
    }

    /// Point `domain` at the target IP, creating the ownership marker when
    /// needed
    pub async fn upsert_record(&self, domain: &str) -> Result<UpsertOutcome> {
        let record_type = RecordType::for_ip(self.target);
        let content = self.target.to_string();

        let set = RecordSet::partition(domain, self.provider.list_records(domain).await?);
        set.ensure_mutable(domain)?;

        let outcome = if set.data.is_empty() {
            self.provider
                .create_record(domain, record_type, &content)
                .await?;
            info!(
                domain = %domain,
                provider = self.provider.provider_name(),
                "Created {} record -> {}",
                record_type,
                content
            );
            UpsertOutcome::Created
        } else if set
            .data
            .iter()
            .any(|r| !matches_target(r, record_type, self.target))
        {
            for record in &set.data {
                self.provider
                    .update_record(record, record_type, &content)
                    .await?;
            }
            info!(
                domain = %domain,
                provider = self.provider.provider_name(),
                records = set.data.len(),
                "Updated records -> {} {}",
                record_type,
                content
            );
            UpsertOutcome::Updated
        } else {
            debug!(domain = %domain, "Records already point to {}", content);
            UpsertOutcome::Unchanged
        };

        if !set.is_owned() {
            if let Err(e) = self
                .provider
                .create_record(&marker_name(domain), RecordType::Txt, MARKER_CONTENT)
                .await
            {
                if outcome == UpsertOutcome::Created {
                    self.roll_back_created(domain, record_type).await;
                }
                return Err(e);
            }
            debug!(domain = %domain, "Created ownership marker");
        }

        Ok(outcome)
    }

    /// Delete the data record created by a pass whose marker write failed
    ///
    /// An unmarked record would be refused by every later pass, so the name
    /// is returned to empty. Failures here are logged only.
    async fn roll_back_created(&self, domain: &str, record_type: RecordType) {
        let records = match self.provider.list_records(domain).await {
            Ok(records) => records,
            Err(e) => {
                warn!(domain = %domain, "Failed to list records for rollback: {}", e);
                return;
            }
        };

        let domain_name = normalize_name(domain);
        for record in records.iter().filter(|r| {
            normalize_name(&r.name) == domain_name && matches_target(r, record_type, self.target)
        }) {
            match self.provider.delete_record(record).await {
                Ok(()) => info!(
                    domain = %domain,
                    provider = self.provider.provider_name(),
                    "Rolled back unmarked {} record",
                    record_type
                ),
                Err(e) => warn!(
                    domain = %domain,
                    "Failed to roll back {} record: {}",
                    record_type,
                    e
                ),
            }
        }
    }

    /// Remove the data records and marker of `domain`
    ///
    /// Returns the number of records deleted; zero when nothing existed.
    pub async fn delete_record(&self, domain: &str) -> Result<usize> {
        let set = RecordSet::partition(domain, self.provider.list_records(domain).await?);
        if set.is_empty() {
            debug!(domain = %domain, "No records to delete");
            return Ok(0);
        }
        set.ensure_mutable(domain)?;

        let mut deleted = 0;
        for record in set.data.iter().chain(set.markers.iter()) {
            self.provider.delete_record(record).await?;
            deleted += 1;
        }
        info!(
            domain = %domain,
            provider = self.provider.provider_name(),
            records = deleted,
            "Deleted managed records"
        );
        Ok(deleted)
    }
}
