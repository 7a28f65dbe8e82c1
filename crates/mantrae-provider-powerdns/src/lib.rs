// # PowerDNS Provider
//
// PowerDNS Authoritative HTTP API adapter for the record ownership manager.
//
// ## Behaviour
//
// - Records live in rrsets (name + type); PowerDNS has no record ids, so the
//   adapter synthesises `name|type|content` ids
// - A `REPLACE` rewrites the whole rrset, so every mutation reads the
//   current rrset first and sends the merged record list
// - TXT content is quoted on the wire and unquoted towards the engine
// - `zone_type` restricts zone lookup to zones of that `kind`
//
// ## API Reference
//
// - List Zones: GET `/api/v1/servers/localhost/zones`
// - Get Zone (with rrsets): GET `/api/v1/servers/localhost/zones/:zone_id`
// - Modify rrsets: PATCH `/api/v1/servers/localhost/zones/:zone_id`

use async_trait::async_trait;
use mantrae_core::model::ProviderKind;
use mantrae_core::ownership::unquote_txt;
use mantrae_core::traits::{
    DnsProvider, DnsProviderFactory, DnsRecord, RecordType, ResolvedProvider, longest_zone_match,
    normalize_name,
};
use mantrae_core::{Error, ProviderRegistry, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// TTL for newly created rrsets
const DEFAULT_TTL: u32 = 300;

const SERVER_ID: &str = "localhost";

const PROVIDER: &str = "powerdns";

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
    #[serde(default)]
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
struct ZoneDetail {
    #[serde(default)]
    rrsets: Vec<RrSet>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RrSet {
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default)]
    ttl: Option<u32>,
    #[serde(default)]
    records: Vec<RrRecord>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
struct RrRecord {
    content: String,
    #[serde(default)]
    disabled: bool,
}

#[derive(Debug, Serialize)]
struct RrSetChange {
    name: String,
    #[serde(rename = "type")]
    record_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
    changetype: &'static str,
    records: Vec<RrRecord>,
}

#[derive(Debug, Serialize)]
struct Patch {
    rrsets: Vec<RrSetChange>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    error: String,
}

/// Absolute (trailing-dot) form of a name as PowerDNS stores it
fn canonical(name: &str) -> String {
    format!("{}.", normalize_name(name))
}

/// Encode logical content for the wire
fn wire_content(record_type: RecordType, content: &str) -> String {
    match record_type {
        RecordType::Txt => format!(
            "\"{}\"",
            content.replace('\\', "\\\\").replace('"', "\\\"")
        ),
        _ => content.to_string(),
    }
}

/// Decode wire content into its logical form
fn logical_content(record_type: RecordType, content: &str) -> String {
    match record_type {
        RecordType::Txt => unquote_txt(content).replace("\\\"", "\"").replace("\\\\", "\\"),
        _ => content.to_string(),
    }
}

fn record_id(name: &str, record_type: RecordType, content: &str) -> String {
    format!("{name}|{record_type}|{content}")
}

/// PowerDNS provider
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the API key.
pub struct PowerDnsProvider {
    /// API key sent as `X-API-Key`
    /// ⚠️ NEVER log this value
    api_key: String,

    /// Server base URL (without `/api/v1`)
    api_base: String,

    /// Only zones of this kind qualify (Native, Master, ...)
    zone_type: Option<String>,

    client: reqwest::Client,
}

impl std::fmt::Debug for PowerDnsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerDnsProvider")
            .field("api_key", &"<REDACTED>")
            .field("api_base", &self.api_base)
            .field("zone_type", &self.zone_type)
            .finish()
    }
}

impl PowerDnsProvider {
    /// Create a new PowerDNS provider
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the key or URL is empty or the client cannot be
    ///   built
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        zone_type: Option<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::config("PowerDNS API key cannot be empty"));
        }
        let api_base = api_base.into().trim().trim_end_matches('/').to_string();
        if api_base.is_empty() {
            return Err(Error::config("PowerDNS API URL is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            api_base,
            zone_type: zone_type.filter(|t| !t.trim().is_empty()),
            client,
        })
    }

    fn zones_url(&self) -> String {
        format!("{}/api/v1/servers/{}/zones", self.api_base, SERVER_ID)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<reqwest::Response> {
        let response = request
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiError>(&body)
            .map(|e| e.error)
            .unwrap_or(body);

        Err(match status.as_u16() {
            401 | 403 => Error::provider(
                PROVIDER,
                format!("Authentication failed: Invalid API key. Status: {status}"),
            ),
            500..=599 => Error::provider(
                PROVIDER,
                format!("PowerDNS server error (transient): {status} - {detail}"),
            ),
            _ => Error::provider(PROVIDER, format!("{context} failed: {status} - {detail}")),
        })
    }

    /// Resolve the zone owning `name`, honouring the zone kind filter
    async fn zone(&self, name: &str) -> Result<Zone> {
        let zones: Vec<Zone> = self
            .send(self.client.get(self.zones_url()), "Zone lookup")
            .await?
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("Failed to parse zones: {e}")))?;

        let mut zones: Vec<Zone> = zones
            .into_iter()
            .filter(|z| match &self.zone_type {
                Some(kind) => z.kind.eq_ignore_ascii_case(kind),
                None => true,
            })
            .collect();
        let names: Vec<&str> = zones.iter().map(|z| z.name.as_str()).collect();

        let index = longest_zone_match(name, &names).ok_or_else(|| {
            Error::provider(PROVIDER, format!("No zone found for {name}"))
        })?;
        Ok(zones.swap_remove(index))
    }

    async fn zone_detail(&self, zone: &Zone) -> Result<ZoneDetail> {
        let url = format!("{}/{}", self.zones_url(), zone.id);
        self.send(self.client.get(url), "Zone read")
            .await?
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("Failed to parse zone: {e}")))
    }

    async fn patch(&self, zone: &Zone, rrsets: Vec<RrSetChange>) -> Result<()> {
        let url = format!("{}/{}", self.zones_url(), zone.id);
        self.send(self.client.patch(url).json(&Patch { rrsets }), "Record change")
            .await?;
        Ok(())
    }

    /// Build the change that leaves `name`/`record_type` holding `records`
    fn change(
        name: &str,
        record_type: RecordType,
        ttl: Option<u32>,
        records: Vec<RrRecord>,
    ) -> RrSetChange {
        if records.is_empty() {
            RrSetChange {
                name: canonical(name),
                record_type: record_type.as_str(),
                ttl: None,
                changetype: "DELETE",
                records,
            }
        } else {
            RrSetChange {
                name: canonical(name),
                record_type: record_type.as_str(),
                ttl: Some(ttl.unwrap_or(DEFAULT_TTL)),
                changetype: "REPLACE",
                records,
            }
        }
    }

    /// Current records and TTL of one rrset
    fn rrset(
        detail: &ZoneDetail,
        name: &str,
        record_type: RecordType,
    ) -> (Vec<RrRecord>, Option<u32>) {
        let name = canonical(name);
        detail
            .rrsets
            .iter()
            .find(|r| {
                normalize_name(&r.name) == normalize_name(&name)
                    && RecordType::parse(&r.record_type) == Some(record_type)
            })
            .map(|r| (r.records.clone(), r.ttl))
            .unwrap_or_default()
    }

    fn without(records: Vec<RrRecord>, record_type: RecordType, content: &str) -> Vec<RrRecord> {
        records
            .into_iter()
            .filter(|r| logical_content(record_type, &r.content) != content)
            .collect()
    }

    fn with(mut records: Vec<RrRecord>, record_type: RecordType, content: &str) -> Vec<RrRecord> {
        if !records
            .iter()
            .any(|r| logical_content(record_type, &r.content) == content)
        {
            records.push(RrRecord {
                content: wire_content(record_type, content),
                disabled: false,
            });
        }
        records
    }
}

#[async_trait]
impl DnsProvider for PowerDnsProvider {
    async fn list_records(&self, domain: &str) -> Result<Vec<DnsRecord>> {
        let zone = self.zone(domain).await?;
        let detail = self.zone_detail(&zone).await?;
        let domain = normalize_name(domain);

        let mut records = Vec::new();
        for rrset in detail.rrsets {
            let name = normalize_name(&rrset.name);
            if !name.ends_with(&domain) {
                continue;
            }
            let Some(record_type) = RecordType::parse(&rrset.record_type) else {
                continue;
            };
            for record in rrset.records {
                let content = logical_content(record_type, &record.content);
                records.push(DnsRecord::new(
                    record_id(&name, record_type, &content),
                    name.clone(),
                    record_type,
                    content,
                ));
            }
        }
        Ok(records)
    }

    async fn create_record(
        &self,
        name: &str,
        record_type: RecordType,
        content: &str,
    ) -> Result<()> {
        let zone = self.zone(name).await?;
        let detail = self.zone_detail(&zone).await?;
        let (current, ttl) = Self::rrset(&detail, name, record_type);

        tracing::info!("Creating {} record {} -> {}", record_type, name, content);
        let records = Self::with(current, record_type, content);
        let change = Self::change(name, record_type, ttl, records);
        self.patch(&zone, vec![change]).await
    }

    async fn update_record(
        &self,
        record: &DnsRecord,
        record_type: RecordType,
        content: &str,
    ) -> Result<()> {
        let zone = self.zone(&record.name).await?;
        let detail = self.zone_detail(&zone).await?;

        tracing::info!(
            "Updating {} record {} -> {} {} (was: {})",
            record.record_type,
            record.name,
            record_type,
            content,
            record.content
        );

        let (old, old_ttl) = Self::rrset(&detail, &record.name, record.record_type);
        let old = Self::without(old, record.record_type, &record.content);

        let changes = if record.record_type == record_type {
            vec![Self::change(
                &record.name,
                record_type,
                old_ttl,
                Self::with(old, record_type, content),
            )]
        } else {
            let (new, new_ttl) = Self::rrset(&detail, &record.name, record_type);
            vec![
                Self::change(&record.name, record.record_type, old_ttl, old),
                Self::change(
                    &record.name,
                    record_type,
                    new_ttl.or(old_ttl),
                    Self::with(new, record_type, content),
                ),
            ]
        };
        self.patch(&zone, changes).await
    }

    async fn delete_record(&self, record: &DnsRecord) -> Result<()> {
        let zone = self.zone(&record.name).await?;
        let detail = self.zone_detail(&zone).await?;
        let (current, ttl) = Self::rrset(&detail, &record.name, record.record_type);

        tracing::info!("Deleting {} record {}", record.record_type, record.name);
        let remaining = Self::without(current, record.record_type, &record.content);
        let change = Self::change(&record.name, record.record_type, ttl, remaining);
        self.patch(&zone, vec![change]).await
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for creating PowerDNS providers
pub struct PowerDnsFactory;

impl DnsProviderFactory for PowerDnsFactory {
    fn create(&self, config: &ResolvedProvider) -> Result<Box<dyn DnsProvider>> {
        if config.kind != ProviderKind::PowerDns {
            return Err(Error::config("Invalid config for PowerDNS provider"));
        }
        let api_url = config
            .api_url
            .clone()
            .ok_or_else(|| Error::config("PowerDNS API URL is required"))?;

        Ok(Box::new(PowerDnsProvider::new(
            config.api_key.clone(),
            api_url,
            config.zone_type.clone(),
        )?))
    }
}

/// Register the PowerDNS provider with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider(ProviderKind::PowerDns, Box::new(PowerDnsFactory));
}
