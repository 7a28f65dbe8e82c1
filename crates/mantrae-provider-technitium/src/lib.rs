// # Technitium DNS Provider
//
// Technitium DNS Server HTTP API adapter for the record ownership manager.
//
// ## Behaviour
//
// - Authentication through the `token` query parameter
// - Every response carries a `status`; anything but `"ok"` is an error
// - Records have no ids, so the adapter synthesises `name|type|content` ids
// - A type change is a delete of the old record plus an add of the new one
// - `zone_type` restricts zone lookup to zones of that `type`
//
// ## API Reference
//
// - List Zones: `/api/zones/list`
// - List Records: `/api/zones/records/get?listZone=true`
// - Mutations: `/api/zones/records/add|update|delete`

use async_trait::async_trait;
use mantrae_core::model::ProviderKind;
use mantrae_core::traits::{
    DnsProvider, DnsProviderFactory, DnsRecord, RecordType, ResolvedProvider, longest_zone_match,
    normalize_name,
};
use mantrae_core::{Error, ProviderRegistry, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// TTL for created records
const DEFAULT_TTL: u32 = 300;

const PROVIDER: &str = "technitium";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    response: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ZoneList {
    #[serde(default)]
    zones: Vec<Zone>,
}

#[derive(Debug, Deserialize)]
struct Zone {
    name: String,
    #[serde(rename = "type", default)]
    zone_type: String,
}

#[derive(Debug, Deserialize)]
struct RecordList {
    #[serde(default)]
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default)]
    r_data: RData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RData {
    ip_address: Option<String>,
    text: Option<String>,
}

impl RData {
    fn content(&self, record_type: RecordType) -> Option<&str> {
        match record_type {
            RecordType::A | RecordType::Aaaa => self.ip_address.as_deref(),
            RecordType::Txt => self.text.as_deref(),
        }
    }
}

/// Query parameter carrying a record value of the given type
fn value_param(record_type: RecordType) -> &'static str {
    match record_type {
        RecordType::A | RecordType::Aaaa => "ipAddress",
        RecordType::Txt => "text",
    }
}

/// Query parameter carrying the replacement value of an update
fn new_value_param(record_type: RecordType) -> &'static str {
    match record_type {
        RecordType::A | RecordType::Aaaa => "newIpAddress",
        RecordType::Txt => "newText",
    }
}

fn record_id(name: &str, record_type: RecordType, content: &str) -> String {
    format!("{name}|{record_type}|{content}")
}

/// Technitium provider
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the API token.
pub struct TechnitiumProvider {
    /// API token
    /// ⚠️ NEVER log this value
    token: String,

    /// Server base URL
    api_base: String,

    /// Only zones of this type qualify (Primary, Forwarder, ...)
    zone_type: Option<String>,

    client: reqwest::Client,
}

impl std::fmt::Debug for TechnitiumProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TechnitiumProvider")
            .field("token", &"<REDACTED>")
            .field("api_base", &self.api_base)
            .field("zone_type", &self.zone_type)
            .finish()
    }
}

impl TechnitiumProvider {
    /// Create a new Technitium provider
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the token or URL is empty or the client cannot be
    ///   built
    pub fn new(
        token: impl Into<String>,
        api_base: impl Into<String>,
        zone_type: Option<String>,
    ) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(Error::config("Technitium API token cannot be empty"));
        }
        let api_base = api_base.into().trim().trim_end_matches('/').to_string();
        if api_base.is_empty() {
            return Err(Error::config("Technitium API URL is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            token,
            api_base,
            zone_type: zone_type.filter(|t| !t.trim().is_empty()),
            client,
        })
    }

    /// Call an API endpoint and unwrap its `response` object
    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        context: &str,
    ) -> Result<Option<T>> {
        let url = format!("{}/api/{}", self.api_base, endpoint);
        let response = self
            .client
            .get(&url)
            .query(&[("token", self.token.as_str())])
            .query(params)
            .send()
            .await
            // reqwest errors carry the URL, which carries the token
            .map_err(|e| {
                Error::provider(PROVIDER, format!("HTTP request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => Error::provider(
                    PROVIDER,
                    format!("Authentication failed: Invalid API token. Status: {status}"),
                ),
                500..=599 => Error::provider(
                    PROVIDER,
                    format!("Technitium server error (transient): {status}"),
                ),
                _ => Error::provider(PROVIDER, format!("{context} failed: {status}")),
            });
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            Error::provider(PROVIDER, format!("Failed to parse response: {}", e.without_url()))
        })?;

        if envelope.status != "ok" {
            return Err(Error::provider(
                PROVIDER,
                format!(
                    "{context} failed ({}): {}",
                    envelope.status,
                    envelope.error_message.unwrap_or_default()
                ),
            ));
        }
        Ok(envelope.response)
    }

    /// Resolve the zone name owning `name`, honouring the zone type filter
    async fn zone(&self, name: &str) -> Result<String> {
        let zones = self
            .call::<ZoneList>("zones/list", &[], "Zone lookup")
            .await?
            .map(|list| list.zones)
            .unwrap_or_default();

        let mut names: Vec<String> = zones
            .into_iter()
            .filter(|z| match &self.zone_type {
                Some(kind) => z.zone_type.eq_ignore_ascii_case(kind),
                None => true,
            })
            .map(|z| z.name)
            .collect();

        let index = longest_zone_match(name, &names).ok_or_else(|| {
            Error::provider(PROVIDER, format!("No zone found for {name}"))
        })?;
        Ok(names.swap_remove(index))
    }

    async fn mutate(&self, endpoint: &str, params: &[(&str, &str)], context: &str) -> Result<()> {
        self.call::<serde_json::Value>(endpoint, params, context)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DnsProvider for TechnitiumProvider {
    async fn list_records(&self, domain: &str) -> Result<Vec<DnsRecord>> {
        let zone = self.zone(domain).await?;
        let domain = normalize_name(domain);
        let records = self
            .call::<RecordList>(
                "zones/records/get",
                &[("domain", zone.as_str()), ("zone", zone.as_str()), ("listZone", "true")],
                "Record lookup",
            )
            .await?
            .map(|list| list.records)
            .unwrap_or_default();

        Ok(records
            .into_iter()
            .filter_map(|r| {
                let name = normalize_name(&r.name);
                if !name.ends_with(&domain) {
                    return None;
                }
                let record_type = RecordType::parse(&r.record_type)?;
                let content = r.r_data.content(record_type)?.to_string();
                Some(DnsRecord::new(
                    record_id(&name, record_type, &content),
                    name,
                    record_type,
                    content,
                ))
            })
            .collect())
    }

    async fn create_record(
        &self,
        name: &str,
        record_type: RecordType,
        content: &str,
    ) -> Result<()> {
        let zone = self.zone(name).await?;
        let name = normalize_name(name);
        let ttl = DEFAULT_TTL.to_string();

        tracing::info!("Creating {} record {} -> {}", record_type, name, content);
        self.mutate(
            "zones/records/add",
            &[
                ("domain", name.as_str()),
                ("zone", zone.as_str()),
                ("type", record_type.as_str()),
                ("ttl", ttl.as_str()),
                (value_param(record_type), content),
            ],
            "Record creation",
        )
        .await
    }

    async fn update_record(
        &self,
        record: &DnsRecord,
        record_type: RecordType,
        content: &str,
    ) -> Result<()> {
        tracing::info!(
            "Updating {} record {} -> {} {} (was: {})",
            record.record_type,
            record.name,
            record_type,
            content,
            record.content
        );

        if record.record_type != record_type {
            self.delete_record(record).await?;
            return self.create_record(&record.name, record_type, content).await;
        }

        let zone = self.zone(&record.name).await?;
        self.mutate(
            "zones/records/update",
            &[
                ("domain", record.name.as_str()),
                ("zone", zone.as_str()),
                ("type", record_type.as_str()),
                (value_param(record_type), record.content.as_str()),
                (new_value_param(record_type), content),
            ],
            "Record update",
        )
        .await
    }

    async fn delete_record(&self, record: &DnsRecord) -> Result<()> {
        let zone = self.zone(&record.name).await?;

        tracing::info!("Deleting {} record {}", record.record_type, record.name);
        self.mutate(
            "zones/records/delete",
            &[
                ("domain", record.name.as_str()),
                ("zone", zone.as_str()),
                ("type", record.record_type.as_str()),
                (value_param(record.record_type), record.content.as_str()),
            ],
            "Record deletion",
        )
        .await
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for creating Technitium providers
pub struct TechnitiumFactory;

impl DnsProviderFactory for TechnitiumFactory {
    fn create(&self, config: &ResolvedProvider) -> Result<Box<dyn DnsProvider>> {
        if config.kind != ProviderKind::Technitium {
            return Err(Error::config("Invalid config for Technitium provider"));
        }
        let api_url = config
            .api_url
            .clone()
            .ok_or_else(|| Error::config("Technitium API URL is required"))?;

        Ok(Box::new(TechnitiumProvider::new(
            config.api_key.clone(),
            api_url,
            config.zone_type.clone(),
        )?))
    }
}

/// Register the Technitium provider with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider(ProviderKind::Technitium, Box::new(TechnitiumFactory));
}
