// # Cloudflare DNS Provider
//
// Cloudflare adapter for the record ownership manager.
//
// ## Behaviour
//
// - One vendor interaction per trait call; no retries, no caching
// - Zone resolved per call: longest registered zone that is a suffix of the
//   record name (zone list is paginated)
// - Only A, AAAA and TXT records are reported
// - `proxied` is honoured for address records, never for TXT
//
// ## Security Requirements
//
// - API token NEVER appears in logs or Debug output
// - Factory fails fast if the token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?page=..&per_page=..`
// - List DNS Records: GET `/zones/:zone_id/dns_records?name.endswith=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use mantrae_core::model::ProviderKind;
use mantrae_core::ownership::unquote_txt;
use mantrae_core::traits::{
    DnsProvider, DnsProviderFactory, DnsRecord, RecordType, ResolvedProvider, longest_zone_match,
    normalize_name,
};
use mantrae_core::{Error, ProviderRegistry, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for list endpoints
const PAGE_SIZE: u32 = 100;

/// "Automatic" TTL
const AUTO_TTL: u32 = 1;

const PROVIDER: &str = "cloudflare";

/// Standard response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    page: u32,
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Record {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default)]
    content: String,
}

/// Cloudflare DNS provider
///
/// Stateless and single-shot. All coordination (ownership checks, retry on
/// the next tick) is owned by the engine.
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the API token.
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// API base URL (overridable for tests and API gateways)
    api_base: String,

    /// Proxy address records through Cloudflare
    proxied: bool,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("api_base", &self.api_base)
            .field("proxied", &self.proxied)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `api_base`: API base URL; defaults to the public v4 endpoint
    /// - `proxied`: Proxy created/updated address records
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the token is empty or the client cannot be built
    pub fn new(
        api_token: impl Into<String>,
        api_base: Option<String>,
        proxied: bool,
    ) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        let api_base = api_base
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| CLOUDFLARE_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            api_token,
            api_base,
            proxied,
            client,
        })
    }

    /// Send a request and unwrap the response envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<Envelope<T>> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(match status.as_u16() {
                401 | 403 => Error::provider(
                    PROVIDER,
                    format!("Authentication failed, check the API token: {status}"),
                ),
                429 => Error::provider(
                    PROVIDER,
                    format!("Rate limit exceeded. Status: {status}"),
                ),
                500..=599 => Error::provider(
                    PROVIDER,
                    format!("Cloudflare server error (transient): {status} - {error_text}"),
                ),
                _ => Error::provider(
                    PROVIDER,
                    format!("{context} failed: {status} - {error_text}"),
                ),
            });
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("Failed to parse response: {e}")))?;

        if !envelope.success {
            let messages: Vec<String> = envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect();
            return Err(Error::provider(
                PROVIDER,
                format!("{context} rejected: {}", messages.join(", ")),
            ));
        }

        Ok(envelope)
    }

    /// Fetch every page of a list endpoint
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        context: &str,
    ) -> Result<Vec<T>> {
        let url = format!("{}{}", self.api_base, path);
        let per_page = PAGE_SIZE.to_string();
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let page_str = page.to_string();
            let request = self
                .client
                .get(&url)
                .query(query)
                .query(&[("page", page_str.as_str()), ("per_page", per_page.as_str())]);
            let envelope: Envelope<Vec<T>> = self.send(request, context).await?;
            items.extend(envelope.result.unwrap_or_default());

            match envelope.result_info {
                Some(info) if info.page < info.total_pages => page = info.page + 1,
                _ => break,
            }
        }

        Ok(items)
    }

    /// Resolve the zone ID owning `name`
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones?page=1&per_page=100
    /// Authorization: Bearer <token>
    /// ```
    async fn zone_id(&self, name: &str) -> Result<String> {
        let zones: Vec<Zone> = self.get_all("/zones", &[], "Zone lookup").await?;
        let names: Vec<&str> = zones.iter().map(|z| z.name.as_str()).collect();

        let index = longest_zone_match(name, &names).ok_or_else(|| {
            Error::provider(PROVIDER, format!("No zone found for {name}"))
        })?;

        tracing::debug!("Resolved {} to zone {}", name, zones[index].name);
        Ok(zones[index].id.clone())
    }

    fn record_body(&self, name: &str, record_type: RecordType, content: &str) -> serde_json::Value {
        let mut body = json!({
            "type": record_type.as_str(),
            "name": name,
            "content": content,
            "ttl": AUTO_TTL,
        });
        if record_type.is_address() {
            body["proxied"] = json!(self.proxied);
        }
        body
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// List records whose name ends with `domain`
    ///
    /// The marker name `_mantrae.<domain>` ends with `domain`, so it is part
    /// of the same listing.
    async fn list_records(&self, domain: &str) -> Result<Vec<DnsRecord>> {
        let zone_id = self.zone_id(domain).await?;
        let domain = normalize_name(domain);
        let records: Vec<Record> = self
            .get_all(
                &format!("/zones/{zone_id}/dns_records"),
                &[("name.endswith", domain.as_str())],
                "Record lookup",
            )
            .await?;

        Ok(records
            .into_iter()
            .filter_map(|r| {
                let record_type = RecordType::parse(&r.record_type)?;
                let content = match record_type {
                    RecordType::Txt => unquote_txt(&r.content).to_string(),
                    _ => r.content,
                };
                Some(DnsRecord::new(r.id, normalize_name(&r.name), record_type, content))
            })
            .collect())
    }

    async fn create_record(
        &self,
        name: &str,
        record_type: RecordType,
        content: &str,
    ) -> Result<()> {
        let zone_id = self.zone_id(name).await?;
        let url = format!("{}/zones/{}/dns_records", self.api_base, zone_id);

        tracing::info!("Creating {} record {} -> {}", record_type, name, content);
        let request = self
            .client
            .post(&url)
            .json(&self.record_body(name, record_type, content));
        self.send::<serde_json::Value>(request, "Record creation").await?;
        Ok(())
    }

    async fn update_record(
        &self,
        record: &DnsRecord,
        record_type: RecordType,
        content: &str,
    ) -> Result<()> {
        let zone_id = self.zone_id(&record.name).await?;
        let url = format!("{}/zones/{}/dns_records/{}", self.api_base, zone_id, record.id);

        tracing::info!(
            "Updating {} record {} -> {} {} (was: {})",
            record.record_type,
            record.name,
            record_type,
            content,
            record.content
        );
        let request = self
            .client
            .put(&url)
            .json(&self.record_body(&record.name, record_type, content));
        self.send::<serde_json::Value>(request, "Record update").await?;
        Ok(())
    }

    async fn delete_record(&self, record: &DnsRecord) -> Result<()> {
        let zone_id = self.zone_id(&record.name).await?;
        let url = format!("{}/zones/{}/dns_records/{}", self.api_base, zone_id, record.id);

        tracing::info!("Deleting {} record {}", record.record_type, record.name);
        self.send::<serde_json::Value>(self.client.delete(&url), "Record deletion")
            .await?;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, config: &ResolvedProvider) -> Result<Box<dyn DnsProvider>> {
        if config.kind != ProviderKind::Cloudflare {
            return Err(Error::config("Invalid config for Cloudflare provider"));
        }
        if config.api_key.is_empty() {
            return Err(Error::config("Cloudflare API token is required"));
        }

        Ok(Box::new(CloudflareProvider::new(
            config.api_key.clone(),
            config.api_url.clone(),
            config.proxied,
        )?))
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use mantrae_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// mantrae_provider_cloudflare::register(&registry);
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider(ProviderKind::Cloudflare, Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use mantrae_core::ownership::{RecordManager, UpsertOutcome};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn resolved(api_key: &str) -> ResolvedProvider {
        ResolvedProvider {
            id: 1,
            name: "cf1".to_string(),
            kind: ProviderKind::Cloudflare,
            api_key: api_key.to_string(),
            api_url: None,
            ip: "1.2.3.4".to_string(),
            proxied: false,
            zone_type: None,
        }
    }

    fn ok(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "errors": [],
            "result": result,
            "result_info": { "page": 1, "total_pages": 1 }
        }))
    }

    async fn mount_zones(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/zones"))
            .and(header("authorization", "Bearer test_token"))
            .respond_with(ok(json!([
                { "id": "z-root", "name": "example.com" },
                { "id": "z-sub", "name": "sub.example.com" }
            ])))
            .mount(server)
            .await;
    }

    fn provider(server: &MockServer, proxied: bool) -> CloudflareProvider {
        CloudflareProvider::new("test_token", Some(server.uri()), proxied).unwrap()
    }

    #[test]
    fn test_factory_creation() {
        assert!(CloudflareFactory.create(&resolved("test_token")).is_ok());
    }

    #[test]
    fn test_factory_missing_token() {
        assert!(CloudflareFactory.create(&resolved("")).is_err());
    }

    #[test]
    fn test_factory_rejects_other_vendor() {
        let mut config = resolved("test_token");
        config.kind = ProviderKind::PowerDns;
        assert!(CloudflareFactory.create(&config).is_err());
    }

    #[test]
    fn test_register() {
        let registry = ProviderRegistry::new();
        register(&registry);
        assert!(registry.has_provider(ProviderKind::Cloudflare));
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let provider = CloudflareProvider::new("secret_token_12345", None, false).unwrap();

        let debug_str = format!("{provider:?}");
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareProvider"));
        assert!(debug_str.contains(CLOUDFLARE_API_BASE));
    }

    #[tokio::test]
    async fn test_list_uses_longest_zone_and_filters_types() {
        let server = MockServer::start().await;
        mount_zones(&server).await;
        Mock::given(method("GET"))
            .and(path("/zones/z-sub/dns_records"))
            .and(query_param("name.endswith", "app.sub.example.com"))
            .respond_with(ok(json!([
                { "id": "r1", "name": "app.sub.example.com", "type": "A", "content": "1.2.3.4" },
                { "id": "r2", "name": "_mantrae.app.sub.example.com", "type": "TXT", "content": "\"mantrae-managed\"" },
                { "id": "r3", "name": "app.sub.example.com", "type": "MX", "content": "mail.example.com" }
            ])))
            .mount(&server)
            .await;

        let records = provider(&server, false)
            .list_records("App.Sub.Example.com")
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            DnsRecord::new("r1", "app.sub.example.com", RecordType::A, "1.2.3.4")
        );
        assert_eq!(records[1].record_type, RecordType::Txt);
        assert_eq!(records[1].content, "mantrae-managed");
    }

    #[tokio::test]
    async fn test_zone_list_is_paginated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(|req: &Request| {
                let second = req.url.query_pairs().any(|(k, v)| k == "page" && v == "2");
                let (zones, page) = if second {
                    (json!([{ "id": "z-2", "name": "example.org" }]), 2)
                } else {
                    (json!([{ "id": "z-1", "name": "example.com" }]), 1)
                };
                ResponseTemplate::new(200).set_body_json(json!({
                    "success": true,
                    "errors": [],
                    "result": zones,
                    "result_info": { "page": page, "total_pages": 2 }
                }))
            })
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/zones/z-2/dns_records"))
            .respond_with(ok(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let records = provider(&server, false).list_records("www.example.org").await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_create_address_record_honours_proxied() {
        let server = MockServer::start().await;
        mount_zones(&server).await;
        Mock::given(method("POST"))
            .and(path("/zones/z-root/dns_records"))
            .and(body_partial_json(json!({
                "type": "A", "name": "app.example.com", "content": "1.2.3.4", "proxied": true
            })))
            .respond_with(ok(json!({ "id": "new" })))
            .expect(1)
            .mount(&server)
            .await;

        provider(&server, true)
            .create_record("app.example.com", RecordType::A, "1.2.3.4")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_txt_record_is_never_proxied() {
        let server = MockServer::start().await;
        mount_zones(&server).await;
        Mock::given(method("POST"))
            .and(path("/zones/z-root/dns_records"))
            .respond_with(ok(json!({ "id": "txt" })))
            .expect(1)
            .mount(&server)
            .await;

        provider(&server, true)
            .create_record("_mantrae.app.example.com", RecordType::Txt, "mantrae-managed")
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let post = requests
            .iter()
            .find(|r| r.method == wiremock::http::Method::POST)
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&post.body).unwrap();
        assert_eq!(body["type"], "TXT");
        assert_eq!(body["content"], "mantrae-managed");
        assert!(body.get("proxied").is_none());
    }

    #[tokio::test]
    async fn test_apex_record_and_marker_land_in_apex_zone() {
        let server = MockServer::start().await;
        mount_zones(&server).await;
        Mock::given(method("GET"))
            .and(path("/zones/z-root/dns_records"))
            .and(query_param("name.endswith", "example.com"))
            .respond_with(ok(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/zones/z-root/dns_records"))
            .respond_with(ok(json!({ "id": "new" })))
            .expect(2)
            .mount(&server)
            .await;

        let manager =
            RecordManager::from_target(Box::new(provider(&server, false)), "1.2.3.4").unwrap();
        let outcome = manager.upsert_record("example.com").await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);

        let requests = server.received_requests().await.unwrap();
        let names: Vec<String> = requests
            .iter()
            .filter(|r| r.method == wiremock::http::Method::POST)
            .map(|r| {
                let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
                body["name"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(names, vec!["example.com", "_mantrae.example.com"]);
    }

    #[tokio::test]
    async fn test_update_and_delete_address_record_by_id() {
        let server = MockServer::start().await;
        mount_zones(&server).await;
        Mock::given(method("PUT"))
            .and(path("/zones/z-root/dns_records/r1"))
            .and(body_partial_json(json!({ "type": "AAAA", "content": "2001:db8::1" })))
            .respond_with(ok(json!({ "id": "r1" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/zones/z-root/dns_records/r1"))
            .respond_with(ok(json!({ "id": "r1" })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server, false);
        let record = DnsRecord::new("r1", "app.example.com", RecordType::A, "1.2.3.4");
        provider
            .update_record(&record, RecordType::Aaaa, "2001:db8::1")
            .await
            .unwrap();
        provider.delete_record(&record).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_zone_is_an_error() {
        let server = MockServer::start().await;
        mount_zones(&server).await;

        let err = provider(&server, false)
            .list_records("app.example.net")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No zone found"));
    }

    #[tokio::test]
    async fn test_auth_failure_does_not_leak_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = provider(&server, false)
            .list_records("app.example.com")
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Authentication failed"));
        assert!(!message.contains("test_token"));
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope_is_an_error() {
        let server = MockServer::start().await;
        mount_zones(&server).await;
        Mock::given(method("POST"))
            .and(path("/zones/z-root/dns_records"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "errors": [{ "code": 81057, "message": "Record already exists." }],
                "result": null
            })))
            .mount(&server)
            .await;

        let err = provider(&server, false)
            .create_record("app.example.com", RecordType::A, "1.2.3.4")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Record already exists."));
    }
}
