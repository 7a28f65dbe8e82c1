// # HTTP Public IP Source
//
// Looks up the machine's public address through plain-text "what is my IP"
// services (e.g., api.ipify.org, icanhazip.com).
//
// ## Lookup Order
//
// 1. Every IPv4 service in order; the first valid IPv4 answer wins
// 2. Only when no IPv4 service answers: every IPv6 service in order
//
// One lookup per call. The sync scheduler caches the answer for the
// duration of a pass, so there is no cache here.

use async_trait::async_trait;
use mantrae_core::traits::{IpVersion, PublicIpSource};
use mantrae_core::{EngineConfig, Error, Result};
use std::net::IpAddr;
use std::time::Duration;

/// Default HTTP timeout per service
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP-based public IP source
#[derive(Debug, Clone)]
pub struct HttpIpSource {
    /// Services answering with an IPv4 address
    v4_urls: Vec<String>,

    /// Services answering with an IPv6 address
    v6_urls: Vec<String>,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpIpSource {
    /// Create a new HTTP IP source
    ///
    /// # Parameters
    ///
    /// - `v4_urls`: Services tried first, in order
    /// - `v6_urls`: Fallback services, in order
    pub fn new(v4_urls: Vec<String>, v6_urls: Vec<String>) -> Result<Self> {
        if v4_urls.is_empty() && v6_urls.is_empty() {
            return Err(Error::config("At least one public IP service URL is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            v4_urls,
            v6_urls,
            client,
        })
    }

    /// Create from the engine's configured service lists
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(config.public_ip_v4_urls.clone(), config.public_ip_v6_urls.clone())
    }

    /// Fetch one service and check the address family
    async fn fetch_ip(&self, url: &str, version: IpVersion) -> Result<IpAddr> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::http(format!("Request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::http(format!("{url} returned {}", response.status())));
        }

        let ip_text = response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read response from {url}: {e}")))?;
        let ip_text = ip_text.trim();

        let ip: IpAddr = ip_text
            .parse()
            .map_err(|_| Error::decode(format!("Invalid IP address from {url}: {ip_text}")))?;

        if IpVersion::of(&ip) != version {
            return Err(Error::decode(format!(
                "Expected {version:?} address from {url}, got: {ip}"
            )));
        }

        Ok(ip)
    }

    /// First valid answer from `urls`, or the last failure
    async fn first_answer(&self, urls: &[String], version: IpVersion) -> Option<Result<IpAddr>> {
        let mut last = None;
        for url in urls {
            match self.fetch_ip(url, version).await {
                Ok(ip) => return Some(Ok(ip)),
                Err(e) => {
                    tracing::warn!("Public IP lookup via {} failed: {}", url, e);
                    last = Some(Err(e));
                }
            }
        }
        last
    }
}

#[async_trait]
impl PublicIpSource for HttpIpSource {
    async fn current(&self) -> Result<IpAddr> {
        let v4 = self.first_answer(&self.v4_urls, IpVersion::V4).await;
        if let Some(Ok(ip)) = v4 {
            return Ok(ip);
        }

        tracing::debug!("No IPv4 answer, trying IPv6 services");
        match self.first_answer(&self.v6_urls, IpVersion::V6).await {
            Some(Ok(ip)) => Ok(ip),
            Some(Err(e)) => Err(e),
            None => match v4 {
                Some(Err(e)) => Err(e),
                _ => Err(Error::http("Public IP could not be determined")),
            },
        }
    }
}
