//! Instance poller
//!
//! Pulls the live state of one proxy instance from its administrative API
//! and stores it as the instance snapshot.
//!
//! The four endpoints are fetched concurrently and joined before anything is
//! written. A transport or status failure on any of them aborts the cycle
//! without touching the stored snapshot. A body that fails to decode only
//! costs its own field, which is stored at its default value.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::coordinator::InstanceRefresher;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::model::{InstanceEndpoint, InstanceSnapshot, InstanceUpdate};
use crate::traits::Store;

const RAWDATA: &str = "rawdata";
const ENTRYPOINTS: &str = "entrypoints";
const OVERVIEW: &str = "overview";
const VERSION: &str = "version";

/// Polls proxy instances and upserts their snapshots
pub struct InstancePoller {
    store: Arc<dyn Store>,
    timeout: Duration,
    base_path: String,
}

impl std::fmt::Debug for InstancePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstancePoller")
            .field("timeout", &self.timeout)
            .field("base_path", &self.base_path)
            .finish()
    }
}

impl InstancePoller {
    pub fn new(store: Arc<dyn Store>, config: &EngineConfig) -> Self {
        Self {
            store,
            timeout: config.instance_request_timeout(),
            base_path: config.admin_api_base_path.trim_end_matches('/').to_string(),
        }
    }

    /// HTTP client for one instance
    ///
    /// Instances without TLS enabled are assumed local or self-signed, so
    /// certificate verification is skipped for them.
    fn client(&self, endpoint: &InstanceEndpoint) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(!endpoint.tls)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {e}")))
    }

    async fn fetch(
        &self,
        client: &reqwest::Client,
        endpoint: &InstanceEndpoint,
        path: &str,
    ) -> Result<String> {
        let url = format!(
            "{}{}/{}",
            endpoint.url.trim_end_matches('/'),
            self.base_path,
            path
        );

        let mut request = client.get(&url);
        if let Some(username) = endpoint.username.as_deref().filter(|u| !u.is_empty()) {
            request = request.basic_auth(username, endpoint.password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http(format!("GET {url} returned {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| Error::http(format!("GET {url}: failed to read body: {e}")))
    }

    /// Poll one instance and upsert its snapshot
    pub async fn poll_endpoint(&self, endpoint: &InstanceEndpoint) -> Result<InstanceSnapshot> {
        let client = self.client(endpoint)?;

        let (rawdata, entrypoints, overview, version) = tokio::join!(
            self.fetch(&client, endpoint, RAWDATA),
            self.fetch(&client, endpoint, ENTRYPOINTS),
            self.fetch(&client, endpoint, OVERVIEW),
            self.fetch(&client, endpoint, VERSION),
        );
        let (rawdata, entrypoints, overview, version) =
            (rawdata?, entrypoints?, overview?, version?);

        let update = InstanceUpdate {
            profile_id: endpoint.profile_id,
            name: endpoint.name.clone(),
            url: endpoint.url.clone(),
            tls: endpoint.tls,
            config: decode_field(&endpoint.name, RAWDATA, &rawdata),
            entrypoints: decode_field(&endpoint.name, ENTRYPOINTS, &entrypoints),
            overview: decode_field(&endpoint.name, OVERVIEW, &overview),
            version: decode_field(&endpoint.name, VERSION, &version),
        };

        let snapshot = self.store.upsert_instance(update).await?;
        debug!(
            instance = %endpoint.name,
            profile_id = endpoint.profile_id,
            version = %snapshot.version.version,
            "Stored instance snapshot"
        );
        Ok(snapshot)
    }
}

/// Decode one endpoint body, falling back to the default value
fn decode_field<T: DeserializeOwned + Default>(instance: &str, field: &str, body: &str) -> T {
    match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            warn!(
                instance = %instance,
                field,
                "Failed to decode {} response, storing default: {}",
                field,
                e
            );
            T::default()
        }
    }
}

#[async_trait]
impl InstanceRefresher for InstancePoller {
    /// Poll every endpoint registered under `name`
    ///
    /// All endpoints are attempted; the first failure is returned.
    async fn refresh(&self, name: &str) -> Result<()> {
        let endpoints = self.store.list_instance_endpoints(name).await?;
        if endpoints.is_empty() {
            return Err(Error::not_found(format!("No instance named {name}")));
        }

        let mut first_error = None;
        for endpoint in &endpoints {
            match self.poll_endpoint(endpoint).await {
                Ok(_) => {
                    info!(instance = %name, profile_id = endpoint.profile_id, "Instance refreshed");
                }
                Err(e) => {
                    warn!(
                        instance = %name,
                        profile_id = endpoint.profile_id,
                        "Instance poll failed: {}",
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
