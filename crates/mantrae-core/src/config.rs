//! Configuration types for the reconciliation engine
//!
//! Timings and endpoints of the periodic jobs. Declared routing state and
//! provider settings live in the store, not here.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between DNS sync passes (in seconds)
    #[serde(default = "default_dns_sync_interval_secs")]
    pub dns_sync_interval_secs: u64,

    /// Interval between periodic refreshes of every known instance (in seconds)
    #[serde(default = "default_instance_poll_interval_secs")]
    pub instance_poll_interval_secs: u64,

    /// Minimum interval between two admitted polls of one instance (in seconds)
    #[serde(default = "default_instance_debounce_secs")]
    pub instance_debounce_secs: u64,

    /// Per-request timeout for admin API calls (in seconds)
    #[serde(default = "default_instance_request_timeout_secs")]
    pub instance_request_timeout_secs: u64,

    /// Upper bound on polls running at the same time
    #[serde(default = "default_max_concurrent_polls")]
    pub max_concurrent_polls: usize,

    /// Base path of the proxy's administrative API
    #[serde(default = "default_admin_api_base_path")]
    pub admin_api_base_path: String,

    /// Services returning the public IPv4 address as plain text
    #[serde(default = "default_public_ip_v4_urls")]
    pub public_ip_v4_urls: Vec<String>,

    /// Services returning the public IPv6 address as plain text
    #[serde(default = "default_public_ip_v6_urls")]
    pub public_ip_v6_urls: Vec<String>,
}

impl EngineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.dns_sync_interval_secs == 0 {
            return Err(crate::Error::config("DNS sync interval must be > 0"));
        }
        if self.instance_poll_interval_secs == 0 {
            return Err(crate::Error::config("Instance poll interval must be > 0"));
        }
        if self.instance_request_timeout_secs == 0 {
            return Err(crate::Error::config("Instance request timeout must be > 0"));
        }
        if self.max_concurrent_polls == 0 {
            return Err(crate::Error::config("Max concurrent polls must be > 0"));
        }
        if !self.admin_api_base_path.starts_with('/') {
            return Err(crate::Error::config(format!(
                "Admin API base path must start with '/': {}",
                self.admin_api_base_path
            )));
        }
        Ok(())
    }

    pub fn dns_sync_interval(&self) -> Duration {
        Duration::from_secs(self.dns_sync_interval_secs)
    }

    pub fn instance_poll_interval(&self) -> Duration {
        Duration::from_secs(self.instance_poll_interval_secs)
    }

    pub fn instance_debounce(&self) -> Duration {
        Duration::from_secs(self.instance_debounce_secs)
    }

    pub fn instance_request_timeout(&self) -> Duration {
        Duration::from_secs(self.instance_request_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dns_sync_interval_secs: default_dns_sync_interval_secs(),
            instance_poll_interval_secs: default_instance_poll_interval_secs(),
            instance_debounce_secs: default_instance_debounce_secs(),
            instance_request_timeout_secs: default_instance_request_timeout_secs(),
            max_concurrent_polls: default_max_concurrent_polls(),
            admin_api_base_path: default_admin_api_base_path(),
            public_ip_v4_urls: default_public_ip_v4_urls(),
            public_ip_v6_urls: default_public_ip_v6_urls(),
        }
    }
}

fn default_dns_sync_interval_secs() -> u64 {
    300
}

fn default_instance_poll_interval_secs() -> u64 {
    60
}

fn default_instance_debounce_secs() -> u64 {
    30
}

fn default_instance_request_timeout_secs() -> u64 {
    5
}

fn default_max_concurrent_polls() -> usize {
    8
}

fn default_admin_api_base_path() -> String {
    "/api".to_string()
}

fn default_public_ip_v4_urls() -> Vec<String> {
    vec![
        "https://api.ipify.org".to_string(),
        "https://ipv4.icanhazip.com".to_string(),
    ]
}

fn default_public_ip_v6_urls() -> Vec<String> {
    vec![
        "https://api6.ipify.org".to_string(),
        "https://ipv6.icanhazip.com".to_string(),
    ]
}
