//! Declared-state rows and live-state snapshots
//!
//! These are the shapes the engine reads from (and, for instance snapshots,
//! writes to) the relational store. Router/service/middleware/transport
//! config blobs are kept as opaque JSON and copied verbatim into the
//! assembled dynamic configuration.

use crate::instance::traefik::{EntryPoint, Overview, RawData, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Routing protocol of a declared entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Tcp,
    Udp,
}

impl Protocol {
    /// All protocols, in document order
    pub const ALL: [Protocol; 3] = [Protocol::Http, Protocol::Tcp, Protocol::Udp];

    /// Whether routers of this protocol carry a rule with domains in it
    pub fn has_rule(self) -> bool {
        !matches!(self, Protocol::Udp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Http => "http",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        })
    }
}

/// Kind of declared routing entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Router,
    Service,
    Middleware,
    ServersTransport,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Router => "router",
            ResourceKind::Service => "service",
            ResourceKind::Middleware => "middleware",
            ResourceKind::ServersTransport => "servers_transport",
        })
    }
}

/// A configuration profile, the scope every declared entity belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub name: String,
}

/// One declared router, service, middleware or servers transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRow {
    pub id: i64,
    pub profile_id: i64,
    #[serde(default)]
    pub agent_id: Option<String>,
    pub name: String,
    pub protocol: Protocol,
    pub kind: ResourceKind,
    /// Protocol-native config, rendered as-is
    pub config: serde_json::Value,
    pub enabled: bool,
}

impl ResourceRow {
    /// The routing rule of a router row, if it has one
    pub fn rule(&self) -> Option<&str> {
        self.config.get("rule").and_then(|r| r.as_str())
    }
}

/// DNS vendor tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Cloudflare,
    PowerDns,
    Technitium,
}

impl ProviderKind {
    /// Stable vendor name used in logs and the registry
    pub fn type_name(self) -> &'static str {
        match self {
            ProviderKind::Cloudflare => "cloudflare",
            ProviderKind::PowerDns => "powerdns",
            ProviderKind::Technitium => "technitium",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Stored settings of a DNS provider
///
/// `api_key` holds the encrypted credential; it is decrypted only when the
/// provider is resolved for a sync pass.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Encrypted API key (base64 nonce + ciphertext)
    pub api_key: String,
    /// Vendor API endpoint (required for self-hosted vendors)
    #[serde(default)]
    pub api_url: Option<String>,
    /// Target IP the managed names should resolve to
    #[serde(default)]
    pub ip: String,
    /// Proxy traffic through the vendor (Cloudflare only)
    #[serde(default)]
    pub proxied: bool,
    /// Replace `ip` with the machine's public IP at resolution time
    #[serde(default)]
    pub auto_update: bool,
    /// Restrict zone lookup to zones of this type
    #[serde(default)]
    pub zone_type: Option<String>,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &"<REDACTED>")
            .field("api_url", &self.api_url)
            .field("ip", &self.ip)
            .field("proxied", &self.proxied)
            .field("auto_update", &self.auto_update)
            .field("zone_type", &self.zone_type)
            .finish()
    }
}

/// A DNS provider row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsProviderRow {
    pub id: i64,
    pub name: String,
    pub kind: ProviderKind,
    pub settings: ProviderSettings,
    #[serde(default)]
    pub is_default: bool,
}

/// Link between a router and the DNS provider that manages its domains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterDnsLink {
    pub protocol: Protocol,
    pub router_id: i64,
    pub provider_id: i64,
}

/// An HTTP/TCP router together with its assigned DNS provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterDnsBinding {
    pub profile_id: i64,
    pub profile_name: String,
    pub protocol: Protocol,
    pub router_id: i64,
    pub router_name: String,
    pub rule: String,
    pub enabled: bool,
    pub provider_id: i64,
}

/// Connection data for one proxy instance's administrative API
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceEndpoint {
    pub profile_id: i64,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: bool,
}

impl fmt::Debug for InstanceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceEndpoint")
            .field("profile_id", &self.profile_id)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .field("tls", &self.tls)
            .finish()
    }
}

/// Values written by one successful poll
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceUpdate {
    pub profile_id: i64,
    pub name: String,
    pub url: String,
    pub tls: bool,
    pub entrypoints: Vec<EntryPoint>,
    pub overview: Overview,
    pub config: RawData,
    pub version: Version,
}

/// Most recently polled live state of one proxy instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub id: i64,
    pub profile_id: i64,
    pub name: String,
    pub url: String,
    pub tls: bool,
    pub entrypoints: Vec<EntryPoint>,
    pub overview: Overview,
    pub config: RawData,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
