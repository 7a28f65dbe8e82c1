//! Declared-config assembler
//!
//! Renders the enabled routing entities of one profile into the proxy's
//! dynamic configuration document. Read-only; safe to call concurrently for
//! the same profile.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::model::{Protocol, ResourceKind};
use crate::traits::Store;

/// Entities of one protocol, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolSection {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub routers: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub services: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub middlewares: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub servers_transports: BTreeMap<String, serde_json::Value>,
}

impl ProtocolSection {
    /// A section without routers, services and middlewares is not rendered,
    /// even if it declares transports
    pub fn is_empty(&self) -> bool {
        self.routers.is_empty() && self.services.is_empty() && self.middlewares.is_empty()
    }

    fn map_mut(&mut self, kind: ResourceKind) -> &mut BTreeMap<String, serde_json::Value> {
        match kind {
            ResourceKind::Router => &mut self.routers,
            ResourceKind::Service => &mut self.services,
            ResourceKind::Middleware => &mut self.middlewares,
            ResourceKind::ServersTransport => &mut self.servers_transports,
        }
    }
}

/// The proxy's dynamic configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<ProtocolSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp: Option<ProtocolSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp: Option<ProtocolSection>,
}

impl DynamicConfig {
    pub fn section(&self, protocol: Protocol) -> Option<&ProtocolSection> {
        match protocol {
            Protocol::Http => self.http.as_ref(),
            Protocol::Tcp => self.tcp.as_ref(),
            Protocol::Udp => self.udp.as_ref(),
        }
    }

    fn set_section(&mut self, protocol: Protocol, section: ProtocolSection) {
        let slot = match protocol {
            Protocol::Http => &mut self.http,
            Protocol::Tcp => &mut self.tcp,
            Protocol::Udp => &mut self.udp,
        };
        *slot = Some(section);
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Other(format!("YAML encoding failed: {e}")))
    }
}

const KINDS: [ResourceKind; 4] = [
    ResourceKind::Router,
    ResourceKind::Service,
    ResourceKind::Middleware,
    ResourceKind::ServersTransport,
];

/// Assemble the dynamic configuration of a profile
pub async fn build_dynamic_config(store: &dyn Store, profile_id: i64) -> Result<DynamicConfig> {
    if store.get_profile(profile_id).await?.is_none() {
        return Err(Error::not_found(format!("Profile {profile_id}")));
    }

    let mut config = DynamicConfig::default();
    for protocol in Protocol::ALL {
        let mut section = ProtocolSection::default();
        for kind in KINDS {
            let rows = store.list_enabled(profile_id, protocol, kind).await?;
            let map = section.map_mut(kind);
            for row in rows {
                map.insert(row.name, row.config);
            }
        }
        if !section.is_empty() {
            config.set_section(protocol, section);
        }
    }

    tracing::debug!(
        profile_id,
        http = config.http.is_some(),
        tcp = config.tcp.is_some(),
        udp = config.udp.is_some(),
        "Assembled dynamic config"
    );
    Ok(config)
}

/// Assemble the dynamic configuration of a profile looked up by name
pub async fn build_dynamic_config_by_name(
    store: &dyn Store,
    profile_name: &str,
) -> Result<DynamicConfig> {
    let profile = store
        .get_profile_by_name(profile_name)
        .await?
        .ok_or_else(|| Error::not_found(format!("Profile {profile_name}")))?;
    build_dynamic_config(store, profile.id).await
}
