// # Public IP Source Trait
//
// Defines how the sync scheduler learns the machine's current public
// address for providers with auto-update enabled.
//
// ## Implementations
//
// - HTTP-based: `mantrae-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use mantrae_core::PublicIpSource;
//
// let ip = source.current().await?; // IPv4 preferred
// ```

use async_trait::async_trait;
use std::net::IpAddr;

/// IP version (v4 or v6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    /// Version of an address
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }
}

/// Trait for public IP lookups
///
/// # Constraints
///
/// - Single-shot: one lookup per call, no background polling.
/// - Prefer IPv4; fall back to IPv6 only when no IPv4 address is available.
#[async_trait]
pub trait PublicIpSource: Send + Sync {
    /// Get the machine's current public IP address
    async fn current(&self) -> Result<IpAddr, crate::Error>;
}
