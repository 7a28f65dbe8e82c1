// # mantrae-core
//
// Reconciliation engine for a reverse-proxy control plane.
//
// ## Architecture Overview
//
// Declared routing state lives in a store. This library keeps two outside
// surfaces in line with it:
// - **DNS**: `DnsSync` derives managed domains from router rules and drives
//   the `RecordManager` ownership logic over vendor `DnsProvider` adapters
// - **Instances**: `UpdateCoordinator` debounces refresh requests and hands
//   them to the `InstancePoller`, which stores live-state snapshots
// - **Dynamic config**: `build_dynamic_config` renders enabled entities into
//   the proxy's native document
//
// ## Design Principles
//
// 1. **Ownership first**: address records are only touched when provably ours
// 2. **Best effort**: one failing domain or instance never stops the others
// 3. **Plugin-Based**: vendors are registered by tag, no hard-coded dispatch
// 4. **Library-First**: the daemon is a thin shell over this crate

pub mod config;
pub mod dns;
pub mod dynamic;
pub mod error;
pub mod instance;
pub mod model;
pub mod ownership;
pub mod registry;
pub mod rule;
pub mod secret;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::EngineConfig;
pub use dns::{DnsSync, SyncEntry, SyncReport};
pub use dynamic::{DynamicConfig, build_dynamic_config, build_dynamic_config_by_name};
pub use error::{Error, Result};
pub use instance::{InstancePoller, InstanceRefresher, UpdateCoordinator};
pub use ownership::{RecordManager, UpsertOutcome};
pub use registry::ProviderRegistry;
pub use rule::RuleDomainExtractor;
pub use secret::SecretCipher;
pub use store::{FileStore, MemoryStore};
pub use traits::{DnsProvider, DnsProviderFactory, DomainExtractor, PublicIpSource, Store};
