//! Proxy instance live state
//!
//! - [`UpdateCoordinator`]: debounce and single-flight for refresh requests
//! - [`InstancePoller`]: fetches the admin API and upserts the snapshot
//! - [`traefik`]: decoded admin API bodies

pub mod coordinator;
pub mod poller;
pub mod traefik;

pub use coordinator::{InstanceRefresher, UpdateCoordinator};
pub use poller::InstancePoller;
