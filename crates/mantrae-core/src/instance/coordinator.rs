//! Instance update coordinator
//!
//! Collapses bursts of refresh requests for one instance name into a single
//! detached poll.
//!
//! ## Admission
//!
//! ```text
//! schedule(name)
//!      │
//!      ├── poll in flight for name ─────────────► skipped
//!      ├── last admission < window ago ─────────► skipped
//!      │
//!      ▼
//! record admission time, mark in flight
//!      │
//!      ▼
//! tokio::spawn ── acquire pool permit ── refresh(name) ── clear in flight
//! ```
//!
//! The admission time is recorded before the poll starts, so callers that
//! arrive while the poll is still running are collapsed too. The caller never
//! sees the poll's outcome; failures are logged.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::traits::Store;

/// Refreshes the stored live state of every instance with a given name
#[async_trait]
pub trait InstanceRefresher: Send + Sync {
    async fn refresh(&self, name: &str) -> Result<()>;
}

/// Per-name bookkeeping
#[derive(Debug, Default)]
struct DebounceEntry {
    last_attempt: Option<Instant>,
    in_flight: bool,
}

/// Clears the in-flight flag when the detached poll ends, even on panic
struct InFlightGuard {
    state: Arc<DashMap<String, DebounceEntry>>,
    name: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(mut entry) = self.state.get_mut(&self.name) {
            entry.in_flight = false;
        }
    }
}

/// Debounces and deduplicates instance polls
///
/// Clones share the debounce table and the worker pool, so one coordinator
/// can be handed to the API layer and to the periodic job at once.
#[derive(Clone)]
pub struct UpdateCoordinator {
    refresher: Arc<dyn InstanceRefresher>,
    state: Arc<DashMap<String, DebounceEntry>>,
    permits: Arc<Semaphore>,
    window: Duration,
    poll_interval: Duration,
}

impl std::fmt::Debug for UpdateCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateCoordinator")
            .field("tracked", &self.state.len())
            .field("window", &self.window)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl UpdateCoordinator {
    pub fn new(refresher: Arc<dyn InstanceRefresher>, config: &EngineConfig) -> Self {
        Self {
            refresher,
            state: Arc::new(DashMap::new()),
            permits: Arc::new(Semaphore::new(config.max_concurrent_polls.max(1))),
            window: config.instance_debounce(),
            poll_interval: config.instance_poll_interval(),
        }
    }

    /// Request a refresh of `name`
    ///
    /// Returns whether a poll was admitted. Never waits for the poll.
    pub fn schedule(&self, name: &str) -> bool {
        let now = Instant::now();
        {
            let mut entry = self.state.entry(name.to_string()).or_default();
            if entry.in_flight {
                debug!(instance = %name, "Poll already in flight, skipping");
                return false;
            }
            if let Some(last) = entry.last_attempt
                && now.duration_since(last) < self.window
            {
                debug!(
                    instance = %name,
                    "Polled {}s ago, skipping",
                    now.duration_since(last).as_secs()
                );
                return false;
            }
            entry.last_attempt = Some(now);
            entry.in_flight = true;
        }

        let guard = InFlightGuard {
            state: Arc::clone(&self.state),
            name: name.to_string(),
        };
        let refresher = Arc::clone(&self.refresher);
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            if let Err(e) = refresher.refresh(&guard.name).await {
                warn!(instance = %guard.name, "Instance refresh failed: {}", e);
            }
            drop(guard);
        });

        true
    }

    /// Whether a poll for `name` is currently running
    pub fn is_in_flight(&self, name: &str) -> bool {
        self.state
            .get(name)
            .map(|entry| entry.in_flight)
            .unwrap_or(false)
    }

    /// Periodically schedule every registered instance until `shutdown` fires
    ///
    /// The first round runs immediately.
    pub async fn run(&self, store: Arc<dyn Store>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Instance refresh loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Instance refresh loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.schedule_all(store.as_ref()).await;
                }
            }
        }
    }

    async fn schedule_all(&self, store: &dyn Store) {
        let endpoints = match store.list_all_instance_endpoints().await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!("Failed to list instances: {}", e);
                return;
            }
        };

        let names: BTreeSet<String> = endpoints.into_iter().map(|e| e.name).collect();
        let admitted = names.iter().filter(|name| self.schedule(name)).count();
        debug!(instances = names.len(), admitted, "Scheduled instance refresh");
    }
}
