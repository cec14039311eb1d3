#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::CorpusStore;
use crate::error::LoadResult;
use crate::metrics::Metrics;

#[derive(Clone, Debug, Serialize)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of the most recent store probe.
#[derive(Default)]
pub struct StoreHealth {
    last: Mutex<Option<HealthSnapshot>>,
}

impl StoreHealth {
    pub fn record(&self, result: &LoadResult<()>) -> HealthSnapshot {
        let snapshot = HealthSnapshot {
            healthy: result.is_ok(),
            checked_at: Utc::now(),
            error: result.as_ref().err().map(ToString::to_string),
        };
        *self.last.lock() = Some(snapshot.clone());
        snapshot
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<HealthSnapshot> {
        self.last.lock().clone()
    }
}

/// Pings the store once, which also refreshes its cached corpus size, and
/// records the outcome.
pub async fn check_once(
    store: &dyn CorpusStore,
    health: &StoreHealth,
    metrics: &Metrics,
) -> HealthSnapshot {
    let result = store.ping().await;
    let snapshot = health.record(&result);
    metrics.store_healthy.set(i64::from(snapshot.healthy));
    match &snapshot.error {
        Some(e) => warn!(backend = store.backend(), error = %e, "store health check failed"),
        None => debug!(backend = store.backend(), corpus_size = store.len(), "store health check ok"),
    }
    snapshot
}

/// Runs [`check_once`] every `interval` until the runtime shuts down.
pub fn spawn_health_check(
    store: Arc<dyn CorpusStore>,
    health: Arc<StoreHealth>,
    metrics: Metrics,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            check_once(store.as_ref(), &health, &metrics).await;
        }
    })
}
