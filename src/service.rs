#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::accounting::{duration_ms, ClockMode};
use crate::domain::{CorpusRecord, LookupKey, WorkloadDescriptor, WorkloadReport};
use crate::error::{LoadError, LoadResult};
use crate::lib_cpu::{BurnResult, CpuBurner, WorkVariant};
use crate::lib_io::wait;
use crate::metrics::Metrics;
use crate::store::health::{check_once, spawn_health_check};
use crate::store::{CorpusStore, HealthSnapshot, StoreHealth};

/// Runs workload descriptors against the burner and the corpus store.
/// Cheap to clone; clones share the same burner, store and metrics.
#[derive(Clone)]
pub struct LoadCoordinator {
    burner: Arc<CpuBurner>,
    store: Option<Arc<dyn CorpusStore>>,
    health: Arc<StoreHealth>,
    metrics: Metrics,
}

/// Raises the burn's cancel flag when the awaiting request goes away.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl LoadCoordinator {
    #[must_use]
    pub fn new(
        burner: Arc<CpuBurner>,
        store: Option<Arc<dyn CorpusStore>>,
        metrics: Metrics,
    ) -> Self {
        Self {
            burner,
            store,
            health: Arc::new(StoreHealth::default()),
            metrics,
        }
    }

    #[must_use]
    pub fn burner(&self) -> &CpuBurner {
        &self.burner
    }

    pub fn store(&self) -> LoadResult<&Arc<dyn CorpusStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| LoadError::BackendUnavailable("no corpus store configured".into()))
    }

    /// Executes the present stages in order: CPU burn, wait, store lookup.
    /// The first failing stage aborts the rest.
    pub async fn run(&self, desc: &WorkloadDescriptor) -> LoadResult<WorkloadReport> {
        let started = Instant::now();
        let mut report = WorkloadReport::default();
        if let Some(cpu_ms) = desc.cpu_ms {
            let burn = self.burn(cpu_ms, desc.variant).await?;
            report.cycles = Some(burn.iterations);
            report.cpu_time_ms = Some(burn.elapsed_cpu_ms);
        }
        if let Some(io_ms) = desc.io_ms {
            self.wait(io_ms).await;
            report.io_time_ms = Some(io_ms);
        }
        if let Some(key) = desc.lookup {
            let record = self.fetch(key).await?;
            report.id = Some(record.id);
            report.value = Some(record.value);
        }
        report.total_time_ms = duration_ms(started.elapsed());
        debug!(
            cycles = report.cycles,
            cpu_time_ms = report.cpu_time_ms,
            io_time_ms = report.io_time_ms,
            total_time_ms = report.total_time_ms,
            "workload complete"
        );
        Ok(report)
    }

    /// Burns on a dedicated blocking thread so the whole measurement stays on
    /// one OS thread. Dropping the returned future cancels the burn at the
    /// next work-unit boundary.
    pub async fn burn(&self, target_ms: u64, variant: WorkVariant) -> LoadResult<BurnResult> {
        let cancel = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(Arc::clone(&cancel));
        let burner = Arc::clone(&self.burner);
        let result = tokio::task::spawn_blocking(move || {
            burner.burn_cancellable(target_ms, variant, &cancel)
        })
        .await
        .map_err(|e| LoadError::Internal(format!("burn worker failed: {e}")))??;
        self.metrics.work_units_total.inc_by(result.iterations);
        self.metrics
            .cpu_seconds_total
            .inc_by(result.elapsed_cpu_ms / 1000.0);
        Ok(result)
    }

    pub async fn wait(&self, io_ms: u64) {
        wait(io_ms).await;
        #[allow(clippy::cast_precision_loss)]
        let seconds = io_ms as f64 / 1000.0;
        self.metrics.io_wait_seconds_total.inc_by(seconds);
    }

    pub async fn fetch(&self, key: LookupKey) -> LoadResult<CorpusRecord> {
        let store = self.store()?;
        let result = match key {
            LookupKey::Random => store.fetch_random().await,
            LookupKey::Id(id) => store.fetch_by_id(id).await,
        };
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        self.metrics.observe_fetch(store.backend(), outcome);
        result
    }

    pub async fn seed(&self, count: u64) -> LoadResult<()> {
        let store = self.store()?;
        let started = Instant::now();
        store.seed(count).await?;
        info!(
            backend = store.backend(),
            count,
            elapsed_ms = duration_ms(started.elapsed()),
            "corpus seeded"
        );
        Ok(())
    }

    pub async fn clear(&self) -> LoadResult<()> {
        let store = self.store()?;
        store.clear().await?;
        info!(backend = store.backend(), "corpus cleared");
        Ok(())
    }

    /// Probes the store now and records the result for readiness reports.
    pub async fn check_store(&self) -> Option<HealthSnapshot> {
        let store = self.store.as_ref()?;
        Some(check_once(store.as_ref(), &self.health, &self.metrics).await)
    }

    /// Starts the periodic store health check. `None` without a store.
    #[must_use]
    pub fn spawn_health_check(&self, interval: Duration) -> Option<JoinHandle<()>> {
        let store = Arc::clone(self.store.as_ref()?);
        Some(spawn_health_check(
            store,
            Arc::clone(&self.health),
            self.metrics.clone(),
            interval,
        ))
    }

    #[must_use]
    pub fn readiness(&self) -> ReadinessReport {
        let accounting = self.burner.accountant().mode();
        let store = self.health.snapshot();
        let store_ok = store.as_ref().map_or(true, |s| s.healthy);
        let metrics_ok = self.metrics.encode_text().is_ok();
        let status = if accounting == ClockMode::ThreadCpu && store_ok && metrics_ok {
            "ok"
        } else {
            "degraded"
        };
        ReadinessReport {
            status: status.to_string(),
            accounting,
            backend: self.store.as_ref().map(|s| s.backend()),
            corpus_size: self.store.as_ref().map(|s| s.len()),
            store,
            metrics_ok,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ReadinessReport {
    pub status: String,
    pub accounting: ClockMode,
    pub backend: Option<&'static str>,
    pub corpus_size: Option<u64>,
    pub store: Option<HealthSnapshot>,
    pub metrics_ok: bool,
}
