#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use anyhow::{Context, Result as AnyResult};
use prometheus::{
    Counter, Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,
    pub requests_total: IntCounterVec,
    pub requests_in_flight: IntGauge,
    pub work_units_total: IntCounter,
    pub cpu_seconds_total: Counter,
    pub io_wait_seconds_total: Counter,
    pub store_fetch_total: IntCounterVec,
    pub store_healthy: IntGauge,
}

impl Metrics {
    pub fn new() -> AnyResult<Self> {
        let registry = Registry::new();
        let requests_total = IntCounterVec::new(
            Opts::new("loadgen_requests_total", "requests by endpoint and outcome"),
            &["endpoint", "outcome"],
        )
        .context("create requests_total")?;
        let requests_in_flight =
            IntGauge::with_opts(Opts::new("loadgen_requests_in_flight", "requests in flight"))
                .context("create requests_in_flight")?;
        registry
            .register(Box::new(requests_total.clone()))
            .context("register requests_total")?;
        registry
            .register(Box::new(requests_in_flight.clone()))
            .context("register requests_in_flight")?;
        let work_units_total =
            IntCounter::with_opts(Opts::new("loadgen_work_units_total", "burn work units"))
                .context("create work_units_total")?;
        let cpu_seconds_total = Counter::with_opts(Opts::new(
            "loadgen_cpu_seconds_total",
            "measured cpu seconds burned",
        ))
        .context("create cpu_seconds_total")?;
        let io_wait_seconds_total = Counter::with_opts(Opts::new(
            "loadgen_io_wait_seconds_total",
            "emulated io wait seconds",
        ))
        .context("create io_wait_seconds_total")?;
        registry
            .register(Box::new(work_units_total.clone()))
            .context("register work_units_total")?;
        registry
            .register(Box::new(cpu_seconds_total.clone()))
            .context("register cpu_seconds_total")?;
        registry
            .register(Box::new(io_wait_seconds_total.clone()))
            .context("register io_wait_seconds_total")?;
        let store_fetch_total = IntCounterVec::new(
            Opts::new("loadgen_store_fetch_total", "corpus fetches by backend and outcome"),
            &["backend", "outcome"],
        )
        .context("create store_fetch_total")?;
        let store_healthy = IntGauge::with_opts(Opts::new(
            "loadgen_store_healthy",
            "1 if the last store health check passed",
        ))
        .context("create store_healthy")?;
        registry
            .register(Box::new(store_fetch_total.clone()))
            .context("register store_fetch_total")?;
        registry
            .register(Box::new(store_healthy.clone()))
            .context("register store_healthy")?;
        Ok(Self {
            registry,
            requests_total,
            requests_in_flight,
            work_units_total,
            cpu_seconds_total,
            io_wait_seconds_total,
            store_fetch_total,
            store_healthy,
        })
    }

    pub fn observe_request(&self, endpoint: &str, outcome: &str) {
        self.requests_total
            .with_label_values(&[endpoint, outcome])
            .inc();
    }

    pub fn observe_fetch(&self, backend: &str, outcome: &str) {
        self.store_fetch_total
            .with_label_values(&[backend, outcome])
            .inc();
    }

    pub fn encode_text(&self) -> AnyResult<Vec<u8>> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf).context("encode metrics")?;
        Ok(buf)
    }
}

/// Holds `requests_in_flight` up for as long as it lives.
pub struct InFlight {
    gauge: IntGauge,
}

impl InFlight {
    #[must_use]
    pub fn enter(metrics: &Metrics) -> Self {
        metrics.requests_in_flight.inc();
        Self {
            gauge: metrics.requests_in_flight.clone(),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}
