#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod accounting;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod lib_cpu;
pub mod lib_io;
pub mod metrics;
pub mod service;
pub mod store;
pub mod validation;

pub use accounting::{ClockMode, CpuAccountant, CpuTimeSample};
pub use config::AppConfig;
pub use domain::{AppState, CorpusRecord, LookupKey, WorkloadDescriptor, WorkloadReport};
pub use error::{LoadError, LoadResult};
pub use http::serve;
pub use http::{
    clear, healthz, lookup, payload_cpu, payload_cpu_io, payload_default, readyz, routes,
    scrape_metrics, seed, work,
};
pub use lib_cpu::{BurnResult, CpuBurner, WorkVariant};
pub use metrics::Metrics;
pub use service::{LoadCoordinator, ReadinessReport};
pub use store::{CorpusStore, MemoryCorpusStore};
