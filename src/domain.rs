#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use serde::{Deserialize, Serialize};

use crate::config::LimitsConfig;
use crate::lib_cpu::WorkVariant;
use crate::metrics::Metrics;
use crate::service::LoadCoordinator;

/// Which corpus record a request reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupKey {
    Random,
    Id(i64),
}

/// What one request asks the engine to do. Stages run CPU, then wait, then
/// lookup; absent fields skip their stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadDescriptor {
    pub cpu_ms: Option<u64>,
    pub io_ms: Option<u64>,
    pub lookup: Option<LookupKey>,
    #[serde(default)]
    pub variant: WorkVariant,
}

impl WorkloadDescriptor {
    #[must_use]
    pub fn cpu(cpu_ms: u64) -> Self {
        Self {
            cpu_ms: Some(cpu_ms),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn io(io_ms: u64) -> Self {
        Self {
            io_ms: Some(io_ms),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn lookup(key: LookupKey) -> Self {
        Self {
            lookup: Some(key),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub id: i64,
    pub value: String,
}

/// Aggregate result of one request. Stages that did not run leave their
/// fields out of the serialized form.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycles: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub io_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub total_time_ms: f64,
}

#[derive(Clone)]
pub struct AppState {
    pub coordinator: LoadCoordinator,
    pub metrics: Metrics,
    pub limits: LimitsConfig,
    /// Record count used by a seed request without `count`.
    pub default_seed_count: u64,
}
