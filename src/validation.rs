#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::collections::HashMap;

use crate::config::LimitsConfig;
use crate::domain::{LookupKey, WorkloadDescriptor};
use crate::error::{LoadError, LoadResult};
use crate::lib_cpu::WorkVariant;

/// Parses an optional non-negative millisecond count capped at `max`.
pub fn parse_millis(name: &str, raw: Option<&str>, max: u64) -> LoadResult<Option<u64>> {
    let Some(raw) = raw else { return Ok(None) };
    let value: u64 = raw
        .trim()
        .parse()
        .map_err(|_| LoadError::InvalidInput(format!("{name} must be a non-negative integer, got {raw:?}")))?;
    if value > max {
        return Err(LoadError::InvalidInput(format!("{name} must be <= {max}")));
    }
    Ok(Some(value))
}

/// `None` selects a random record.
pub fn parse_lookup_id(raw: Option<&str>) -> LoadResult<LookupKey> {
    match raw {
        None => Ok(LookupKey::Random),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map(LookupKey::Id)
            .map_err(|_| LoadError::InvalidInput(format!("id must be an integer, got {raw:?}"))),
    }
}

/// `random` or an integer id.
pub fn parse_lookup(raw: Option<&str>) -> LoadResult<Option<LookupKey>> {
    match raw {
        None => Ok(None),
        Some(raw) if raw.trim().eq_ignore_ascii_case("random") => Ok(Some(LookupKey::Random)),
        Some(raw) => parse_lookup_id(Some(raw)).map(Some),
    }
}

pub fn parse_variant(raw: Option<&str>) -> LoadResult<WorkVariant> {
    raw.map_or(Ok(WorkVariant::Light), str::parse)
}

pub fn parse_seed_count(raw: Option<&str>, default: u64) -> LoadResult<u64> {
    let count = match raw {
        None => default,
        Some(raw) => raw.trim().parse().map_err(|_| {
            LoadError::InvalidInput(format!("count must be a positive integer, got {raw:?}"))
        })?,
    };
    if count == 0 {
        return Err(LoadError::InvalidInput("count must be > 0".into()));
    }
    Ok(count)
}

/// Builds a descriptor from `/work` query parameters.
pub fn parse_workload(
    params: &HashMap<String, String>,
    limits: &LimitsConfig,
) -> LoadResult<WorkloadDescriptor> {
    let get = |k: &str| params.get(k).map(String::as_str);
    Ok(WorkloadDescriptor {
        cpu_ms: parse_millis("cpu_ms", get("cpu_ms"), limits.max_cpu_ms)?,
        io_ms: parse_millis("io_ms", get("io_ms"), limits.max_io_ms)?,
        lookup: parse_lookup(get("lookup"))?,
        variant: parse_variant(get("variant"))?,
    })
}

/// Builds a descriptor from the `/payload/{cpu_ms}/{io_ms}` path form.
pub fn parse_payload_path(
    cpu_ms: &str,
    io_ms: Option<&str>,
    limits: &LimitsConfig,
) -> LoadResult<WorkloadDescriptor> {
    Ok(WorkloadDescriptor {
        cpu_ms: parse_millis("cpu_ms", Some(cpu_ms), limits.max_cpu_ms)?,
        io_ms: parse_millis("io_ms", io_ms, limits.max_io_ms)?,
        ..WorkloadDescriptor::default()
    })
}
