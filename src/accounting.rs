#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! Per-thread CPU time accounting.
//!
//! Readings are scoped to the calling OS thread, so a burn running on one
//! thread is not inflated by work other requests do on other threads.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::warn;

use crate::error::{LoadError, LoadResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// User+system CPU time of the calling thread.
    ThreadCpu,
    /// Degraded mode: wall-clock time. Only used when explicitly allowed.
    WallClock,
}

impl std::fmt::Display for ClockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClockMode::ThreadCpu => f.write_str("thread_cpu"),
            ClockMode::WallClock => f.write_str("wall_clock"),
        }
    }
}

/// A point-in-time reading taken by [`CpuAccountant::mark`].
#[derive(Clone, Copy, Debug)]
pub enum CpuTimeSample {
    Thread(Duration),
    Wall(Instant),
}

#[derive(Clone, Copy, Debug)]
pub struct CpuAccountant {
    mode: ClockMode,
}

impl CpuAccountant {
    #[must_use]
    pub fn thread_cpu() -> Self {
        Self {
            mode: ClockMode::ThreadCpu,
        }
    }

    #[must_use]
    pub fn wall_clock() -> Self {
        Self {
            mode: ClockMode::WallClock,
        }
    }

    /// Probes the per-thread facility once. Falls back to wall-clock time only
    /// when `allow_wall_clock_fallback` is set, and says so in the log.
    pub fn detect(allow_wall_clock_fallback: bool) -> LoadResult<Self> {
        match thread_cpu_time() {
            Ok(_) => Ok(Self::thread_cpu()),
            Err(e) if allow_wall_clock_fallback => {
                warn!(error=%e, "thread cpu accounting unavailable, running in degraded wall-clock mode");
                Ok(Self::wall_clock())
            }
            Err(e) => Err(e),
        }
    }

    #[must_use]
    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    pub fn mark(&self) -> LoadResult<CpuTimeSample> {
        match self.mode {
            ClockMode::ThreadCpu => thread_cpu_time().map(CpuTimeSample::Thread),
            ClockMode::WallClock => Ok(CpuTimeSample::Wall(Instant::now())),
        }
    }

    /// Milliseconds consumed since `start`. Must be called on the thread that
    /// took the mark.
    pub fn since(&self, start: &CpuTimeSample) -> LoadResult<f64> {
        match start {
            CpuTimeSample::Thread(at) => {
                let now = thread_cpu_time()?;
                Ok(duration_ms(now.saturating_sub(*at)))
            }
            CpuTimeSample::Wall(at) => Ok(duration_ms(at.elapsed())),
        }
    }
}

#[must_use]
pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Accumulated user+system CPU time of the calling thread.
#[cfg(unix)]
pub fn thread_cpu_time() -> LoadResult<Duration> {
    use nix::time::{clock_gettime, ClockId};

    let ts = clock_gettime(ClockId::CLOCK_THREAD_CPUTIME_ID).map_err(|e| {
        LoadError::AccountingUnavailable(format!("clock_gettime(CLOCK_THREAD_CPUTIME_ID): {e}"))
    })?;
    let secs = u64::try_from(ts.tv_sec())
        .map_err(|_| LoadError::AccountingUnavailable("negative thread cpu seconds".into()))?;
    let nanos = u32::try_from(ts.tv_nsec())
        .map_err(|_| LoadError::AccountingUnavailable("thread cpu nanos out of range".into()))?;
    Ok(Duration::new(secs, nanos))
}

#[cfg(not(unix))]
pub fn thread_cpu_time() -> LoadResult<Duration> {
    Err(LoadError::AccountingUnavailable(
        "per-thread cpu time is not supported on this platform".into(),
    ))
}
