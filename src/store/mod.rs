#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! Random corpus stores.
//!
//! A corpus is the dense id range `1..=count` of placeholder records. Every
//! backend offers the same capability set through [`CorpusStore`]; callers
//! pick an implementation once at startup via [`connect`] and never branch
//! on it afterwards.

use std::ops::RangeInclusive;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;

use crate::config::{CorpusConfig, PoolConfig, StoreConfig};
use crate::domain::CorpusRecord;
use crate::error::{LoadError, LoadResult};

pub mod health;
pub mod memory;
pub mod postgres_store;
pub mod redis_store;

pub use health::{HealthSnapshot, StoreHealth};
pub use memory::MemoryCorpusStore;
pub use postgres_store::PostgresCorpusStore;
pub use redis_store::RedisCorpusStore;

/// Records written per round trip while seeding.
pub(crate) const SEED_CHUNK: u64 = 1000;

#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Backend label for logs and metrics.
    fn backend(&self) -> &'static str;

    /// Corpus size as last observed by this instance. Another process may
    /// have reseeded since; [`CorpusStore::refresh_len`] re-reads it.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-reads the corpus size from the backend and caches it.
    async fn refresh_len(&self) -> LoadResult<u64>;

    /// Replaces the corpus with exactly `count` fresh records.
    async fn seed(&self, count: u64) -> LoadResult<()>;

    /// Reads record `id` from the backend without consulting [`CorpusStore::len`].
    async fn fetch_record(&self, id: i64) -> LoadResult<CorpusRecord>;

    /// Fetches record `id`. An id past the cached size triggers one refresh
    /// before it is reported as `NotFound`.
    async fn fetch_by_id(&self, id: i64) -> LoadResult<CorpusRecord> {
        if id >= 1 && check_bounds(id, self.len()).is_err() {
            self.refresh_len().await?;
        }
        check_bounds(id, self.len())?;
        self.fetch_record(id).await
    }

    /// Fetches a uniformly chosen record from `1..=len()`.
    async fn fetch_random(&self) -> LoadResult<CorpusRecord> {
        let mut count = self.len();
        if count == 0 {
            count = self.refresh_len().await?;
        }
        let id = random_id(count).ok_or_else(|| {
            LoadError::NotFound(format!("{} corpus is empty", self.backend()))
        })?;
        match self.fetch_record(id).await {
            // The corpus shrank under us; draw again from the new range.
            Err(LoadError::NotFound(_)) if self.refresh_len().await? != count => {
                let id = random_id(self.len()).ok_or_else(|| {
                    LoadError::NotFound(format!("{} corpus is empty", self.backend()))
                })?;
                self.fetch_record(id).await
            }
            other => other,
        }
    }

    async fn clear(&self) -> LoadResult<()>;

    /// Round trip used by the periodic health check. Also refreshes the
    /// cached size, so seeds done elsewhere become visible.
    async fn ping(&self) -> LoadResult<()> {
        self.refresh_len().await.map(|_| ())
    }
}

/// Builds the configured backend. Connection failures here are startup-fatal
/// for the caller.
pub async fn connect(
    store: &StoreConfig,
    corpus: &CorpusConfig,
    pool: &PoolConfig,
) -> LoadResult<Arc<dyn CorpusStore>> {
    let store: Arc<dyn CorpusStore> = match store {
        StoreConfig::Memory => Arc::new(MemoryCorpusStore::new(corpus.record_size)),
        StoreConfig::Redis(settings) => {
            Arc::new(RedisCorpusStore::connect(settings, corpus, pool).await?)
        }
        StoreConfig::Postgres(settings) => {
            Arc::new(PostgresCorpusStore::connect(settings, corpus, pool).await?)
        }
    };
    Ok(store)
}

/// Deterministic value for record `id`, exactly `size` bytes once `size`
/// exceeds the `record-NNNNNNNNNN:` prefix.
#[must_use]
pub fn placeholder_value(id: i64, size: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
    let mut value = format!("record-{id:010}:");
    let offset = usize::try_from(id.unsigned_abs() % 26).unwrap_or(0);
    let mut i = 0usize;
    while value.len() < size {
        value.push(char::from(ALPHABET[(offset + i) % ALPHABET.len()]));
        i += 1;
    }
    value
}

/// Uniform id in `1..=count`; `None` for an empty corpus.
#[must_use]
pub fn random_id(count: u64) -> Option<i64> {
    let upper = i64::try_from(count).ok().filter(|c| *c > 0)?;
    Some(rand::thread_rng().gen_range(1..=upper))
}

/// `NotFound` unless `id` lies in `1..=count`.
pub fn check_bounds(id: i64, count: u64) -> LoadResult<()> {
    match u64::try_from(id) {
        Ok(n) if n >= 1 && n <= count => Ok(()),
        _ => Err(LoadError::NotFound(format!(
            "record {id} is outside 1..={count}"
        ))),
    }
}

pub(crate) fn require_count(count: u64) -> LoadResult<()> {
    if count == 0 {
        return Err(LoadError::InvalidInput("seed count must be > 0".into()));
    }
    if i64::try_from(count).is_err() {
        return Err(LoadError::InvalidInput(format!("seed count too large: {count}")));
    }
    Ok(())
}

/// Splits `first..=last` into consecutive ranges of at most `chunk` ids.
pub(crate) fn id_chunks(
    first: u64,
    last: u64,
    chunk: u64,
) -> impl Iterator<Item = RangeInclusive<u64>> {
    let chunk = chunk.max(1);
    let step = usize::try_from(chunk).unwrap_or(usize::MAX);
    (first..=last)
        .step_by(step)
        .map(move |start| start..=last.min(start.saturating_add(chunk - 1)))
}

pub(crate) fn to_id(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
