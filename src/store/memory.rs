#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! In-process corpus. Seeding swaps the whole vector under the write lock,
//! so readers see either the old corpus or the new one.
//!
//! Handles made with [`MemoryCorpusStore::attach`] share the records but keep
//! their own cached size, the same way two processes share a Redis or
//! Postgres corpus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{placeholder_value, require_count, to_id, CorpusStore};
use crate::domain::CorpusRecord;
use crate::error::{LoadError, LoadResult};

#[derive(Default)]
pub struct MemoryCorpusStore {
    records: Arc<RwLock<Vec<String>>>,
    count: AtomicU64,
    record_size: usize,
}

impl MemoryCorpusStore {
    #[must_use]
    pub fn new(record_size: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            count: AtomicU64::new(0),
            record_size,
        }
    }

    /// A second handle on the same records, seeing the corpus size as of now.
    #[must_use]
    pub fn attach(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            count: AtomicU64::new(self.records.read().len() as u64),
            record_size: self.record_size,
        }
    }
}

#[async_trait]
impl CorpusStore for MemoryCorpusStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn len(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    async fn refresh_len(&self) -> LoadResult<u64> {
        let count = self.records.read().len() as u64;
        self.count.store(count, Ordering::Release);
        Ok(count)
    }

    async fn seed(&self, count: u64) -> LoadResult<()> {
        require_count(count)?;
        let fresh: Vec<String> = (1..=to_id(count))
            .map(|id| placeholder_value(id, self.record_size))
            .collect();
        *self.records.write() = fresh;
        self.count.store(count, Ordering::Release);
        Ok(())
    }

    async fn fetch_record(&self, id: i64) -> LoadResult<CorpusRecord> {
        let missing = || LoadError::NotFound(format!("record {id}"));
        let index = id
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(missing)?;
        self.records
            .read()
            .get(index)
            .map(|value| CorpusRecord {
                id,
                value: value.clone(),
            })
            .ok_or_else(missing)
    }

    async fn clear(&self) -> LoadResult<()> {
        self.records.write().clear();
        self.count.store(0, Ordering::Release);
        Ok(())
    }
}
