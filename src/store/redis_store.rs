#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! Redis corpus: one key per record (`{prefix}:{id}`) plus `{prefix}:count`.
//!
//! Seeding is not atomic across keys. The count key is raised to cover every
//! id a seed may write before any record is written, so a failure partway
//! leaves a partial corpus that a later seed or clear fully removes.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bb8::{Pool, PooledConnection, RunError};
use bb8_redis::RedisConnectionManager;
use redis::{IntoConnectionInfo, RedisError};
use tracing::{debug, info};

use super::{id_chunks, placeholder_value, require_count, to_id, CorpusStore, SEED_CHUNK};
use crate::config::{CorpusConfig, PoolConfig, RedisSettings};
use crate::domain::CorpusRecord;
use crate::error::{LoadError, LoadResult};

pub struct RedisCorpusStore {
    pool: Pool<RedisConnectionManager>,
    key_prefix: String,
    ttl_seconds: u64,
    record_size: usize,
    count: AtomicU64,
}

impl RedisCorpusStore {
    pub async fn connect(
        settings: &RedisSettings,
        corpus: &CorpusConfig,
        pool: &PoolConfig,
    ) -> LoadResult<Self> {
        let mut info = settings
            .url
            .as_str()
            .into_connection_info()
            .map_err(|e| LoadError::InvalidInput(format!("redis url: {e}")))?;
        if let Some(username) = &settings.username {
            info.redis.username = Some(username.clone());
        }
        if let Some(password) = &settings.password {
            info.redis.password = Some(password.clone());
        }
        let manager = RedisConnectionManager::new(info).map_err(redis_error)?;
        let mut builder = Pool::<RedisConnectionManager>::builder()
            .max_size(pool.max_size)
            .min_idle(Some(pool.min_size))
            .max_lifetime(pool.max_lifetime())
            .connection_timeout(pool.acquire_timeout())
            .test_on_check_out(true);
        if let Some(interval) = pool.health_check_interval() {
            builder = builder.reaper_rate(interval);
        }
        let pool = builder.build(manager).await.map_err(redis_error)?;
        let store = Self {
            pool,
            key_prefix: settings.key_prefix.clone(),
            ttl_seconds: corpus.ttl_seconds,
            record_size: corpus.record_size,
            count: AtomicU64::new(0),
        };
        let count = store.refresh_len().await?;
        info!(count, prefix = %store.key_prefix, "redis corpus store ready");
        Ok(store)
    }

    fn key(&self, id: i64) -> String {
        format!("{}:{id}", self.key_prefix)
    }

    fn count_key(&self) -> String {
        format!("{}:count", self.key_prefix)
    }

    async fn conn(&self) -> LoadResult<PooledConnection<'_, RedisConnectionManager>> {
        self.pool.get().await.map_err(|e| match e {
            RunError::User(e) => redis_error(e),
            RunError::TimedOut => {
                LoadError::BackendUnavailable("redis pool exhausted: acquire timed out".into())
            }
        })
    }

    async fn stored_count(&self) -> LoadResult<u64> {
        let mut conn = self.conn().await?;
        let count: Option<u64> = redis::cmd("GET")
            .arg(self.count_key())
            .query_async(&mut *conn)
            .await
            .map_err(redis_error)?;
        Ok(count.unwrap_or(0))
    }

    /// Deletes record keys `first..=last` in chunks.
    async fn delete_range(&self, first: u64, last: u64) -> LoadResult<()> {
        let mut conn = self.conn().await?;
        for range in id_chunks(first, last, SEED_CHUNK) {
            let keys: Vec<String> = range.map(|id| self.key(to_id(id))).collect();
            let _: () = redis::cmd("DEL")
                .arg(&keys)
                .query_async(&mut *conn)
                .await
                .map_err(redis_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl CorpusStore for RedisCorpusStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    fn len(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    async fn refresh_len(&self) -> LoadResult<u64> {
        let count = self.stored_count().await?;
        self.count.store(count, Ordering::Release);
        Ok(count)
    }

    async fn seed(&self, count: u64) -> LoadResult<()> {
        require_count(count)?;
        let previous = self.stored_count().await?.max(self.len());
        // Readers see an empty corpus until the new count is published.
        self.count.store(0, Ordering::Release);
        if previous > count {
            self.delete_range(count + 1, previous).await?;
        }
        let mut conn = self.conn().await?;
        let _: () = redis::cmd("SET")
            .arg(self.count_key())
            .arg(previous.max(count))
            .query_async(&mut *conn)
            .await
            .map_err(redis_error)?;
        for range in id_chunks(1, count, SEED_CHUNK) {
            let mut pipe = redis::pipe();
            for id in range {
                let id = to_id(id);
                let cmd = pipe
                    .cmd("SET")
                    .arg(self.key(id))
                    .arg(placeholder_value(id, self.record_size));
                if self.ttl_seconds > 0 {
                    cmd.arg("EX").arg(self.ttl_seconds);
                }
                cmd.ignore();
            }
            let _: () = pipe.query_async(&mut *conn).await.map_err(redis_error)?;
        }
        let _: () = redis::cmd("SET")
            .arg(self.count_key())
            .arg(count)
            .query_async(&mut *conn)
            .await
            .map_err(redis_error)?;
        self.count.store(count, Ordering::Release);
        debug!(count, previous, "redis corpus seeded");
        Ok(())
    }

    async fn fetch_record(&self, id: i64) -> LoadResult<CorpusRecord> {
        let mut conn = self.conn().await?;
        let value: Option<String> = redis::cmd("GET")
            .arg(self.key(id))
            .query_async(&mut *conn)
            .await
            .map_err(redis_error)?;
        value
            .map(|value| CorpusRecord { id, value })
            .ok_or_else(|| LoadError::NotFound(format!("record {id} missing or expired")))
    }

    async fn clear(&self) -> LoadResult<()> {
        let previous = self.stored_count().await?.max(self.len());
        self.count.store(0, Ordering::Release);
        self.delete_range(1, previous).await?;
        let mut conn = self.conn().await?;
        let _: () = redis::cmd("DEL")
            .arg(self.count_key())
            .query_async(&mut *conn)
            .await
            .map_err(redis_error)?;
        Ok(())
    }
}

fn redis_error(e: RedisError) -> LoadError {
    LoadError::BackendUnavailable(format!("redis: {e}"))
}
