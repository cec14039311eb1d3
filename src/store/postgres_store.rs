#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! PostgreSQL corpus table `(id BIGSERIAL PRIMARY KEY, value TEXT NOT NULL)`.
//!
//! A seed is one transaction: truncate, chunked bulk insert, sequence reset.
//! If any step fails the previous corpus stays in place.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{debug, info};

use super::{id_chunks, placeholder_value, require_count, to_id, CorpusStore, SEED_CHUNK};
use crate::config::{is_sql_identifier, CorpusConfig, PoolConfig, PostgresSettings};
use crate::domain::CorpusRecord;
use crate::error::{LoadError, LoadResult};

struct Statements {
    create: String,
    truncate: String,
    insert: String,
    select: String,
    max_id: String,
    reset_sequence: String,
}

impl Statements {
    fn for_table(table: &str) -> Self {
        Self {
            create: format!(
                "CREATE TABLE IF NOT EXISTS {table} (id BIGSERIAL PRIMARY KEY, value TEXT NOT NULL)"
            ),
            truncate: format!("TRUNCATE TABLE {table} RESTART IDENTITY"),
            insert: format!(
                "INSERT INTO {table} (id, value) SELECT * FROM UNNEST($1::BIGINT[], $2::TEXT[])"
            ),
            select: format!("SELECT id, value FROM {table} WHERE id = $1"),
            max_id: format!("SELECT COALESCE(MAX(id), 0)::BIGINT FROM {table}"),
            reset_sequence: format!("SELECT setval(pg_get_serial_sequence('{table}', 'id'), $1)"),
        }
    }
}

pub struct PostgresCorpusStore {
    pool: PgPool,
    sql: Statements,
    record_size: usize,
    count: AtomicU64,
}

impl PostgresCorpusStore {
    pub async fn connect(
        settings: &PostgresSettings,
        corpus: &CorpusConfig,
        pool: &PoolConfig,
    ) -> LoadResult<Self> {
        if !is_sql_identifier(&settings.table) {
            return Err(LoadError::InvalidInput(format!(
                "table name is not an identifier: {}",
                settings.table
            )));
        }
        let mut options = PgConnectOptions::from_str(&settings.url)
            .map_err(|e| LoadError::InvalidInput(format!("postgres url: {e}")))?;
        if let Some(username) = &settings.username {
            options = options.username(username);
        }
        if let Some(password) = &settings.password {
            options = options.password(password);
        }
        let pg_pool = PgPoolOptions::new()
            .min_connections(pool.min_size)
            .max_connections(pool.max_size)
            .max_lifetime(pool.max_lifetime())
            .acquire_timeout(pool.acquire_timeout())
            .test_before_acquire(true)
            .connect_with(options)
            .await
            .map_err(sql_error)?;
        Self::from_pool(pg_pool, &settings.table, corpus.record_size).await
    }

    /// Wraps an existing pool, creating the table if needed.
    pub async fn from_pool(pool: PgPool, table: &str, record_size: usize) -> LoadResult<Self> {
        let store = Self {
            pool,
            sql: Statements::for_table(table),
            record_size,
            count: AtomicU64::new(0),
        };
        sqlx::query(&store.sql.create)
            .execute(&store.pool)
            .await
            .map_err(sql_error)?;
        let count = store.refresh_len().await?;
        info!(count, table, "postgres corpus store ready");
        Ok(store)
    }
}

#[async_trait]
impl CorpusStore for PostgresCorpusStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn len(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    async fn refresh_len(&self) -> LoadResult<u64> {
        let max_id: i64 = sqlx::query_scalar(&self.sql.max_id)
            .fetch_one(&self.pool)
            .await
            .map_err(sql_error)?;
        let count = u64::try_from(max_id).unwrap_or(0);
        self.count.store(count, Ordering::Release);
        Ok(count)
    }

    async fn seed(&self, count: u64) -> LoadResult<()> {
        require_count(count)?;
        let mut tx = self.pool.begin().await.map_err(sql_error)?;
        sqlx::query(&self.sql.truncate)
            .execute(&mut *tx)
            .await
            .map_err(sql_error)?;
        for range in id_chunks(1, count, SEED_CHUNK) {
            let ids: Vec<i64> = range.map(to_id).collect();
            let values: Vec<String> = ids
                .iter()
                .map(|id| placeholder_value(*id, self.record_size))
                .collect();
            sqlx::query(&self.sql.insert)
                .bind(ids)
                .bind(values)
                .execute(&mut *tx)
                .await
                .map_err(sql_error)?;
        }
        sqlx::query(&self.sql.reset_sequence)
            .bind(to_id(count))
            .execute(&mut *tx)
            .await
            .map_err(sql_error)?;
        tx.commit().await.map_err(sql_error)?;
        self.count.store(count, Ordering::Release);
        debug!(count, "postgres corpus seeded");
        Ok(())
    }

    async fn fetch_record(&self, id: i64) -> LoadResult<CorpusRecord> {
        let row: Option<(i64, String)> = sqlx::query_as(&self.sql.select)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_error)?;
        row.map(|(id, value)| CorpusRecord { id, value })
            .ok_or_else(|| LoadError::NotFound(format!("record {id}")))
    }

    async fn clear(&self) -> LoadResult<()> {
        sqlx::query(&self.sql.truncate)
            .execute(&self.pool)
            .await
            .map_err(sql_error)?;
        self.count.store(0, Ordering::Release);
        Ok(())
    }
}

fn sql_error(e: sqlx::Error) -> LoadError {
    match e {
        sqlx::Error::RowNotFound => LoadError::NotFound("row not found".into()),
        sqlx::Error::PoolTimedOut => {
            LoadError::BackendUnavailable("postgres pool exhausted: acquire timed out".into())
        }
        other => LoadError::BackendUnavailable(format!("postgres: {other}")),
    }
}
