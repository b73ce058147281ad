//! Per-region database engine.

use std::sync::Once;

use sea_query::{
    MysqlQueryBuilder, PostgresQueryBuilder, QueryStatementWriter, SchemaStatementBuilder,
    SqliteQueryBuilder, TableCreateStatement,
};
use sqlx::any::AnyPoolOptions;
use sqlx::{Any, AnyPool, Transaction};
use tracing::{debug, info};

use tracker_core::{DatabaseConfig, Dialect, Error, RegionTag, Result};

use crate::tables::event_tables;

fn install_drivers() {
    static ONCE: Once = Once::new();
    ONCE.call_once(sqlx::any::install_default_drivers);
}

/// Classify a driver error into the tracker's error kinds.
pub(crate) fn classify(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::invariant(format!("duplicate key: {db}"))
        }
        sqlx::Error::Database(_)
        | sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Protocol(_) => Error::db_transient(err.to_string()),
        _ => Error::db_fatal(err.to_string()),
    }
}

/// One connection pool for one region's database.
///
/// All multi-row writes go through [`DatabaseEngine::begin`]; SQL text is
/// rendered per dialect by [`DatabaseEngine::build_query`] so dynamic table
/// names are never assembled by string concatenation at call sites.
#[derive(Clone)]
pub struct DatabaseEngine {
    region: RegionTag,
    dialect: Dialect,
    pool: AnyPool,
}

impl DatabaseEngine {
    /// Connect a pool using the region's `gorm_config` block.
    pub async fn connect(region: RegionTag, cfg: &DatabaseConfig) -> Result<Self> {
        install_drivers();
        let dialect = cfg.resolved_dialect()?;
        let pool = AnyPoolOptions::new()
            .max_connections(cfg.max_open_conns)
            .min_connections(cfg.max_idle_conns.min(cfg.max_open_conns))
            .max_lifetime(cfg.max_lifetime()?)
            .connect(&cfg.dsn)
            .await
            .map_err(classify)?;
        info!(region = %region, dialect = ?dialect, "database engine connected");
        Ok(Self {
            region,
            dialect,
            pool,
        })
    }

    pub fn region(&self) -> RegionTag {
        self.region
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Render a query statement in this engine's dialect.
    pub fn build_query<S: QueryStatementWriter>(&self, stmt: &S) -> String {
        match self.dialect {
            Dialect::Mysql => stmt.to_string(MysqlQueryBuilder),
            Dialect::Postgres => stmt.to_string(PostgresQueryBuilder),
            Dialect::Sqlite => stmt.to_string(SqliteQueryBuilder),
        }
    }

    /// Render a DDL statement in this engine's dialect.
    pub fn build_schema(&self, stmt: &TableCreateStatement) -> String {
        match self.dialect {
            Dialect::Mysql => stmt.to_string(MysqlQueryBuilder),
            Dialect::Postgres => stmt.to_string(PostgresQueryBuilder),
            Dialect::Sqlite => stmt.to_string(SqliteQueryBuilder),
        }
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Any>> {
        self.pool.begin().await.map_err(classify)
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Create the four per-event tables, skipping the chapter table for
    /// non-world-bloom events. Idempotent; safe to call on every switchover.
    pub async fn create_event_tables(&self, event_id: i32, is_world_bloom: bool) -> Result<()> {
        let tables = event_tables(self.region, event_id);
        let mut statements = vec![
            tables.create_time_id(),
            tables.create_users(),
            tables.create_ranking(),
        ];
        if is_world_bloom {
            statements.push(tables.create_world_bloom());
        }
        for stmt in &statements {
            let sql = self.build_schema(stmt);
            debug!(region = %self.region, event_id, sql = %sql, "migrating event table");
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::db_fatal(format!("migration failed: {e}")))?;
        }
        info!(region = %self.region, event_id, is_world_bloom, "event tables ready");
        Ok(())
    }
}
