//! PostgreSQL event store.

use async_trait::async_trait;
use sea_query::{Expr, Iden, Order, PostgresQueryBuilder, Query};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use super::{records_match, History, Record, Store};
use crate::errors::{Error, Kind, Result};
use crate::model::{Id, Version};

/// `records` table schema.
#[derive(Iden)]
enum Records {
    Table,
    #[iden = "aggregate_id"]
    AggregateId,
    #[iden = "tenant_id"]
    TenantId,
    #[iden = "version"]
    Version,
    #[iden = "data"]
    Data,
    #[iden = "created_at"]
    CreatedAt,
}

/// Event store backed by a PostgreSQL `records` table.
///
/// The unique index on `(aggregate_id, tenant_id, version)` is what resolves
/// racing appends: the first writer of a version wins, the rest surface a
/// conflict.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        info!(url = %url, "connected to Postgres");
        Ok(Self::new(pool))
    }

    /// Create the `records` table and its unique index if absent.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id BIGSERIAL PRIMARY KEY,
                aggregate_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                data BYTEA NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS records_aggregate_tenant_version
            ON records (aggregate_id, tenant_id, version)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn max_version(&self, aggregate_id: &Id, tenant_id: &Id) -> Result<Version> {
        let query = Query::select()
            .expr(Expr::col(Records::Version).max())
            .from(Records::Table)
            .and_where(Expr::col(Records::AggregateId).eq(aggregate_id.as_str()))
            .and_where(Expr::col(Records::TenantId).eq(tenant_id.as_str()))
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        let max: Option<Version> = match row {
            Some(row) => row.get(0),
            None => None,
        };

        Ok(max.unwrap_or(0))
    }

    /// Compare a colliding batch against the persisted range it overlaps.
    async fn check_idempotent(
        &self,
        aggregate_id: &Id,
        tenant_id: &Id,
        batch: &[Record],
    ) -> Result<()> {
        const OP: &str = "eventstore/PgStore.check_idempotent";

        let from = batch[0].version;
        let to = batch[batch.len() - 1].version;
        let persisted = self.load(aggregate_id, tenant_id, from, to).await?;

        if !records_match(batch, &persisted) {
            return Err(Error::new(Kind::Internal)
                .op(OP)
                .id(aggregate_id.clone())
                .msg(format!(
                    "conflicting records of aggregate with aggregateID {aggregate_id} detected"
                )));
        }

        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn load(
        &self,
        aggregate_id: &Id,
        tenant_id: &Id,
        from_version: Version,
        to_version: Version,
    ) -> Result<History> {
        const OP: &str = "eventstore/PgStore.load";
        debug!(aggregate_id = %aggregate_id, tenant_id = %tenant_id, "load history");

        let to_version = if to_version == 0 {
            Version::MAX
        } else {
            to_version
        };

        let query = Query::select()
            .columns([
                Records::AggregateId,
                Records::TenantId,
                Records::Version,
                Records::Data,
                Records::CreatedAt,
            ])
            .from(Records::Table)
            .and_where(Expr::col(Records::AggregateId).eq(aggregate_id.as_str()))
            .and_where(Expr::col(Records::TenantId).eq(tenant_id.as_str()))
            .and_where(Expr::col(Records::Version).gte(from_version))
            .and_where(Expr::col(Records::Version).lte(to_version))
            .order_by(Records::Version, Order::Asc)
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        if rows.is_empty() {
            return Err(Error::new(Kind::NotFound).op(OP).id(aggregate_id.clone()));
        }

        let mut history = History::with_capacity(rows.len());
        for row in rows {
            history.push(Record {
                aggregate_id: Id::new(row.get::<String, _>("aggregate_id")),
                tenant_id: Id::new(row.get::<String, _>("tenant_id")),
                version: row.get("version"),
                data: row.get("data"),
                created_at: row.get("created_at"),
            });
        }

        Ok(history)
    }

    async fn save(&self, aggregate_id: &Id, tenant_id: &Id, records: Vec<Record>) -> Result<()> {
        const OP: &str = "eventstore/PgStore.save";
        debug!(aggregate_id = %aggregate_id, tenant_id = %tenant_id, count = records.len(), "save records");

        if records.is_empty() {
            return Ok(());
        }

        let mut batch = records;
        batch.sort_by_key(|r| r.version);

        let max_version = self.max_version(aggregate_id, tenant_id).await?;
        if max_version >= batch[0].version {
            return self.check_idempotent(aggregate_id, tenant_id, &batch).await;
        }

        let mut tx = self.pool.begin().await?;
        for record in &batch {
            let query = Query::insert()
                .into_table(Records::Table)
                .columns([
                    Records::AggregateId,
                    Records::TenantId,
                    Records::Version,
                    Records::Data,
                    Records::CreatedAt,
                ])
                .values_panic([
                    record.aggregate_id.as_str().into(),
                    record.tenant_id.as_str().into(),
                    record.version.into(),
                    record.data.clone().into(),
                    record.created_at.into(),
                ])
                .to_string(PostgresQueryBuilder);

            sqlx::query(&query).execute(&mut *tx).await.map_err(|e| {
                if is_unique_violation(&e) {
                    Error::new(Kind::Internal)
                        .op(OP)
                        .id(aggregate_id.clone())
                        .msg(format!(
                            "conflicting records of aggregate with aggregateID {aggregate_id} detected"
                        ))
                } else {
                    Error::from(e)
                }
            })?;
        }
        tx.commit().await?;

        Ok(())
    }
}

/// Whether the database rejected an insert for violating the
/// `(aggregate_id, tenant_id, version)` unique index.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err.as_database_error().map(|db| db.kind()),
        Some(sqlx::error::ErrorKind::UniqueViolation)
    )
}
