//! `sqlx`-backed `Storage` implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Executor, PgPool, Postgres, Row, Transaction};
use tokio::sync::Mutex;

use super::{ChangeRecord, Claim, GraphOps, Storage};
use crate::error::Result;
use crate::set::{ChangeKind, Set, Tuple};

async fn fetch_cache_column<'e, E>(executor: E, column: &str, set: &Set) -> Result<Vec<Set>>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        "select {column} from caches where (set_type, set_id, set_relation) = ($1, $2, $3)"
    );
    let row = sqlx::query(&query)
        .bind(&set.type_)
        .bind(&set.id)
        .bind(&set.relation)
        .fetch_optional(executor)
        .await?;

    let Some(row) = row else {
        return Ok(Vec::new());
    };
    let value: Option<serde_json::Value> = row.try_get(0)?;
    match value {
        Some(value) => Ok(serde_json::from_value(value).unwrap_or_default()),
        None => Ok(Vec::new()),
    }
}

async fn upsert_cache_column<'e, E>(
    executor: E,
    column: &str,
    set: &Set,
    sets: &[Set],
) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        "insert into caches(set_type, set_id, set_relation, {column}) \
         values ($1, $2, $3, $4) \
         on conflict (set_type, set_id, set_relation) \
         do update set {column} = $4"
    );
    let payload = serde_json::to_value(sets)
        .map_err(|e| crate::error::Error::Processing(format!("serializing {column}: {e}")))?;
    sqlx::query(&query)
        .bind(&set.type_)
        .bind(&set.id)
        .bind(&set.relation)
        .bind(payload)
        .execute(executor)
        .await?;
    Ok(())
}

async fn record_tuple<'e, E>(executor: E, tuple: &Tuple) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        "insert into tuples(parent_type, parent_id, parent_relation, child_type, child_id, child_relation) \
         values ($1, $2, $3, $4, $5, $6)",
    )
    .bind(&tuple.parent.type_)
    .bind(&tuple.parent.id)
    .bind(&tuple.parent.relation)
    .bind(&tuple.child.type_)
    .bind(&tuple.child.id)
    .bind(&tuple.child.relation)
    .execute(executor)
    .await?;
    Ok(())
}

async fn delete_tuple<'e, E>(executor: E, tuple: &Tuple) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        "delete from tuples \
         where parent_type = $1 and parent_id = $2 and parent_relation = $3 \
           and child_type = $4 and child_id = $5 and child_relation = $6",
    )
    .bind(&tuple.parent.type_)
    .bind(&tuple.parent.id)
    .bind(&tuple.parent.relation)
    .bind(&tuple.child.type_)
    .bind(&tuple.child.id)
    .bind(&tuple.child.relation)
    .execute(executor)
    .await?;
    Ok(())
}

pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GraphOps for PgStorage {
    async fn children(&self, set: &Set) -> Result<Vec<Set>> {
        fetch_cache_column(&self.pool, "children", set).await
    }

    async fn parents(&self, set: &Set) -> Result<Vec<Set>> {
        fetch_cache_column(&self.pool, "parents", set).await
    }

    async fn subsets(&self, set: &Set) -> Result<Vec<Set>> {
        fetch_cache_column(&self.pool, "subsets", set).await
    }

    async fn set_children(&self, set: &Set, children: &[Set]) -> Result<()> {
        upsert_cache_column(&self.pool, "children", set, children).await
    }

    async fn set_parents(&self, set: &Set, parents: &[Set]) -> Result<()> {
        upsert_cache_column(&self.pool, "parents", set, parents).await
    }

    async fn set_subsets(&self, set: &Set, subsets: &[Set]) -> Result<()> {
        upsert_cache_column(&self.pool, "subsets", set, subsets).await
    }

    async fn record_tuple(&self, tuple: &Tuple) -> Result<()> {
        record_tuple(&self.pool, tuple).await
    }

    async fn delete_tuple(&self, tuple: &Tuple) -> Result<()> {
        delete_tuple(&self.pool, tuple).await
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn create_change(&self, kind: ChangeKind, tuple: &Tuple) -> Result<()> {
        let payload = serde_json::to_value(tuple).map_err(|e| {
            crate::error::Error::Processing(format!("serializing change payload: {e}"))
        })?;
        sqlx::query("insert into changes(id, type, payload) values ($1, $2, $3)")
            .bind(uuid::Uuid::new_v4())
            .bind(kind.as_str())
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn begin_claim(&self) -> Result<Option<Box<dyn Claim>>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "update changes \
             set processed = true \
             where id in ( \
               select id from changes \
               where not processed \
               order by created_at \
               for update skip locked \
               limit 1 \
             ) \
             returning id, type, payload, created_at",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let id: uuid::Uuid = row.try_get("id")?;
        let kind_raw: String = row.try_get("type")?;
        let payload: serde_json::Value = row.try_get("payload")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        let kind = ChangeKind::from_str(&kind_raw).ok_or_else(|| {
            crate::error::Error::Processing(format!("unknown change type '{kind_raw}'"))
        })?;
        let payload: Tuple = serde_json::from_value(payload).map_err(|e| {
            crate::error::Error::Processing(format!("decoding change payload: {e}"))
        })?;

        Ok(Some(Box::new(PgClaim {
            change: ChangeRecord {
                id: id.to_string(),
                kind,
                payload,
                created_at,
            },
            tx: Mutex::new(tx),
        })))
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "create table if not exists tuples ( \
               parent_type text not null, \
               parent_id text not null, \
               parent_relation text not null, \
               child_type text not null, \
               child_id text not null, \
               child_relation text not null \
             )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "create table if not exists caches ( \
               set_type text not null, \
               set_id text not null, \
               set_relation text not null, \
               children jsonb, \
               parents jsonb, \
               subsets jsonb, \
               primary key (set_type, set_id, set_relation) \
             )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "create table if not exists changes ( \
               id uuid primary key, \
               type text not null, \
               payload jsonb not null, \
               created_at timestamptz not null default now(), \
               processed boolean not null default false \
             )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "create index if not exists changes_unprocessed_idx on changes (created_at) where not processed",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_unprocessed(&self) -> Result<i64> {
        let row = sqlx::query("select count(*) from changes where not processed")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get(0)?)
    }
}

/// A claimed change whose `processed = true` update, and any cache writes
/// made while processing it, live in `tx` until the caller decides the
/// outcome. The transaction is behind a `tokio::sync::Mutex` purely so
/// `GraphOps`'s `&self` methods can borrow it mutably one at a time — a
/// claim is processed by a single worker, never concurrently.
struct PgClaim {
    change: ChangeRecord,
    tx: Mutex<Transaction<'static, Postgres>>,
}

#[async_trait]
impl GraphOps for PgClaim {
    async fn children(&self, set: &Set) -> Result<Vec<Set>> {
        let mut tx = self.tx.lock().await;
        fetch_cache_column(&mut *tx, "children", set).await
    }

    async fn parents(&self, set: &Set) -> Result<Vec<Set>> {
        let mut tx = self.tx.lock().await;
        fetch_cache_column(&mut *tx, "parents", set).await
    }

    async fn subsets(&self, set: &Set) -> Result<Vec<Set>> {
        let mut tx = self.tx.lock().await;
        fetch_cache_column(&mut *tx, "subsets", set).await
    }

    async fn set_children(&self, set: &Set, children: &[Set]) -> Result<()> {
        let mut tx = self.tx.lock().await;
        upsert_cache_column(&mut *tx, "children", set, children).await
    }

    async fn set_parents(&self, set: &Set, parents: &[Set]) -> Result<()> {
        let mut tx = self.tx.lock().await;
        upsert_cache_column(&mut *tx, "parents", set, parents).await
    }

    async fn set_subsets(&self, set: &Set, subsets: &[Set]) -> Result<()> {
        let mut tx = self.tx.lock().await;
        upsert_cache_column(&mut *tx, "subsets", set, subsets).await
    }

    async fn record_tuple(&self, tuple: &Tuple) -> Result<()> {
        let mut tx = self.tx.lock().await;
        record_tuple(&mut *tx, tuple).await
    }

    async fn delete_tuple(&self, tuple: &Tuple) -> Result<()> {
        let mut tx = self.tx.lock().await;
        delete_tuple(&mut *tx, tuple).await
    }
}

#[async_trait]
impl Claim for PgClaim {
    fn change(&self) -> &ChangeRecord {
        &self.change
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.into_inner().commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.into_inner().rollback().await?;
        Ok(())
    }
}
