//! Postgres relational adapter: one row per proposal in a single table.
//! The legacy `timestamp` field becomes the `created_at` column; everything
//! else passes through under its canonical name.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use crate::errors::StoreError;
use crate::models::proposal::Proposal;
use crate::store::adapter::{AdapterKind, CollectionAdapter, RemoteCollection};

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS proposals (
    id             TEXT PRIMARY KEY,
    city           TEXT NOT NULL,
    state          TEXT NOT NULL DEFAULT '',
    country        TEXT NOT NULL DEFAULT '',
    slug           TEXT NOT NULL,
    title          TEXT NOT NULL DEFAULT '',
    description    TEXT NOT NULL DEFAULT '',
    background     TEXT NOT NULL DEFAULT '',
    policy         TEXT NOT NULL DEFAULT '',
    stakeholders   TEXT NOT NULL DEFAULT '',
    costs          TEXT NOT NULL DEFAULT '',
    metrics        TEXT NOT NULL DEFAULT '',
    timeline       TEXT NOT NULL DEFAULT '',
    full_text      TEXT NOT NULL DEFAULT '',
    tags           TEXT[] NOT NULL DEFAULT '{}',
    lat            DOUBLE PRECISION,
    lng            DOUBLE PRECISION,
    created_at     TIMESTAMPTZ,
    submitter_name TEXT NOT NULL DEFAULT '',
    email          TEXT NOT NULL DEFAULT '',
    institution    TEXT NOT NULL DEFAULT ''
)
"#;

const COLUMNS: &str = "id, city, state, country, slug, title, description, background, \
     policy, stakeholders, costs, metrics, timeline, full_text, tags, lat, lng, \
     created_at, submitter_name, email, institution";

const PLACEHOLDERS: &str = "$1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
     $15, $16, $17, $18, $19, $20, $21";

pub struct PgAdapter {
    pool: PgPool,
}

impl PgAdapter {
    pub fn new(pool: PgPool) -> Self {
        PgAdapter { pool }
    }

    /// Creates the proposals table when it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await?;
        info!("Proposals table ready");
        Ok(())
    }
}

fn bind_proposal<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    p: &'q Proposal,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(&p.id)
        .bind(&p.city)
        .bind(&p.state)
        .bind(&p.country)
        .bind(&p.slug)
        .bind(&p.title)
        .bind(&p.description)
        .bind(&p.background)
        .bind(&p.policy)
        .bind(&p.stakeholders)
        .bind(&p.costs)
        .bind(&p.metrics)
        .bind(&p.timeline)
        .bind(&p.full_text)
        .bind(&p.tags)
        .bind(p.lat)
        .bind(p.lng)
        .bind(p.created_at)
        .bind(&p.submitter_name)
        .bind(&p.email)
        .bind(&p.institution)
}

#[async_trait]
impl CollectionAdapter for PgAdapter {
    async fn load(&self) -> Result<Vec<Proposal>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM proposals");
        Ok(sqlx::query_as::<_, Proposal>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Whole-collection save: DELETE plus re-INSERT inside one transaction,
    /// so readers never observe a half-written collection.
    async fn save(&self, proposals: &[Proposal]) -> Result<(), StoreError> {
        let sql = format!("INSERT INTO proposals ({COLUMNS}) VALUES ({PLACEHOLDERS})");
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM proposals").execute(&mut *tx).await?;
        for proposal in proposals {
            bind_proposal(sqlx::query(&sql), proposal)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Relational
    }
}

#[async_trait]
impl RemoteCollection for PgAdapter {
    async fn count(&self) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM proposals")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Migration insert. `ON CONFLICT DO NOTHING` makes re-delivery of an
    /// already-inserted row a no-op, which is what lets the migration ack a
    /// batch only after the insert succeeds.
    async fn insert_all(&self, records: &[Proposal]) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO proposals ({COLUMNS}) VALUES ({PLACEHOLDERS}) \
             ON CONFLICT (id) DO NOTHING"
        );
        for record in records {
            bind_proposal(sqlx::query(&sql), record)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}
