//! Bundled SQLite sink.
//!
//! A local implementation of the [`Sink`] contract for development and
//! single-host runs. Tables mirror the partitioned key-value layout the
//! pipeline assumes downstream: a (partition key, sort key) primary key per
//! entity, the typed record serialized as a JSON payload column, and an
//! `updated_at` stamp for last-write-wins semantics. SQLite never reports a
//! partial batch, so `put_batch` always returns an empty unprocessed set.

use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::store::{BatchWrite, Page, Sink, StoreError};
use crate::types::{PlayerKey, PlayerRecord, RosterObservation, SnapGameRecord, TrendSummary};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS roster_rows (
        season     TEXT NOT NULL,
        sk         TEXT NOT NULL,
        payload    TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (season, sk)
    )",
    "CREATE TABLE IF NOT EXISTS players (
        season_team TEXT NOT NULL,
        player_id   TEXT NOT NULL,
        payload     TEXT NOT NULL,
        updated_at  INTEGER NOT NULL,
        PRIMARY KEY (season_team, player_id)
    )",
    "CREATE TABLE IF NOT EXISTS snap_games (
        season_team_week TEXT NOT NULL,
        player_id        TEXT NOT NULL,
        season_week      TEXT NOT NULL,
        payload          TEXT NOT NULL,
        updated_at       INTEGER NOT NULL,
        PRIMARY KEY (season_team_week, player_id)
    )",
    // Per-player chronological reads for the trend run
    "CREATE INDEX IF NOT EXISTS idx_snap_player_games
        ON snap_games (player_id, season_week)",
];

pub struct SqliteSink {
    pool: SqlitePool,
    page_size: usize,
}

impl SqliteSink {
    /// Open (creating if missing) a database file and bootstrap the schema.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(opts).await
    }

    /// An in-memory database, used by tests and dry runs.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("in-memory sqlite options")?;
        Self::connect(opts).await
    }

    async fn connect(opts: SqliteConnectOptions) -> Result<Self, StoreError> {
        // The pipeline is sequential; one connection also keeps an
        // in-memory database from fragmenting across pool members.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .context("open sqlite sink")?;
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&pool)
                .await
                .context("bootstrap sink schema")?;
        }
        Ok(Self { pool, page_size: 500 })
    }

    #[cfg(test)]
    pub fn with_page_size(mut self, n: usize) -> Self {
        self.page_size = n;
        self
    }
}

fn encode<T: serde::Serialize>(record: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_string(record).context("encode sink payload")?)
}

fn decode<T: serde::de::DeserializeOwned>(payload: &str) -> Result<T, StoreError> {
    Ok(serde_json::from_str(payload).context("decode sink payload")?)
}

// ---------------------------------------------------------------------------
// Batch writes
// ---------------------------------------------------------------------------

#[async_trait]
impl BatchWrite<PlayerRecord> for SqliteSink {
    async fn put_batch(&self, batch: Vec<PlayerRecord>) -> Result<Vec<PlayerRecord>, StoreError> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await.context("begin batch")?;
        for r in &batch {
            sqlx::query(
                "INSERT INTO players (season_team, player_id, payload, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (season_team, player_id)
                 DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
            )
            .bind(r.season_team())
            .bind(&r.player_id)
            .bind(encode(r)?)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("put player record")?;
        }
        tx.commit().await.context("commit batch")?;
        Ok(Vec::new())
    }
}

#[async_trait]
impl BatchWrite<RosterObservation> for SqliteSink {
    async fn put_batch(
        &self,
        batch: Vec<RosterObservation>,
    ) -> Result<Vec<RosterObservation>, StoreError> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await.context("begin batch")?;
        for r in &batch {
            sqlx::query(
                "INSERT INTO roster_rows (season, sk, payload, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (season, sk)
                 DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
            )
            .bind(&r.season)
            .bind(r.sort_key())
            .bind(encode(r)?)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("put roster row")?;
        }
        tx.commit().await.context("commit batch")?;
        Ok(Vec::new())
    }
}

#[async_trait]
impl BatchWrite<SnapGameRecord> for SqliteSink {
    async fn put_batch(
        &self,
        batch: Vec<SnapGameRecord>,
    ) -> Result<Vec<SnapGameRecord>, StoreError> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await.context("begin batch")?;
        for r in &batch {
            sqlx::query(
                "INSERT INTO snap_games (season_team_week, player_id, season_week, payload, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (season_team_week, player_id)
                 DO UPDATE SET payload = excluded.payload,
                               season_week = excluded.season_week,
                               updated_at = excluded.updated_at",
            )
            .bind(r.season_team_week())
            .bind(&r.player_id)
            .bind(r.season_week())
            .bind(encode(r)?)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("put snap game row")?;
        }
        tx.commit().await.context("commit batch")?;
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Sink surface
// ---------------------------------------------------------------------------

#[async_trait]
impl Sink for SqliteSink {
    async fn update_trends(&self, key: &PlayerKey, trends: &TrendSummary) -> Result<(), StoreError> {
        let season_team = format!("{}#{}", key.season, key.team);

        let mut tx = self.pool.begin().await.context("begin trend update")?;
        let row = sqlx::query("SELECT payload FROM players WHERE season_team = ?1 AND player_id = ?2")
            .bind(&season_team)
            .bind(&key.player_id)
            .fetch_optional(&mut *tx)
            .await
            .context("read trend target")?;

        let Some(row) = row else {
            return Err(StoreError::TargetMissing {
                key: format!("{season_team}#{}", key.player_id),
            });
        };

        let payload: String = row.get("payload");
        let mut record: PlayerRecord = decode(&payload)?;
        record.trends = Some(*trends);

        sqlx::query(
            "UPDATE players SET payload = ?1, updated_at = ?2
             WHERE season_team = ?3 AND player_id = ?4",
        )
        .bind(encode(&record)?)
        .bind(Utc::now().timestamp())
        .bind(&season_team)
        .bind(&key.player_id)
        .execute(&mut *tx)
        .await
        .context("write trend target")?;
        tx.commit().await.context("commit trend update")?;
        Ok(())
    }

    async fn roster_page(
        &self,
        season: &str,
        cursor: Option<String>,
    ) -> Result<Page<RosterObservation>, StoreError> {
        let after = cursor.unwrap_or_default();
        let rows = sqlx::query(
            "SELECT sk, payload FROM roster_rows
             WHERE season = ?1 AND sk > ?2
             ORDER BY sk
             LIMIT ?3",
        )
        .bind(season)
        .bind(&after)
        .bind(self.page_size as i64)
        .fetch_all(&self.pool)
        .await
        .context("page roster rows")?;

        let cursor = if rows.len() == self.page_size {
            rows.last().map(|r| r.get::<String, _>("sk"))
        } else {
            None
        };
        let items = rows
            .iter()
            .map(|r| decode(&r.get::<String, _>("payload")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page { items, cursor })
    }

    async fn players(&self, season: &str, team: &str) -> Result<Vec<PlayerRecord>, StoreError> {
        let season_team = format!("{season}#{team}");
        let rows = sqlx::query("SELECT payload FROM players WHERE season_team = ?1 ORDER BY player_id")
            .bind(&season_team)
            .fetch_all(&self.pool)
            .await
            .context("list players")?;
        rows.iter()
            .map(|r| decode(&r.get::<String, _>("payload")))
            .collect()
    }

    async fn snap_series(&self, player_id: &str, season: &str) -> Result<Vec<f64>, StoreError> {
        let rows = sqlx::query(
            "SELECT payload FROM snap_games
             WHERE player_id = ?1 AND season_week LIKE ?2
             ORDER BY season_week",
        )
        .bind(player_id)
        .bind(format!("{season}#%"))
        .fetch_all(&self.pool)
        .await
        .context("query snap series")?;

        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            let record: SnapGameRecord = decode(&row.get::<String, _>("payload"))?;
            values.push(record.snap_pct);
        }
        Ok(values)
    }
}
