//! Persistence layer.
//!
//! The pipeline writes to a partitioned key-value sink through the [`Sink`]
//! trait: batched multi-item puts that report a partial-failure subset,
//! a conditional single-item trend update that fails closed when the target
//! is absent, and range reads with pagination. Engines depend only on the
//! trait; the bundled SQLite implementation ([`sqlite::SqliteSink`]) is a
//! thin, replaceable stand-in that mirrors the partition/sort-key contract.
//!
//! Records cross this boundary as typed structs, encoded/decoded exactly
//! once; no loosely-typed attribute bags leak into call sites.

pub mod sqlite;
pub mod writer;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{PlayerKey, PlayerRecord, RosterObservation, SnapGameRecord, TrendSummary};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional update addressed a key that does not exist. Reported,
    /// never retried: trend summaries must not create records.
    #[error("conditional update target missing: {key}")]
    TargetMissing { key: String },

    /// The batch writer drained its retry budget with items still pending.
    #[error("batch retries exhausted; {remaining} unprocessed items remain")]
    RetriesExhausted { remaining: usize },

    #[error("write cancelled")]
    Cancelled,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

// ---------------------------------------------------------------------------
// Record addressing
// ---------------------------------------------------------------------------

/// A persistable record with a composite (partition, sort) key.
///
/// `is_writable` guards against staging rows that never acquired an
/// identity; those are skipped before a batch is formed, matching the
/// sink-side validation they would otherwise trip.
pub trait Record: Clone + Send + Sync + 'static {
    fn partition_key(&self) -> String;
    fn sort_key(&self) -> String;

    fn composite_key(&self) -> (String, String) {
        (self.partition_key(), self.sort_key())
    }

    fn is_writable(&self) -> bool {
        true
    }
}

impl Record for PlayerRecord {
    fn partition_key(&self) -> String {
        self.season_team()
    }

    fn sort_key(&self) -> String {
        self.player_id.clone()
    }

    fn is_writable(&self) -> bool {
        !self.player_id.is_empty() && !self.team.is_empty()
    }
}

impl Record for RosterObservation {
    fn partition_key(&self) -> String {
        self.season.clone()
    }

    fn sort_key(&self) -> String {
        RosterObservation::sort_key(self)
    }

    fn is_writable(&self) -> bool {
        !self.season.is_empty() && !self.player_id.is_empty() && !self.team.is_empty()
    }
}

impl Record for SnapGameRecord {
    fn partition_key(&self) -> String {
        self.season_team_week()
    }

    fn sort_key(&self) -> String {
        self.player_id.clone()
    }

    fn is_writable(&self) -> bool {
        !self.season.is_empty() && !self.team.is_empty() && self.week >= 1 && !self.player_id.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Sink trait
// ---------------------------------------------------------------------------

/// One page of a range read, with an opaque continuation cursor.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub cursor: Option<String>,
}

/// A single-batch write target for one record type. Returns the unprocessed
/// subset: the sink-side partial failure the writer retries.
#[async_trait]
pub trait BatchWrite<R: Record>: Send + Sync {
    async fn put_batch(&self, batch: Vec<R>) -> Result<Vec<R>, StoreError>;
}

/// The full persistence surface the pipeline consumes.
#[async_trait]
pub trait Sink:
    BatchWrite<PlayerRecord> + BatchWrite<RosterObservation> + BatchWrite<SnapGameRecord>
{
    /// Write trend numbers onto an existing canonical record. Fails closed
    /// with [`StoreError::TargetMissing`] when the record is absent.
    async fn update_trends(&self, key: &PlayerKey, trends: &TrendSummary) -> Result<(), StoreError>;

    /// Page through every staged roster row for a season.
    async fn roster_page(
        &self,
        season: &str,
        cursor: Option<String>,
    ) -> Result<Page<RosterObservation>, StoreError>;

    /// All canonical player records for a (season, team) partition, decoded
    /// once at this boundary.
    async fn players(&self, season: &str, team: &str) -> Result<Vec<PlayerRecord>, StoreError>;

    /// A player's participation percentages for a season, oldest week first.
    async fn snap_series(&self, player_id: &str, season: &str) -> Result<Vec<f64>, StoreError>;
}
