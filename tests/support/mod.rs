//! Fake sink for integration testing.
//!
//! A deterministic in-memory [`Sink`] implementation with controllable
//! partial-failure behavior: when `echo_unprocessed_once` is set, the first
//! attempt of every batch is returned whole as unprocessed, so tests can
//! observe the writer retrying exactly the rejected subset.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use snaptrack::store::{BatchWrite, Page, Sink, StoreError};
use snaptrack::types::{PlayerKey, PlayerRecord, RosterObservation, SnapGameRecord, TrendSummary};

#[derive(Default)]
pub struct FakeSink {
    pub players: Mutex<BTreeMap<(String, String), PlayerRecord>>,
    pub roster: Mutex<BTreeMap<(String, String), RosterObservation>>,
    pub snaps: Mutex<BTreeMap<(String, String), SnapGameRecord>>,

    /// Echo each batch back whole on its first attempt.
    pub echo_unprocessed_once: AtomicBool,
    echo_counter: AtomicUsize,

    pub player_batch_calls: AtomicUsize,
    pub snap_batch_calls: AtomicUsize,
    pub roster_batch_calls: AtomicUsize,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this call should be rejected (first attempt of a batch).
    fn reject_this_call(&self) -> bool {
        if !self.echo_unprocessed_once.load(Ordering::SeqCst) {
            return false;
        }
        // Batches are attempted sequentially: even call index = first try.
        self.echo_counter.fetch_add(1, Ordering::SeqCst) % 2 == 0
    }

    pub fn seed_players(&self, records: impl IntoIterator<Item = PlayerRecord>) {
        let mut map = self.players.lock().unwrap();
        for r in records {
            map.insert((r.season_team(), r.player_id.clone()), r);
        }
    }

    pub fn seed_roster(&self, rows: impl IntoIterator<Item = RosterObservation>) {
        let mut map = self.roster.lock().unwrap();
        for r in rows {
            map.insert((r.season.clone(), r.sort_key()), r);
        }
    }

    pub fn seed_snaps(&self, rows: impl IntoIterator<Item = SnapGameRecord>) {
        let mut map = self.snaps.lock().unwrap();
        for r in rows {
            map.insert((r.season_team_week(), r.player_id.clone()), r);
        }
    }
}

#[async_trait]
impl BatchWrite<PlayerRecord> for FakeSink {
    async fn put_batch(&self, batch: Vec<PlayerRecord>) -> Result<Vec<PlayerRecord>, StoreError> {
        self.player_batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_this_call() {
            return Ok(batch);
        }
        let mut map = self.players.lock().unwrap();
        for r in batch {
            map.insert((r.season_team(), r.player_id.clone()), r);
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl BatchWrite<RosterObservation> for FakeSink {
    async fn put_batch(
        &self,
        batch: Vec<RosterObservation>,
    ) -> Result<Vec<RosterObservation>, StoreError> {
        self.roster_batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_this_call() {
            return Ok(batch);
        }
        let mut map = self.roster.lock().unwrap();
        for r in batch {
            map.insert((r.season.clone(), r.sort_key()), r);
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl BatchWrite<SnapGameRecord> for FakeSink {
    async fn put_batch(
        &self,
        batch: Vec<SnapGameRecord>,
    ) -> Result<Vec<SnapGameRecord>, StoreError> {
        self.snap_batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_this_call() {
            return Ok(batch);
        }
        let mut map = self.snaps.lock().unwrap();
        for r in batch {
            map.insert((r.season_team_week(), r.player_id.clone()), r);
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl Sink for FakeSink {
    async fn update_trends(&self, key: &PlayerKey, trends: &TrendSummary) -> Result<(), StoreError> {
        let map_key = (format!("{}#{}", key.season, key.team), key.player_id.clone());
        let mut map = self.players.lock().unwrap();
        match map.get_mut(&map_key) {
            Some(record) => {
                record.trends = Some(*trends);
                Ok(())
            }
            None => Err(StoreError::TargetMissing {
                key: format!("{}#{}", map_key.0, map_key.1),
            }),
        }
    }

    async fn roster_page(
        &self,
        season: &str,
        cursor: Option<String>,
    ) -> Result<Page<RosterObservation>, StoreError> {
        // Single-page fake: the cursor protocol is exercised against the
        // real sink implementation.
        if cursor.is_some() {
            return Ok(Page { items: Vec::new(), cursor: None });
        }
        let map = self.roster.lock().unwrap();
        let items = map
            .iter()
            .filter(|((s, _), _)| s == season)
            .map(|(_, r)| r.clone())
            .collect();
        Ok(Page { items, cursor: None })
    }

    async fn players(&self, season: &str, team: &str) -> Result<Vec<PlayerRecord>, StoreError> {
        let pk = format!("{season}#{team}");
        let map = self.players.lock().unwrap();
        Ok(map
            .iter()
            .filter(|((st, _), _)| *st == pk)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn snap_series(&self, player_id: &str, season: &str) -> Result<Vec<f64>, StoreError> {
        let map = self.snaps.lock().unwrap();
        let mut rows: Vec<&SnapGameRecord> = map
            .values()
            .filter(|r| r.player_id == player_id && r.season == season)
            .collect();
        rows.sort_by_key(|r| r.week);
        Ok(rows.iter().map(|r| r.snap_pct).collect())
    }
}
