//! Integration tests: engine runs against a fake sink and against the
//! bundled SQLite sink.

mod support;

use snaptrack::cancel::CancelToken;
use snaptrack::config::AppConfig;
use snaptrack::engine::{run_materialize, run_trends};
use snaptrack::store::sqlite::SqliteSink;
use snaptrack::store::writer::{write_records, RetryPolicy};
use snaptrack::store::{Sink, StoreError};
use snaptrack::types::{PlayerKey, PlayerRecord, RosterObservation, SnapGameRecord, TrendSummary};
use std::sync::atomic::Ordering;
use support::FakeSink;

fn cfg() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.pipeline.season = "2024".to_string();
    cfg
}

fn roster_row(player: &str, id: &str, team: &str, pos: &str, g: u32, gs: u32) -> RosterObservation {
    RosterObservation {
        season: "2024".into(),
        player_id: id.into(),
        player: player.into(),
        team: team.into(),
        age: 24,
        pos: pos.into(),
        games: g,
        games_started: gs,
        ..Default::default()
    }
}

fn snap_row(team: &str, week: u32, id: &str, pct: f64) -> SnapGameRecord {
    SnapGameRecord {
        season: "2024".into(),
        team: team.into(),
        week,
        player_id: id.into(),
        player: format!("Player {id}"),
        pos: "CB".into(),
        snap_pct: pct,
    }
}

fn canonical(team: &str, id: &str) -> PlayerRecord {
    PlayerRecord {
        season: "2024".into(),
        player_id: id.into(),
        player: format!("Player {id}"),
        team: team.into(),
        teams: team.into(),
        games: 10,
        games_started: 10,
        pos: "CB".into(),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Materialize
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_materialize_folds_multi_team_player() {
    let sink = FakeSink::new();
    sink.seed_roster(vec![
        roster_row("John Doe", "DoeJo00", "ATL", "CB", 10, 10),
        roster_row("John Doe", "DoeJo00", "CHI", "CB", 7, 7),
        roster_row("John Doe", "DoeJo00", "TOT", "CB", 17, 17),
        roster_row("Jane Roe", "RoeJa00", "SEA", "SS", 17, 17),
    ]);

    let report = run_materialize(&cfg(), &sink, &CancelToken::never()).await.unwrap();
    assert_eq!(report.rows_scanned, 4);
    assert_eq!(report.players, 2);

    let doe = sink.players("2024", "ATL").await.unwrap();
    assert_eq!(doe.len(), 1);
    assert_eq!(doe[0].games, 17);
    assert_eq!(doe[0].games_started, 17);
    assert_eq!(doe[0].team, "ATL");
    assert_eq!(doe[0].teams, "ATL,CHI");

    let roe = sink.players("2024", "SEA").await.unwrap();
    assert_eq!(roe.len(), 1);
    assert_eq!(roe[0].player, "Jane Roe");
}

#[tokio::test]
async fn test_materialize_applies_position_allow_list() {
    let sink = FakeSink::new();
    sink.seed_roster(vec![
        roster_row("Corner Back", "CB1", "SEA", "CB", 10, 10),
        roster_row("Quarter Back", "QB1", "SEA", "QB", 17, 17),
    ]);

    let report = run_materialize(&cfg(), &sink, &CancelToken::never()).await.unwrap();
    assert_eq!(report.players, 1);
    let players = sink.players("2024", "SEA").await.unwrap();
    assert_eq!(players[0].player_id, "CB1");
}

#[tokio::test]
async fn test_materialize_starters_only_config() {
    let sink = FakeSink::new();
    sink.seed_roster(vec![
        roster_row("Full Starter", "FS1", "SEA", "CB", 17, 17),
        roster_row("Part Timer", "PT1", "SEA", "CB", 17, 4),
    ]);

    let mut config = cfg();
    config.pipeline.starters_only = true;
    let report = run_materialize(&config, &sink, &CancelToken::never()).await.unwrap();
    assert_eq!(report.players, 1);
    assert_eq!(sink.players("2024", "SEA").await.unwrap()[0].player_id, "FS1");
}

#[tokio::test]
async fn test_materialize_retries_partial_batch_failures() {
    let sink = FakeSink::new();
    // 30 distinct players -> 30 canonical records -> 2 batches of 25 + 5
    sink.seed_roster((0..30).map(|i| {
        roster_row(&format!("Player {i:02}"), &format!("P{i:02}"), "SEA", "CB", 10, 5)
    }));
    sink.echo_unprocessed_once.store(true, Ordering::SeqCst);

    let report = run_materialize(&cfg(), &sink, &CancelToken::never()).await.unwrap();
    assert_eq!(report.players, 30);
    assert_eq!(report.write.written, 30);
    // Each batch rejected once then accepted: 2 batches x 2 attempts
    assert_eq!(sink.player_batch_calls.load(Ordering::SeqCst), 4);
}

// ---------------------------------------------------------------------------
// Trends
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_trends_updates_existing_records() {
    let sink = FakeSink::new();
    sink.seed_players(vec![canonical("SEA", "A00")]);
    // Strictly increasing arithmetic series of slope 5
    sink.seed_snaps((1..=6).map(|w| snap_row("SEA", w, "A00", 50.0 + 5.0 * w as f64)));

    let report = run_trends(&cfg(), &sink, &CancelToken::never()).await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.target_missing, 0);

    let players = sink.players("2024", "SEA").await.unwrap();
    let trends = players[0].trends.expect("trends written");
    assert!((trends.last - 80.0).abs() < 1e-9);
    assert!((trends.slope3 - 5.0).abs() < 1e-9);
    assert!((trends.slope5 - 5.0).abs() < 1e-9);
    assert!((trends.change3 - 7.5).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_trends_zeroes_players_without_series() {
    let sink = FakeSink::new();
    sink.seed_players(vec![canonical("SEA", "NoSnaps00")]);

    let report = run_trends(&cfg(), &sink, &CancelToken::never()).await.unwrap();
    assert_eq!(report.updated, 1);

    let players = sink.players("2024", "SEA").await.unwrap();
    assert_eq!(players[0].trends.unwrap(), TrendSummary::default());
}

#[tokio::test]
async fn test_conditional_update_never_creates_records() {
    let sink = FakeSink::new();
    let key = PlayerKey { season: "2024".into(), team: "SEA".into(), player_id: "Ghost00".into() };
    let err = sink
        .update_trends(&key, &TrendSummary { last: 1.0, ..Default::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::TargetMissing { .. }));
    assert!(sink.players("2024", "SEA").await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Full pipeline over the bundled SQLite sink
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_full_pipeline_on_sqlite() {
    let sink = SqliteSink::open_in_memory().await.unwrap();
    let config = cfg();
    let cancel = CancelToken::never();

    // Stage raw roster rows the way the ingest run would
    let rows = vec![
        roster_row("John Doe", "DoeJo00", "ATL", "CB", 10, 10),
        roster_row("John Doe", "DoeJo00", "CHI", "CB", 7, 7),
        roster_row("Jane Roe", "RoeJa00", "SEA", "SS", 17, 17),
    ];
    write_records(&sink, rows, &RetryPolicy::default(), &cancel).await.unwrap();

    // Aggregate into canonical records
    let report = run_materialize(&config, &sink, &cancel).await.unwrap();
    assert_eq!(report.players, 2);

    // Weekly series for the multi-team player
    let snaps: Vec<_> = (1..=5).map(|w| snap_row("ATL", w, "DoeJo00", 60.0 + w as f64)).collect();
    write_records(&sink, snaps, &RetryPolicy::default(), &cancel).await.unwrap();

    // Trend run lands numbers on the existing canonical record
    let trends = run_trends(&config, &sink, &cancel).await.unwrap();
    assert_eq!(trends.updated, 2);
    assert_eq!(trends.target_missing, 0);

    let doe = sink.players("2024", "ATL").await.unwrap();
    let summary = doe[0].trends.expect("trend fields present");
    assert!((summary.last - 65.0).abs() < 1e-9);
    assert!((summary.slope3 - 1.0).abs() < 1e-9);
    assert!((summary.slope5 - 1.0).abs() < 1e-9);

    // Rerunning materialize overwrites rather than duplicates
    let again = run_materialize(&config, &sink, &cancel).await.unwrap();
    assert_eq!(again.players, 2);
    assert_eq!(sink.players("2024", "ATL").await.unwrap().len(), 1);
}
