//! Trend materialization run.
//!
//! For every canonical player of the season, read their chronological snap
//! series back from the sink, compute the rolling trend numbers, and write
//! them onto the existing record via conditional update. A missing target is
//! reported per player and never creates a record; the run keeps going.

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::AppConfig;
use crate::fetch::pause;
use crate::store::{Sink, StoreError};
use crate::trend::trend;
use crate::types::{PlayerKey, ALL_TEAMS};

/// Pause between team partitions to avoid hammering the sink.
const TEAM_PAUSE: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Default)]
pub struct TrendsReport {
    pub updated: usize,
    /// Conditional updates rejected because the target record was absent.
    pub target_missing: usize,
    pub errors: usize,
}

pub async fn run_trends<S: Sink>(
    cfg: &AppConfig,
    sink: &S,
    cancel: &CancelToken,
) -> Result<TrendsReport> {
    let season = &cfg.pipeline.season;
    let mut report = TrendsReport::default();

    for team in ALL_TEAMS {
        if cancel.is_cancelled() {
            anyhow::bail!("trend run cancelled");
        }

        let players = match sink.players(season, team.abbr).await {
            Ok(players) => players,
            Err(e) => {
                debug!(team = team.abbr, error = %e, "trends: listing failed, skipping team");
                report.errors += 1;
                continue;
            }
        };
        if players.is_empty() {
            continue;
        }

        for player in &players {
            let series = match sink.snap_series(&player.player_id, season).await {
                Ok(series) => series,
                Err(e) => {
                    debug!(player = %player.player_id, error = %e, "trends: series query failed");
                    report.errors += 1;
                    continue;
                }
            };

            // An empty series still zeroes the trend fields: the record
            // exists, its trend is simply flat-at-nothing.
            let summary = trend(&series);
            let key = PlayerKey {
                season: season.clone(),
                team: team.abbr.to_string(),
                player_id: player.player_id.clone(),
            };

            match sink.update_trends(&key, &summary).await {
                Ok(()) => report.updated += 1,
                Err(StoreError::TargetMissing { key }) => {
                    warn!(%key, "trends: target record missing, not created");
                    report.target_missing += 1;
                }
                Err(e) => {
                    debug!(player = %player.player_id, error = %e, "trends: update failed");
                    report.errors += 1;
                }
            }
        }

        pause(TEAM_PAUSE, cancel).await?;
    }

    info!(
        season = %season,
        updated = report.updated,
        target_missing = report.target_missing,
        errors = report.errors,
        "trends: run complete"
    );
    Ok(report)
}
