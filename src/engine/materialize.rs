//! Canonical aggregation run.
//!
//! Reads every staged roster row for the season back out of the sink, folds
//! them into one record per player, and overwrites the canonical player
//! partition. Each run recomputes the full set from raw inputs; nothing is
//! mutated incrementally, so reruns are idempotent.

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::aggregate::{aggregate, AggregateOptions};
use crate::cancel::CancelToken;
use crate::config::AppConfig;
use crate::fetch::Fetcher;
use crate::sources::site;
use crate::store::writer::{write_records, RetryPolicy, WriteReport};
use crate::store::Sink;
use crate::types::RosterObservation;

#[derive(Debug, Clone, Default)]
pub struct MaterializeReport {
    pub rows_scanned: usize,
    pub players: usize,
    pub write: WriteReport,
}

pub async fn run_materialize<S: Sink>(
    cfg: &AppConfig,
    sink: &S,
    cancel: &CancelToken,
) -> Result<MaterializeReport> {
    let season = &cfg.pipeline.season;

    let mut rows: Vec<RosterObservation> = Vec::new();
    let mut cursor = None;
    loop {
        if cancel.is_cancelled() {
            bail!("materialize cancelled");
        }
        let page = sink.roster_page(season, cursor).await?;
        debug!(page_rows = page.items.len(), "materialize: roster page read");
        rows.extend(page.items);
        cursor = page.cursor;
        if cursor.is_none() {
            break;
        }
    }

    let opts = AggregateOptions {
        positions: cfg.pipeline.position_set(),
        starters_only: cfg.pipeline.starters_only,
    };
    let records = aggregate(&rows, &opts);

    let mut report = MaterializeReport {
        rows_scanned: rows.len(),
        players: records.len(),
        ..Default::default()
    };

    // This is the required write of the run: exhausting the batch retry
    // budget here fails the whole step.
    report.write = write_records(sink, records, &RetryPolicy::default(), cancel).await?;

    info!(
        season = %season,
        rows = report.rows_scanned,
        players = report.players,
        written = report.write.written,
        starters_only = cfg.pipeline.starters_only,
        "materialize: complete"
    );
    Ok(report)
}

/// Aggregate straight from the site's league-wide defense page, every
/// player's season line keyed by (season) alone, instead of the staged
/// roster rows. One fetch, same fold, same canonical output.
pub async fn run_league_materialize<S: Sink>(
    cfg: &AppConfig,
    fetcher: &Fetcher,
    sink: &S,
    cancel: &CancelToken,
) -> Result<MaterializeReport> {
    let season = &cfg.pipeline.season;

    let rows = site::fetch_league_defense(fetcher, &cfg.site.base_url, season, cancel).await?;

    let opts = AggregateOptions {
        positions: cfg.pipeline.position_set(),
        starters_only: cfg.pipeline.starters_only,
    };
    let records = aggregate(&rows, &opts);

    let mut report = MaterializeReport {
        rows_scanned: rows.len(),
        players: records.len(),
        ..Default::default()
    };
    report.write = write_records(sink, records, &RetryPolicy::default(), cancel).await?;

    info!(
        season = %season,
        rows = report.rows_scanned,
        players = report.players,
        written = report.write.written,
        "materialize[league]: complete"
    );
    Ok(report)
}
