//! Roster ingestion run.
//!
//! Sweeps the selected team subset one page at a time: roster table, then
//! (optionally) the season snap-count totals merged in by player id. Teams
//! that fail a sweep are queued for the next pass behind an escalating
//! cooldown, the rate-limit-friendly alternative to hammering retries.
//! Output order is stable regardless of fetch order or which pass a team
//! succeeded in.

use anyhow::{bail, Result};
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::AppConfig;
use crate::fetch::{pause, Fetcher, Pacer};
use crate::sources::site;
use crate::store::writer::{write_records, RetryPolicy, WriteReport};
use crate::store::Sink;
use crate::types::{RosterObservation, Team, ALL_TEAMS};

/// Outcome of a roster ingest: partial progress is success, with counts.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub teams_ok: usize,
    /// Teams still failing after the last pass.
    pub teams_failed: Vec<String>,
    pub passes: u32,
    pub rows: usize,
    pub write: WriteReport,
}

pub async fn run_roster_ingest<S: Sink>(
    cfg: &AppConfig,
    fetcher: &Fetcher,
    sink: &S,
    cancel: &CancelToken,
) -> Result<IngestReport> {
    let season = &cfg.pipeline.season;
    let mut pending: Vec<&Team> = cfg.teams.select(ALL_TEAMS);
    if pending.is_empty() {
        warn!("roster: no teams selected (check [teams] list or chunking)");
        return Ok(IngestReport::default());
    }
    if cfg.teams.shuffle {
        pending.shuffle(&mut rand::thread_rng());
    }

    let referer = site::league_referer(&cfg.site.base_url, season);
    let pacer = Pacer::new(cfg.http.team_delay());
    let mut report = IngestReport::default();
    let mut rows: Vec<RosterObservation> = Vec::with_capacity(pending.len() * 64);

    for pass in 1..=cfg.http.pass_max {
        if pending.is_empty() {
            break;
        }
        report.passes = pass;
        info!(pass, teams = pending.len(), season = %season, "roster: pass starting");

        let mut failed: Vec<&Team> = Vec::new();
        for team in pending {
            if cancel.is_cancelled() {
                bail!("roster ingest cancelled");
            }

            match fetch_team(cfg, fetcher, team, season, &referer, cancel).await {
                Ok(mut team_rows) => {
                    debug!(team = team.abbr, rows = team_rows.len(), "roster: team parsed");
                    rows.append(&mut team_rows);
                    report.teams_ok += 1;
                }
                Err(e) if e.is_cancelled() => bail!("roster ingest cancelled"),
                Err(e) => {
                    warn!(team = team.abbr, error = %e, "roster: team failed, queuing for next pass");
                    failed.push(team);
                }
            }
            pacer.wait(cancel).await?;
        }

        pending = failed;
        if !pending.is_empty() && report.passes < cfg.http.pass_max {
            let cool = cfg.http.pass_cooldown(report.passes);
            let abbrs: Vec<_> = pending.iter().map(|t| t.abbr).collect();
            info!(cooldown_ms = cool.as_millis() as u64, retrying = ?abbrs, "roster: inter-pass cooldown");
            pause(cool, cancel).await?;
        }
    }

    report.teams_failed = pending.iter().map(|t| t.abbr.to_string()).collect();

    // Stable order for reproducibility: fetch timing must not leak into the
    // staged rows.
    rows.sort_by(|a, b| (a.team.as_str(), a.player.as_str()).cmp(&(b.team.as_str(), b.player.as_str())));
    report.rows = rows.len();

    report.write = write_records(sink, rows, &RetryPolicy::default(), cancel).await?;

    info!(
        teams_ok = report.teams_ok,
        teams_failed = report.teams_failed.len(),
        rows = report.rows,
        written = report.write.written,
        "roster: ingest complete"
    );
    Ok(report)
}

/// One team's roster page, with snap totals merged in when enabled. Snap
/// totals are an enrichment: their failure degrades to empty, it does not
/// fail the team.
async fn fetch_team(
    cfg: &AppConfig,
    fetcher: &Fetcher,
    team: &Team,
    season: &str,
    referer: &str,
    cancel: &CancelToken,
) -> Result<Vec<RosterObservation>, crate::sources::SourceError> {
    let base = &cfg.site.base_url;
    let mut rows = site::fetch_team_roster(fetcher, base, team, season, referer, cancel).await?;

    if cfg.site.fetch_snap_totals {
        match site::fetch_team_snap_totals(fetcher, base, team, season, referer, cancel).await {
            Ok(totals) => {
                for row in &mut rows {
                    if let Some(t) = totals.get(&row.player_id) {
                        row.snap_count = t.count;
                        row.snap_pct = t.pct;
                    }
                }
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                debug!(team = team.abbr, error = %e, "roster: snap totals unavailable, continuing without");
            }
        }
    }
    Ok(rows)
}
