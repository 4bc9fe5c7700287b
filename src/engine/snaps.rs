//! Weekly snap ingestion run.
//!
//! Primary path: the community feed's season export, reconciled into the
//! site's id/team namespaces and position-backfilled from previously
//! persisted records. Fallback path: scraping the site's per-game
//! participation columns team by team. Either way the records are
//! de-duplicated and batch-written through the durable writer.

use std::collections::HashSet;

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::AppConfig;
use crate::fetch::Fetcher;
use crate::reconcile::{
    feed_team_to_site, IdNamespace, IdentityMap, PositionMaps, site_team_to_feed,
};
use crate::sources::feed::{self, FeedSnapRow};
use crate::sources::{idmap, site};
use crate::store::writer::{write_records, RetryPolicy, WriteReport};
use crate::store::Sink;
use crate::types::{SnapGameRecord, Team, ALL_TEAMS};

#[derive(Debug, Clone, Default)]
pub struct SnapsReport {
    /// "feed" or "site", whichever produced the records.
    pub source: String,
    pub kept: usize,
    pub dropped_non_def: usize,
    /// Rows whose canonical id never resolved (feed id kept verbatim).
    pub unresolved: usize,
    pub filled_default_pos: usize,
    pub canonicalized_pos: usize,
    pub write: WriteReport,
}

pub async fn run_snaps_ingest<S: Sink>(
    cfg: &AppConfig,
    fetcher: &Fetcher,
    sink: &S,
    cancel: &CancelToken,
) -> Result<SnapsReport> {
    let season = &cfg.pipeline.season;
    let selected: Vec<&Team> = cfg.teams.select(ALL_TEAMS);

    let mut report = SnapsReport::default();

    let records = if cfg.feed.enabled {
        match ingest_from_feed(cfg, fetcher, sink, &selected, cancel, &mut report).await {
            Ok(records) => {
                report.source = "feed".into();
                records
            }
            Err(e) if is_cancelled(&e) => return Err(e),
            Err(e) => {
                warn!(error = %e, "snaps: feed unavailable, falling back to site per-game columns");
                report.source = "site".into();
                ingest_from_site(cfg, fetcher, &selected, cancel, &mut report).await?
            }
        }
    } else {
        report.source = "site".into();
        ingest_from_site(cfg, fetcher, &selected, cancel, &mut report).await?
    };

    report.write = write_records(sink, records, &RetryPolicy::default(), cancel).await?;

    info!(
        source = %report.source,
        kept = report.kept,
        dropped_non_def = report.dropped_non_def,
        unresolved = report.unresolved,
        written = report.write.written,
        season = %season,
        "snaps: ingest complete"
    );
    Ok(report)
}

fn is_cancelled(e: &anyhow::Error) -> bool {
    e.downcast_ref::<crate::sources::SourceError>().is_some_and(|s| s.is_cancelled())
        || e.downcast_ref::<crate::fetch::FetchError>()
            .is_some_and(|f| matches!(f, crate::fetch::FetchError::Cancelled))
}

// ---------------------------------------------------------------------------
// Feed path
// ---------------------------------------------------------------------------

async fn ingest_from_feed<S: Sink>(
    cfg: &AppConfig,
    fetcher: &Fetcher,
    sink: &S,
    selected: &[&Team],
    cancel: &CancelToken,
    report: &mut SnapsReport,
) -> Result<Vec<SnapGameRecord>> {
    let season = &cfg.pipeline.season;
    let season_num: u32 = season.parse().unwrap_or(0);

    // The feed keys teams in its own namespace; an explicit subset must be
    // translated before filtering. No subset means the whole league.
    let team_filter: Option<HashSet<String>> = if cfg.teams.list.is_empty() {
        None
    } else {
        Some(selected.iter().map(|t| site_team_to_feed(t.abbr)).collect())
    };

    // Identity map is best-effort: absent or unreachable degrades resolution
    // to name matching, never fails the run.
    let ids_url = if cfg.feed.ids_url.is_empty() {
        idmap::default_ids_url()
    } else {
        cfg.feed.ids_url.clone()
    };
    let identity = match idmap::fetch_identity_map(fetcher, &ids_url, cancel).await {
        Ok(map) => {
            debug!(ids = map.id_entries(), names = map.name_entries(), "snaps: identity map loaded");
            map
        }
        // Propagate cancellation as-is so the caller aborts instead of
        // falling back to the site path.
        Err(e) if e.is_cancelled() => return Err(e.into()),
        Err(e) => {
            warn!(error = %e, "snaps: identity map unavailable, name matching only");
            IdentityMap::new()
        }
    };

    let positions = load_position_maps(cfg, sink, selected).await;

    let url = if cfg.feed.snap_counts_url.is_empty() {
        feed::default_snap_counts_url(season)
    } else {
        cfg.feed.snap_counts_url.clone()
    };
    let rows = feed::fetch_snap_feed(fetcher, &url, season_num, team_filter.as_ref(), cancel).await?;
    debug!(rows = rows.len(), "snaps: feed rows fetched");

    Ok(reconcile_feed_rows(&rows, season, &identity, &positions, cfg, report))
}

/// Translate feed rows into site-namespace snap records. Pure with respect
/// to its inputs; every counter lands on the report.
fn reconcile_feed_rows(
    rows: &[FeedSnapRow],
    season: &str,
    identity: &IdentityMap,
    positions: &PositionMaps,
    cfg: &AppConfig,
    report: &mut SnapsReport,
) -> Vec<SnapGameRecord> {
    let keep_all = cfg.pipeline.position_set().is_none();
    let default_pos = cfg.pipeline.default_position.to_uppercase();

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if row.week == 0 {
            continue;
        }

        let team = feed_team_to_site(&row.team);

        let resolution = identity.resolve(&row.player_id, IdNamespace::Feed, &row.player);
        if !resolution.is_resolved() {
            report.unresolved += 1;
        }
        let player_id = resolution.id;

        // Prefer the canonical position from persisted records; the feed's
        // column is frequently empty or generic.
        let csv_pos = row.position.trim().to_uppercase();
        let mut pos = csv_pos.clone();
        if let Some(canonical) = positions.lookup(&player_id, &row.player) {
            let canonical = canonical.to_uppercase();
            if !csv_pos.is_empty() && canonical != csv_pos {
                report.canonicalized_pos += 1;
            }
            pos = canonical;
        }

        if !keep_all {
            // Participation itself proves defense: a positive percentage is
            // kept even when no source knows the position.
            if row.defense_pct <= 0.0 {
                report.dropped_non_def += 1;
                continue;
            }
            if pos.is_empty() {
                pos = default_pos.clone();
                report.filled_default_pos += 1;
            }
        }

        out.push(SnapGameRecord {
            season: season.to_string(),
            team,
            week: row.week,
            player_id,
            player: row.player.clone(),
            pos,
            // The feed ships a 0..1 share; everything downstream speaks 0..100.
            snap_pct: row.defense_pct * 100.0,
        });
        report.kept += 1;
    }
    out
}

/// Position backfill from previously persisted records: canonical player
/// records by id and name, then staged roster rows by name. Both reads are
/// best-effort.
async fn load_position_maps<S: Sink>(cfg: &AppConfig, sink: &S, selected: &[&Team]) -> PositionMaps {
    let season = &cfg.pipeline.season;
    let mut maps = PositionMaps::default();

    for team in selected {
        match sink.players(season, team.abbr).await {
            Ok(players) => {
                for p in players {
                    if p.pos.is_empty() {
                        continue;
                    }
                    if !p.player_id.is_empty() {
                        maps.by_id.entry(p.player_id.clone()).or_insert_with(|| p.pos.clone());
                    }
                    if !p.player.is_empty() {
                        maps.by_name
                            .entry(crate::reconcile::normalize_name(&p.player))
                            .or_insert_with(|| p.pos.clone());
                    }
                }
            }
            Err(e) => {
                debug!(team = team.abbr, error = %e, "snaps: no persisted players for backfill");
            }
        }
    }

    // Roster rows fill name gaps without overwriting canonical entries.
    let mut cursor = None;
    loop {
        match sink.roster_page(season, cursor.clone()).await {
            Ok(page) => {
                let mut extra = std::collections::HashMap::new();
                for row in &page.items {
                    if !row.player.is_empty() && !row.pos.is_empty() {
                        extra
                            .entry(crate::reconcile::normalize_name(&row.player))
                            .or_insert_with(|| row.pos.to_uppercase());
                    }
                }
                maps.merge_names(extra);
                cursor = page.cursor;
                if cursor.is_none() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "snaps: roster backfill unavailable");
                break;
            }
        }
    }

    maps
}

// ---------------------------------------------------------------------------
// Site fallback path
// ---------------------------------------------------------------------------

async fn ingest_from_site(
    cfg: &AppConfig,
    fetcher: &Fetcher,
    selected: &[&Team],
    cancel: &CancelToken,
    report: &mut SnapsReport,
) -> Result<Vec<SnapGameRecord>> {
    let season = &cfg.pipeline.season;
    let base = &cfg.site.base_url;
    let referer = site::league_referer(base, season);
    let pacer = crate::fetch::Pacer::new(cfg.http.team_delay());

    let mut out = Vec::new();
    for team in selected {
        if cancel.is_cancelled() {
            bail!("snaps ingest cancelled");
        }
        match site::fetch_team_weekly(fetcher, base, team, season, &referer, cancel).await {
            Ok(mut rows) => {
                report.kept += rows.len();
                out.append(&mut rows);
            }
            Err(e) if e.is_cancelled() => bail!("snaps ingest cancelled"),
            Err(e) => {
                warn!(team = team.abbr, error = %e, "snaps: team weekly page failed, skipping");
            }
        }
        pacer.wait(cancel).await?;
    }
    Ok(out)
}
