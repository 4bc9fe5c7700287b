//! Sports-reference site adapter: roster pages, team snap-count totals, and
//! per-game participation columns.
//!
//! Pages are keyed by (team path, season). Tables frequently arrive wrapped
//! in comment markup and under drifting layouts; everything funnels through
//! the declarative resolver in [`crate::resolve`].

use std::collections::HashMap;

use scraper::Html;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::fetch::Fetcher;
use crate::resolve::{
    cell_at, cell_stat, cell_text, clean_player_name, data_rows, find_table, parse_int, parse_pct,
    player_identity_from_cell, row_cells, strip_comment_markup, week_from_stat, ROSTER_COLUMNS,
    SNAP_TOTAL_COLUMNS,
};
use crate::sources::SourceError;
use crate::types::{RosterObservation, SnapGameRecord, Team};

/// Stable table ids tried before falling back to a header scan.
const ROSTER_TABLE_IDS: &[&str] = &["roster"];
const SNAP_TABLE_IDS: &[&str] = &["snap_counts", "snap_counts_d", "snap_counts_defense"];

// ---------------------------------------------------------------------------
// URLs
// ---------------------------------------------------------------------------

pub fn roster_url(base: &str, team_path: &str, season: &str) -> String {
    format!("{base}/teams/{team_path}/{season}_roster.htm")
}

/// The per-game snap page exists under two URL shapes depending on season;
/// callers try them in order and keep the first body that carries a table.
pub fn snap_page_candidates(base: &str, team_path: &str, season: &str) -> Vec<String> {
    vec![
        format!("{base}/teams/{team_path}/{season}-snap-counts.htm"),
        format!("{base}/teams/{team_path}/{season}_snap_counts.htm"),
    ]
}

/// Referer mirroring normal navigation from the season index page.
pub fn league_referer(base: &str, season: &str) -> String {
    format!("{base}/years/{season}/")
}

// ---------------------------------------------------------------------------
// Roster page
// ---------------------------------------------------------------------------

/// Fetch and parse one team's roster page into raw observations.
pub async fn fetch_team_roster(
    fetcher: &Fetcher,
    base: &str,
    team: &Team,
    season: &str,
    referer: &str,
    cancel: &CancelToken,
) -> Result<Vec<RosterObservation>, SourceError> {
    let url = roster_url(base, team.path, season);
    debug!(url = %url, team = team.abbr, "roster: GET");
    let html = fetcher.get_text(&url, Some(referer), cancel).await?;
    parse_roster(&html, team.abbr, season)
}

/// Parse a roster document. Pure; soft-fails with `Schema` when the table or
/// its required columns cannot be resolved.
pub fn parse_roster(
    html: &str,
    team_abbr: &str,
    season: &str,
) -> Result<Vec<RosterObservation>, SourceError> {
    let doc = Html::parse_document(&strip_comment_markup(html));
    let resolved = find_table(&doc, ROSTER_TABLE_IDS, ROSTER_COLUMNS)
        .ok_or_else(|| SourceError::Schema(format!("no roster table for {team_abbr}")))?;
    let cols = &resolved.columns;

    let mut out = Vec::with_capacity(64);
    for row in data_rows(resolved.table) {
        let cells = row_cells(row);
        if cells.is_empty() {
            continue;
        }
        let Some(&player_idx) = cols.get("player") else { continue };
        let Some(player_cell) = cells.get(player_idx) else { continue };

        let player = clean_player_name(&cell_text(*player_cell));
        if player.is_empty() {
            continue;
        }
        let player_id = player_identity_from_cell(*player_cell);

        out.push(RosterObservation {
            season: season.to_string(),
            player_id,
            player,
            team: team_abbr.to_string(),
            age: parse_int(&cell_at(&cells, cols.get("age")), 0),
            pos: cell_at(&cells, cols.get("pos")),
            games: parse_int(&cell_at(&cells, cols.get("g")), 0),
            games_started: parse_int(&cell_at(&cells, cols.get("gs")), 0),
            ..Default::default()
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Season snap-count totals
// ---------------------------------------------------------------------------

/// A player's season totals from the team snap page.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SnapTotals {
    pub count: u32,
    pub pct: f64,
}

/// Fetch a team's season snap-count totals, keyed by player id. An absent or
/// unresolvable table yields an empty map: totals are an enrichment, not a
/// requirement.
pub async fn fetch_team_snap_totals(
    fetcher: &Fetcher,
    base: &str,
    team: &Team,
    season: &str,
    referer: &str,
    cancel: &CancelToken,
) -> Result<HashMap<String, SnapTotals>, SourceError> {
    let url = format!("{base}/teams/{}/{season}_snap_counts.htm", team.path);
    debug!(url = %url, team = team.abbr, "snap totals: GET");
    let html = fetcher.get_text(&url, Some(referer), cancel).await?;
    Ok(parse_snap_totals(&html))
}

pub fn parse_snap_totals(html: &str) -> HashMap<String, SnapTotals> {
    let doc = Html::parse_document(&strip_comment_markup(html));
    let Some(resolved) = find_table(&doc, SNAP_TABLE_IDS, SNAP_TOTAL_COLUMNS) else {
        return HashMap::new();
    };
    let cols = &resolved.columns;
    if !cols.contains_key("def_num") && !cols.contains_key("def_pct") {
        return HashMap::new();
    }

    let mut out = HashMap::new();
    for row in data_rows(resolved.table) {
        let cells = row_cells(row);
        let Some(&player_idx) = cols.get("player") else { continue };
        let Some(player_cell) = cells.get(player_idx) else { continue };
        let player_id = player_identity_from_cell(*player_cell);
        if player_id.is_empty() {
            continue;
        }
        out.insert(
            player_id,
            SnapTotals {
                count: parse_int(&cell_at(&cells, cols.get("def_num")), 0),
                pct: parse_pct(&cell_at(&cells, cols.get("def_pct"))),
            },
        );
    }
    out
}

// ---------------------------------------------------------------------------
// Per-game participation columns
// ---------------------------------------------------------------------------

/// Fetch per-game participation percentages for a team/season from the site.
/// Used as the fallback when the community feed is unavailable. Week numbers
/// come from machine-readable cell keys, never header captions.
pub async fn fetch_team_weekly(
    fetcher: &Fetcher,
    base: &str,
    team: &Team,
    season: &str,
    referer: &str,
    cancel: &CancelToken,
) -> Result<Vec<SnapGameRecord>, SourceError> {
    let mut html = String::new();
    for url in snap_page_candidates(base, team.path, season) {
        match fetcher.get_text(&url, Some(referer), cancel).await {
            Ok(body) if body.contains("<table") => {
                debug!(url = %url, team = team.abbr, "weekly snaps: using candidate");
                html = body;
                break;
            }
            Ok(_) => debug!(url = %url, team = team.abbr, "weekly snaps: candidate had no table"),
            Err(e) if matches!(&e, crate::fetch::FetchError::Cancelled) => return Err(e.into()),
            Err(e) => debug!(url = %url, team = team.abbr, error = %e, "weekly snaps: candidate failed"),
        }
    }
    if html.is_empty() {
        return Err(SourceError::Schema(format!(
            "snap counts page not found for {} {season}",
            team.abbr
        )));
    }
    Ok(parse_weekly(&html, team.abbr, season))
}

/// Walk every table row in the document; any row carrying a player cell plus
/// per-week percentage cells yields one record per week.
pub fn parse_weekly(html: &str, team_abbr: &str, season: &str) -> Vec<SnapGameRecord> {
    let doc = Html::parse_document(&strip_comment_markup(html));
    let table_sel = scraper::Selector::parse("table").unwrap();

    let mut out = Vec::with_capacity(256);
    for table in doc.select(&table_sel) {
        for row in data_rows(table) {
            let cells = row_cells(row);
            let Some(player_cell) = cells.iter().find(|c| cell_stat(**c) == Some("player")) else {
                continue;
            };
            let player = clean_player_name(&cell_text(*player_cell));
            let player_id = player_identity_from_cell(*player_cell);
            if player.is_empty() || player_id.is_empty() {
                continue;
            }

            for cell in &cells {
                let Some(week) = cell_stat(*cell).and_then(week_from_stat) else {
                    continue;
                };
                out.push(SnapGameRecord {
                    season: season.to_string(),
                    team: team_abbr.to_string(),
                    week,
                    player_id: player_id.clone(),
                    player: player.clone(),
                    pos: String::new(),
                    snap_pct: parse_pct(&cell_text(*cell)),
                });
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// League-wide defense page
// ---------------------------------------------------------------------------

pub fn league_defense_url(base: &str, season: &str) -> String {
    format!("{base}/years/{season}/defense.htm")
}

/// Map a machine-readable cell key on the league page to a semantic field.
/// The site has shipped several key spellings over the years.
fn league_field(stat: &str) -> Option<&'static str> {
    match stat {
        "player" => Some("player"),
        "age" => Some("age"),
        "team" | "team_name" | "team_abbr" | "team_id" => Some("team"),
        "pos" | "position" | "def_pos" => Some("pos"),
        "g" | "games" => Some("g"),
        "gs" | "games_started" => Some("gs"),
        _ => None,
    }
}

/// Fetch the league-wide defense table: every player's season line on one
/// page, keyed by (season) alone. Multi-team aggregate lines ("TOT", "2TM")
/// come through as-is; the aggregation engine excludes them.
pub async fn fetch_league_defense(
    fetcher: &Fetcher,
    base: &str,
    season: &str,
    cancel: &CancelToken,
) -> Result<Vec<RosterObservation>, SourceError> {
    let url = league_defense_url(base, season);
    debug!(url = %url, "league defense: GET");
    let html = fetcher.get_text(&url, None, cancel).await?;
    parse_league_defense(&html, season)
}

/// Parse the league defense document. The table is auto-detected by the
/// presence of player + games + games-started cell keys in its body.
pub fn parse_league_defense(
    html: &str,
    season: &str,
) -> Result<Vec<RosterObservation>, SourceError> {
    let doc = Html::parse_document(&strip_comment_markup(html));
    let table_sel = scraper::Selector::parse("table").unwrap();

    let table = doc
        .select(&table_sel)
        .find(|t| {
            let mut has_player = false;
            let mut has_g = false;
            let mut has_gs = false;
            for row in data_rows(*t) {
                for cell in row_cells(row) {
                    match cell_stat(cell).and_then(league_field) {
                        Some("player") => has_player = true,
                        Some("g") => has_g = true,
                        Some("gs") => has_gs = true,
                        _ => {}
                    }
                }
                if has_player && has_g && has_gs {
                    return true;
                }
            }
            false
        })
        .ok_or_else(|| SourceError::Schema("league defense table not found".to_string()))?;

    let mut out = Vec::with_capacity(1024);
    for row in data_rows(table) {
        let mut obs = RosterObservation { season: season.to_string(), ..Default::default() };
        for cell in row_cells(row) {
            let Some(field) = cell_stat(cell).and_then(league_field) else { continue };
            let text = cell_text(cell);
            match field {
                "player" => {
                    obs.player = clean_player_name(&text);
                    obs.player_id = player_identity_from_cell(cell);
                }
                "age" => obs.age = parse_int(&text, 0),
                "team" => obs.team = text.to_uppercase(),
                "pos" => obs.pos = text,
                "g" => obs.games = parse_int(&text, 0),
                "gs" => obs.games_started = parse_int(&text, 0),
                _ => {}
            }
        }
        if !obs.player.is_empty() {
            out.push(obs);
        }
    }
    Ok(out)
}
