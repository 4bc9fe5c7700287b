//! Shared types for the snaptrack pipeline.
//!
//! These types form the data model used across all modules: reference team
//! data, raw per-source observations, the canonical aggregated records that
//! land in the sink, and trend summaries. Sources, the aggregation engine,
//! and the store all depend on this module without circular references.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Teams
// ---------------------------------------------------------------------------

/// Immutable team reference data.
///
/// `abbr` is the display abbreviation used on the reference site (e.g. "SEA");
/// `path` is the URL slug the site keys team pages by (historical codes like
/// "crd" or "oti" that do not match the abbreviation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub abbr: &'static str,
    pub path: &'static str,
    pub name: &'static str,
}

/// The canonical league team list in site order.
///
/// The site keys team pages by historical three-letter slugs, so both columns
/// are needed: the slug for URLs, the abbreviation for record attribution.
pub const ALL_TEAMS: &[Team] = &[
    Team { abbr: "ARI", path: "crd", name: "Arizona Cardinals" },
    Team { abbr: "ATL", path: "atl", name: "Atlanta Falcons" },
    Team { abbr: "BAL", path: "rav", name: "Baltimore Ravens" },
    Team { abbr: "BUF", path: "buf", name: "Buffalo Bills" },
    Team { abbr: "CAR", path: "car", name: "Carolina Panthers" },
    Team { abbr: "CHI", path: "chi", name: "Chicago Bears" },
    Team { abbr: "CIN", path: "cin", name: "Cincinnati Bengals" },
    Team { abbr: "CLE", path: "cle", name: "Cleveland Browns" },
    Team { abbr: "DAL", path: "dal", name: "Dallas Cowboys" },
    Team { abbr: "DEN", path: "den", name: "Denver Broncos" },
    Team { abbr: "DET", path: "det", name: "Detroit Lions" },
    Team { abbr: "GNB", path: "gnb", name: "Green Bay Packers" },
    Team { abbr: "HOU", path: "htx", name: "Houston Texans" },
    Team { abbr: "IND", path: "clt", name: "Indianapolis Colts" },
    Team { abbr: "JAX", path: "jax", name: "Jacksonville Jaguars" },
    Team { abbr: "KAN", path: "kan", name: "Kansas City Chiefs" },
    Team { abbr: "LVR", path: "rai", name: "Las Vegas Raiders" },
    Team { abbr: "LAC", path: "sdg", name: "Los Angeles Chargers" },
    Team { abbr: "LAR", path: "ram", name: "Los Angeles Rams" },
    Team { abbr: "MIA", path: "mia", name: "Miami Dolphins" },
    Team { abbr: "MIN", path: "min", name: "Minnesota Vikings" },
    Team { abbr: "NWE", path: "nwe", name: "New England Patriots" },
    Team { abbr: "NOR", path: "nor", name: "New Orleans Saints" },
    Team { abbr: "NYG", path: "nyg", name: "New York Giants" },
    Team { abbr: "NYJ", path: "nyj", name: "New York Jets" },
    Team { abbr: "PHI", path: "phi", name: "Philadelphia Eagles" },
    Team { abbr: "PIT", path: "pit", name: "Pittsburgh Steelers" },
    Team { abbr: "SFO", path: "sfo", name: "San Francisco 49ers" },
    Team { abbr: "SEA", path: "sea", name: "Seattle Seahawks" },
    Team { abbr: "TAM", path: "tam", name: "Tampa Bay Buccaneers" },
    Team { abbr: "TEN", path: "oti", name: "Tennessee Titans" },
    Team { abbr: "WAS", path: "was", name: "Washington Commanders" },
];

/// Look up the site URL slug for a team abbreviation.
pub fn abbr_to_path(abbr: &str) -> Option<&'static str> {
    let a = abbr.trim().to_uppercase();
    ALL_TEAMS.iter().find(|t| t.abbr == a).map(|t| t.path)
}

// ---------------------------------------------------------------------------
// Raw observations
// ---------------------------------------------------------------------------

/// One row as parsed from a single source for a single (season, team) scope.
///
/// Ephemeral: produced per fetch, consumed by reconciliation/aggregation, and
/// persisted only as a raw staging record. Identifier and position may be
/// empty; participation percentage is 0–100 with 0 meaning "did not play".
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RosterObservation {
    pub season: String,
    pub player_id: String,
    pub player: String,
    pub team: String,
    pub age: u32,
    pub pos: String,
    pub games: u32,
    pub games_started: u32,
    pub snap_count: u32,
    pub snap_pct: f64,
}

impl RosterObservation {
    /// Composite sort key used when staging raw rows: `PlayerID#Team`.
    pub fn sort_key(&self) -> String {
        format!("{}#{}", self.player_id, self.team)
    }
}

// ---------------------------------------------------------------------------
// Canonical player record
// ---------------------------------------------------------------------------

/// The aggregated entity: one record per (season, player), attributed to the
/// player's primary team. Recomputed in full on every aggregation run and
/// written over the previous generation, never mutated incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlayerRecord {
    pub season: String,
    pub player_id: String,
    pub player: String,
    /// Primary team for the season (highest games-started, see aggregate.rs).
    pub team: String,
    /// All teams seen this season, sorted and comma-joined.
    pub teams: String,
    pub age: u32,
    pub games: u32,
    pub games_started: u32,
    /// Union of positions seen, sorted and comma-joined (e.g. "CB,DB").
    pub pos: String,
    pub snap_count: u32,
    /// Latest known participation percentage with the primary team.
    pub snap_pct: f64,
    /// Rolling trend numbers, present only after a trend run has updated
    /// this record in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trends: Option<TrendSummary>,
}

impl PlayerRecord {
    /// Partition key: `Season#Team`.
    pub fn season_team(&self) -> String {
        format!("{}#{}", self.season, self.team)
    }
}

impl fmt::Display for PlayerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} {} g={} gs={} snap%={:.1}",
            self.player, self.player_id, self.team, self.pos, self.games, self.games_started, self.snap_pct,
        )
    }
}

/// Key addressing a canonical player record in the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerKey {
    pub season: String,
    pub team: String,
    pub player_id: String,
}

// ---------------------------------------------------------------------------
// Snap game records
// ---------------------------------------------------------------------------

/// One per (season, team, week, player): the narrow time-series fact feeding
/// trend computation. Immutable once written; de-duplicated by composite key
/// before every batch write.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SnapGameRecord {
    pub season: String,
    pub team: String,
    pub week: u32,
    pub player_id: String,
    pub player: String,
    pub pos: String,
    /// 0..100; blank/DNP upstream cells land here as 0.
    pub snap_pct: f64,
}

impl SnapGameRecord {
    /// Partition key: `Season#Team#Week` with the week zero-padded so string
    /// order matches chronological order.
    pub fn season_team_week(&self) -> String {
        format!("{}#{}#{:02}", self.season, self.team, self.week)
    }

    /// Secondary-index sort key: `Season#Week`, zero-padded for the same
    /// reason. Chronological per-player queries sort on this.
    pub fn season_week(&self) -> String {
        format!("{}#{:02}", self.season, self.week)
    }
}

// ---------------------------------------------------------------------------
// Trend summary
// ---------------------------------------------------------------------------

/// Derived, ephemeral rolling-trend numbers for one player's season series.
/// Written onto an existing [`PlayerRecord`] via conditional update only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TrendSummary {
    /// Most recent participation percentage (0 if the series is empty).
    pub last: f64,
    /// OLS slope over the last 3 points (0 if fewer exist).
    pub slope3: f64,
    /// OLS slope over the last 5 points (0 if fewer exist).
    pub slope5: f64,
    /// `last - avg(two points preceding last)` within the last-3 window.
    pub change3: f64,
}

impl fmt::Display for TrendSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "last={:.1} s3={:.3} s5={:.3} c3={:.1}",
            self.last, self.slope3, self.slope5, self.change3
        )
    }
}
