//! Aggregation engine: folds per-(player, team) observations into one
//! canonical record per player per season.
//!
//! Pure with respect to its inputs: no network, clock, or map-iteration
//! order leaks into the output, so repeated runs over identical upstream
//! data are byte-identical regardless of fetch timing.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::types::{PlayerRecord, RosterObservation};

/// Eligibility and filtering knobs for an aggregation run.
///
/// `starters_only` is the configurable eligibility predicate: when set, a
/// player is kept only if they started every game they appeared in
/// (`games > 0 && games == games_started`). Off by default: the canonical
/// table carries every defensive player, and `games_started > games` rows
/// are tolerated rather than rejected.
#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    /// Uppercased position tokens; rows whose position doesn't intersect are
    /// excluded before grouping. `None` keeps every position.
    pub positions: Option<HashSet<String>>,
    pub starters_only: bool,
}

impl AggregateOptions {
    /// Build an allow-list from tokens, uppercasing and dropping blanks.
    pub fn with_positions<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: HashSet<String> = tokens
            .into_iter()
            .map(|t| t.as_ref().trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            positions: if set.is_empty() { None } else { Some(set) },
            starters_only: false,
        }
    }
}

/// League-wide tables mark multi-team season lines with a pseudo team code
/// ("TOT", "2TM", "3TM"). Those rows duplicate the per-team lines and are
/// excluded entirely so totals are not double counted.
pub fn is_aggregate_marker(team: &str) -> bool {
    let t = team.trim().to_uppercase();
    t == "TOT" || t.ends_with("TM")
}

/// Split a possibly comma-joined position cell into uppercase tokens.
fn position_tokens(pos: &str) -> Vec<String> {
    pos.split(',')
        .map(|p| p.trim().to_uppercase())
        .filter(|p| !p.is_empty())
        .collect()
}

fn position_allowed(allow: &Option<HashSet<String>>, pos: &str) -> bool {
    match allow {
        None => true,
        Some(set) => position_tokens(pos).iter().any(|p| set.contains(p)),
    }
}

// Per-player accumulator. BTree maps keep every derived ordering independent
// of input order.
#[derive(Debug, Default)]
struct Acc {
    season: String,
    player: String,
    age_min: u32,
    games: u32,
    games_started: u32,
    positions: BTreeSet<String>,
    team_games: BTreeMap<String, u32>,
    team_started: BTreeMap<String, u32>,
    team_pct: BTreeMap<String, f64>,
    snap_count: u32,
}

/// Fold observations into canonical per-player records.
///
/// Deterministic for a given input multiset: grouping, tie-breaking and the
/// final (team, player) sort are all order-independent.
pub fn aggregate(rows: &[RosterObservation], opts: &AggregateOptions) -> Vec<PlayerRecord> {
    let mut by_player: BTreeMap<String, Acc> = BTreeMap::new();

    for row in rows {
        if row.player_id.is_empty() || row.player.is_empty() {
            continue;
        }
        if is_aggregate_marker(&row.team) {
            continue;
        }
        if !position_allowed(&opts.positions, &row.pos) {
            continue;
        }

        let acc = by_player.entry(row.player_id.clone()).or_default();
        if acc.season.is_empty() {
            acc.season = row.season.clone();
        }
        // Smallest display name wins so duplicates with formatting drift
        // cannot make the output order-dependent.
        if acc.player.is_empty() || (!row.player.is_empty() && row.player < acc.player) {
            acc.player = row.player.clone();
        }
        if row.age > 0 && (acc.age_min == 0 || row.age < acc.age_min) {
            acc.age_min = row.age;
        }
        acc.games += row.games;
        acc.games_started += row.games_started;
        acc.snap_count += row.snap_count;
        for p in position_tokens(&row.pos) {
            acc.positions.insert(p);
        }
        if !row.team.is_empty() {
            let team = row.team.to_uppercase();
            *acc.team_games.entry(team.clone()).or_insert(0) += row.games;
            *acc.team_started.entry(team.clone()).or_insert(0) += row.games_started;
            if row.snap_pct > 0.0 {
                let e = acc.team_pct.entry(team).or_insert(0.0);
                if row.snap_pct > *e {
                    *e = row.snap_pct;
                }
            }
        }
    }

    let mut out = Vec::with_capacity(by_player.len());
    for (player_id, acc) in by_player {
        if opts.starters_only && !(acc.games > 0 && acc.games == acc.games_started) {
            continue;
        }
        let team = pick_primary_team(&acc.team_started, &acc.team_games);
        let teams = acc.team_games.keys().cloned().collect::<Vec<_>>().join(",");
        let pos = acc.positions.iter().cloned().collect::<Vec<_>>().join(",");
        let snap_pct = acc.team_pct.get(&team).copied().unwrap_or(0.0);

        out.push(PlayerRecord {
            season: acc.season,
            player_id,
            player: acc.player,
            team,
            teams,
            age: acc.age_min,
            games: acc.games,
            games_started: acc.games_started,
            pos,
            snap_count: acc.snap_count,
            snap_pct,
            trends: None,
        });
    }

    out.sort_by(|a, b| (a.team.as_str(), a.player.as_str()).cmp(&(b.team.as_str(), b.player.as_str())));
    out
}

/// Primary-team precedence: highest summed games-started, then highest summed
/// games, then lexicographically smallest code. When no team recorded any
/// start, the same tie-break runs on games alone.
fn pick_primary_team(started: &BTreeMap<String, u32>, games: &BTreeMap<String, u32>) -> String {
    let mut best: Option<(&str, u32, u32)> = None;
    for (team, &g) in games {
        let gs = started.get(team).copied().unwrap_or(0);
        let better = match best {
            None => true,
            Some((bt, bgs, bg)) => {
                (gs, g) > (bgs, bg) || ((gs, g) == (bgs, bg) && team.as_str() < bt)
            }
        };
        if better {
            best = Some((team, gs, g));
        }
    }
    best.map(|(t, _, _)| t.to_string()).unwrap_or_default()
}
