//! Community data-project adapter: weekly snap-count exports.
//!
//! The export is a delimited file with a header row; column presence and
//! order are not guaranteed stable across releases, so every lookup goes by
//! header name. Rows carry the feed's own team codes and player ids; the
//! reconciler translates both downstream.

use std::collections::HashSet;
use std::io::Read;

use tracing::debug;

use crate::cancel::CancelToken;
use crate::fetch::Fetcher;
use crate::sources::SourceError;

/// Versioned release URL for a season's snap-count export.
pub fn default_snap_counts_url(season: &str) -> String {
    format!(
        "https://github.com/nflverse/nflverse-data/releases/download/snap_counts/snap_counts_{season}.csv"
    )
}

/// One weekly row as shipped by the feed, before reconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapRow {
    pub season: u32,
    pub week: u32,
    /// Feed-namespace team code (translated later).
    pub team: String,
    pub opponent: String,
    pub player: String,
    /// Feed-namespace player id (often empty or foreign to the site).
    pub player_id: String,
    pub position: String,
    /// 0..100; empty upstream cells land as 0.
    pub defense_pct: f64,
}

/// Fetch and parse the season export. `team_filter` holds feed-namespace
/// codes; `None` keeps every team.
pub async fn fetch_snap_feed(
    fetcher: &Fetcher,
    url: &str,
    season: u32,
    team_filter: Option<&HashSet<String>>,
    cancel: &CancelToken,
) -> Result<Vec<FeedSnapRow>, SourceError> {
    debug!(url, season, "feed: GET snap counts");
    let body = fetcher.get_text(url, None, cancel).await?;
    parse_snap_feed(body.as_bytes(), season, team_filter)
}

/// Parse the export from any reader. Pure; fails only on a missing header or
/// a missing *required* column; data rows degrade field by field.
pub fn parse_snap_feed<R: Read>(
    reader: R,
    season: u32,
    team_filter: Option<&HashSet<String>>,
) -> Result<Vec<FeedSnapRow>, SourceError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = rdr.headers()?.clone();
    let col = |name: &str| -> Option<usize> {
        headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
    };

    let i_season = col("season");
    let i_week = col("week");
    let i_team = col("team");
    let i_player = col("player");
    let i_pfr_id = col("pfr_player_id");
    let i_def_pct = col("defense_pct");
    let i_opponent = col("opponent");
    let i_position = col("position");

    if i_season.is_none()
        || i_week.is_none()
        || i_team.is_none()
        || i_player.is_none()
        || i_pfr_id.is_none()
        || i_def_pct.is_none()
    {
        return Err(SourceError::Schema(
            "required columns missing (need season, week, team, player, pfr_player_id, defense_pct)"
                .to_string(),
        ));
    }

    let get = |rec: &csv::StringRecord, idx: Option<usize>| -> String {
        idx.and_then(|i| rec.get(i)).unwrap_or("").trim().to_string()
    };

    let mut out = Vec::with_capacity(4096);
    for rec in rdr.records() {
        let rec = rec?;

        let row_season: u32 = get(&rec, i_season).parse().unwrap_or(0);
        if row_season != season {
            continue;
        }
        let team = get(&rec, i_team).to_uppercase();
        if let Some(filter) = team_filter {
            if !filter.contains(&team) {
                continue;
            }
        }

        let defense_pct = {
            let raw = get(&rec, i_def_pct);
            if raw.is_empty() { 0.0 } else { raw.parse().unwrap_or(0.0) }
        };

        out.push(FeedSnapRow {
            season: row_season,
            week: get(&rec, i_week).parse().unwrap_or(0),
            team,
            opponent: get(&rec, i_opponent),
            player: get(&rec, i_player),
            player_id: get(&rec, i_pfr_id),
            position: get(&rec, i_position).to_uppercase(),
            defense_pct,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "\
season,week,team,opponent,player,pfr_player_id,position,defense_pct
2024,1,SEA,DEN,John Doe,DoeJo00,CB,0.91
2024,1,GB,PHI,Jane Roe,,LB,
2023,18,SEA,ARI,Old Row,OldRo00,SS,0.5
2024,2,TB,NO,Skip Me,SkipMe00,DT,0.25
";

    #[test]
    fn test_parse_by_header_name() {
        let rows = parse_snap_feed(FEED.as_bytes(), 2024, None).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].player_id, "DoeJo00");
        assert_eq!(rows[0].team, "SEA");
        assert!((rows[0].defense_pct - 0.91).abs() < 1e-9);
        // Empty pct and id degrade, not error
        assert_eq!(rows[1].player_id, "");
        assert_eq!(rows[1].defense_pct, 0.0);
    }

    #[test]
    fn test_season_and_team_filters() {
        let filter: HashSet<String> = ["SEA".to_string()].into_iter().collect();
        let rows = parse_snap_feed(FEED.as_bytes(), 2024, Some(&filter)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].player, "John Doe");
    }

    #[test]
    fn test_reordered_columns_still_resolve() {
        let reordered = "\
player,defense_pct,team,week,season,pfr_player_id
John Doe,0.8,SEA,3,2024,DoeJo00
";
        let rows = parse_snap_feed(reordered.as_bytes(), 2024, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].week, 3);
        // Columns absent from this release degrade to defaults
        assert_eq!(rows[0].opponent, "");
        assert_eq!(rows[0].position, "");
    }

    #[test]
    fn test_missing_required_column_is_schema_error() {
        let broken = "season,week,team,player\n2024,1,SEA,John Doe\n";
        let err = parse_snap_feed(broken.as_bytes(), 2024, None).unwrap_err();
        assert!(matches!(err, SourceError::Schema(_)));
    }

    #[test]
    fn test_default_url_embeds_season() {
        assert!(default_snap_counts_url("2024").ends_with("snap_counts_2024.csv"));
    }
}
