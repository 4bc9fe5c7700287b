//! Identity cross-reference adapter.
//!
//! The community project publishes a player index joining its own ids to the
//! site's canonical codes, with display names as a best-effort third signal.
//! The file may be partially populated; a fetch failure degrades the whole
//! reconciliation step to name matching, it never fails the run.

use std::io::Read;

use tracing::debug;

use crate::cancel::CancelToken;
use crate::fetch::Fetcher;
use crate::reconcile::{normalize_site_id, IdentityMap};
use crate::sources::SourceError;

/// Stable "latest release" URL for the player index.
pub fn default_ids_url() -> String {
    "https://github.com/nflverse/nflverse-data/releases/download/players/players.csv".to_string()
}

/// Fetch and parse the identity file into cross-reference maps.
pub async fn fetch_identity_map(
    fetcher: &Fetcher,
    url: &str,
    cancel: &CancelToken,
) -> Result<IdentityMap, SourceError> {
    debug!(url, "idmap: GET player index");
    let body = fetcher.get_text(url, None, cancel).await?;
    parse_identity_csv(body.as_bytes())
}

/// Parse the identity file. Rows missing a canonical id are skipped; a
/// malformed row ends the scan with whatever was collected so far (a partial
/// map is still useful).
pub fn parse_identity_csv<R: Read>(reader: R) -> Result<IdentityMap, SourceError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = rdr.headers()?.clone();
    let col = |name: &str| -> Option<usize> {
        headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
    };

    let i_feed_id = col("gsis_id");
    let i_canonical = col("pfr_player_id").or_else(|| col("pfr_id"));
    let i_name = col("full_name");

    let Some(i_canonical) = i_canonical else {
        return Err(SourceError::Schema("identity file lacks a canonical id column".to_string()));
    };

    let mut map = IdentityMap::new();
    for rec in rdr.records() {
        let Ok(rec) = rec else { break };

        let canonical = rec.get(i_canonical).unwrap_or("").trim();
        if canonical.is_empty() {
            continue;
        }
        let canonical = normalize_site_id(canonical);

        if let Some(feed_id) = i_feed_id.and_then(|i| rec.get(i)) {
            let feed_id = feed_id.trim();
            if !feed_id.is_empty() {
                map.insert_id(feed_id, canonical.clone());
            }
        }
        if let Some(name) = i_name.and_then(|i| rec.get(i)) {
            let name = name.trim();
            if !name.is_empty() {
                map.insert_name(name, canonical.clone());
            }
        }
    }
    Ok(map)
}
