//! Identity reconciliation across the two upstream namespaces.
//!
//! The feed keys players by its own league ids; the site keys them by stable
//! per-player page codes. The cross-reference file joins the two, but it is
//! sparse, so resolution walks a fixed precedence chain and always produces
//! *some* identifier rather than dropping a row. Team abbreviations likewise
//! differ between the namespaces and translate through a static table.

use std::collections::HashMap;

use once_cell::sync::Lazy;

// ---------------------------------------------------------------------------
// Name / id normalization
// ---------------------------------------------------------------------------

/// Normalize a display name for cross-source matching: uppercase, strip a
/// fixed punctuation set (including the accented apostrophe variants the feed
/// emits), map dash variants to spaces, collapse whitespace.
///
/// "D'Onta Foreman-Smith" and "DONTA FOREMAN SMITH" normalize identically.
pub fn normalize_name(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.to_uppercase().chars() {
        match c {
            '.' | ',' | '\'' | '`' | '’' | '(' | ')' => {}
            '-' | '–' | '—' => out.push(' '),
            other => out.push(other),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a site player id: accept `XyzAb00`, `X/XyzAb00` or
/// `/players/X/XyzAb00` forms and return the bare code.
pub fn normalize_site_id(id: &str) -> String {
    let id = id.trim();
    let id = id.strip_prefix("/players/").unwrap_or(id);
    id.rsplit('/').next().unwrap_or(id).to_string()
}

// ---------------------------------------------------------------------------
// Team-code translation
// ---------------------------------------------------------------------------

/// Codes that differ between the feed and site namespaces. Everything else
/// is identical and passes through unchanged.
const TEAM_CODE_PAIRS: &[(&str, &str)] = &[
    // (feed, site)
    ("GB", "GNB"),
    ("KC", "KAN"),
    ("LV", "LVR"),
    ("NE", "NWE"),
    ("NO", "NOR"),
    ("SF", "SFO"),
    ("TB", "TAM"),
];

static FEED_TO_SITE: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| TEAM_CODE_PAIRS.iter().copied().collect());

static SITE_TO_FEED: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| TEAM_CODE_PAIRS.iter().map(|&(f, s)| (s, f)).collect());

/// Translate a feed team code to the site namespace. Unknown codes pass
/// through uppercased.
pub fn feed_team_to_site(abbr: &str) -> String {
    let up = abbr.trim().to_uppercase();
    FEED_TO_SITE.get(up.as_str()).map_or(up, |s| s.to_string())
}

/// Translate a site team code to the feed namespace. Unknown codes pass
/// through uppercased.
pub fn site_team_to_feed(abbr: &str) -> String {
    let up = abbr.trim().to_uppercase();
    SITE_TO_FEED.get(up.as_str()).map_or(up, |s| s.to_string())
}

// ---------------------------------------------------------------------------
// Identity map + resolution
// ---------------------------------------------------------------------------

/// Which namespace a row's own identifier lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdNamespace {
    /// Already a site (canonical) id; no lookup needed.
    Canonical,
    /// A feed-local id that must be cross-referenced.
    Feed,
}

/// How a canonical id was obtained, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// The row's own id was already canonical.
    Native,
    /// Found via the id cross-reference map.
    IdMap,
    /// Found via normalized display name.
    NameMap,
    /// Nothing resolved; the feed id is used verbatim as a stand-in.
    Fallback,
}

/// The outcome of a resolution: the best available canonical identifier and
/// where it came from. Rows are never dropped for failing to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub id: String,
    pub provenance: Provenance,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        self.provenance != Provenance::Fallback
    }
}

/// Cross-reference maps built from the identity file. Read-only during a
/// pipeline run; either map may be sparse or empty (an absent identity file
/// degrades resolution to name matching, or to pure fallback).
#[derive(Debug, Default, Clone)]
pub struct IdentityMap {
    by_source_id: HashMap<String, String>,
    by_name: HashMap<String, String>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feed-id → canonical-id pair.
    pub fn insert_id(&mut self, feed_id: impl Into<String>, canonical: impl Into<String>) {
        self.by_source_id.insert(feed_id.into(), canonical.into());
    }

    /// Register a display-name → canonical-id pair (name is normalized here).
    pub fn insert_name(&mut self, display: &str, canonical: impl Into<String>) {
        self.by_name.insert(normalize_name(display), canonical.into());
    }

    pub fn is_empty(&self) -> bool {
        self.by_source_id.is_empty() && self.by_name.is_empty()
    }

    pub fn id_entries(&self) -> usize {
        self.by_source_id.len()
    }

    pub fn name_entries(&self) -> usize {
        self.by_name.len()
    }

    /// Resolve the best canonical id for a row, in precedence order:
    /// own canonical id → id-map lookup → name lookup → feed id verbatim.
    pub fn resolve(&self, id: &str, namespace: IdNamespace, display_name: &str) -> Resolution {
        if namespace == IdNamespace::Canonical && !id.is_empty() {
            return Resolution { id: id.to_string(), provenance: Provenance::Native };
        }
        if let Some(canonical) = self.by_source_id.get(id) {
            if !canonical.is_empty() {
                return Resolution { id: canonical.clone(), provenance: Provenance::IdMap };
            }
        }
        if let Some(canonical) = self.by_name.get(&normalize_name(display_name)) {
            if !canonical.is_empty() {
                return Resolution { id: canonical.clone(), provenance: Provenance::NameMap };
            }
        }
        Resolution { id: id.to_string(), provenance: Provenance::Fallback }
    }
}

// ---------------------------------------------------------------------------
// Position backfill maps
// ---------------------------------------------------------------------------

/// Canonical-position lookups sourced from previously persisted records:
/// by canonical id first, then by normalized display name. Used to fill or
/// canonicalize the feed's often-empty position column.
#[derive(Debug, Default, Clone)]
pub struct PositionMaps {
    pub by_id: HashMap<String, String>,
    pub by_name: HashMap<String, String>,
}

impl PositionMaps {
    /// Preferred canonical position for a player, if any source knows one.
    pub fn lookup(&self, player_id: &str, display_name: &str) -> Option<&str> {
        if let Some(p) = self.by_id.get(player_id) {
            if !p.is_empty() {
                return Some(p);
            }
        }
        self.by_name
            .get(&normalize_name(display_name))
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }

    /// Merge name entries from another map without overwriting existing ones.
    pub fn merge_names(&mut self, other: HashMap<String, String>) {
        for (k, v) in other {
            self.by_name.entry(k).or_insert(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name_punctuation_and_dashes() {
        assert_eq!(normalize_name("D'Onta Foreman"), "DONTA FOREMAN");
        assert_eq!(normalize_name("Smith-Njigba, J.J."), "SMITH NJIGBA JJ");
        assert_eq!(normalize_name("  Ja’Marr   Chase "), "JAMARR CHASE");
        assert_eq!(normalize_name("A–B—C"), "A B C");
    }

    #[test]
    fn test_normalize_site_id_forms() {
        assert_eq!(normalize_site_id("WattJJ00"), "WattJJ00");
        assert_eq!(normalize_site_id("W/WattJJ00"), "WattJJ00");
        assert_eq!(normalize_site_id("/players/W/WattJJ00"), "WattJJ00");
        assert_eq!(normalize_site_id("  WattJJ00 "), "WattJJ00");
    }

    #[test]
    fn test_team_translation_round_trip() {
        assert_eq!(feed_team_to_site("GB"), "GNB");
        assert_eq!(site_team_to_feed("GNB"), "GB");
        assert_eq!(feed_team_to_site("tb"), "TAM");
        // Shared codes pass through
        assert_eq!(feed_team_to_site("SEA"), "SEA");
        // Unknown codes pass through unchanged
        assert_eq!(feed_team_to_site("XYZ"), "XYZ");
        assert_eq!(site_team_to_feed("XYZ"), "XYZ");
    }

    #[test]
    fn test_resolve_precedence_id_beats_name() {
        let mut map = IdentityMap::new();
        map.insert_id("00-0031234", "WattJJ00");
        map.insert_name("J.J. Watt", "SomeoneElse00");

        // Both signals present and disagreeing: the id match wins.
        let r = map.resolve("00-0031234", IdNamespace::Feed, "J.J. Watt");
        assert_eq!(r.id, "WattJJ00");
        assert_eq!(r.provenance, Provenance::IdMap);
    }

    #[test]
    fn test_resolve_canonical_short_circuits() {
        let mut map = IdentityMap::new();
        map.insert_id("WattJJ00", "WrongWay00");
        let r = map.resolve("WattJJ00", IdNamespace::Canonical, "J.J. Watt");
        assert_eq!(r.id, "WattJJ00");
        assert_eq!(r.provenance, Provenance::Native);
    }

    #[test]
    fn test_resolve_name_fallback() {
        let mut map = IdentityMap::new();
        map.insert_name("John Doe", "DoeJo00");
        let r = map.resolve("00-0099999", IdNamespace::Feed, "JOHN DOE");
        assert_eq!(r.id, "DoeJo00");
        assert_eq!(r.provenance, Provenance::NameMap);
    }

    #[test]
    fn test_resolve_never_drops() {
        let map = IdentityMap::new();
        let r = map.resolve("00-0099999", IdNamespace::Feed, "Unknown Player");
        assert_eq!(r.id, "00-0099999");
        assert_eq!(r.provenance, Provenance::Fallback);
        assert!(!r.is_resolved());
    }

    #[test]
    fn test_position_maps_prefer_id() {
        let mut maps = PositionMaps::default();
        maps.by_id.insert("DoeJo00".into(), "CB".into());
        maps.by_name.insert(normalize_name("John Doe"), "SS".into());
        assert_eq!(maps.lookup("DoeJo00", "John Doe"), Some("CB"));
        assert_eq!(maps.lookup("Other00", "John Doe"), Some("SS"));
        assert_eq!(maps.lookup("Other00", "Nobody"), None);
    }

    #[test]
    fn test_position_maps_merge_does_not_overwrite() {
        let mut maps = PositionMaps::default();
        maps.by_name.insert("JOHN DOE".into(), "CB".into());
        let mut extra = HashMap::new();
        extra.insert("JOHN DOE".to_string(), "LB".to_string());
        extra.insert("JANE ROE".to_string(), "FS".to_string());
        maps.merge_names(extra);
        assert_eq!(maps.by_name["JOHN DOE"], "CB");
        assert_eq!(maps.by_name["JANE ROE"], "FS");
    }
}
