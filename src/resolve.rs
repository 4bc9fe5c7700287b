//! Schema resolver for upstream HTML documents.
//!
//! The reference site renders the same logical table under shifting layouts:
//! tables wrapped in comment markup, renamed or reordered columns, two-row
//! headers, secondary header rows in the body. Resolution is declarative:
//! a [`ColumnSpec`] names the semantic field and the labels/token sets that
//! are accepted for it, so new layout variants are added as data, not code.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static SEL_TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").unwrap());
static SEL_HEAD_ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("thead tr").unwrap());
static SEL_BODY_ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tbody tr").unwrap());
static SEL_ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static SEL_CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("th, td").unwrap());
static SEL_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());

/// Per-week participation cell keys look like `def_pct_7` / `defense-pct-12`;
/// the week number lives in the machine-readable key, not the caption.
static RE_WEEK_PCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:def|defense).*?pct[_-]?(\d{1,2})$").unwrap());

/// Weeks outside this range are header noise, not games.
const MAX_WEEK: u32 = 22;

// ---------------------------------------------------------------------------
// Column specs
// ---------------------------------------------------------------------------

/// Declarative mapping from a semantic field to the header labels that count
/// as a match. `synonyms` are exact normalized labels; `token_sets` accept a
/// header containing every token in a set (for verbose multi-word captions).
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub field: &'static str,
    pub synonyms: &'static [&'static str],
    pub token_sets: &'static [&'static [&'static str]],
    pub required: bool,
}

impl ColumnSpec {
    fn matches(&self, normalized: &str) -> bool {
        self.synonyms.contains(&normalized)
            || self
                .token_sets
                .iter()
                .any(|set| set.iter().all(|tok| normalized.contains(tok)))
    }
}

/// Roster-table columns. Games-started is optional: some season layouts drop
/// it, and the aggregation degrades to zero rather than rejecting the table.
pub const ROSTER_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { field: "player", synonyms: &["player"], token_sets: &[], required: true },
    ColumnSpec { field: "age", synonyms: &["age"], token_sets: &[], required: true },
    ColumnSpec { field: "pos", synonyms: &["pos", "position"], token_sets: &[], required: true },
    ColumnSpec { field: "g", synonyms: &["g", "games"], token_sets: &[], required: true },
    ColumnSpec { field: "gs", synonyms: &["gs", "games started"], token_sets: &[], required: false },
];

/// Snap-count-totals columns. Either the raw count or the percentage is
/// enough; the caller checks that at least one resolved.
pub const SNAP_TOTAL_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { field: "player", synonyms: &["player"], token_sets: &[], required: true },
    ColumnSpec {
        field: "def_num",
        synonyms: &[],
        token_sets: &[&["def", "num"]],
        required: false,
    },
    ColumnSpec {
        field: "def_pct",
        synonyms: &[],
        token_sets: &[&["def", "pct"], &["def", "percent"]],
        required: false,
    },
];

// ---------------------------------------------------------------------------
// Document-level helpers
// ---------------------------------------------------------------------------

/// The site frequently ships its data tables inside HTML comments; strip the
/// markers so the parser sees the table at all.
pub fn strip_comment_markup(html: &str) -> String {
    html.replace("<!--", "").replace("-->", "")
}

/// A resolved table: the element plus a field → cell-index map.
pub struct ResolvedTable<'a> {
    pub table: ElementRef<'a>,
    pub columns: HashMap<&'static str, usize>,
}

/// Locate the table of interest: prefer a stable `table#id` from `ids`, then
/// fall back to scanning every table for one whose header satisfies all
/// required specs. Returns `None` when nothing matches, a soft failure the
/// caller logs and skips.
pub fn find_table<'a>(
    doc: &'a Html,
    ids: &[&str],
    specs: &[ColumnSpec],
) -> Option<ResolvedTable<'a>> {
    for id in ids {
        if let Ok(sel) = Selector::parse(&format!("table#{id}")) {
            for table in doc.select(&sel) {
                if let Some(columns) = resolve_columns(table, specs) {
                    return Some(ResolvedTable { table, columns });
                }
            }
        }
    }
    for table in doc.select(&SEL_TABLE) {
        if let Some(columns) = resolve_columns(table, specs) {
            return Some(ResolvedTable { table, columns });
        }
    }
    None
}

/// Map header cells to semantic fields. Multi-row headers are handled by
/// scoring every header row and keeping the one that resolves the most
/// fields; the result is accepted only if every required field resolved.
pub fn resolve_columns(
    table: ElementRef<'_>,
    specs: &[ColumnSpec],
) -> Option<HashMap<&'static str, usize>> {
    let mut best: Option<HashMap<&'static str, usize>> = None;

    for row in table.select(&SEL_HEAD_ROW) {
        let mut columns = HashMap::new();
        for (i, cell) in row.select(&SEL_CELL).enumerate() {
            let label = normalize_header(&cell_text(cell));
            for spec in specs {
                if !columns.contains_key(spec.field) && spec.matches(&label) {
                    columns.insert(spec.field, i);
                }
            }
        }
        if best.as_ref().map_or(true, |b| columns.len() > b.len()) && !columns.is_empty() {
            best = Some(columns);
        }
    }

    let columns = best?;
    if specs
        .iter()
        .filter(|s| s.required)
        .all(|s| columns.contains_key(s.field))
    {
        Some(columns)
    } else {
        None
    }
}

/// Case-fold, cut unit/parenthetical suffixes, drop punctuation, collapse
/// whitespace. `"Games Started (GS)"` and `"games started"` both normalize
/// to `"games started"`.
pub fn normalize_header(s: &str) -> String {
    let mut s = s.trim().to_lowercase();
    if let Some(i) = s.find('(') {
        s.truncate(i);
    }
    let s = s.replace('.', "").replace('|', " ");
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Row / cell extraction
// ---------------------------------------------------------------------------

/// Data rows of a table: `tbody tr` when present, all `tr` otherwise, with
/// secondary header rows (flagged by a `thead` class marker) skipped.
pub fn data_rows<'a>(table: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    let mut rows: Vec<ElementRef<'a>> = table.select(&SEL_BODY_ROW).collect();
    if rows.is_empty() {
        rows = table.select(&SEL_ROW).collect();
    }
    rows.retain(|tr| !tr.value().attr("class").unwrap_or("").contains("thead"));
    rows
}

/// Cells of a row, header and data alike, in document order.
pub fn row_cells<'a>(row: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    row.select(&SEL_CELL).collect()
}

/// Text of a cell at a resolved index; empty when the row is short.
pub fn cell_at(cells: &[ElementRef<'_>], idx: Option<&usize>) -> String {
    idx.and_then(|&i| cells.get(i))
        .map(|c| cell_text(*c))
        .unwrap_or_default()
}

pub fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// The machine-readable key (`data-stat`) of a cell, if any.
pub fn cell_stat<'a>(cell: ElementRef<'a>) -> Option<&'a str> {
    cell.value().attr("data-stat").map(str::trim)
}

/// Resolve a per-week participation column from its cell key. Returns the
/// week number for keys like `def_pct_7`, `None` for everything else.
pub fn week_from_stat(stat: &str) -> Option<u32> {
    let caps = RE_WEEK_PCT.captures(stat)?;
    let week: u32 = caps.get(1)?.as_str().parse().ok()?;
    if (1..=MAX_WEEK).contains(&week) {
        Some(week)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Player-cell parsing
// ---------------------------------------------------------------------------

/// Extract a stable player identifier from a name cell: the last path segment
/// of the per-player link (minus the `.htm` suffix) when present, else a
/// sanitized lowercase form of the display text.
pub fn player_identity_from_cell(cell: ElementRef<'_>) -> String {
    for a in cell.select(&SEL_LINK) {
        if let Some(href) = a.value().attr("href") {
            if let Some(id) = identity_from_href(href) {
                return id;
            }
        }
    }
    sanitize_identity(&cell_text(cell))
}

fn identity_from_href(href: &str) -> Option<String> {
    let last = href.rsplit('/').next()?;
    let id = last.strip_suffix(".htm").unwrap_or(last);
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

fn sanitize_identity(display: &str) -> String {
    display
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '.' | '\''))
        .collect()
}

/// Clean a display name: strip award markers and collapse whitespace.
pub fn clean_player_name(s: &str) -> String {
    let stripped: String = s.chars().filter(|c| *c != '*' && *c != '+').collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Numeric cells
// ---------------------------------------------------------------------------

/// Parse a participation percentage cell. Blank, dash and em-dash variants
/// are "did not play" markers and resolve to 0.0, never an error. Handles
/// the unicode space/punctuation variants the site emits.
pub fn parse_pct(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() || t == "-" || t == "—" || t == "â€”" {
        return 0.0;
    }
    let cleaned: String = t
        .chars()
        .filter(|c| !matches!(c, '%' | ',' | '\u{00A0}' | '\u{2009}'))
        .collect();
    cleaned.trim().parse::<f64>().unwrap_or(0.0)
}

/// Parse an integer cell, tolerating decimal suffixes and blanks.
pub fn parse_int(s: &str, default: u32) -> u32 {
    let t = s.trim();
    if t.is_empty() {
        return default;
    }
    let head = t.split('.').next().unwrap_or(t);
    head.parse::<u32>().unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMENTED_ROSTER: &str = r##"
<html><body>
<!--
<table id="roster">
  <thead><tr><th>Player</th><th>Age</th><th>Pos</th><th>G</th><th>GS</th></tr></thead>
  <tbody>
    <tr><th data-stat="player"><a href="/players/D/DoeJo00.htm">John Doe*</a></th>
        <td data-stat="age">23</td><td data-stat="pos">CB</td>
        <td data-stat="g">10</td><td data-stat="gs">10</td></tr>
    <tr class="thead"><th>Player</th><td>Age</td><td>Pos</td><td>G</td><td>GS</td></tr>
    <tr><th data-stat="player">Jane Roe</th>
        <td data-stat="age">25</td><td data-stat="pos">SS</td>
        <td data-stat="g">17</td><td data-stat="gs">17</td></tr>
  </tbody>
</table>
-->
</body></html>"##;

    #[test]
    fn test_find_table_inside_comments() {
        let doc = Html::parse_document(&strip_comment_markup(COMMENTED_ROSTER));
        let resolved = find_table(&doc, &["roster"], ROSTER_COLUMNS).expect("table");
        assert_eq!(resolved.columns["player"], 0);
        assert_eq!(resolved.columns["gs"], 4);
        // Without stripping, nothing resolves
        let raw = Html::parse_document(COMMENTED_ROSTER);
        assert!(find_table(&raw, &["roster"], ROSTER_COLUMNS).is_none());
    }

    #[test]
    fn test_data_rows_skip_secondary_headers() {
        let doc = Html::parse_document(&strip_comment_markup(COMMENTED_ROSTER));
        let resolved = find_table(&doc, &["roster"], ROSTER_COLUMNS).unwrap();
        let rows = data_rows(resolved.table);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_player_identity_prefers_link() {
        let doc = Html::parse_document(&strip_comment_markup(COMMENTED_ROSTER));
        let resolved = find_table(&doc, &["roster"], ROSTER_COLUMNS).unwrap();
        let rows = data_rows(resolved.table);
        let cells = row_cells(rows[0]);
        assert_eq!(player_identity_from_cell(cells[0]), "DoeJo00");
        // No link: sanitized lowercase fallback
        let cells = row_cells(rows[1]);
        assert_eq!(player_identity_from_cell(cells[0]), "janeroe");
    }

    #[test]
    fn test_clean_player_name_strips_award_markers() {
        assert_eq!(clean_player_name("John Doe*"), "John Doe");
        assert_eq!(clean_player_name("  T.J.   Watt+ "), "T.J. Watt");
    }

    #[test]
    fn test_resolve_columns_synonyms_and_suffixes() {
        let html = r#"<table><thead><tr>
            <th>Player</th><th>Age</th><th>Position</th>
            <th>Games (G)</th><th>Games Started (GS)</th>
        </tr></thead><tbody><tr><td>x</td></tr></tbody></table>"#;
        let doc = Html::parse_document(html);
        let table = doc.select(&SEL_TABLE).next().unwrap();
        let cols = resolve_columns(table, ROSTER_COLUMNS).expect("columns");
        assert_eq!(cols["pos"], 2);
        assert_eq!(cols["g"], 3);
        assert_eq!(cols["gs"], 4);
    }

    #[test]
    fn test_resolve_columns_missing_required_fails() {
        let html = "<table><thead><tr><th>Player</th><th>Age</th></tr></thead></table>";
        let doc = Html::parse_document(html);
        let table = doc.select(&SEL_TABLE).next().unwrap();
        assert!(resolve_columns(table, ROSTER_COLUMNS).is_none());
    }

    #[test]
    fn test_snap_total_columns_token_sets() {
        let html = r#"<table><thead>
            <tr><th></th><th>Defense</th><th>Defense</th></tr>
            <tr><th>Player</th><th>Def. Num</th><th>Def. Pct</th></tr>
        </thead></table>"#;
        let doc = Html::parse_document(html);
        let table = doc.select(&SEL_TABLE).next().unwrap();
        let cols = resolve_columns(table, SNAP_TOTAL_COLUMNS).expect("columns");
        assert_eq!(cols["player"], 0);
        assert_eq!(cols["def_num"], 1);
        assert_eq!(cols["def_pct"], 2);
    }

    #[test]
    fn test_week_from_stat() {
        assert_eq!(week_from_stat("def_pct_7"), Some(7));
        assert_eq!(week_from_stat("defense_pct_12"), Some(12));
        assert_eq!(week_from_stat("DEF-PCT-3"), Some(3));
        assert_eq!(week_from_stat("def_pct_0"), None);
        assert_eq!(week_from_stat("def_pct_23"), None);
        assert_eq!(week_from_stat("off_pct_7"), None);
        assert_eq!(week_from_stat("player"), None);
    }

    #[test]
    fn test_parse_pct_dnp_markers() {
        assert_eq!(parse_pct(""), 0.0);
        assert_eq!(parse_pct("-"), 0.0);
        assert_eq!(parse_pct("—"), 0.0);
        assert_eq!(parse_pct("   "), 0.0);
        assert_eq!(parse_pct("junk"), 0.0);
    }

    #[test]
    fn test_parse_pct_punctuation_variants() {
        assert_eq!(parse_pct("85%"), 85.0);
        assert_eq!(parse_pct("\u{00A0}62.5%\u{2009}"), 62.5);
        assert_eq!(parse_pct("1,000"), 1000.0);
    }

    #[test]
    fn test_parse_pct_round_trip() {
        for x in [0.0, 12.5, 33.3, 85.0, 100.0] {
            let formatted = format!("{x:.1}%");
            assert!((parse_pct(&formatted) - x).abs() < 1e-9);
        }
    }

    #[test]
    fn test_parse_int_tolerates_decimals_and_blanks() {
        assert_eq!(parse_int("17", 0), 17);
        assert_eq!(parse_int("17.0", 0), 17);
        assert_eq!(parse_int("", 3), 3);
        assert_eq!(parse_int("n/a", 0), 0);
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Games Started (GS) "), "games started");
        assert_eq!(normalize_header("Pos."), "pos");
        assert_eq!(normalize_header("Def|Num"), "def num");
    }
}
