//! Configuration loading from TOML.
//!
//! Every per-run parameter travels in this struct and is passed explicitly
//! through call boundaries; the core never consults process environment
//! state for per-request values, so a warm process can serve back-to-back
//! runs with different parameters safely.

use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::fetch::FetchConfig;
use crate::types::Team;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub teams: TeamsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub season: String,
    /// Position allow-list for aggregation; empty keeps every position.
    #[serde(default = "default_positions")]
    pub positions: Vec<String>,
    /// Eligibility predicate: keep only players who started every game they
    /// appeared in. Off by default: every defensive player is written.
    #[serde(default)]
    pub starters_only: bool,
    /// Assigned when a feed row demonstrably played defense but no source
    /// knows its position.
    #[serde(default = "default_position")]
    pub default_position: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            season: "2024".to_string(),
            positions: default_positions(),
            starters_only: false,
            default_position: default_position(),
        }
    }
}

fn default_positions() -> Vec<String> {
    ["DE", "DT", "NT", "DL", "EDGE", "LB", "ILB", "OLB", "MLB", "CB", "DB", "S", "FS", "SS", "SAF", "NB"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_position() -> String {
    "DB".to_string()
}

impl PipelineConfig {
    /// The allow-list as uppercase tokens, `None` when empty.
    pub fn position_set(&self) -> Option<HashSet<String>> {
        let set: HashSet<String> = self
            .positions
            .iter()
            .map(|p| p.trim().to_uppercase())
            .filter(|p| !p.is_empty())
            .collect();
        if set.is_empty() {
            None
        } else {
            Some(set)
        }
    }
}

/// Team subset selection: an explicit list wins; otherwise the full list is
/// split into `chunk_total` contiguous chunks and `chunk_index` is taken.
#[derive(Debug, Deserialize, Clone)]
pub struct TeamsConfig {
    #[serde(default)]
    pub list: Vec<String>,
    #[serde(default)]
    pub chunk_index: usize,
    #[serde(default = "one")]
    pub chunk_total: usize,
    /// Randomize fetch order within the subset. Output order is unaffected.
    #[serde(default)]
    pub shuffle: bool,
}

fn one() -> usize {
    1
}

impl Default for TeamsConfig {
    fn default() -> Self {
        Self { list: Vec::new(), chunk_index: 0, chunk_total: 1, shuffle: false }
    }
}

impl TeamsConfig {
    /// Select the subset of `all` this run covers. List entries match either
    /// the display abbreviation or the URL slug, case-insensitively.
    pub fn select<'a>(&self, all: &'a [Team]) -> Vec<&'a Team> {
        if !self.list.is_empty() {
            let want: HashSet<String> = self
                .list
                .iter()
                .map(|t| t.trim().to_uppercase())
                .filter(|t| !t.is_empty())
                .collect();
            return all
                .iter()
                .filter(|t| want.contains(t.abbr) || want.contains(&t.path.to_uppercase()))
                .collect();
        }

        if self.chunk_total <= 1 {
            return all.iter().collect();
        }
        let index = self.chunk_index.min(self.chunk_total - 1);
        let size = all.len().div_ceil(self.chunk_total);
        let start = index * size;
        if start >= all.len() {
            return Vec::new();
        }
        let end = (start + size).min(all.len());
        all[start..end].iter().collect()
    }
}

/// Rate-limit tuning: per-request retries, inter-request pacing, and the
/// multi-pass cooldown schedule.
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "d_team_delay")]
    pub team_delay_ms: u64,
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "d_retry_base")]
    pub retry_base_ms: u64,
    #[serde(default = "d_retry_max")]
    pub retry_max_ms: u64,
    #[serde(default = "d_cooldown")]
    pub cooldown_ms: u64,
    /// Maximum sweeps over the pending team list.
    #[serde(default = "d_pass_max")]
    pub pass_max: u32,
    /// Base inter-pass cooldown; multiplied by the pass number.
    #[serde(default = "d_pass_cooldown")]
    pub pass_cooldown_ms: u64,
    #[serde(default = "d_timeout")]
    pub timeout_secs: u64,
}

fn d_team_delay() -> u64 { 300 }
fn d_max_attempts() -> u32 { 6 }
fn d_retry_base() -> u64 { 400 }
fn d_retry_max() -> u64 { 6000 }
fn d_cooldown() -> u64 { 7000 }
fn d_pass_max() -> u32 { 3 }
fn d_pass_cooldown() -> u64 { 12000 }
fn d_timeout() -> u64 { 30 }

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            team_delay_ms: d_team_delay(),
            max_attempts: d_max_attempts(),
            retry_base_ms: d_retry_base(),
            retry_max_ms: d_retry_max(),
            cooldown_ms: d_cooldown(),
            pass_max: d_pass_max(),
            pass_cooldown_ms: d_pass_cooldown(),
            timeout_secs: d_timeout(),
        }
    }
}

impl HttpConfig {
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            max_attempts: self.max_attempts,
            retry_base: Duration::from_millis(self.retry_base_ms),
            retry_max: Duration::from_millis(self.retry_max_ms),
            cooldown: Duration::from_millis(self.cooldown_ms),
            timeout: Duration::from_secs(self.timeout_secs),
            ..FetchConfig::default()
        }
    }

    pub fn team_delay(&self) -> Duration {
        Duration::from_millis(self.team_delay_ms.min(5000))
    }

    pub fn pass_cooldown(&self, pass: u32) -> Duration {
        Duration::from_millis(self.pass_cooldown_ms) * pass
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Also fetch the per-team season snap totals and merge them into the
    /// roster rows.
    #[serde(default = "yes")]
    pub fetch_snap_totals: bool,
}

fn d_base_url() -> String {
    "https://www.pro-football-reference.com".to_string()
}

fn yes() -> bool {
    true
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { base_url: d_base_url(), fetch_snap_totals: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    /// Override for the snap-count export URL; empty uses the default
    /// release pattern for the season.
    #[serde(default)]
    pub snap_counts_url: String,
    /// Override for the identity file URL; empty uses the default. Fetch
    /// failure degrades reconciliation to name matching.
    #[serde(default)]
    pub ids_url: String,
    /// Prefer the community feed for weekly ingestion; the site's per-game
    /// columns are the fallback.
    #[serde(default = "yes")]
    pub enabled: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            snap_counts_url: String::new(),
            ids_url: String::new(),
            enabled: yes(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "d_db_path")]
    pub db_path: String,
}

fn d_db_path() -> String {
    "snaptrack.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { db_path: d_db_path() }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }
}
