//! snaptrack: defensive snap-count ingestion, reconciliation and trend
//! pipeline.
//!
//! Entry point. Loads configuration, initialises structured logging, wires
//! Ctrl-C into the cooperative cancellation token, and dispatches the
//! requested run(s). All pipeline parameters travel in the config struct;
//! nothing below this file reads ambient process state.

use anyhow::{bail, Result};
use tracing::{info, warn};

use snaptrack::cancel::CancelToken;
use snaptrack::config::AppConfig;
use snaptrack::engine;
use snaptrack::fetch::Fetcher;
use snaptrack::store::sqlite::SqliteSink;

const USAGE: &str = "usage: snaptrack <roster|snaps|materialize|league|trends|all>";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;
    init_logging();

    let mode = std::env::args().nth(1).unwrap_or_else(|| "all".to_string());
    let run_id = uuid::Uuid::new_v4();
    info!(
        %run_id,
        mode = %mode,
        season = %cfg.pipeline.season,
        starters_only = cfg.pipeline.starters_only,
        "snaptrack starting"
    );

    // Wire Ctrl-C into cooperative cancellation: in-flight retries stop and
    // the current run returns promptly instead of draining its budget.
    let (guard, cancel) = CancelToken::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("shutdown signal received, cancelling run");
            guard.cancel();
        }
    });

    let fetcher = Fetcher::new(cfg.http.fetch_config())?;
    let sink = SqliteSink::open(&cfg.store.db_path).await?;

    match mode.as_str() {
        "roster" => {
            let report = engine::run_roster_ingest(&cfg, &fetcher, &sink, &cancel).await?;
            log_roster(&report);
        }
        "snaps" => {
            let report = engine::run_snaps_ingest(&cfg, &fetcher, &sink, &cancel).await?;
            log_snaps(&report);
        }
        "materialize" => {
            let report = engine::run_materialize(&cfg, &sink, &cancel).await?;
            log_materialize(&report);
        }
        // One-page alternative: aggregate the league-wide defense table
        // directly, without staging roster rows first.
        "league" => {
            let report = engine::run_league_materialize(&cfg, &fetcher, &sink, &cancel).await?;
            log_materialize(&report);
        }
        "trends" => {
            let report = engine::run_trends(&cfg, &sink, &cancel).await?;
            log_trends(&report);
        }
        "all" => {
            let roster = engine::run_roster_ingest(&cfg, &fetcher, &sink, &cancel).await?;
            log_roster(&roster);
            let snaps = engine::run_snaps_ingest(&cfg, &fetcher, &sink, &cancel).await?;
            log_snaps(&snaps);
            let materialize = engine::run_materialize(&cfg, &sink, &cancel).await?;
            log_materialize(&materialize);
            let trends = engine::run_trends(&cfg, &sink, &cancel).await?;
            log_trends(&trends);
        }
        other => bail!("unknown mode {other:?}\n{USAGE}"),
    }

    info!(%run_id, "snaptrack finished");
    Ok(())
}

fn log_roster(r: &engine::IngestReport) {
    info!(
        teams_ok = r.teams_ok,
        teams_failed = ?r.teams_failed,
        passes = r.passes,
        rows = r.rows,
        written = r.write.written,
        deduped = r.write.deduped,
        "OK roster"
    );
}

fn log_snaps(r: &engine::SnapsReport) {
    info!(
        source = %r.source,
        kept = r.kept,
        dropped_non_def = r.dropped_non_def,
        unresolved = r.unresolved,
        written = r.write.written,
        "OK snaps"
    );
}

fn log_materialize(r: &engine::MaterializeReport) {
    info!(rows = r.rows_scanned, players = r.players, written = r.write.written, "OK materialize");
}

fn log_trends(r: &engine::TrendsReport) {
    info!(
        updated = r.updated,
        target_missing = r.target_missing,
        errors = r.errors,
        "OK trends"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("snaptrack=info"));

    let json_logging = std::env::var("SNAPTRACK_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
