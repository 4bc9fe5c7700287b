//! Pipeline runs.
//!
//! Each submodule is one end-to-end run over the season scope, sequenced by
//! `main`: roster ingestion ([`ingest`]), weekly snap ingestion ([`snaps`]),
//! canonical aggregation ([`materialize`]) and trend materialization
//! ([`trends`]). All of them favor partial progress: per-resource failures
//! are logged and counted, and only a failed required write step aborts.

pub mod ingest;
pub mod materialize;
pub mod snaps;
pub mod trends;

pub use ingest::{run_roster_ingest, IngestReport};
pub use materialize::{run_league_materialize, run_materialize, MaterializeReport};
pub use snaps::{run_snaps_ingest, SnapsReport};
pub use trends::{run_trends, TrendsReport};
