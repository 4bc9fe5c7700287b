//! Upstream boundary adapters.
//!
//! Three read-only inputs feed the pipeline:
//! - [`site`]: the HTML sports-reference site (roster pages, snap-count
//!   totals, per-game participation columns), pages keyed by (team path,
//!   season);
//! - [`feed`]: the community data project's versioned flat-file exports,
//!   keyed by (dataset, season), columns addressed by header name only;
//! - [`idmap`]: the identity cross-reference file joining the feed's player
//!   ids to the site's canonical codes.
//!
//! Each adapter separates fetching from parsing so the parse half stays pure
//! and testable against fixture text.

pub mod feed;
pub mod idmap;
pub mod site;

use thiserror::Error;

use crate::fetch::FetchError;

/// Failure taxonomy at a source boundary. Schema failures are soft: the
/// engine logs them, skips the resource and moves on.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The document arrived but the expected table/columns did not resolve.
    #[error("schema: {0}")]
    Schema(String),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
}

impl SourceError {
    /// Whether the run should stop instead of skipping this resource.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SourceError::Fetch(FetchError::Cancelled))
    }
}
