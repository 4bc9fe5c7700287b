//! Rate-limited HTTP fetcher.
//!
//! One request in flight at a time, by design: the upstream site throttles
//! aggressively, so concurrency is counterproductive. The fetcher owns
//! per-request retries (network errors, 5xx, 429 with `Retry-After`); the
//! [`Pacer`] spaces *successive* requests to different resources. Multi-pass
//! retry across resources lives in the engine, not here.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cancel::CancelToken;

/// How much of a non-retryable error body to keep for diagnostics.
const BODY_SNIPPET_LEN: usize = 256;

/// Jitter added to each exponential backoff step.
const BACKOFF_JITTER_MS: u64 = 250;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Fetch failure taxonomy. `Status` is non-retryable and surfaced immediately;
/// the rest have already consumed the retry budget by the time callers see
/// them. Callers may still re-queue the resource in a later pass.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("status {status} for {url} ({body})")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("exhausted {attempts} attempts for {url}")]
    Exhausted { url: String, attempts: u32 },

    #[error("request cancelled")]
    Cancelled,

    #[error("http transport: {0}")]
    Transport(#[from] reqwest::Error),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Retry/backoff tuning for a [`Fetcher`]. All values come from the run
/// configuration; nothing here is read from ambient process state.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub max_attempts: u32,
    /// Base backoff for 5xx/network retries; doubles per attempt.
    pub retry_base: Duration,
    /// Cap on a single backoff sleep.
    pub retry_max: Duration,
    /// Sleep on 429 when the server sends no `Retry-After`.
    pub cooldown: Duration,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            retry_base: Duration::from_millis(400),
            retry_max: Duration::from_millis(6000),
            cooldown: Duration::from_millis(7000),
            timeout: Duration::from_secs(30),
            user_agent: concat!(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 ",
                "(KHTML, like Gecko) Chrome/119 Safari/537.36 (+stats-research)"
            )
            .to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cancellable sleep
// ---------------------------------------------------------------------------

/// Sleep for `d`, returning early with `FetchError::Cancelled` if the token
/// fires first. Every wait in the fetch layer goes through here.
pub async fn pause(d: Duration, cancel: &CancelToken) -> Result<(), FetchError> {
    if cancel.is_cancelled() {
        return Err(FetchError::Cancelled);
    }
    tokio::select! {
        _ = tokio::time::sleep(d) => Ok(()),
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// HTTP GET with identity headers and bounded retries.
pub struct Fetcher {
    http: Client,
    cfg: FetchConfig,
}

impl Fetcher {
    pub fn new(cfg: FetchConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(cfg.timeout)
            .user_agent(cfg.user_agent.clone())
            .build()?;
        Ok(Self { http, cfg })
    }

    /// Fetch `url` as text. Retries network errors, 5xx and 429 up to the
    /// configured attempt budget; any other non-2xx status is returned
    /// immediately with a truncated body for diagnostics.
    pub async fn get_text(
        &self,
        url: &str,
        referer: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<String, FetchError> {
        for attempt in 0..self.cfg.max_attempts {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let mut req = self
                .http
                .get(url)
                .header("Accept-Language", "en-US,en;q=0.9");
            if let Some(r) = referer {
                req = req.header("Referer", r);
            }

            let resp = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    if attempt + 1 == self.cfg.max_attempts {
                        return Err(FetchError::Transport(e));
                    }
                    let d = self.backoff(attempt);
                    debug!(url, attempt, error = %e, backoff_ms = d.as_millis() as u64, "fetch: transport error, retrying");
                    pause(d, cancel).await?;
                    continue;
                }
            };

            let status = resp.status();

            if status.is_success() {
                match resp.text().await {
                    Ok(body) => return Ok(body),
                    Err(e) => {
                        if attempt + 1 == self.cfg.max_attempts {
                            return Err(FetchError::Transport(e));
                        }
                        pause(self.backoff(attempt), cancel).await?;
                        continue;
                    }
                }
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                let d = retry_after.unwrap_or(self.cfg.cooldown);
                warn!(url, attempt, cooldown_ms = d.as_millis() as u64, "fetch: throttled (429)");
                pause(d, cancel).await?;
                continue;
            }

            if status.is_server_error() {
                let d = self.backoff(attempt);
                debug!(url, attempt, status = status.as_u16(), backoff_ms = d.as_millis() as u64, "fetch: server error, retrying");
                pause(d, cancel).await?;
                continue;
            }

            // Non-retryable
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body: truncate(&body, BODY_SNIPPET_LEN),
            });
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts: self.cfg.max_attempts,
        })
    }

    /// Exponential backoff with jitter, capped at `retry_max`.
    fn backoff(&self, attempt: u32) -> Duration {
        backoff_delay(attempt, self.cfg.retry_base, self.cfg.retry_max)
    }
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exp = base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..BACKOFF_JITTER_MS));
    std::cmp::min(exp + jitter, max)
}

/// Parse a `Retry-After` header: either delay-seconds or an HTTP date.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if let Ok(secs) = v.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Ok(when) = DateTime::parse_from_rfc2822(v) {
        let until = when.with_timezone(&Utc) - Utc::now();
        if let Ok(d) = until.to_std() {
            return Some(d);
        }
    }
    None
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_string();
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

// ---------------------------------------------------------------------------
// Pacer
// ---------------------------------------------------------------------------

/// Spaces successive requests to *different* resources: base delay plus a
/// small random jitter so batches don't align into bursts. Retries of the
/// same resource are paced by the fetcher itself.
#[derive(Debug, Clone)]
pub struct Pacer {
    base: Duration,
    jitter: Duration,
}

impl Pacer {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            jitter: Duration::from_millis(100),
        }
    }

    /// The next inter-request delay: `base ± jitter`, clamped at zero.
    pub fn next_delay(&self) -> Duration {
        let base_ms = self.base.as_millis() as i64;
        let jitter_ms = self.jitter.as_millis() as i64;
        if jitter_ms == 0 {
            return self.base;
        }
        let ms = base_ms + rand::thread_rng().gen_range(-jitter_ms..=jitter_ms);
        Duration::from_millis(ms.max(0) as u64)
    }

    /// Wait out the inter-request delay, bailing early on cancellation.
    pub async fn wait(&self, cancel: &CancelToken) -> Result<(), FetchError> {
        pause(self.next_delay(), cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(" 30 "), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after(""), None);
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_parse_retry_after_http_date_in_past_is_none() {
        // A date in the past yields no sleep at all
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_backoff_is_capped() {
        let base = Duration::from_millis(400);
        let max = Duration::from_millis(6000);
        for attempt in 0..16 {
            let d = backoff_delay(attempt, base, max);
            assert!(d <= max, "attempt {attempt} exceeded cap: {d:?}");
        }
        // Early attempts grow roughly exponentially
        assert!(backoff_delay(0, base, max) < Duration::from_millis(700));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "péché".repeat(100);
        let t = truncate(&s, BODY_SNIPPET_LEN);
        assert!(t.len() <= BODY_SNIPPET_LEN);
        assert!(s.starts_with(&t));
    }

    #[test]
    fn test_pacer_delay_bounds() {
        let p = Pacer::new(Duration::from_millis(300));
        for _ in 0..50 {
            let d = p.next_delay();
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(400));
        }
    }

    #[tokio::test]
    async fn test_pause_returns_cancelled() {
        let (guard, token) = crate::cancel::CancelToken::new();
        guard.cancel();
        let res = pause(Duration::from_secs(60), &token).await;
        assert!(matches!(res, Err(FetchError::Cancelled)));
    }
}
