//! # Metric Feed
//! Cache-first polling of one [`MetricSource`].
//!
//! Lifecycle: `Uninitialized`/`Seeded`/`Fresh` at construction (cache hit wins,
//! then the configured seed), `Fresh <-> Stale` while running, `Closed` on
//! teardown. Fetch failures are silent: the last real value stays on screen.
//!
//! Jitter is display-only. It never reaches the cache and never moves
//! `direction`, which always compares real fetches with each other.

pub mod jitter;
mod runner;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use metrics::{counter, gauge, histogram};

use crate::cache::CacheStore;
use crate::clock::SharedClock;
use crate::source::{MetricSource, RetryPolicy};
use crate::telemetry::ensure_metrics_described;

pub use jitter::Jitter;
pub use runner::{spawn, FeedHandle, JITTER_PERIOD};

/// Polling faster than this is clamped.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    pub interval: Duration,
    pub ttl: Duration,
    pub seed_value: Option<f64>,
    /// Total attempts per fetch, first one included.
    pub max_retries: u32,
    pub per_attempt_timeout: Duration,
}

impl PollConfig {
    pub fn new(interval: Duration, ttl: Duration, seed_value: Option<f64>) -> Self {
        let defaults = RetryPolicy::default();
        Self {
            interval: interval.max(MIN_POLL_INTERVAL),
            ttl,
            seed_value: seed_value.filter(|v| v.is_finite()),
            max_retries: defaults.max_attempts,
            per_attempt_timeout: defaults.per_attempt_timeout,
        }
    }

    pub fn with_retries(mut self, attempts: u32) -> Self {
        self.max_retries = attempts;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = timeout;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_attempts(self.max_retries)
            .with_timeout(self.per_attempt_timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Unknown,
    Increased,
    Decreased,
    Unchanged,
}

impl Direction {
    pub fn between(prev: Option<f64>, next: f64) -> Self {
        match prev {
            None => Direction::Unknown,
            Some(p) if next > p => Direction::Increased,
            Some(p) if next < p => Direction::Decreased,
            Some(_) => Direction::Unchanged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Uninitialized,
    Seeded,
    Fresh,
    Stale,
    Closed,
}

/// What the UI reads. `value` is the displayed value (jitter included).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSnapshot {
    pub value: Option<f64>,
    pub direction: Direction,
    pub state: FeedState,
}

pub struct MetricFeed {
    key: String,
    config: PollConfig,
    source: Arc<dyn MetricSource>,
    cache: Arc<dyn CacheStore>,
    clock: SharedClock,
    jitter: Option<Jitter>,

    state: FeedState,
    real: Option<f64>,
    displayed: Option<f64>,
    direction: Direction,
    next_fetch_at_ms: i64,
    issued_seq: u64,
    applied_seq: u64,
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

impl MetricFeed {
    /// Reads the cache once; a valid entry makes the feed `Fresh` and holds
    /// off the network until that entry expires.
    pub fn new(
        key: impl Into<String>,
        config: PollConfig,
        source: Arc<dyn MetricSource>,
        cache: Arc<dyn CacheStore>,
        clock: SharedClock,
    ) -> Self {
        ensure_metrics_described();

        let key = key.into();
        let now = clock.now_ms();
        let mut feed = Self {
            key,
            config,
            source,
            cache,
            clock,
            jitter: None,
            state: FeedState::Uninitialized,
            real: None,
            displayed: None,
            direction: Direction::Unknown,
            next_fetch_at_ms: 0,
            issued_seq: 0,
            applied_seq: 0,
        };

        if let Some(hit) = feed.cache.get(&feed.key, config.ttl, now) {
            counter!("feed_cache_hits_total", "feed" => feed.key.clone()).increment(1);
            tracing::debug!(
                feed = %feed.key,
                value = hit.value,
                ts = hit.timestamp,
                "starting from cache"
            );
            feed.real = Some(hit.value);
            feed.displayed = Some(hit.value);
            feed.state = FeedState::Fresh;
            feed.next_fetch_at_ms = hit.timestamp.saturating_add(millis(config.ttl));
        } else if let Some(seed) = config.seed_value {
            tracing::debug!(feed = %feed.key, seed, "starting from seed");
            feed.real = Some(seed);
            feed.displayed = Some(seed);
            feed.state = FeedState::Seeded;
        }
        feed
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = Some(jitter);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn source(&self) -> Arc<dyn MetricSource> {
        Arc::clone(&self.source)
    }

    pub fn has_jitter(&self) -> bool {
        self.jitter.is_some()
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    /// Last value that came from the cache, a fetch, or the seed.
    pub fn real_value(&self) -> Option<f64> {
        self.real
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        MetricSnapshot {
            value: self.displayed,
            direction: self.direction,
            state: self.state,
        }
    }

    /// Decide whether this tick goes to the network. Returns the sequence
    /// number the eventual result must be applied with.
    pub fn begin_fetch(&mut self) -> Option<u64> {
        if self.state == FeedState::Closed {
            return None;
        }
        let now = self.clock.now_ms();
        if now < self.next_fetch_at_ms {
            return None;
        }
        if self.state == FeedState::Fresh {
            self.state = FeedState::Stale;
        }
        self.issued_seq += 1;
        Some(self.issued_seq)
    }

    /// Apply a finished fetch. Returns true when the snapshot changed.
    ///
    /// Results older than the newest applied one are dropped, so a slow retry
    /// from an earlier tick cannot overwrite a later answer.
    pub fn apply(&mut self, seq: u64, outcome: Result<f64>) -> bool {
        if self.state == FeedState::Closed {
            return false;
        }
        let value = match outcome {
            Ok(v) if v.is_finite() => v,
            Ok(v) => {
                tracing::debug!(feed = %self.key, value = v, "source returned a non-finite value");
                counter!("feed_fetch_errors_total", "feed" => self.key.clone()).increment(1);
                return false;
            }
            Err(e) => {
                tracing::debug!(
                    feed = %self.key,
                    error = %format!("{e:#}"),
                    "fetch failed, keeping last value"
                );
                counter!("feed_fetch_errors_total", "feed" => self.key.clone()).increment(1);
                return false;
            }
        };
        if seq <= self.applied_seq {
            tracing::debug!(
                feed = %self.key,
                seq,
                applied = self.applied_seq,
                "dropping out-of-order result"
            );
            counter!("feed_stale_results_total", "feed" => self.key.clone()).increment(1);
            return false;
        }
        self.applied_seq = seq;

        let now = self.clock.now_ms();
        self.direction = Direction::between(self.real, value);
        self.real = Some(value);
        self.displayed = Some(value);
        self.cache.set(&self.key, value, now);
        self.next_fetch_at_ms = now.saturating_add(millis(self.config.ttl));
        self.state = FeedState::Fresh;

        gauge!("feed_value", "feed" => self.key.clone()).set(value);
        tracing::debug!(feed = %self.key, value, direction = ?self.direction, "applied");
        true
    }

    /// One sequential poll step: skip while fresh, otherwise fetch and apply.
    pub async fn tick(&mut self) -> bool {
        let Some(seq) = self.begin_fetch() else {
            return false;
        };
        let source = self.source();
        let outcome = timed_fetch(source.as_ref(), &self.key).await;
        self.apply(seq, outcome)
    }

    /// Nudge the displayed value around the last real one.
    pub fn jitter_tick(&mut self) -> Option<f64> {
        if self.state == FeedState::Closed {
            return None;
        }
        let base = self.real?;
        let jitter = self.jitter.as_mut()?;
        let v = jitter.nudge(base);
        self.displayed = Some(v);
        Some(v)
    }

    pub fn close(&mut self) {
        self.state = FeedState::Closed;
    }
}

pub(crate) async fn timed_fetch(source: &dyn MetricSource, key: &str) -> Result<f64> {
    let t0 = Instant::now();
    let out = source.fetch().await;
    counter!("feed_fetch_total", "feed" => key.to_string()).increment(1);
    histogram!("feed_fetch_ms", "feed" => key.to_string())
        .record(t0.elapsed().as_secs_f64() * 1_000.0);
    out
}
