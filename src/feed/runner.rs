// src/feed/runner.rs
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{timed_fetch, MetricFeed, MetricSnapshot};

pub const JITTER_PERIOD: Duration = Duration::from_millis(2_500);

/// Owner side of a running feed. Dropping it without `shutdown` leaves the
/// task running until the runtime stops.
pub struct FeedHandle {
    key: String,
    snapshots: watch::Receiver<MetricSnapshot>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl FeedHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn subscribe(&self) -> watch::Receiver<MetricSnapshot> {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> MetricSnapshot {
        *self.snapshots.borrow()
    }

    /// Cancel timers and in-flight fetches, then wait for the task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                tracing::warn!(feed = %self.key, error = %e, "feed task panicked");
            }
        }
    }
}

/// Drive `feed` on the current runtime: poll every `interval` (first tick
/// immediately), jitter every [`JITTER_PERIOD`] when enabled.
///
/// Fetches run as separate tasks so a slow retry never delays the next tick;
/// results are applied in completion order through the feed's sequence guard.
pub fn spawn(mut feed: MetricFeed) -> FeedHandle {
    let (tx, rx) = watch::channel(feed.snapshot());
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let key = feed.key().to_string();

    let task = tokio::spawn(async move {
        let mut poll = time::interval(feed.config().interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut jitter = time::interval_at(Instant::now() + JITTER_PERIOD, JITTER_PERIOD);
        let jitter_on = feed.has_jitter();
        let mut in_flight: JoinSet<(u64, Result<f64>)> = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => match joined {
                    Ok((seq, outcome)) => {
                        if feed.apply(seq, outcome) {
                            tx.send_replace(feed.snapshot());
                        }
                    }
                    Err(e) => {
                        let feed = feed.key();
                        tracing::warn!(feed, error = %e, "fetch task ended abnormally")
                    }
                },
                _ = poll.tick() => {
                    if let Some(seq) = feed.begin_fetch() {
                        let source = feed.source();
                        let key = feed.key().to_string();
                        in_flight.spawn(async move {
                            let outcome = timed_fetch(source.as_ref(), &key).await;
                            (seq, outcome)
                        });
                    }
                    let next = feed.snapshot();
                    tx.send_if_modified(|cur| {
                        if *cur != next {
                            *cur = next;
                            true
                        } else {
                            false
                        }
                    });
                }
                _ = jitter.tick(), if jitter_on => {
                    if feed.jitter_tick().is_some() {
                        tx.send_replace(feed.snapshot());
                    }
                }
            }
        }

        in_flight.abort_all();
        feed.close();
        tx.send_replace(feed.snapshot());
        tracing::debug!(feed = %feed.key(), "feed stopped");
    });

    FeedHandle {
        key,
        snapshots: rx,
        cancel,
        task,
    }
}
