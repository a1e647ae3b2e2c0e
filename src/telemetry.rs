// src/telemetry.rs
//! Tracing subscriber setup and metric descriptions.
//!
//! Metrics go through the `metrics` facade; without an installed recorder
//! they are no-ops, so library users pay nothing unless they opt in.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "live_metric_feed=info,warn";
pub const ENV_LOG_JSON: &str = "FEED_LOG_JSON";

/// Install the global subscriber. `RUST_LOG` overrides the default filter,
/// `FEED_LOG_JSON=1` switches to one JSON object per line.
///
/// Safe to call twice; the second call is a no-op.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var(ENV_LOG_JSON).ok().is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Register help texts once per process.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_fetch_total", "Source fetches completed (success or failure).");
        describe_counter!(
            "feed_fetch_errors_total",
            "Fetches that failed after all retries or produced a non-finite value."
        );
        describe_counter!("feed_cache_hits_total", "Feeds started from a valid cache entry.");
        describe_counter!(
            "feed_stale_results_total",
            "Fetch results dropped because a newer result was already applied."
        );
        describe_gauge!("feed_value", "Last real value per feed.");
        describe_histogram!(
            "feed_fetch_ms",
            "Source fetch latency in milliseconds, retries included."
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_does_not_panic() {
        init_tracing();
        init_tracing();
        ensure_metrics_described();
        ensure_metrics_described();
    }
}
