// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod animate;
pub mod cache;
pub mod clock;
pub mod config;
pub mod feed;
pub mod format;
pub mod source;
pub mod supply;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::animate::{AnimationSpec, Animator};
pub use crate::cache::{CacheStore, CachedValue, FileStore, MemoryStore};
pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use crate::config::Settings;
pub use crate::feed::{Direction, FeedHandle, FeedState, MetricFeed, MetricSnapshot, PollConfig};
pub use crate::format::NumberFormat;
pub use crate::source::{ChainRatioSource, HttpNumericSource, MetricSource, RetryPolicy};
pub use crate::supply::{market_cap, SupplyStats};
