// src/source/mod.rs
pub mod chain;
pub mod http;
pub mod retry;

use anyhow::Result;

pub use alloy_primitives::Address;
pub use chain::{ChainRatioConfig, ChainRatioSource};
pub use http::HttpNumericSource;
pub use retry::RetryPolicy;

/// Decimal places kept for pair prices.
pub const PRICE_DECIMALS: u32 = 8;
/// Supply figures are reported in whole units.
pub const WHOLE_UNITS: u32 = 0;

/// A single numeric origin. Implementations own their retry budget; a returned
/// error means every attempt was spent.
#[async_trait::async_trait]
pub trait MetricSource: Send + Sync {
    async fn fetch(&self) -> Result<f64>;
    fn name(&self) -> &str;
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
