// src/supply.rs
//! Figures derived from a token's reported total supply.

use serde::Serialize;
use tokio::sync::watch;

use crate::feed::MetricSnapshot;

/// Supply minted at launch; everything missing from it has been burned.
pub const DEFAULT_INITIAL_SUPPLY: f64 = 3_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SupplyStats {
    pub total_supply: f64,
    /// Nothing is locked or vested, so circulating equals total.
    pub circulating_supply: f64,
    pub burned: f64,
}

impl SupplyStats {
    /// `burned = max(0, initial - total)`.
    pub fn from_total(total_supply: f64, initial_supply: f64) -> Self {
        Self {
            total_supply,
            circulating_supply: total_supply,
            burned: (initial_supply - total_supply).max(0.0),
        }
    }

    /// `None` until the supply feed has any value.
    pub fn from_snapshot(snapshot: &MetricSnapshot, initial_supply: f64) -> Option<Self> {
        snapshot
            .value
            .filter(|v| v.is_finite())
            .map(|v| Self::from_total(v, initial_supply))
    }
}

/// `price * circulating`, floored at zero. `None` while either side is
/// missing or not finite.
pub fn market_cap(price: Option<f64>, circulating: Option<f64>) -> Option<f64> {
    let cap = price.filter(|p| p.is_finite())? * circulating.filter(|c| c.is_finite())?;
    cap.is_finite().then_some(cap.max(0.0))
}

/// Follow both feeds and publish their market cap whenever either changes.
/// The task ends once either feed closes its channel or every receiver is gone.
pub fn watch_market_cap(
    mut price: watch::Receiver<MetricSnapshot>,
    mut supply: watch::Receiver<MetricSnapshot>,
    initial_supply: f64,
) -> watch::Receiver<Option<f64>> {
    let compute = move |p: &MetricSnapshot, s: &MetricSnapshot| {
        let circulating = SupplyStats::from_snapshot(s, initial_supply)
            .map(|x| x.circulating_supply);
        market_cap(p.value, circulating)
    };
    let initial = compute(&price.borrow_and_update(), &supply.borrow_and_update());
    let (tx, rx) = watch::channel(initial);

    tokio::spawn(async move {
        loop {
            let changed = tokio::select! {
                r = price.changed() => r,
                r = supply.changed() => r,
                _ = tx.closed() => break,
            };
            if changed.is_err() {
                break;
            }
            let cap = compute(&price.borrow_and_update(), &supply.borrow_and_update());
            tx.send_if_modified(|cur| {
                let modified = *cur != cap;
                *cur = cap;
                modified
            });
        }
        tracing::debug!("market cap watcher stopped");
    });
    rx
}
