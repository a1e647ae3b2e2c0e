//! Live Metric Feed: binary entrypoint.
//! Polls the pair price and the token supply, animates them along with the
//! derived market cap and logs each rendered line when it changes. Stops on Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::{self, MissedTickBehavior};
use tracing::info;

use live_metric_feed::animate::driver::{self, DEFAULT_FRAME_PERIOD};
use live_metric_feed::feed::{self, Jitter};
use live_metric_feed::source::PRICE_DECIMALS;
use live_metric_feed::supply::watch_market_cap;
use live_metric_feed::{
    config, telemetry, AnimationSpec, Animator, ChainRatioSource, Direction, FileStore,
    HttpNumericSource, MetricFeed, MetricSnapshot, NumberFormat, SharedClock, SupplyStats,
    SystemClock,
};

const PRICE_KEY: &str = "feed:price";
const SUPPLY_KEY: &str = "feed:supply_total";
const RENDER_PERIOD: Duration = Duration::from_secs(1);

fn arrow(direction: Direction) -> &'static str {
    match direction {
        Direction::Increased => "▲",
        Direction::Decreased => "▼",
        Direction::Unchanged => "=",
        Direction::Unknown => " ",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; missing file is fine.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let settings = config::load().context("loading feed settings")?;
    info!(
        rpc = %settings.rpc_url,
        supply = %settings.supply_url,
        reduced_motion = settings.reduced_motion,
        "starting live metric feed"
    );

    let cache = Arc::new(FileStore::new(&settings.cache_path));
    info!(path = %cache.path().display(), "value cache");
    let clock: SharedClock = Arc::new(SystemClock);

    // --- Price: chain ratio, jittered between fetches ---
    let price_cfg = settings.price_poll_config();
    let price_source =
        ChainRatioSource::new(settings.chain_ratio_config()?, price_cfg.retry_policy())?;
    let mut price_feed = MetricFeed::new(
        PRICE_KEY,
        price_cfg,
        Arc::new(price_source),
        cache.clone(),
        clock.clone(),
    );
    if settings.jitter {
        price_feed = price_feed.with_jitter(Jitter::new(PRICE_DECIMALS));
    }
    let price = feed::spawn(price_feed);

    // --- Supply: HTTP endpoint ---
    let supply_cfg = settings.supply_poll_config();
    let supply_source =
        HttpNumericSource::new(settings.supply_url.clone(), supply_cfg.retry_policy())?;
    let supply = feed::spawn(MetricFeed::new(
        SUPPLY_KEY,
        supply_cfg,
        Arc::new(supply_source),
        cache.clone(),
        clock.clone(),
    ));

    // --- Animators ---
    let initial_supply = settings.initial_supply;
    let price_anim = driver::spawn(
        Animator::new(AnimationSpec::simple(), 0.0, settings.reduced_motion),
        price.subscribe(),
        |s: &MetricSnapshot| s.value,
        clock.clone(),
        DEFAULT_FRAME_PERIOD,
    );
    let burned_anim = driver::spawn(
        Animator::new(AnimationSpec::staged(), 0.0, settings.reduced_motion),
        supply.subscribe(),
        move |s: &MetricSnapshot| {
            SupplyStats::from_snapshot(s, initial_supply).map(|x| x.burned)
        },
        clock.clone(),
        DEFAULT_FRAME_PERIOD,
    );
    let circulating_anim = driver::spawn(
        Animator::new(AnimationSpec::simple(), 0.0, settings.reduced_motion),
        supply.subscribe(),
        move |s: &MetricSnapshot| {
            SupplyStats::from_snapshot(s, initial_supply).map(|x| x.circulating_supply)
        },
        clock.clone(),
        DEFAULT_FRAME_PERIOD,
    );
    let market_cap_anim = driver::spawn(
        Animator::new(AnimationSpec::simple(), 0.0, settings.reduced_motion),
        watch_market_cap(price.subscribe(), supply.subscribe(), initial_supply),
        |cap: &Option<f64>| *cap,
        clock.clone(),
        DEFAULT_FRAME_PERIOD,
    );

    // --- Render loop ---
    let price_fmt = NumberFormat::with_digits(PRICE_DECIMALS as usize).prefix("$");
    let burned_fmt = NumberFormat::with_digits(5);
    let supply_fmt = NumberFormat::default();
    let market_cap_fmt = NumberFormat::default().prefix("$");

    let mut render = time::interval(RENDER_PERIOD);
    render.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_line = String::new();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            res = &mut shutdown => {
                if let Err(e) = res {
                    tracing::warn!(error = %e, "ctrl-c handler failed, shutting down");
                }
                break;
            }
            _ = render.tick() => {
                let snap = price.latest();
                let line = format!(
                    "price {} {} | market cap {} | circulating {} | burned {}",
                    price_fmt.render(price_anim.current()),
                    arrow(snap.direction),
                    market_cap_fmt.render(market_cap_anim.current()),
                    supply_fmt.render(circulating_anim.current()),
                    burned_fmt.render(burned_anim.current()),
                );
                if line != last_line {
                    let supply_state = supply.latest().state;
                    info!(price_state = ?snap.state, ?supply_state, "{line}");
                    last_line = line;
                }
            }
        }
    }

    info!("shutting down");
    price_anim.shutdown().await;
    burned_anim.shutdown().await;
    circulating_anim.shutdown().await;
    market_cap_anim.shutdown().await;
    price.shutdown().await;
    supply.shutdown().await;
    Ok(())
}
