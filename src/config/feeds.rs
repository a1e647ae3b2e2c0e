// src/config/feeds.rs
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::feed::PollConfig;
use crate::source::{Address, ChainRatioConfig};
use crate::supply::DEFAULT_INITIAL_SUPPLY;

pub const DEFAULT_RPC_URL: &str = "https://bsc-dataseed.bnbchain.org";
pub const DEFAULT_TOKEN_A: &str = "0x8f452a1fdd388a45e1080992eff051b4dd9048d2";
pub const DEFAULT_TOKEN_B: &str = "0xE68b79e51bf826534Ff37AA9CeE71a3842ee9c70";
pub const DEFAULT_PAIR: &str = "0xBe9F06b76e301b49Dc345948a7a5E3418264886A";
pub const DEFAULT_SUPPLY_URL: &str = "https://listing-api.cl8y.com/api/v3/supply/total/cl8y";
pub const DEFAULT_CACHE_PATH: &str = "cache/feeds.json";

/// Optional TOML layer. Keys are the env names without `FEED_`, lowercased.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub rpc_url: Option<String>,
    pub token_a_address: Option<String>,
    pub token_b_address: Option<String>,
    pub pair_address: Option<String>,
    pub price_seed: Option<f64>,
    pub price_poll_ms: Option<u64>,
    pub price_ttl_ms: Option<u64>,
    pub supply_url: Option<String>,
    pub supply_seed: Option<f64>,
    pub supply_poll_ms: Option<u64>,
    pub supply_ttl_ms: Option<u64>,
    pub initial_supply: Option<f64>,
    pub cache_path: Option<PathBuf>,
    pub reduced_motion: Option<bool>,
    pub jitter: Option<bool>,
}

impl FileSettings {
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing feed settings TOML")
    }
}

/// Resolved runtime settings: env over file over built-in default.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub rpc_url: String,
    pub token_a_address: String,
    pub token_b_address: String,
    pub pair_address: String,
    pub price_seed: f64,
    pub price_poll_ms: u64,
    pub price_ttl_ms: u64,
    pub supply_url: String,
    pub supply_seed: f64,
    pub supply_poll_ms: u64,
    pub supply_ttl_ms: u64,
    pub initial_supply: f64,
    pub cache_path: PathBuf,
    pub reduced_motion: bool,
    pub jitter: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            token_a_address: DEFAULT_TOKEN_A.to_string(),
            token_b_address: DEFAULT_TOKEN_B.to_string(),
            pair_address: DEFAULT_PAIR.to_string(),
            price_seed: 0.75,
            price_poll_ms: 15_000,
            price_ttl_ms: 300_000,
            supply_url: DEFAULT_SUPPLY_URL.to_string(),
            supply_seed: 2_876_179.0,
            supply_poll_ms: 60_000,
            supply_ttl_ms: 1_800_000,
            initial_supply: DEFAULT_INITIAL_SUPPLY,
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            reduced_motion: false,
            jitter: true,
        }
    }
}

/// Parse an override, keeping `fallback` (with a warning) when it does not parse.
fn parsed<T>(name: &str, raw: Option<String>, fallback: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    let Some(raw) = raw else {
        return fallback;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!(
                var = name,
                value = %raw,
                default = %fallback,
                "ignoring unparseable override"
            );
            fallback
        }
    }
}

fn finite(name: &str, raw: Option<String>, fallback: f64) -> f64 {
    let v = parsed(name, raw, fallback);
    if v.is_finite() {
        v
    } else {
        tracing::warn!(var = name, default = fallback, "ignoring non-finite override");
        fallback
    }
}

fn flag(name: &str, raw: Option<String>, fallback: bool) -> bool {
    let Some(raw) = raw else {
        return fallback;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        "" => fallback,
        _ => {
            tracing::warn!(var = name, value = %raw, "ignoring unparseable flag");
            fallback
        }
    }
}

fn text(raw: Option<String>, fallback: String) -> String {
    raw.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback)
}

impl Settings {
    /// Layer `lookup` (usually the process env) over `file` over defaults.
    pub fn from_sources<F>(file: Option<FileSettings>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let f = file.unwrap_or_default();

        let rpc_url = text(lookup("FEED_RPC_URL"), f.rpc_url.unwrap_or(d.rpc_url));
        let token_a_address = text(
            lookup("FEED_TOKEN_A_ADDRESS"),
            f.token_a_address.unwrap_or(d.token_a_address),
        );
        let token_b_address = text(
            lookup("FEED_TOKEN_B_ADDRESS"),
            f.token_b_address.unwrap_or(d.token_b_address),
        );
        let pair_address = text(
            lookup("FEED_PAIR_ADDRESS"),
            f.pair_address.unwrap_or(d.pair_address),
        );
        let supply_url = text(lookup("FEED_SUPPLY_URL"), f.supply_url.unwrap_or(d.supply_url));
        let cache_path = lookup("FEED_CACHE_PATH")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or(f.cache_path)
            .unwrap_or(d.cache_path);

        Self {
            rpc_url,
            token_a_address,
            token_b_address,
            pair_address,
            price_seed: finite(
                "FEED_PRICE_SEED",
                lookup("FEED_PRICE_SEED"),
                f.price_seed.unwrap_or(d.price_seed),
            ),
            price_poll_ms: parsed(
                "FEED_PRICE_POLL_MS",
                lookup("FEED_PRICE_POLL_MS"),
                f.price_poll_ms.unwrap_or(d.price_poll_ms),
            ),
            price_ttl_ms: parsed(
                "FEED_PRICE_TTL_MS",
                lookup("FEED_PRICE_TTL_MS"),
                f.price_ttl_ms.unwrap_or(d.price_ttl_ms),
            ),
            supply_url,
            supply_seed: finite(
                "FEED_SUPPLY_SEED",
                lookup("FEED_SUPPLY_SEED"),
                f.supply_seed.unwrap_or(d.supply_seed),
            ),
            supply_poll_ms: parsed(
                "FEED_SUPPLY_POLL_MS",
                lookup("FEED_SUPPLY_POLL_MS"),
                f.supply_poll_ms.unwrap_or(d.supply_poll_ms),
            ),
            supply_ttl_ms: parsed(
                "FEED_SUPPLY_TTL_MS",
                lookup("FEED_SUPPLY_TTL_MS"),
                f.supply_ttl_ms.unwrap_or(d.supply_ttl_ms),
            ),
            initial_supply: finite(
                "FEED_INITIAL_SUPPLY",
                lookup("FEED_INITIAL_SUPPLY"),
                f.initial_supply.unwrap_or(d.initial_supply),
            ),
            cache_path,
            reduced_motion: flag(
                "FEED_REDUCED_MOTION",
                lookup("FEED_REDUCED_MOTION"),
                f.reduced_motion.unwrap_or(d.reduced_motion),
            ),
            jitter: flag("FEED_JITTER", lookup("FEED_JITTER"), f.jitter.unwrap_or(d.jitter)),
        }
    }

    /// Env only, no file.
    pub fn from_env() -> Self {
        Self::from_sources(None, |k| std::env::var(k).ok())
    }

    pub fn price_poll_config(&self) -> PollConfig {
        PollConfig::new(
            Duration::from_millis(self.price_poll_ms),
            Duration::from_millis(self.price_ttl_ms),
            Some(self.price_seed),
        )
    }

    pub fn supply_poll_config(&self) -> PollConfig {
        PollConfig::new(
            Duration::from_millis(self.supply_poll_ms),
            Duration::from_millis(self.supply_ttl_ms),
            Some(self.supply_seed),
        )
    }

    /// Addresses are only validated here, so a typo fails at startup with the variable name.
    pub fn chain_ratio_config(&self) -> Result<ChainRatioConfig> {
        let addr = |name: &str, raw: &str| -> Result<Address> {
            raw.parse::<Address>()
                .with_context(|| format!("{name} is not a 20-byte hex address: {raw}"))
        };
        Ok(ChainRatioConfig {
            rpc_url: self.rpc_url.clone(),
            pair: addr("FEED_PAIR_ADDRESS", &self.pair_address)?,
            token_a: addr("FEED_TOKEN_A_ADDRESS", &self.token_a_address)?,
            token_b: addr("FEED_TOKEN_B_ADDRESS", &self.token_b_address)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let s = Settings::from_sources(None, env(&[]));
        assert_eq!(s, Settings::default());
        assert_eq!(s.price_poll_config().seed_value, Some(0.75));
        assert_eq!(s.supply_poll_config().ttl, Duration::from_millis(1_800_000));
        let chain = s.chain_ratio_config().unwrap();
        assert_eq!(chain.pair, DEFAULT_PAIR.parse::<Address>().unwrap());
    }

    #[test]
    fn env_beats_file_beats_default() {
        let file = FileSettings::parse(
            r#"
            price_seed = 0.5
            supply_poll_ms = 90000
            jitter = false
            "#,
        )
        .unwrap();
        let s = Settings::from_sources(Some(file), env(&[("FEED_PRICE_SEED", "0.9")]));
        assert_eq!(s.price_seed, 0.9);
        assert_eq!(s.supply_poll_ms, 90_000);
        assert!(!s.jitter);
        assert_eq!(s.price_poll_ms, 15_000);
    }

    #[test]
    fn bad_overrides_fall_back() {
        let s = Settings::from_sources(
            None,
            env(&[
                ("FEED_PRICE_POLL_MS", "soon"),
                ("FEED_SUPPLY_SEED", "NaN"),
                ("FEED_REDUCED_MOTION", "maybe"),
                ("FEED_RPC_URL", "   "),
            ]),
        );
        assert_eq!(s.price_poll_ms, 15_000);
        assert_eq!(s.supply_seed, 2_876_179.0);
        assert!(!s.reduced_motion);
        assert_eq!(s.rpc_url, DEFAULT_RPC_URL);
    }

    #[test]
    fn flags_and_poll_floor() {
        let s = Settings::from_sources(
            None,
            env(&[
                ("FEED_REDUCED_MOTION", "true"),
                ("FEED_JITTER", "0"),
                ("FEED_PRICE_POLL_MS", "500"),
            ]),
        );
        assert!(s.reduced_motion);
        assert!(!s.jitter);
        assert_eq!(s.price_poll_config().interval, crate::feed::MIN_POLL_INTERVAL);
    }

    #[test]
    fn invalid_address_names_the_variable() {
        let s = Settings::from_sources(None, env(&[("FEED_TOKEN_B_ADDRESS", "0x1234")]));
        let err = s.chain_ratio_config().unwrap_err();
        assert!(format!("{err:#}").contains("FEED_TOKEN_B_ADDRESS"));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        assert!(FileSettings::parse("price_sed = 1.0").is_err());
    }
}
