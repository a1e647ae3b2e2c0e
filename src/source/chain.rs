//! Pair price from an AMM v2 pool: one JSON-RPC batch with four `eth_call`s
//! (`balanceOf(pair)` on both tokens, `decimals()` on both tokens).
//!
//! `price = normalize(balance_b, decimals_b) / normalize(balance_a, decimals_a)`,
//! i.e. units of token B per one token A, rounded to 8 places.

use std::time::{Duration, Instant};

use alloy_primitives::{hex, Address, U256};
use alloy_sol_types::{sol, sol_data, SolCall, SolType};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::retry::{permanent, RetryPolicy};
use super::{round_to, MetricSource, PRICE_DECIMALS};

sol! {
    function balanceOf(address owner) external view returns (uint256);
    function decimals() external view returns (uint8);
}

#[derive(Debug, Clone)]
pub struct ChainRatioConfig {
    pub rpc_url: String,
    pub pair: Address,
    pub token_a: Address,
    pub token_b: Address,
}

#[derive(Serialize)]
struct RpcCall {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: (CallParams, &'static str),
}

#[derive(Serialize)]
struct CallParams {
    to: String,
    data: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcReply {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

// Batch slot ids. Replies may come back in any order.
const ID_BALANCE_A: u64 = 0;
const ID_BALANCE_B: u64 = 1;
const ID_DECIMALS_A: u64 = 2;
const ID_DECIMALS_B: u64 = 3;

fn eth_call(id: u64, to: &Address, data: Vec<u8>) -> RpcCall {
    RpcCall {
        jsonrpc: "2.0",
        id,
        method: "eth_call",
        params: (
            CallParams {
                to: format!("{to:#x}"),
                data: hex::encode_prefixed(data),
            },
            "latest",
        ),
    }
}

/// The four-call batch body for `cfg`.
pub fn batch_request(cfg: &ChainRatioConfig) -> Value {
    let balance_of = balanceOfCall { owner: cfg.pair }.abi_encode();
    let decimals = decimalsCall {}.abi_encode();
    let calls = vec![
        eth_call(ID_BALANCE_A, &cfg.token_a, balance_of.clone()),
        eth_call(ID_BALANCE_B, &cfg.token_b, balance_of),
        eth_call(ID_DECIMALS_A, &cfg.token_a, decimals.clone()),
        eth_call(ID_DECIMALS_B, &cfg.token_b, decimals),
    ];
    serde_json::to_value(calls).unwrap_or(Value::Null)
}

/// Token amount scaled down by `10^decimals`.
pub fn normalize(raw: U256, decimals: u8) -> f64 {
    let whole = raw
        .to_be_bytes::<32>()
        .iter()
        .fold(0f64, |acc, b| acc * 256.0 + f64::from(*b));
    whole / 10f64.powi(i32::from(decimals))
}

/// Decoded reads of one batch, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct PairReads {
    pub balance_a: U256,
    pub balance_b: U256,
    pub decimals_a: u8,
    pub decimals_b: u8,
}

impl PairReads {
    /// Match replies to batch slots. A missing slot is a transport problem
    /// (retryable); a slot that reports an error or undecodable return data
    /// is a sub-call failure (permanent for this round).
    pub fn from_replies(replies: &[RpcReply]) -> Result<Self> {
        let slot = |id: u64| -> Result<Vec<u8>> {
            let reply = replies
                .iter()
                .find(|r| r.id.as_u64() == Some(id))
                .ok_or_else(|| anyhow!("batch reply is missing call {id}"))?;
            if let Some(err) = &reply.error {
                let msg = format!("call {id} failed: {} ({})", err.message, err.code);
                return Err(permanent(msg));
            }
            let data = reply
                .result
                .as_deref()
                .ok_or_else(|| permanent(format!("call {id} returned no result")))?;
            hex::decode(data)
                .map_err(|e| permanent(format!("call {id} returned bad hex: {e}")))
        };
        let balance = |id: u64| -> Result<U256> {
            balanceOfCall::abi_decode_returns(&slot(id)?)
                .map_err(|e| permanent(format!("call {id}: {e}")))
        };
        let decimals = |id: u64| -> Result<u8> { decode_decimals(id, &slot(id)?) };

        Ok(Self {
            balance_a: balance(ID_BALANCE_A)?,
            balance_b: balance(ID_BALANCE_B)?,
            decimals_a: decimals(ID_DECIMALS_A)?,
            decimals_b: decimals(ID_DECIMALS_B)?,
        })
    }

    /// Unrounded price of one token A in token B.
    pub fn ratio(&self) -> Result<f64> {
        let a = normalize(self.balance_a, self.decimals_a);
        let b = normalize(self.balance_b, self.decimals_b);
        if !a.is_finite() || !b.is_finite() || a <= 0.0 {
            return Err(permanent(format!("unusable reserves: a={a}, b={b}")));
        }
        let r = b / a;
        if !r.is_finite() {
            return Err(permanent("price is not finite"));
        }
        Ok(r)
    }
}

/// Read the `decimals()` word as a full uint256 so a value wider than uint8
/// is rejected instead of truncated.
fn decode_decimals(id: u64, data: &[u8]) -> Result<u8> {
    let word = <sol_data::Uint<256>>::abi_decode(data)
        .map_err(|e| permanent(format!("call {id}: {e}")))?;
    u8::try_from(word)
        .map_err(|_| permanent(format!("call {id}: decimals {word} does not fit in uint8")))
}

pub struct ChainRatioSource {
    name: String,
    rpc_url: String,
    batch: Value,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl ChainRatioSource {
    pub fn new(config: ChainRatioConfig, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("live-metric-feed/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .build()
            .context("building json-rpc client")?;
        Ok(Self {
            name: format!("pair:{}", config.pair),
            batch: batch_request(&config),
            rpc_url: config.rpc_url,
            client,
            retry,
        })
    }

    async fn read_once(&self) -> Result<f64> {
        let t0 = Instant::now();
        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&self.batch)
            .send()
            .await
            .context("json-rpc batch send")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("json-rpc endpoint answered {status}");
        }
        let replies: Vec<RpcReply> = resp
            .json()
            .await
            .context("decoding json-rpc batch reply")?;
        let price = PairReads::from_replies(&replies)?.ratio()?;
        tracing::debug!(
            source = %self.name,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            price,
            "pair read"
        );
        Ok(price)
    }
}

#[async_trait::async_trait]
impl MetricSource for ChainRatioSource {
    async fn fetch(&self) -> Result<f64> {
        let raw = self.retry.run(&self.name, |_| self.read_once()).await?;
        Ok(round_to(raw, PRICE_DECIMALS))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::retry::is_permanent;
    use serde_json::json;

    fn word(v: u128) -> String {
        format!("0x{:064x}", v)
    }

    fn reply(id: u64, result: &str) -> RpcReply {
        serde_json::from_value(json!({"jsonrpc": "2.0", "id": id, "result": result})).unwrap()
    }

    fn cfg() -> ChainRatioConfig {
        ChainRatioConfig {
            rpc_url: "http://127.0.0.1:1".into(),
            pair: "0xBe9F06b76e301b49Dc345948a7a5E3418264886A".parse().unwrap(),
            token_a: "0x8f452a1fdd388a45e1080992eff051b4dd9048d2".parse().unwrap(),
            token_b: "0xE68b79e51bf826534Ff37AA9CeE71a3842ee9c70".parse().unwrap(),
        }
    }

    #[test]
    fn address_parse_rejects_short_and_non_hex() {
        assert!("0x1234".parse::<Address>().is_err());
        let non_hex = "0xzz9F06b76e301b49Dc345948a7a5E3418264886A";
        assert!(non_hex.parse::<Address>().is_err());
    }

    #[test]
    fn batch_has_four_eth_calls_with_expected_calldata() {
        let body = batch_request(&cfg());
        let calls = body.as_array().unwrap();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0]["method"], "eth_call");
        assert_eq!(
            calls[0]["params"][0]["to"],
            "0x8f452a1fdd388a45e1080992eff051b4dd9048d2"
        );
        assert_eq!(
            calls[0]["params"][0]["data"],
            "0x70a08231000000000000000000000000be9f06b76e301b49dc345948a7a5e3418264886a"
        );
        assert_eq!(calls[3]["params"][0]["data"], "0x313ce567");
        assert_eq!(calls[3]["params"][1], "latest");
    }

    #[test]
    fn normalize_scales_by_decimals() {
        let raw = U256::from(1_500_000_000_000_000_000u128);
        assert_eq!(normalize(raw, 18), 1.5);
        assert_eq!(normalize(U256::from(256u64), 0), 256.0);
    }

    #[test]
    fn ratio_from_out_of_order_replies() {
        // 1000 A (18dp) vs 801.234567 B (6dp)
        let replies = vec![
            reply(3, &word(6)),
            reply(1, &word(801_234_567)),
            reply(0, &word(1_000 * 10u128.pow(18))),
            reply(2, &word(18)),
        ];
        let reads = PairReads::from_replies(&replies).unwrap();
        assert_eq!(reads.decimals_a, 18);
        assert_eq!(reads.decimals_b, 6);
        let r = reads.ratio().unwrap();
        assert_eq!(round_to(r, PRICE_DECIMALS), 0.801_234_57);
    }

    #[test]
    fn sub_call_error_is_permanent() {
        let mut replies = vec![
            reply(0, &word(1)),
            reply(1, &word(1)),
            reply(2, &word(18)),
        ];
        let reverted = json!({
            "jsonrpc": "2.0",
            "id": 3,
            "error": {"code": -32000, "message": "execution reverted"},
        });
        replies.push(serde_json::from_value(reverted).unwrap());
        let e = PairReads::from_replies(&replies).unwrap_err();
        assert!(is_permanent(&e));
    }

    #[test]
    fn empty_return_data_is_permanent() {
        let replies = vec![
            reply(0, "0x"),
            reply(1, &word(1)),
            reply(2, &word(18)),
            reply(3, &word(18)),
        ];
        assert!(is_permanent(&PairReads::from_replies(&replies).unwrap_err()));
    }

    #[test]
    fn missing_slot_is_retryable() {
        let replies = vec![reply(0, &word(1)), reply(1, &word(1))];
        assert!(!is_permanent(&PairReads::from_replies(&replies).unwrap_err()));
    }

    #[test]
    fn zero_reserve_is_guarded() {
        let reads = PairReads {
            balance_a: U256::ZERO,
            balance_b: U256::from(5u64),
            decimals_a: 18,
            decimals_b: 18,
        };
        assert!(is_permanent(&reads.ratio().unwrap_err()));
    }

    #[test]
    fn oversized_decimals_word_rejected() {
        let wide = hex::decode(word(256)).unwrap();
        assert!(is_permanent(&decode_decimals(2, &wide).unwrap_err()));
        let ok = hex::decode(word(18)).unwrap();
        assert_eq!(decode_decimals(2, &ok).unwrap(), 18);
    }
}
