// src/source/http.rs
use std::time::Duration;

use anyhow::{bail, Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;

use super::retry::{permanent, RetryPolicy};
use super::{round_to, MetricSource, WHOLE_UNITS};

/// Field names checked, in order, on a JSON object body.
const JSON_FIELDS: [&str; 3] = ["result", "value", "total"];

/// GET a URL that reports one number, as JSON or as text.
pub struct HttpNumericSource {
    name: String,
    url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
    decimals: u32,
}

impl HttpNumericSource {
    pub fn new(url: impl Into<String>, retry: RetryPolicy) -> Result<Self> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .user_agent(concat!("live-metric-feed/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .build()
            .context("building http client")?;
        Ok(Self {
            name: format!("http:{url}"),
            url,
            client,
            retry,
            decimals: WHOLE_UNITS,
        })
    }

    /// Decimal places kept after extraction (whole units by default).
    pub fn with_decimals(mut self, decimals: u32) -> Self {
        self.decimals = decimals;
        self
    }

    async fn read_once(&self) -> Result<f64> {
        let resp = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "*/*")
            .send()
            .await
            .with_context(|| format!("GET {}", self.url))?;

        let status = resp.status();
        if status.is_client_error() {
            return Err(permanent(format!("GET {} answered {status}", self.url)));
        }
        if !status.is_success() {
            bail!("GET {} answered {status}", self.url);
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = resp.text().await.context("reading response body")?;

        match extract_numeric(content_type.as_deref(), &body) {
            Some(v) => Ok(v),
            None => {
                tracing::debug!(
                    source = %self.name,
                    body = %truncate(&body, 200),
                    "no numeric value in body"
                );
                Err(permanent("no finite numeric value in response"))
            }
        }
    }
}

#[async_trait::async_trait]
impl MetricSource for HttpNumericSource {
    async fn fetch(&self) -> Result<f64> {
        let raw = self.retry.run(&self.name, |_| self.read_once()).await?;
        Ok(round_to(raw, self.decimals))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Pull one finite number out of a response body.
///
/// JSON is tried when the content type says so or the body looks like an
/// object/array; otherwise, or when JSON yields nothing, the first numeric
/// token of the text is used. Grouped thousands (`2,901,442.5`) count as one
/// token.
pub fn extract_numeric(content_type: Option<&str>, body: &str) -> Option<f64> {
    let trimmed = body.trim();
    let looks_json = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json"))
        || trimmed.starts_with('{')
        || trimmed.starts_with('[');

    if looks_json {
        if let Some(v) = serde_json::from_str::<Value>(trimmed)
            .ok()
            .as_ref()
            .and_then(number_from_json)
        {
            return Some(v);
        }
    }
    number_from_text(body)
}

fn number_from_json(json: &Value) -> Option<f64> {
    let candidate = JSON_FIELDS
        .iter()
        .filter_map(|k| json.get(*k))
        .find(|v| !v.is_null())
        .unwrap_or(json);

    let n = match candidate {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_loose(s),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// `"2,901,442.5 "` -> 2901442.5; falls back to the first numeric token.
fn parse_loose(s: &str) -> Option<f64> {
    let compact: String = s.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    match compact.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => number_from_text(s),
    }
}

fn number_from_text(text: &str) -> Option<f64> {
    static RE_NUM: OnceCell<Regex> = OnceCell::new();
    let re = RE_NUM.get_or_init(|| {
        Regex::new(r"-?\d{1,3}(?:,\d{3})+(?:\.\d+)?|-?\d+(?:\.\d+)?").unwrap()
    });
    let m = re.find(text)?;
    let v: f64 = m.as_str().replace(',', "").parse().ok()?;
    v.is_finite().then_some(v)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
