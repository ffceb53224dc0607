//! 0x Swap API (allowance-holder flavour): wire types and the upstream forwarder the proxy
//! uses.

use crate::config::HttpConfig;
use alloy::primitives::{Address, Bytes};
use eyre::Context as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const API_KEY_HEADER: &str = "0x-api-key";
pub const API_VERSION_HEADER: &str = "0x-version";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeeAmount {
    pub amount: String,
    pub token: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Fees {
    pub integrator_fee: Option<Value>,
    pub zero_ex_fee: Option<FeeAmount>,
    pub gas_fee: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BalanceIssue {
    pub token: String,
    pub actual: String,
    pub expected: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Issues {
    pub allowance: Option<Value>,
    pub balance: Option<BalanceIssue>,
    pub simulation_incomplete: bool,
    pub invalid_sources_passed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Fill {
    pub from: String,
    pub to: String,
    pub source: String,
    pub proportion_bps: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteToken {
    pub address: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Route {
    pub fills: Vec<Fill>,
    pub tokens: Vec<RouteToken>,
}

impl Route {
    /// Liquidity sources in fill order, e.g. `["Uniswap_V3", "Aerodrome"]`.
    pub fn sources(&self) -> Vec<&str> {
        self.fills.iter().map(|f| f.source.as_str()).collect()
    }
}

/// Indicative price. Only `buyAmount` is interpreted; everything else is carried through.
///
/// When the aggregator has no route it answers with `liquidityAvailable: false` and no
/// amounts, hence the options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PriceResponse {
    pub liquidity_available: bool,
    pub buy_amount: Option<String>,
    pub sell_amount: Option<String>,
    pub min_buy_amount: Option<String>,
    pub buy_token: Option<String>,
    pub sell_token: Option<String>,
    pub block_number: Option<String>,
    pub gas: Option<String>,
    pub gas_price: Option<String>,
    pub total_network_fee: Option<String>,
    pub route: Option<Route>,
    pub fees: Option<Fees>,
    pub issues: Option<Issues>,
    pub zid: Option<String>,
    /// Fields not modelled above (`tokenMetadata`, ...), kept for pass-through.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Ready-to-sign transaction attached to a firm quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteTransaction {
    pub to: Address,
    pub data: Bytes,
    /// Native value in wei, decimal.
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub gas: Option<String>,
    #[serde(default)]
    pub gas_price: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    #[serde(flatten)]
    pub price: PriceResponse,
    pub transaction: QuoteTransaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Price,
    Quote,
}

impl Endpoint {
    pub const fn path(self) -> &'static str {
        match self {
            Self::Price => "swap/allowance-holder/price",
            Self::Quote => "swap/allowance-holder/quote",
        }
    }
}

/// Upstream status plus its JSON body, relayed verbatim by the proxy.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: u16,
    pub body: Value,
}

fn host_prefix_ok(s: &str, prefix: &str) -> bool {
    if !s.starts_with(prefix) {
        return false;
    }
    matches!(s.as_bytes().get(prefix.len()), None | Some(b':' | b'/'))
}

/// https anywhere, plain http only for loopback hosts.
pub fn base_url_is_allowed(url: &str) -> bool {
    let s = url.trim();
    if s.starts_with("https://") {
        return true;
    }
    if !s.starts_with("http://") {
        return false;
    }
    host_prefix_ok(s, "http://127.0.0.1")
        || host_prefix_ok(s, "http://localhost")
        || host_prefix_ok(s, "http://[::1]")
}

fn http_client(timeout: Duration) -> eyre::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("build http client")
}

async fn read_reply(resp: reqwest::Response, what: &'static str) -> eyre::Result<UpstreamReply> {
    let status = resp.status().as_u16();
    let body: Value = resp
        .json()
        .await
        .with_context(|| format!("{what} response json"))?;
    Ok(UpstreamReply { status, body })
}

#[derive(Debug, Clone)]
pub struct ZeroExUpstream {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    api_version: String,
}

impl ZeroExUpstream {
    pub fn from_config(cfg: &HttpConfig) -> eyre::Result<Self> {
        if !base_url_is_allowed(&cfg.zeroex_base_url) {
            eyre::bail!("zeroex_base_url must use https (or http://localhost for local testing)");
        }
        Ok(Self {
            http: http_client(Duration::from_secs(cfg.request_timeout_seconds))?,
            base_url: cfg.zeroex_base_url.trim().trim_end_matches('/').to_owned(),
            api_key: cfg
                .zeroex_api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_owned),
            api_version: cfg.zeroex_api_version.clone(),
        })
    }

    pub const fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn forward(
        &self,
        endpoint: Endpoint,
        params: &[(&'static str, String)],
    ) -> eyre::Result<UpstreamReply> {
        let Some(key) = &self.api_key else {
            eyre::bail!("ZERO_EX_API_KEY is not set");
        };
        let url = format!("{}/{}", self.base_url, endpoint.path());
        debug!(path = endpoint.path(), "forwarding to 0x");
        let resp = self
            .http
            .get(url)
            .query(params)
            .header(API_KEY_HEADER, key)
            .header(API_VERSION_HEADER, &self.api_version)
            .send()
            .await
            .context("0x request")?;
        read_reply(resp, "0x").await
    }
}

/// Forwards analytics events to the ingestion endpoint.
#[derive(Debug, Clone)]
pub struct AnalyticsForwarder {
    http: Client,
    url: String,
}

impl AnalyticsForwarder {
    pub fn from_config(cfg: &HttpConfig) -> eyre::Result<Self> {
        if !base_url_is_allowed(&cfg.analytics_url) {
            eyre::bail!("analytics_url must use https (or http://localhost for local testing)");
        }
        Ok(Self {
            http: http_client(Duration::from_secs(cfg.request_timeout_seconds))?,
            url: cfg.analytics_url.trim().to_owned(),
        })
    }

    pub async fn forward(&self, event: &Value) -> eyre::Result<UpstreamReply> {
        let resp = self
            .http
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(event)
            .send()
            .await
            .context("analytics request")?;
        read_reply(resp, "analytics").await
    }
}
