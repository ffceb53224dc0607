//! Price/quote client for the same-origin proxy routes.

use crate::amount::{format_units, parse_base_units, parse_units};
use crate::errors::{ApiError, SwapError};
use crate::registry::{self, Token};
use crate::swap::state::SwapState;
use crate::zeroex::{PriceResponse, QuoteResponse};
use alloy::primitives::{Address, U256};
use eyre::Context as _;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_SLIPPAGE_BPS: u32 = 50;

/// One price or quote lookup, already scaled into base units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub chain_id: u64,
    pub sell_token: Address,
    pub buy_token: Address,
    pub sell_amount: U256,
    pub taker: Option<Address>,
    pub slippage_bps: Option<u32>,
}

impl SwapRequest {
    /// Build a request for `amount` (a UI decimal string) in `state`'s pair and chain.
    pub fn from_state(
        state: &SwapState,
        amount: &str,
        taker: Option<Address>,
        slippage_bps: Option<u32>,
    ) -> Result<Self, SwapError> {
        registry::ensure_supported_chain(state.chain_id)?;
        let sell_amount = parse_units(amount, state.sell_token.decimals)
            .map_err(|e| SwapError::InvalidAmount(e.to_string()))?;
        Ok(Self {
            chain_id: state.chain_id,
            sell_token: state.sell_token.address,
            buy_token: state.buy_token.address,
            sell_amount,
            taker,
            slippage_bps,
        })
    }

    /// Query pairs in the order the proxy forwards them.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut q = vec![
            ("chainId", self.chain_id.to_string()),
            ("sellToken", self.sell_token.to_string()),
            ("buyToken", self.buy_token.to_string()),
            ("sellAmount", self.sell_amount.to_string()),
        ];
        if let Some(t) = self.taker {
            q.push(("taker", t.to_string()));
        }
        if let Some(bps) = self.slippage_bps {
            q.push(("slippageBps", bps.to_string()));
        }
        q
    }
}

/// `buyAmount` in UI units of `buy_token`; `None` when the aggregator had no route.
pub fn format_buy_amount(resp: &PriceResponse, buy_token: &Token) -> eyre::Result<Option<String>> {
    let Some(raw) = resp.buy_amount.as_deref() else {
        return Ok(None);
    };
    let base = parse_base_units(raw)?;
    format_units(base, buy_token.decimals).map(Some)
}

/// Anything that can answer price and quote requests. The HTTP client is the real one;
/// sessions are generic so they can be driven by a canned source.
pub trait QuoteSource {
    fn fetch_price(
        &self,
        req: &SwapRequest,
    ) -> impl Future<Output = Result<PriceResponse, ApiError>> + Send;

    fn fetch_quote(
        &self,
        req: &SwapRequest,
    ) -> impl Future<Output = Result<QuoteResponse, ApiError>> + Send;
}

#[derive(Debug, Clone)]
pub struct SwapClient {
    http: Client,
    base_url: String,
}

impl SwapClient {
    pub fn new(base_url: &str, timeout: Duration) -> eyre::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_owned(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        req: &SwapRequest,
    ) -> Result<T, ApiError> {
        registry::ensure_supported_chain(req.chain_id)?;
        let url = format!("{}{path}", self.base_url);
        debug!(%url, chain_id = req.chain_id, "proxy request");
        let resp = self.http.get(url).query(&req.query_pairs()).send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let message = error_message(&bytes)
                .or_else(|| status.canonical_reason().map(str::to_owned))
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(ApiError::Upstream {
                status: status.as_u16(),
                message,
            });
        }
        serde_json::from_slice(&bytes).map_err(|e| {
            warn!(error = %e, path, "could not decode proxy response");
            ApiError::Parse(e.to_string())
        })
    }
}

/// The `message` (or `reason`) field of an error body, if it has one.
fn error_message(body: &[u8]) -> Option<String> {
    let v: Value = serde_json::from_slice(body).ok()?;
    ["message", "reason"]
        .iter()
        .find_map(|k| v.get(k).and_then(Value::as_str))
        .map(str::to_owned)
}

impl QuoteSource for SwapClient {
    async fn fetch_price(&self, req: &SwapRequest) -> Result<PriceResponse, ApiError> {
        self.get_json("/api/price", req).await
    }

    async fn fetch_quote(&self, req: &SwapRequest) -> Result<QuoteResponse, ApiError> {
        if req.taker.is_none() {
            return Err(SwapError::MissingTaker.into());
        }
        self.get_json("/api/quote", req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BASE_CHAIN_ID;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use std::net::SocketAddr;

    fn base_token(symbol: &str) -> Token {
        let t = registry::chain(BASE_CHAIN_ID).and_then(|c| c.token_by_symbol(symbol));
        assert!(t.is_some(), "missing base token {symbol}");
        t.unwrap_or_else(|| registry::default_chain().default_pair().0)
    }

    async fn spawn(router: Router) -> eyre::Result<SocketAddr> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            drop(axum::serve(listener, router).await);
        });
        Ok(addr)
    }

    #[test]
    fn hundred_usdc_scales_to_base_units() -> eyre::Result<()> {
        let state = SwapState::default();
        assert_eq!(state.sell_token.symbol, "USDC");
        let req = SwapRequest::from_state(&state, "100", None, Some(DEFAULT_SLIPPAGE_BPS))?;
        let q = req.query_pairs();
        assert!(q.contains(&("sellAmount", "100000000".to_owned())));
        assert!(q.contains(&("chainId", "8453".to_owned())));
        assert!(q.contains(&("slippageBps", "50".to_owned())));
        assert!(!q.iter().any(|(k, _)| *k == "taker"));
        Ok(())
    }

    #[test]
    fn unsupported_chain_is_rejected_before_any_request() {
        let state = SwapState {
            chain_id: 1,
            ..SwapState::default()
        };
        let r = SwapRequest::from_state(&state, "1", None, None);
        assert_eq!(r, Err(SwapError::UnsupportedChain(1)));
    }

    #[test]
    fn weth_buy_amount_is_decoded_with_18_decimals() -> eyre::Result<()> {
        let resp = PriceResponse {
            buy_amount: Some("38000000000000000".to_owned()),
            liquidity_available: true,
            ..PriceResponse::default()
        };
        let out = format_buy_amount(&resp, &base_token("WETH"))?;
        assert_eq!(out.as_deref(), Some("0.038"));
        assert_eq!(format_buy_amount(&PriceResponse::default(), &base_token("WETH"))?, None);
        Ok(())
    }

    #[tokio::test]
    async fn non_ok_status_carries_upstream_message() -> eyre::Result<()> {
        let router = Router::new().route(
            "/api/price",
            get(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(serde_json::json!({ "message": "Service Unavailable" })),
                )
            }),
        );
        let addr = spawn(router).await?;
        let client = SwapClient::new(&format!("http://{addr}"), DEFAULT_TIMEOUT)?;
        let req = SwapRequest::from_state(&SwapState::default(), "100", None, None)?;
        match client.fetch_price(&req).await {
            Err(ApiError::Upstream { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "Service Unavailable");
            }
            other => eyre::bail!("expected upstream error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn reason_field_is_used_when_message_is_absent() -> eyre::Result<()> {
        let router = Router::new().route(
            "/api/price",
            get(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "name": "INPUT_INVALID", "reason": "Validation Failed" })),
                )
            }),
        );
        let addr = spawn(router).await?;
        let client = SwapClient::new(&format!("http://{addr}"), DEFAULT_TIMEOUT)?;
        let req = SwapRequest::from_state(&SwapState::default(), "1", None, None)?;
        let err = client.fetch_price(&req).await.err();
        assert_eq!(
            err.and_then(|e| e.inline_text()).as_deref(),
            Some("Validation Failed")
        );
        Ok(())
    }

    #[tokio::test]
    async fn price_request_sends_expected_query() -> eyre::Result<()> {
        use axum::extract::Query;
        use std::collections::HashMap;

        let router = Router::new().route(
            "/api/price",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                Json(serde_json::json!({
                    "liquidityAvailable": true,
                    "buyAmount": "38000000000000000",
                    "sellAmount": q.get("sellAmount").cloned().unwrap_or_default(),
                }))
            }),
        );
        let addr = spawn(router).await?;
        let client = SwapClient::new(&format!("http://{addr}/"), DEFAULT_TIMEOUT)?;
        let req = SwapRequest::from_state(&SwapState::default(), "100", None, Some(50))?;
        let resp = client.fetch_price(&req).await?;
        assert_eq!(resp.sell_amount.as_deref(), Some("100000000"));
        Ok(())
    }

    #[tokio::test]
    async fn quote_without_taker_fails_locally() -> eyre::Result<()> {
        let client = SwapClient::new("http://127.0.0.1:9", DEFAULT_TIMEOUT)?;
        let req = SwapRequest::from_state(&SwapState::default(), "1", None, None)?;
        let r = client.fetch_quote(&req).await;
        assert!(matches!(r, Err(ApiError::Invalid(SwapError::MissingTaker))));
        Ok(())
    }
}
