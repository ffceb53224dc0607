//! Same-origin proxy in front of the 0x swap API and the analytics ingestion endpoint.
//!
//! The API key never leaves this process: browsers and the `swap` command talk to
//! `/api/price` and `/api/quote` here, and this server adds the `0x-api-key` header upstream.

use crate::config::HttpConfig;
use crate::errors::ErrorBody;
use crate::params::{BUY_TOKEN, CHAIN_ID, SELL_AMOUNT, SELL_TOKEN};
use crate::zeroex::{AnalyticsForwarder, Endpoint, UpstreamReply, ZeroExUpstream};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use eyre::Context as _;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Instrument as _};

pub const TAKER: &str = "taker";
pub const SLIPPAGE_BPS: &str = "slippageBps";

const MSG_MISSING_KEY: &str = "ZERO_EX_API_KEY is not set";
const MSG_MISSING_PARAMS: &str = "Missing required query parameters";
const MSG_INTERNAL: &str = "Internal Server Error";

#[derive(Debug, Clone)]
pub struct ProxyState {
    upstream: ZeroExUpstream,
    analytics: AnalyticsForwarder,
}

impl ProxyState {
    pub fn from_config(cfg: &HttpConfig) -> eyre::Result<Self> {
        Ok(Self {
            upstream: ZeroExUpstream::from_config(cfg)?,
            analytics: AnalyticsForwarder::from_config(cfg)?,
        })
    }

    pub const fn has_api_key(&self) -> bool {
        self.upstream.has_api_key()
    }
}

pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/api/price", get(price))
        .route("/api/quote", get(quote))
        .route("/api/analytics", post(analytics))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Serve on `listener` until `shutdown` resolves.
pub async fn serve_on(
    listener: TcpListener,
    state: ProxyState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> eyre::Result<()> {
    let addr = listener.local_addr().context("listener address")?;
    if !state.has_api_key() {
        warn!("ZERO_EX_API_KEY is not set; /api/price and /api/quote will answer 500");
    }
    info!(%addr, "proxy listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("serve")
}

/// Bind `listen_addr` and serve until ctrl-c.
pub async fn serve(listen_addr: &str, state: ProxyState) -> eyre::Result<()> {
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("bind {listen_addr}"))?;
    serve_on(listener, state, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

fn message(status: StatusCode, msg: &str) -> Response {
    (status, Json(ErrorBody::new(msg))).into_response()
}

/// Relay the upstream status and body unchanged.
fn relay(reply: UpstreamReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(reply.body)).into_response()
}

/// First value for `key`; an empty value counts as absent.
fn first<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

/// Upstream query for `endpoint`, or `None` when a required parameter is missing.
fn upstream_params(
    endpoint: Endpoint,
    pairs: &[(String, String)],
) -> Option<Vec<(&'static str, String)>> {
    let mut out = Vec::with_capacity(6);
    for key in [CHAIN_ID, SELL_TOKEN, BUY_TOKEN, SELL_AMOUNT] {
        out.push((key, first(pairs, key)?.to_owned()));
    }
    match (endpoint, first(pairs, TAKER)) {
        (_, Some(t)) => out.push((TAKER, t.to_owned())),
        (Endpoint::Quote, None) => return None,
        (Endpoint::Price, None) => {}
    }
    if let Some(s) = first(pairs, SLIPPAGE_BPS) {
        out.push((SLIPPAGE_BPS, s.to_owned()));
    }
    Some(out)
}

async fn proxy_swap(state: &ProxyState, endpoint: Endpoint, pairs: &[(String, String)]) -> Response {
    if !state.upstream.has_api_key() {
        error!(path = endpoint.path(), "{MSG_MISSING_KEY}");
        return message(StatusCode::INTERNAL_SERVER_ERROR, MSG_MISSING_KEY);
    }
    let Some(params) = upstream_params(endpoint, pairs) else {
        return message(StatusCode::BAD_REQUEST, MSG_MISSING_PARAMS);
    };

    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("upstream", %request_id, path = endpoint.path());
    match state.upstream.forward(endpoint, &params).instrument(span).await {
        Ok(reply) => {
            info!(%request_id, status = reply.status, "0x replied");
            relay(reply)
        }
        Err(e) => {
            error!(%request_id, error = %format!("{e:#}"), "error fetching from 0x");
            message(StatusCode::INTERNAL_SERVER_ERROR, MSG_INTERNAL)
        }
    }
}

async fn price(
    State(state): State<Arc<ProxyState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    proxy_swap(&state, Endpoint::Price, &pairs).await
}

async fn quote(
    State(state): State<Arc<ProxyState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    proxy_swap(&state, Endpoint::Quote, &pairs).await
}

async fn analytics(State(state): State<Arc<ProxyState>>, Json(event): Json<Value>) -> Response {
    let request_id = uuid::Uuid::new_v4();
    match state.analytics.forward(&event).await {
        Ok(reply) => {
            if (200..300).contains(&reply.status) {
                info!(%request_id, status = reply.status, "analytics accepted");
            } else {
                warn!(%request_id, status = reply.status, body = %reply.body, "analytics rejected");
            }
            relay(reply)
        }
        Err(e) => {
            error!(%request_id, error = %format!("{e:#}"), "analytics forward failed");
            message(StatusCode::INTERNAL_SERVER_ERROR, MSG_INTERNAL)
        }
    }
}
