//! Swap state <-> shareable query string (`sellToken`, `buyToken`, `sellAmount`, `chainId`).

use crate::amount::is_valid_amount_input;
use crate::errors::SwapError;
use crate::registry::{self, Token};
use crate::swap::state::SwapState;
use reqwest::Url;

pub const SELL_TOKEN: &str = "sellToken";
pub const BUY_TOKEN: &str = "buyToken";
pub const SELL_AMOUNT: &str = "sellAmount";
pub const CHAIN_ID: &str = "chainId";

/// The swap-related query parameters, each present at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapParams {
    pub sell_token: Option<String>,
    pub buy_token: Option<String>,
    pub sell_amount: Option<String>,
    pub chain_id: Option<String>,
}

fn decode_pairs(query: &str) -> Vec<(String, String)> {
    let q = query.trim().trim_start_matches('?');
    if q.is_empty() {
        return Vec::new();
    }
    let Ok(mut url) = Url::parse("http://localhost/") else {
        return Vec::new();
    };
    url.set_query(Some(q));
    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Parse a query string (leading `?` optional). Unrelated keys are ignored.
pub fn parse_query(query: &str) -> Result<SwapParams, SwapError> {
    let mut out = SwapParams::default();
    for (k, v) in decode_pairs(query) {
        let (slot, key) = match k.as_str() {
            SELL_TOKEN => (&mut out.sell_token, SELL_TOKEN),
            BUY_TOKEN => (&mut out.buy_token, BUY_TOKEN),
            SELL_AMOUNT => (&mut out.sell_amount, SELL_AMOUNT),
            CHAIN_ID => (&mut out.chain_id, CHAIN_ID),
            _ => continue,
        };
        if slot.is_some() {
            return Err(SwapError::RepeatedParam(key));
        }
        *slot = Some(v);
    }
    Ok(out)
}

fn non_empty(v: Option<&String>) -> Option<&str> {
    v.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Seed a swap state from query parameters.
///
/// Tokens are resolved against `chainId` (or the default chain when it is absent); a token
/// param that is missing falls back to that chain's default pair. If both sides resolve to
/// the same token, the buy side takes the other default.
pub fn initial_state(params: &SwapParams) -> Result<SwapState, SwapError> {
    let chain = match non_empty(params.chain_id.as_ref()) {
        Some(raw) => {
            let id = raw
                .parse::<u64>()
                .ok()
                .ok_or_else(|| SwapError::InvalidChainId(raw.to_owned()))?;
            registry::ensure_supported_chain(id)?
        }
        None => registry::default_chain(),
    };
    let (default_sell, default_buy) = chain.default_pair();

    let resolve = |raw: Option<&str>, fallback: Token| -> Result<Token, SwapError> {
        match raw {
            None => Ok(fallback),
            Some(a) => chain
                .token_by_str(a)
                .ok_or_else(|| SwapError::UnknownToken {
                    chain_id: chain.id,
                    address: a.to_owned(),
                }),
        }
    };
    let sell_token = resolve(non_empty(params.sell_token.as_ref()), default_sell)?;
    let mut buy_token = resolve(non_empty(params.buy_token.as_ref()), default_buy)?;
    if buy_token.address == sell_token.address {
        buy_token = if sell_token.address == default_sell.address {
            default_buy
        } else {
            default_sell
        };
    }

    let input_amount = match non_empty(params.sell_amount.as_ref()) {
        Some(a) if is_valid_amount_input(a) => a.to_owned(),
        Some(a) => return Err(SwapError::InvalidAmount(a.to_owned())),
        None => String::new(),
    };

    Ok(SwapState {
        sell_token,
        buy_token,
        chain_id: chain.id,
        input_amount,
        should_debounce: true,
    })
}

fn state_pairs(state: &SwapState) -> [(&'static str, String); 4] {
    [
        (SELL_TOKEN, state.sell_token.address.to_string()),
        (BUY_TOKEN, state.buy_token.address.to_string()),
        (SELL_AMOUNT, state.input_amount.trim().to_owned()),
        (CHAIN_ID, state.chain_id.to_string()),
    ]
}

/// Write `state` into `existing`, keeping every other key and its position.
///
/// A key that already exists is replaced in place (later duplicates are dropped); a new key
/// is appended. Empty values are not written, so an empty amount leaves any previous
/// `sellAmount` untouched.
pub fn sync_query(existing: &str, state: &SwapState) -> String {
    let mut pairs = decode_pairs(existing);
    for (key, value) in state_pairs(state) {
        if value.is_empty() {
            continue;
        }
        let mut seen = false;
        pairs.retain_mut(|(k, v)| {
            if k != key {
                return true;
            }
            if seen {
                return false;
            }
            seen = true;
            v.clone_from(&value);
            true
        });
        if !seen {
            pairs.push((key.to_owned(), value));
        }
    }

    let Ok(mut url) = Url::parse("http://localhost/") else {
        return String::new();
    };
    url.query_pairs_mut().extend_pairs(&pairs);
    url.query().unwrap_or_default().to_owned()
}

/// Shareable link for `state` on top of `base` (which may already carry a query).
pub fn share_url(base: &str, state: &SwapState) -> eyre::Result<String> {
    let mut url = Url::parse(base.trim())?;
    let q = sync_query(url.query().unwrap_or_default(), state);
    url.set_query(if q.is_empty() { None } else { Some(&q) });
    Ok(url.to_string())
}
