//! Supported chains and their tradable tokens.
//!
//! The tables are built once on first use and never mutated afterwards. Lookups by an
//! unsupported chain id return `None`; callers are expected to validate chain ids at the
//! edge (see [`ensure_supported_chain`]).

use crate::errors::SwapError;
use alloy::primitives::{address, Address, B256};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;

pub const BASE_CHAIN_ID: u64 = 8453;
pub const ARBITRUM_CHAIN_ID: u64 = 42161;

/// Chain selected when neither the query string nor the user picked one.
pub const DEFAULT_CHAIN_ID: u64 = BASE_CHAIN_ID;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Token {
    pub symbol: &'static str,
    pub name: &'static str,
    pub decimals: u8,
    pub address: Address,
    pub logo: &'static str,
}

#[derive(Debug)]
pub struct Chain {
    pub id: u64,
    pub name: &'static str,
    /// Block explorer root, without a trailing slash.
    pub explorer: &'static str,
    tokens: Vec<Token>,
    by_address: HashMap<Address, Token>,
}

impl Chain {
    fn new(id: u64, name: &'static str, explorer: &'static str, tokens: Vec<Token>) -> Self {
        let by_address = tokens.iter().map(|t| (t.address, *t)).collect();
        Self {
            id,
            name,
            explorer,
            tokens,
            by_address,
        }
    }

    /// Tokens in display order.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn token(&self, address: &Address) -> Option<Token> {
        self.by_address.get(address).copied()
    }

    /// Look up a token by its `0x`-prefixed hex address (any letter case).
    pub fn token_by_str(&self, address: &str) -> Option<Token> {
        let a: Address = address.trim().parse().ok()?;
        self.token(&a)
    }

    /// Look up a token by symbol, ignoring ASCII case.
    pub fn token_by_symbol(&self, symbol: &str) -> Option<Token> {
        let s = symbol.trim();
        self.tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(s))
            .copied()
    }

    pub fn contains(&self, token: &Token) -> bool {
        self.by_address.contains_key(&token.address)
    }

    /// Explorer page for a transaction on this chain.
    pub fn tx_url(&self, hash: &B256) -> String {
        format!("{}/tx/{hash}", self.explorer)
    }

    /// The sell/buy pair a chain starts with: registry positions 0 and 1.
    pub fn default_pair(&self) -> (Token, Token) {
        match self.tokens.as_slice() {
            [sell, buy, ..] => (*sell, *buy),
            // Every registry entry lists at least two tokens (see `registry_tables_are_well_formed`).
            _ => broken_registry(&format!("chain {} lists fewer than two tokens", self.id)),
        }
    }
}

#[expect(clippy::panic, reason = "registry tables are static and checked by tests")]
fn broken_registry(what: &str) -> ! {
    panic!("token registry: {what}")
}

const fn token(
    symbol: &'static str,
    name: &'static str,
    decimals: u8,
    address: Address,
    logo: &'static str,
) -> Token {
    Token {
        symbol,
        name,
        decimals,
        address,
        logo,
    }
}

const LOGO_USDC: &str = "https://raw.githubusercontent.com/trustwallet/assets/master/blockchains/ethereum/assets/0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48/logo.png";
const LOGO_WETH: &str = "https://raw.githubusercontent.com/trustwallet/assets/master/blockchains/ethereum/assets/0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2/logo.png";
const LOGO_DAI: &str = "https://raw.githubusercontent.com/trustwallet/assets/master/blockchains/ethereum/assets/0x6B175474E89094C44Da98b954EedeAC495271d0F/logo.png";
const LOGO_ARB: &str = "https://raw.githubusercontent.com/trustwallet/assets/master/blockchains/arbitrum/assets/0x912CE59144191C1204E64559FE8253a0e49E6548/logo.png";

static CHAINS: LazyLock<Vec<Chain>> = LazyLock::new(|| {
    vec![
        Chain::new(
            BASE_CHAIN_ID,
            "Base",
            "https://basescan.org",
            vec![
                token(
                    "USDC",
                    "USD Coin",
                    6,
                    address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
                    LOGO_USDC,
                ),
                token(
                    "WETH",
                    "Wrapped Ether",
                    18,
                    address!("4200000000000000000000000000000000000006"),
                    LOGO_WETH,
                ),
                token(
                    "DAI",
                    "Dai Stablecoin",
                    18,
                    address!("50c5725949A6F0c72E6C4a641F24049A917DB0Cb"),
                    LOGO_DAI,
                ),
            ],
        ),
        Chain::new(
            ARBITRUM_CHAIN_ID,
            "Arbitrum",
            "https://arbiscan.io",
            vec![
                token(
                    "USDC",
                    "USD Coin",
                    6,
                    address!("af88d065e77c8cC2239327C5EDb3A432268e5831"),
                    LOGO_USDC,
                ),
                token(
                    "WETH",
                    "Wrapped Ether",
                    18,
                    address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1"),
                    LOGO_WETH,
                ),
                token(
                    "ARB",
                    "Arbitrum",
                    18,
                    address!("912CE59144191C1204E64559FE8253a0e49E6548"),
                    LOGO_ARB,
                ),
            ],
        ),
    ]
});

pub fn supported_chains() -> &'static [Chain] {
    &CHAINS
}

pub fn chain(chain_id: u64) -> Option<&'static Chain> {
    CHAINS.iter().find(|c| c.id == chain_id)
}

pub fn is_chain_supported(chain_id: u64) -> bool {
    chain(chain_id).is_some()
}

/// Guard used before any request is built for `chain_id`.
pub fn ensure_supported_chain(chain_id: u64) -> Result<&'static Chain, SwapError> {
    chain(chain_id).ok_or(SwapError::UnsupportedChain(chain_id))
}

pub fn default_chain() -> &'static Chain {
    match chain(DEFAULT_CHAIN_ID) {
        Some(c) => c,
        None => broken_registry("default chain is not registered"),
    }
}
