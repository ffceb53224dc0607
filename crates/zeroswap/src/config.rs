use crate::client::{DEFAULT_SLIPPAGE_BPS, DEFAULT_TIMEOUT};
use crate::debounce::DEFAULT_DEBOUNCE_MS;
use crate::registry::{ARBITRUM_CHAIN_ID, BASE_CHAIN_ID};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// 0x API base URL. The proxy appends `/swap/allowance-holder/{price,quote}`.
    pub zeroex_base_url: String,
    /// Value of the `0x-version` header.
    pub zeroex_api_version: String,
    /// 0x API key (`0x-api-key`). Usually supplied through `ZERO_EX_API_KEY` instead of the file.
    pub zeroex_api_key: Option<String>,
    /// Analytics ingestion endpoint that `/api/analytics` forwards to.
    pub analytics_url: String,
    /// Timeout for every outbound HTTP request (seconds).
    pub request_timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            zeroex_base_url: "https://api.0x.org".into(),
            zeroex_api_version: "v2".into(),
            zeroex_api_key: None,
            analytics_url: "https://api2.amplitude.com/2/httpapi".into(),
            request_timeout_seconds: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Where `swap`, `price` and `quote` find the proxy.
    pub proxy_base_url: String,
    pub slippage_bps: u32,
    /// Quiet period before a typed amount is priced (milliseconds).
    pub debounce_ms: u64,
    /// How long to poll for a swap receipt before giving up (seconds).
    pub receipt_timeout_seconds: u64,
    /// Base URL that `link` prints shareable swap links against.
    pub share_base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proxy_base_url: "http://127.0.0.1:3000".into(),
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            receipt_timeout_seconds: 120,
            share_base_url: "http://127.0.0.1:3000/".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// EVM RPC endpoints keyed by chain name.
    pub evm_rpc_urls: BTreeMap<String, String>,
    /// EVM fallback RPC endpoints keyed by chain name.
    pub evm_fallback_rpc_urls: BTreeMap<String, Vec<String>>,
    /// EVM chain IDs keyed by chain name.
    pub evm_chain_ids: BTreeMap<String, u64>,
}

/// One row of the default RPC table.
struct EvmChainDef {
    name: &'static str,
    chain_id: u64,
    rpc_url: &'static str,
    fallbacks: &'static [&'static str],
}

const EVM_CHAINS: &[EvmChainDef] = &[
    EvmChainDef {
        name: "base",
        chain_id: BASE_CHAIN_ID,
        rpc_url: "https://mainnet.base.org",
        fallbacks: &[
            "https://base-rpc.publicnode.com",
            "https://base.llamarpc.com",
        ],
    },
    EvmChainDef {
        name: "arbitrum",
        chain_id: ARBITRUM_CHAIN_ID,
        rpc_url: "https://arb1.arbitrum.io/rpc",
        fallbacks: &[
            "https://arbitrum-rpc.publicnode.com",
            "https://arbitrum.llamarpc.com",
        ],
    },
];

impl Default for RpcConfig {
    fn default() -> Self {
        let mut cfg = Self {
            evm_rpc_urls: BTreeMap::new(),
            evm_fallback_rpc_urls: BTreeMap::new(),
            evm_chain_ids: BTreeMap::new(),
        };
        for def in EVM_CHAINS {
            cfg.evm_rpc_urls.insert(def.name.into(), def.rpc_url.into());
            cfg.evm_chain_ids.insert(def.name.into(), def.chain_id);
            cfg.evm_fallback_rpc_urls.insert(
                def.name.into(),
                def.fallbacks.iter().map(|&s| s.into()).collect(),
            );
        }
        cfg
    }
}

/// RPC endpoints resolved for a single chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRpc {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub fallback_rpc_urls: Vec<String>,
}

impl RpcConfig {
    pub fn for_chain_id(&self, chain_id: u64) -> Option<ChainRpc> {
        let (name, _) = self.evm_chain_ids.iter().find(|(_, id)| **id == chain_id)?;
        let rpc_url = self.evm_rpc_urls.get(name)?.clone();
        Some(ChainRpc {
            name: name.clone(),
            chain_id,
            rpc_url,
            fallback_rpc_urls: self
                .evm_fallback_rpc_urls
                .get(name)
                .cloned()
                .unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZeroswapConfig {
    pub http: HttpConfig,
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub rpc: RpcConfig,
}
