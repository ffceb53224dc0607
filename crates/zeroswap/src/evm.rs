//! Minimal EVM JSON-RPC plumbing: broadcast a ready-made transaction and poll for its receipt.

use crate::amount::parse_base_units;
use crate::config::ChainRpc;
use crate::retry::{first_success, Backoff};
use crate::zeroex::QuoteTransaction;
use alloy::{
    consensus::{SignableTransaction as _, TxEip1559, TxEnvelope, TxLegacy},
    eips::eip2718::Encodable2718 as _,
    network::TransactionBuilder as _,
    primitives::{Address, TxKind, B256, U256},
    providers::{Provider as _, RootProvider},
    rpc::types::{BlockNumberOrTag, TransactionReceipt, TransactionRequest},
    signers::{local::PrivateKeySigner, SignerSync as _},
};
use eyre::Context as _;
use alloy::transports::http::reqwest::{self as alloy_reqwest, Client};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

const RPC_TIMEOUT: Duration = Duration::from_secs(20);
const RPC_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 1.5 gwei.
const MIN_PRIORITY_FEE: u128 = 1_500_000_000;

type EvmProvider = RootProvider;

/// EIP-1559 fees from the pending base fee and the node's gas price suggestion.
///
/// Tip is the larger of 1.5 gwei and a tenth of the gas price; the cap is twice the base fee
/// plus the tip. Returns `(max_fee_per_gas, max_priority_fee_per_gas)`.
pub fn compute_eip1559_fees(base_fee: u128, gas_price: u128) -> (u128, u128) {
    let tip = MIN_PRIORITY_FEE.max(gas_price / 10);
    let cap = base_fee.saturating_mul(2).saturating_add(tip);
    (cap.max(base_fee.saturating_add(tip)), tip)
}

/// Fill fee fields unless the caller set any. Chains without a base fee get a legacy price.
pub fn apply_fee_policy(
    mut tx: TransactionRequest,
    base_fee: Option<u128>,
    gas_price: u128,
) -> TransactionRequest {
    if tx.max_fee_per_gas.is_some()
        || tx.max_priority_fee_per_gas.is_some()
        || tx.gas_price.is_some()
    {
        return tx;
    }
    match base_fee {
        Some(base) => {
            let (cap, tip) = compute_eip1559_fees(base, gas_price);
            tx.max_fee_per_gas = Some(cap);
            tx.max_priority_fee_per_gas = Some(tip);
        }
        None => tx.gas_price = Some(gas_price),
    }
    tx
}

/// Turn the aggregator's transaction into a request from `from`. `to`, `data`, `value` and
/// `gas` are taken as given; fees and nonce are filled in at send time.
pub fn tx_request_from_quote(
    from: Address,
    chain_id: u64,
    quote_tx: &QuoteTransaction,
) -> eyre::Result<TransactionRequest> {
    let value = match quote_tx.value.trim() {
        "" => U256::ZERO,
        v => parse_base_units(v).context("parse quote value")?,
    };
    let mut tx = TransactionRequest::default()
        .with_from(from)
        .with_to(quote_tx.to)
        .with_input(quote_tx.data.clone())
        .with_value(value)
        .with_chain_id(chain_id);
    if let Some(gas) = quote_tx
        .gas
        .as_deref()
        .map(str::trim)
        .filter(|g| !g.is_empty())
    {
        tx.gas = Some(gas.parse::<u64>().context("parse quote gas")?);
    }
    Ok(tx)
}

/// Nodes answer a re-broadcast of a transaction they already hold with one of these.
fn already_broadcast(err: &eyre::Report) -> bool {
    let s = format!("{err:#}").to_lowercase();
    ["already known", "known transaction", "already imported", "already in mempool"]
        .iter()
        .any(|m| s.contains(m))
}

fn sign_tx(signer: &PrivateKeySigner, tx: &TransactionRequest) -> eyre::Result<(TxEnvelope, B256)> {
    let to = tx.to.unwrap_or(TxKind::Create);
    let value = tx.value.unwrap_or(U256::ZERO);
    let input = tx.input.clone().into_input().unwrap_or_default();
    let nonce = tx.nonce.ok_or_else(|| eyre::eyre!("nonce not set"))?;
    let gas_limit = tx.gas.ok_or_else(|| eyre::eyre!("gas limit not set"))?;
    let chain_id = tx.chain_id.ok_or_else(|| eyre::eyre!("chain id not set"))?;

    if let Some(max_fee_per_gas) = tx.max_fee_per_gas {
        let unsigned = TxEip1559 {
            chain_id,
            nonce,
            gas_limit,
            max_fee_per_gas,
            max_priority_fee_per_gas: tx.max_priority_fee_per_gas.unwrap_or(0),
            to,
            value,
            input,
            access_list: tx.access_list.clone().unwrap_or_default(),
        };
        let sig = signer
            .sign_hash_sync(&unsigned.signature_hash())
            .context("sign eip1559")?;
        let signed = unsigned.into_signed(sig);
        let hash = *signed.hash();
        Ok((TxEnvelope::Eip1559(signed), hash))
    } else {
        let unsigned = TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price: tx.gas_price.unwrap_or(0),
            gas_limit,
            to,
            value,
            input,
        };
        let sig = signer
            .sign_hash_sync(&unsigned.signature_hash())
            .context("sign legacy")?;
        let signed = unsigned.into_signed(sig);
        let hash = *signed.hash();
        Ok((TxEnvelope::Legacy(signed), hash))
    }
}

#[derive(Debug, Clone)]
pub struct EvmChain {
    pub name: String,
    pub chain_id: u64,
    rpc_urls: Vec<String>,
    backoff: Backoff,
}

impl EvmChain {
    pub fn new(rpc: &ChainRpc) -> Self {
        let mut rpc_urls: Vec<String> = Vec::with_capacity(1 + rpc.fallback_rpc_urls.len());
        for u in std::iter::once(&rpc.rpc_url).chain(&rpc.fallback_rpc_urls) {
            let t = u.trim();
            if !t.is_empty() && !rpc_urls.iter().any(|x| x == t) {
                rpc_urls.push(t.to_owned());
            }
        }
        Self {
            name: rpc.name.clone(),
            chain_id: rpc.chain_id,
            rpc_urls,
            backoff: Backoff::default(),
        }
    }

    /// Primary first, then fallbacks, without blanks or duplicates.
    pub fn rpc_urls(&self) -> &[String] {
        &self.rpc_urls
    }

    fn provider_for_url(url: &str) -> eyre::Result<EvmProvider> {
        let u: alloy_reqwest::Url = url
            .parse()
            .with_context(|| format!("invalid rpc url: {url}"))?;
        let client = Client::builder()
            .timeout(RPC_TIMEOUT)
            .connect_timeout(RPC_CONNECT_TIMEOUT)
            .build()
            .context("build rpc http client")?;
        let http = alloy::transports::http::Http::with_client(client, u);
        Ok(RootProvider::new(alloy::rpc::client::RpcClient::new(
            http, false,
        )))
    }

    async fn healthy_provider(&self) -> eyre::Result<EvmProvider> {
        first_success(
            &self.rpc_urls,
            &self.backoff,
            |u| {
                let u = u.clone();
                async move {
                    let p = Self::provider_for_url(&u)?;
                    p.get_block_number().await.context("get block number")?;
                    Ok(p)
                }
            },
            "select rpc",
        )
        .await
    }

    /// Fill nonce, fees and (if missing) gas, sign once, and broadcast the same raw bytes to
    /// every endpoint until one accepts.
    pub async fn send_tx(
        &self,
        signer: &PrivateKeySigner,
        mut tx: TransactionRequest,
    ) -> eyre::Result<B256> {
        let provider = self.healthy_provider().await?;
        let from = signer.address();
        tx.chain_id = Some(self.chain_id);
        tx.from = Some(from);

        if tx.gas_price.is_none() && tx.max_fee_per_gas.is_none() {
            let base_fee = provider
                .get_block_by_number(BlockNumberOrTag::Pending)
                .await
                .ok()
                .flatten()
                .and_then(|b| b.header.base_fee_per_gas.map(u128::from));
            let gas_price = provider.get_gas_price().await.context("get gas price")?;
            tx = apply_fee_policy(tx, base_fee, gas_price);
        }

        if tx.nonce.is_none() {
            let nonce = provider
                .get_transaction_count(from)
                .pending()
                .await
                .context("get nonce")?;
            tx.nonce = Some(nonce);
        }

        if tx.gas.is_none() {
            let gas = provider
                .estimate_gas(tx.clone())
                .await
                .context("estimate gas")?;
            tx.gas = Some(gas.saturating_mul(120) / 100);
        }

        let (envelope, tx_hash) = sign_tx(signer, &tx).context("sign tx")?;
        let raw = envelope.encoded_2718();
        debug!(chain = %self.name, %tx_hash, "broadcasting");

        first_success(
            &self.rpc_urls,
            &self.backoff,
            |u| {
                let u = u.clone();
                let raw = raw.clone();
                async move {
                    let p = Self::provider_for_url(&u)?;
                    match p.send_raw_transaction(&raw).await {
                        Ok(_pending) => Ok(()),
                        Err(e) => {
                            let e: eyre::Report = e.into();
                            if already_broadcast(&e) {
                                Ok(())
                            } else {
                                Err(e.wrap_err("broadcast raw tx"))
                            }
                        }
                    }
                }
            },
            "send transaction",
        )
        .await?;

        info!(chain = %self.name, %tx_hash, "transaction sent");
        Ok(tx_hash)
    }

    pub async fn get_tx_receipt(&self, tx: B256) -> eyre::Result<Option<TransactionReceipt>> {
        first_success(
            &self.rpc_urls,
            &self.backoff,
            |u| {
                let u = u.clone();
                async move {
                    let p = Self::provider_for_url(&u)?;
                    p.get_transaction_receipt(tx)
                        .await
                        .context("get transaction receipt")
                }
            },
            "get tx receipt",
        )
        .await
    }

    /// Poll until the receipt shows up or `timeout` passes. Failed polls are logged and
    /// retried; they never end the wait early.
    pub async fn wait_for_tx_receipt(
        &self,
        tx: B256,
        timeout: Duration,
    ) -> eyre::Result<TransactionReceipt> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.get_tx_receipt(tx).await {
                Ok(Some(r)) => return Ok(r),
                Ok(None) => {}
                Err(e) => warn!(%tx, error = %e, "receipt poll failed"),
            }
            if Instant::now() >= deadline {
                eyre::bail!("timed out waiting for receipt of {tx}");
            }
            sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}
