//! Wallet seam for the swap form: who the taker is, and how a quote's transaction gets signed,
//! sent and confirmed.

use crate::config::RpcConfig;
use crate::evm::{tx_request_from_quote, EvmChain};
use crate::swap::form::ReceiptOutcome;
use crate::zeroex::QuoteTransaction;
use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use eyre::Context as _;
use secrecy::{ExposeSecret as _, SecretString};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

pub const PRIVATE_KEY_ENV: &str = "ZEROSWAP_PRIVATE_KEY";

pub trait Wallet {
    /// Connected account, if any.
    fn address(&self) -> Option<Address>;

    fn send_transaction(
        &self,
        chain_id: u64,
        tx: &QuoteTransaction,
    ) -> impl Future<Output = eyre::Result<B256>> + Send;

    fn wait_for_receipt(
        &self,
        chain_id: u64,
        hash: B256,
    ) -> impl Future<Output = eyre::Result<ReceiptOutcome>> + Send;
}

/// No account connected: prices work, reviewing asks to connect.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disconnected;

impl Wallet for Disconnected {
    fn address(&self) -> Option<Address> {
        None
    }

    async fn send_transaction(&self, _chain_id: u64, _tx: &QuoteTransaction) -> eyre::Result<B256> {
        eyre::bail!("no wallet connected")
    }

    async fn wait_for_receipt(&self, _chain_id: u64, _hash: B256) -> eyre::Result<ReceiptOutcome> {
        eyre::bail!("no wallet connected")
    }
}

/// Signs locally with a raw private key and broadcasts over the configured RPC endpoints.
#[derive(Debug, Clone)]
pub struct LocalWallet {
    signer: PrivateKeySigner,
    rpc: RpcConfig,
    receipt_timeout: Duration,
}

impl LocalWallet {
    pub fn from_secret(
        key: &SecretString,
        rpc: RpcConfig,
        receipt_timeout: Duration,
    ) -> eyre::Result<Self> {
        let signer: PrivateKeySigner = key
            .expose_secret()
            .trim()
            .parse()
            .context("parse private key")?;
        Ok(Self {
            signer,
            rpc,
            receipt_timeout,
        })
    }

    fn chain(&self, chain_id: u64) -> eyre::Result<EvmChain> {
        let rpc = self
            .rpc
            .for_chain_id(chain_id)
            .ok_or_else(|| eyre::eyre!("no rpc configured for chain {chain_id}"))?;
        Ok(EvmChain::new(&rpc))
    }
}

impl Wallet for LocalWallet {
    fn address(&self) -> Option<Address> {
        Some(self.signer.address())
    }

    async fn send_transaction(&self, chain_id: u64, tx: &QuoteTransaction) -> eyre::Result<B256> {
        let chain = self.chain(chain_id)?;
        debug!(
            chain = %chain.name,
            endpoints = chain.rpc_urls().len(),
            "sending swap transaction"
        );
        let req = tx_request_from_quote(self.signer.address(), chain_id, tx)?;
        chain.send_tx(&self.signer, req).await
    }

    async fn wait_for_receipt(&self, chain_id: u64, hash: B256) -> eyre::Result<ReceiptOutcome> {
        let chain = self.chain(chain_id)?;
        let receipt = chain.wait_for_tx_receipt(hash, self.receipt_timeout).await?;
        let outcome = if receipt.status() {
            ReceiptOutcome::Success
        } else {
            ReceiptOutcome::Reverted
        };
        info!(%hash, ?outcome, block = ?receipt.block_number, "receipt observed");
        Ok(outcome)
    }
}

/// Private key from `ZEROSWAP_PRIVATE_KEY`, or a hidden terminal prompt when `prompt` is set.
pub fn load_private_key(prompt: bool) -> eyre::Result<Option<SecretString>> {
    if let Ok(v) = std::env::var(PRIVATE_KEY_ENV) {
        let v = v.trim();
        if !v.is_empty() {
            return Ok(Some(SecretString::from(v.to_owned())));
        }
    }
    if !prompt {
        return Ok(None);
    }
    let entered = rpassword::prompt_password("Private key (hex): ").context("read private key")?;
    let entered = entered.trim();
    if entered.is_empty() {
        return Ok(None);
    }
    Ok(Some(SecretString::from(entered.to_owned())))
}
