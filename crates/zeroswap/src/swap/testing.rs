//! In-memory price source and wallet for driving a swap session in tests.

use super::form::ReceiptOutcome;
use crate::client::{QuoteSource, SwapRequest};
use crate::errors::ApiError;
use crate::wallet::Wallet;
use crate::zeroex::{PriceResponse, QuoteResponse, QuoteTransaction};
use alloy::primitives::{address, Address, Bytes, B256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TAKER: Address = address!("0x00000000000000000000000000000000000000aa");

pub const TX_HASH: B256 = B256::repeat_byte(0x42);

/// Answers every price with 0.038 WETH for whatever was asked and records the requests.
#[derive(Clone, Default)]
pub struct CannedSource {
    fail_with: Option<(u16, &'static str)>,
    prices: Arc<Mutex<Vec<SwapRequest>>>,
    quotes: Arc<Mutex<Vec<SwapRequest>>>,
}

impl CannedSource {
    pub fn failing(status: u16, message: &'static str) -> Self {
        Self {
            fail_with: Some((status, message)),
            ..Self::default()
        }
    }

    pub fn price_requests(&self) -> Vec<SwapRequest> {
        self.prices.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn quote_requests(&self) -> Vec<SwapRequest> {
        self.quotes.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn canned_price() -> PriceResponse {
        PriceResponse {
            liquidity_available: true,
            buy_amount: Some("38000000000000000".to_owned()),
            ..PriceResponse::default()
        }
    }
}

impl QuoteSource for CannedSource {
    async fn fetch_price(&self, req: &SwapRequest) -> Result<PriceResponse, ApiError> {
        if let Ok(mut v) = self.prices.lock() {
            v.push(req.clone());
        }
        if let Some((status, message)) = self.fail_with {
            return Err(ApiError::Upstream {
                status,
                message: message.to_owned(),
            });
        }
        Ok(Self::canned_price())
    }

    async fn fetch_quote(&self, req: &SwapRequest) -> Result<QuoteResponse, ApiError> {
        if let Ok(mut v) = self.quotes.lock() {
            v.push(req.clone());
        }
        Ok(QuoteResponse {
            price: Self::canned_price(),
            transaction: QuoteTransaction {
                to: address!("0x0000000000001ff3684f28c67538d4d072c22734"),
                data: Bytes::from_static(&[0x22, 0x13, 0xbc, 0x0b]),
                value: "0".to_owned(),
                gas: Some("210000".to_owned()),
                gas_price: None,
            },
        })
    }
}

/// Sends after `send_delay`, confirms two seconds later with `outcome`.
#[derive(Clone)]
pub struct ScriptedWallet {
    outcome: ReceiptOutcome,
    send_delay: Duration,
    sent: Arc<AtomicUsize>,
    receipts: Arc<AtomicUsize>,
}

impl ScriptedWallet {
    pub fn new(outcome: ReceiptOutcome) -> Self {
        Self {
            outcome,
            send_delay: Duration::ZERO,
            sent: Arc::new(AtomicUsize::new(0)),
            receipts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub const fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Transactions that made it to the network.
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    /// Receipts handed back to the session.
    pub fn receipts(&self) -> usize {
        self.receipts.load(Ordering::SeqCst)
    }
}

impl Wallet for ScriptedWallet {
    fn address(&self) -> Option<Address> {
        Some(TAKER)
    }

    async fn send_transaction(&self, _chain_id: u64, _tx: &QuoteTransaction) -> eyre::Result<B256> {
        tokio::time::sleep(self.send_delay).await;
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(TX_HASH)
    }

    async fn wait_for_receipt(&self, _chain_id: u64, _hash: B256) -> eyre::Result<ReceiptOutcome> {
        tokio::time::sleep(Duration::from_secs(2)).await;
        self.receipts.fetch_add(1, Ordering::SeqCst);
        Ok(self.outcome)
    }
}
