//! The swap form as a state machine without I/O.
//!
//! The session feeds it user actions and fetch results; the form decides which fetch is due
//! next and hands out tickets for them. A ticket remembers the generation it was issued
//! for, and completions carrying an outdated generation are dropped.

use super::state::{reduce, SwapAction, SwapState};
use crate::amount::format_display_amount;
use crate::client::{format_buy_amount, SwapRequest};
use crate::errors::ApiError;
use crate::params;
use crate::registry;
use crate::zeroex::{PriceResponse, QuoteResponse, QuoteTransaction};
use alloy::primitives::{Address, B256};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Pricing,
    Quoting,
    Submitted,
    Confirming,
    Completed,
    Reverted,
}

impl Phase {
    /// A transaction is out and being tracked; edits do not disturb it.
    pub const fn tracking(self) -> bool {
        matches!(self, Self::Submitted | Self::Confirming)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Pricing => "pricing",
            Self::Quoting => "quoting",
            Self::Submitted => "submitted",
            Self::Confirming => "confirming",
            Self::Completed => "completed",
            Self::Reverted => "reverted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptOutcome {
    Success,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTicket {
    generation: u64,
    pub request: SwapRequest,
}

impl PriceTicket {
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteTicket {
    generation: u64,
    pub request: SwapRequest,
}

impl QuoteTicket {
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// Everything that identifies a price query. A change here means a new generation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PriceKey {
    chain_id: u64,
    sell: Address,
    buy: Address,
    amount: String,
    taker: Option<Address>,
}

/// Snapshot for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormView {
    pub phase: Phase,
    pub chain_id: u64,
    pub chain: String,
    pub sell_symbol: String,
    pub buy_symbol: String,
    pub input_amount: String,
    pub output_amount: Option<String>,
    pub button: &'static str,
    pub button_enabled: bool,
    pub error: Option<String>,
    pub tx_hash: Option<String>,
    /// Explorer page for `tx_hash`.
    pub tx_url: Option<String>,
    pub query: String,
}

impl fmt::Display for FormView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let input = if self.input_amount.is_empty() {
            "0"
        } else {
            self.input_amount.as_str()
        };
        let output = self.output_amount.as_deref().unwrap_or("-");
        write!(
            f,
            "[{}] {}: {input} {} -> {output} {}  <{}{}>",
            self.phase,
            self.chain,
            self.sell_symbol,
            self.buy_symbol,
            self.button,
            if self.button_enabled { "" } else { ", disabled" },
        )?;
        if let Some(e) = &self.error {
            write!(f, "  error: {e}")?;
        }
        if let Some(h) = &self.tx_hash {
            write!(f, "  tx: {h}")?;
            if let Some(u) = &self.tx_url {
                write!(f, " ({u})")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct SwapForm {
    state: SwapState,
    phase: Phase,
    taker: Option<Address>,
    slippage_bps: u32,

    /// Amount the price query is keyed on: the debounced input, or the raw input while
    /// debouncing is off.
    price_amount: String,
    price_generation: u64,
    price_key: Option<PriceKey>,
    price: Option<PriceResponse>,
    price_loading: bool,
    price_error: Option<String>,

    quote_generation: u64,
    quote: Option<QuoteResponse>,
    quote_loading: bool,
    quote_error: Option<String>,

    /// Last sent transaction and the chain it went to.
    tx: Option<(u64, B256)>,
}

impl SwapForm {
    pub fn new(state: SwapState, taker: Option<Address>, slippage_bps: u32) -> Self {
        let price_amount = state.input_amount.clone();
        let phase = if state.has_amount() {
            Phase::Pricing
        } else {
            Phase::Idle
        };
        Self {
            state,
            phase,
            taker,
            slippage_bps,
            price_amount,
            price_generation: 0,
            price_key: None,
            price: None,
            price_loading: false,
            price_error: None,
            quote_generation: 0,
            quote: None,
            quote_loading: false,
            quote_error: None,
            tx: None,
        }
    }

    pub const fn state(&self) -> &SwapState {
        &self.state
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    pub const fn taker(&self) -> Option<Address> {
        self.taker
    }

    pub const fn price(&self) -> Option<&PriceResponse> {
        self.price.as_ref()
    }

    pub const fn quote(&self) -> Option<&QuoteResponse> {
        self.quote.as_ref()
    }

    pub const fn price_generation(&self) -> u64 {
        self.price_generation
    }

    pub const fn quote_generation(&self) -> u64 {
        self.quote_generation
    }

    pub fn tx_hash(&self) -> Option<B256> {
        self.tx.map(|(_, h)| h)
    }

    /// Inline error text: the quote error wins over the price error.
    pub fn error(&self) -> Option<&str> {
        self.quote_error.as_deref().or(self.price_error.as_deref())
    }

    pub fn dispatch(&mut self, action: SwapAction) {
        let next = reduce(&self.state, action);
        if next == self.state {
            return;
        }
        let pair_changed = next.chain_id != self.state.chain_id
            || next.sell_token != self.state.sell_token
            || next.buy_token != self.state.buy_token;
        let amount_changed = next.input_amount != self.state.input_amount;
        self.state = next;
        if !self.state.should_debounce {
            self.price_amount.clone_from(&self.state.input_amount);
        }
        if pair_changed || amount_changed {
            self.invalidate_quote();
            self.settle_phase();
        }
    }

    /// Swap direction, carrying the currently shown output into the sell box.
    pub fn toggle(&mut self) {
        let out = self.output_amount().unwrap_or_default();
        self.dispatch(SwapAction::ToggleDirection(out));
    }

    /// The debounced amount arrived.
    pub fn set_price_amount(&mut self, amount: &str) {
        if self.state.should_debounce && amount != self.price_amount {
            amount.clone_into(&mut self.price_amount);
        }
    }

    pub fn set_taker(&mut self, taker: Option<Address>) {
        if self.taker != taker {
            self.taker = taker;
            self.invalidate_quote();
            self.settle_phase();
        }
    }

    fn current_price_key(&self) -> PriceKey {
        PriceKey {
            chain_id: self.state.chain_id,
            sell: self.state.sell_token.address,
            buy: self.state.buy_token.address,
            amount: self.price_amount.clone(),
            taker: self.taker,
        }
    }

    fn invalidate_quote(&mut self) {
        self.quote_generation = self.quote_generation.wrapping_add(1);
        self.quote = None;
        self.quote_loading = false;
        self.quote_error = None;
    }

    fn settle_phase(&mut self) {
        if self.phase.tracking() {
            return;
        }
        self.phase = if self.state.has_amount() {
            Phase::Pricing
        } else {
            Phase::Idle
        };
    }

    /// A price fetch that is due, if any. Issuing one bumps the generation so any fetch still
    /// in flight becomes stale.
    pub fn next_price_ticket(&mut self) -> Option<PriceTicket> {
        let key = self.current_price_key();
        if self.price_key.as_ref() == Some(&key) {
            return None;
        }
        self.price_generation = self.price_generation.wrapping_add(1);
        self.price_key = Some(key);
        self.price = None;
        self.price_error = None;
        self.price_loading = false;

        if self.price_amount.trim().is_empty() {
            return None;
        }
        match SwapRequest::from_state(
            &self.state,
            &self.price_amount,
            self.taker,
            Some(self.slippage_bps),
        ) {
            Ok(request) => {
                self.price_loading = true;
                Some(PriceTicket {
                    generation: self.price_generation,
                    request,
                })
            }
            Err(e) => {
                self.price_error = Some(e.to_string());
                None
            }
        }
    }

    /// Apply a price result. Returns `false` when the ticket was stale and the result dropped.
    pub fn complete_price(
        &mut self,
        ticket: &PriceTicket,
        result: Result<PriceResponse, ApiError>,
    ) -> bool {
        if ticket.generation != self.price_generation {
            debug!(
                ticket = ticket.generation,
                current = self.price_generation,
                "dropping stale price"
            );
            return false;
        }
        self.price_loading = false;
        match result {
            Ok(p) => {
                self.price_error = if p.liquidity_available {
                    None
                } else {
                    Some("Insufficient liquidity".to_owned())
                };
                self.price = Some(p);
            }
            Err(e) => {
                warn!(error = %e, status = ?e.status(), "price fetch failed");
                self.price_error = e.inline_text();
            }
        }
        true
    }

    pub fn button_label(&self) -> &'static str {
        if self.quote_loading {
            "Loading..."
        } else if self.taker.is_none() {
            "Connect"
        } else if self.quote.is_some() {
            "Submit"
        } else if !self.state.has_amount() {
            "Enter an amount"
        } else {
            "Review"
        }
    }

    pub fn button_enabled(&self) -> bool {
        self.taker.is_some()
            && self.state.has_amount()
            && !self.price_loading
            && !self.quote_loading
            && !self.phase.tracking()
    }

    /// Review: request a firm quote. A no-op without a wallet address or an amount.
    pub fn confirm(&mut self) -> Option<QuoteTicket> {
        if !self.button_enabled() || self.quote.is_some() {
            return None;
        }
        let taker = self.taker?;
        let request = match SwapRequest::from_state(
            &self.state,
            &self.state.input_amount,
            Some(taker),
            Some(self.slippage_bps),
        ) {
            Ok(r) => r,
            Err(e) => {
                self.quote_error = Some(e.to_string());
                return None;
            }
        };
        self.quote_generation = self.quote_generation.wrapping_add(1);
        self.quote_loading = true;
        self.quote_error = None;
        self.tx = None;
        self.phase = Phase::Quoting;
        Some(QuoteTicket {
            generation: self.quote_generation,
            request,
        })
    }

    pub fn complete_quote(
        &mut self,
        ticket: &QuoteTicket,
        result: Result<QuoteResponse, ApiError>,
    ) -> bool {
        if ticket.generation != self.quote_generation {
            debug!(
                ticket = ticket.generation,
                current = self.quote_generation,
                "dropping stale quote"
            );
            return false;
        }
        self.quote_loading = false;
        match result {
            Ok(q) => {
                self.quote_error = None;
                self.quote = Some(q);
            }
            Err(e) => {
                warn!(error = %e, status = ?e.status(), "quote fetch failed");
                self.quote_error = e.inline_text();
            }
        }
        true
    }

    /// Submit: the transaction to hand to the wallet, once a quote is in.
    pub fn accept(&self) -> Option<QuoteTransaction> {
        if self.phase != Phase::Quoting || self.quote_loading {
            return None;
        }
        self.quote.as_ref().map(|q| q.transaction.clone())
    }

    pub fn transaction_sent(&mut self, hash: B256) {
        self.tx = Some((self.state.chain_id, hash));
        self.quote_error = None;
        self.phase = Phase::Submitted;
    }

    /// The wallet refused or failed to send. The quote stays so the user can retry.
    pub fn transaction_rejected(&mut self, message: String) {
        self.quote_error = Some(message);
        self.phase = Phase::Quoting;
    }

    pub fn receipt_polling(&mut self) {
        if self.phase == Phase::Submitted {
            self.phase = Phase::Confirming;
        }
    }

    /// A successful swap clears the form; a revert keeps the amount for another attempt.
    pub fn receipt_observed(&mut self, outcome: ReceiptOutcome) {
        self.invalidate_quote();
        match outcome {
            ReceiptOutcome::Success => {
                self.state = reduce(&self.state, SwapAction::ResetSwap);
                self.price_amount.clear();
                self.phase = Phase::Completed;
            }
            ReceiptOutcome::Reverted => {
                self.quote_error = Some("Transaction reverted".to_owned());
                self.phase = Phase::Reverted;
            }
        }
    }

    /// Receipt tracking gave up. The hash stays visible so the outcome can be checked by hand.
    pub fn receipt_lost(&mut self, message: String) {
        self.invalidate_quote();
        self.quote_error = Some(message);
        self.phase = Phase::Idle;
        self.settle_phase();
    }

    /// Formatted `buyAmount` of the current price.
    pub fn output_amount(&self) -> Option<String> {
        let price = self.price.as_ref()?;
        match format_buy_amount(price, &self.state.buy_token) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "could not decode buyAmount");
                None
            }
        }
    }

    pub fn view(&self) -> FormView {
        let chain = registry::chain(self.state.chain_id)
            .map_or_else(|| self.state.chain_id.to_string(), |c| c.name.to_owned());
        FormView {
            phase: self.phase,
            chain_id: self.state.chain_id,
            chain,
            sell_symbol: self.state.sell_token.symbol.to_owned(),
            buy_symbol: self.state.buy_token.symbol.to_owned(),
            input_amount: self.state.input_amount.clone(),
            output_amount: self.output_amount().map(|a| format_display_amount(&a)),
            button: self.button_label(),
            button_enabled: self.button_enabled(),
            error: self.error().map(str::to_owned),
            tx_hash: self.tx_hash().map(|h| h.to_string()),
            tx_url: self
                .tx
                .and_then(|(id, h)| registry::chain(id).map(|c| c.tx_url(&h))),
            query: params::sync_query("", &self.state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ARBITRUM_CHAIN_ID;
    use alloy::primitives::{address, Bytes};

    const TAKER: Address = address!("0x00000000000000000000000000000000000000aa");

    fn price(buy_amount: &str) -> PriceResponse {
        PriceResponse {
            liquidity_available: true,
            buy_amount: Some(buy_amount.to_owned()),
            ..PriceResponse::default()
        }
    }

    fn quote(buy_amount: &str) -> QuoteResponse {
        QuoteResponse {
            price: price(buy_amount),
            transaction: QuoteTransaction {
                to: address!("0x0000000000001ff3684f28c67538d4d072c22734"),
                data: Bytes::from_static(&[0x22, 0x13, 0xbc, 0x0b]),
                value: "0".to_owned(),
                gas: Some("210000".to_owned()),
                gas_price: None,
            },
        }
    }

    fn typed(form: &mut SwapForm, amount: &str) {
        form.dispatch(SwapAction::TypeSellAmount(amount.to_owned()));
        form.set_price_amount(amount);
    }

    fn priced_form(taker: Option<Address>) -> SwapForm {
        let mut form = SwapForm::new(SwapState::default(), taker, 50);
        typed(&mut form, "100");
        let t = form.next_price_ticket();
        assert!(t.is_some());
        if let Some(t) = t {
            assert!(form.complete_price(&t, Ok(price("38000000000000000"))));
        }
        form
    }

    #[test]
    fn fresh_form_waits_for_an_amount() {
        let mut form = SwapForm::new(SwapState::default(), None, 50);
        assert_eq!(form.phase(), Phase::Idle);
        assert_eq!(form.next_price_ticket(), None);
        assert_eq!(form.button_label(), "Connect");
    }

    #[test]
    fn typing_prices_the_debounced_amount() {
        let mut form = SwapForm::new(SwapState::default(), None, 50);
        form.dispatch(SwapAction::TypeSellAmount("100".to_owned()));
        assert_eq!(form.phase(), Phase::Pricing);
        // Nothing to fetch until the debounced amount lands.
        assert_eq!(form.next_price_ticket(), None);
        form.set_price_amount("100");
        let t = form.next_price_ticket();
        assert_eq!(
            t.map(|t| t.request.sell_amount.to_string()).as_deref(),
            Some("100000000")
        );
        // Same key: no duplicate fetch.
        assert_eq!(form.next_price_ticket(), None);
    }

    #[test]
    fn price_result_shows_output_amount() {
        let form = priced_form(None);
        assert_eq!(form.output_amount().as_deref(), Some("0.038"));
        assert_eq!(form.view().output_amount.as_deref(), Some("0.038"));
    }

    #[test]
    fn stale_price_is_discarded() {
        let mut form = SwapForm::new(SwapState::default(), None, 50);
        typed(&mut form, "100");
        let old = form.next_price_ticket();
        form.dispatch(SwapAction::SelectChain(ARBITRUM_CHAIN_ID));
        let new = form.next_price_ticket();
        assert!(old.is_some() && new.is_some());
        if let (Some(old), Some(new)) = (old, new) {
            assert!(!form.complete_price(&old, Ok(price("1"))));
            assert!(form.price().is_none());
            assert!(form.complete_price(&new, Ok(price("38000000000000000"))));
            assert!(form.price().is_some());
        }
    }

    #[test]
    fn upstream_error_is_inline_and_keeps_amount() {
        let mut form = SwapForm::new(SwapState::default(), None, 50);
        typed(&mut form, "100");
        let t = form.next_price_ticket();
        assert!(t.is_some());
        if let Some(t) = t {
            let err = ApiError::Upstream {
                status: 503,
                message: "Service Unavailable".to_owned(),
            };
            assert!(form.complete_price(&t, Err(err)));
        }
        assert_eq!(form.error(), Some("Service Unavailable"));
        assert_eq!(form.state().input_amount, "100");
        assert_eq!(form.phase(), Phase::Pricing);
    }

    #[test]
    fn network_failure_shows_no_data() {
        let mut form = SwapForm::new(SwapState::default(), None, 50);
        typed(&mut form, "100");
        if let Some(t) = form.next_price_ticket() {
            let err = ApiError::Network("connection refused".to_owned());
            assert!(form.complete_price(&t, Err(err)));
        }
        assert_eq!(form.error(), None);
        assert_eq!(form.output_amount(), None);
        assert_eq!(form.view().output_amount, None);
        assert_eq!(form.state().input_amount, "100");
    }

    #[test]
    fn no_liquidity_is_reported_inline() {
        let mut form = SwapForm::new(SwapState::default(), None, 50);
        typed(&mut form, "100");
        if let Some(t) = form.next_price_ticket() {
            form.complete_price(&t, Ok(PriceResponse::default()));
        }
        assert_eq!(form.error(), Some("Insufficient liquidity"));
        assert_eq!(form.output_amount(), None);
    }

    #[test]
    fn invalid_amount_becomes_inline_error_without_fetch() {
        let mut form = SwapForm::new(SwapState::default(), None, 50);
        typed(&mut form, "1.0000001");
        assert_eq!(form.next_price_ticket(), None);
        assert!(form.error().is_some_and(|e| e.contains("too many decimal places")));
    }

    #[test]
    fn confirm_without_wallet_is_a_noop() {
        let mut form = priced_form(None);
        assert_eq!(form.confirm(), None);
        assert_eq!(form.button_label(), "Connect");
        assert_eq!(form.phase(), Phase::Pricing);
    }

    #[test]
    fn button_labels_follow_form_progress() {
        let mut form = SwapForm::new(SwapState::default(), Some(TAKER), 50);
        assert_eq!(form.button_label(), "Enter an amount");
        typed(&mut form, "100");
        if let Some(t) = form.next_price_ticket() {
            form.complete_price(&t, Ok(price("38000000000000000")));
        }
        assert_eq!(form.button_label(), "Review");
        let qt = form.confirm();
        assert_eq!(form.button_label(), "Loading...");
        if let Some(qt) = qt {
            form.complete_quote(&qt, Ok(quote("38000000000000000")));
        }
        assert_eq!(form.button_label(), "Submit");
    }

    #[test]
    fn full_swap_cycle_resets_form() {
        let mut form = priced_form(Some(TAKER));
        let qt = form.confirm();
        assert_eq!(form.phase(), Phase::Quoting);
        assert_eq!(
            qt.as_ref().and_then(|t| t.request.taker),
            Some(TAKER)
        );
        if let Some(qt) = qt {
            assert!(form.complete_quote(&qt, Ok(quote("38000000000000000"))));
        }
        let tx = form.accept();
        assert!(tx.is_some());

        form.transaction_sent(B256::repeat_byte(0x11));
        assert_eq!(form.phase(), Phase::Submitted);
        form.receipt_polling();
        assert_eq!(form.phase(), Phase::Confirming);

        form.receipt_observed(ReceiptOutcome::Success);
        assert_eq!(form.phase(), Phase::Completed);
        assert!(form.state().input_amount.is_empty());
        assert!(form.quote().is_none());
        assert_eq!(form.tx_hash(), Some(B256::repeat_byte(0x11)));

        typed(&mut form, "5");
        assert_eq!(form.phase(), Phase::Pricing);
    }

    #[test]
    fn explorer_link_follows_the_chain_the_swap_went_to() {
        let mut form = priced_form(Some(TAKER));
        if let Some(qt) = form.confirm() {
            form.complete_quote(&qt, Ok(quote("1")));
        }
        let hash = B256::repeat_byte(0x11);
        form.transaction_sent(hash);
        let v = form.view();
        let url = format!("https://basescan.org/tx/{hash}");
        assert_eq!(v.tx_url.as_deref(), Some(url.as_str()));
        assert!(v.to_string().contains(&format!("tx: {hash} ({url})")));

        form.receipt_observed(ReceiptOutcome::Success);
        form.dispatch(SwapAction::SelectChain(ARBITRUM_CHAIN_ID));
        assert_eq!(form.view().tx_url.as_deref(), Some(url.as_str()));
    }

    #[test]
    fn wallet_rejection_stays_in_quoting() {
        let mut form = priced_form(Some(TAKER));
        if let Some(qt) = form.confirm() {
            form.complete_quote(&qt, Ok(quote("1")));
        }
        form.transaction_rejected("user rejected".to_owned());
        assert_eq!(form.phase(), Phase::Quoting);
        assert_eq!(form.error(), Some("user rejected"));
        assert!(form.accept().is_some());
    }

    #[test]
    fn revert_keeps_amount() {
        let mut form = priced_form(Some(TAKER));
        if let Some(qt) = form.confirm() {
            form.complete_quote(&qt, Ok(quote("1")));
        }
        form.transaction_sent(B256::repeat_byte(0x22));
        form.receipt_observed(ReceiptOutcome::Reverted);
        assert_eq!(form.phase(), Phase::Reverted);
        assert_eq!(form.state().input_amount, "100");
    }

    #[test]
    fn lost_receipt_returns_to_pricing_with_hash() {
        let mut form = priced_form(Some(TAKER));
        if let Some(qt) = form.confirm() {
            form.complete_quote(&qt, Ok(quote("1")));
        }
        form.transaction_sent(B256::repeat_byte(0x22));
        form.receipt_polling();
        form.receipt_lost("timed out waiting for receipt".to_owned());
        assert_eq!(form.phase(), Phase::Pricing);
        assert_eq!(form.tx_hash(), Some(B256::repeat_byte(0x22)));
        assert_eq!(form.error(), Some("timed out waiting for receipt"));
        assert_eq!(form.button_label(), "Review");
    }

    #[test]
    fn edit_during_quote_drops_it() {
        let mut form = priced_form(Some(TAKER));
        let qt = form.confirm();
        typed(&mut form, "200");
        assert_eq!(form.phase(), Phase::Pricing);
        if let Some(qt) = qt {
            assert!(!form.complete_quote(&qt, Ok(quote("1"))));
        }
        assert!(form.quote().is_none());
    }

    #[test]
    fn toggle_carries_output_into_input() {
        let mut form = priced_form(None);
        form.toggle();
        assert_eq!(form.state().sell_token.symbol, "WETH");
        assert_eq!(form.state().input_amount, "0.038");
        // Debounce is off after a toggle, so the price key follows immediately.
        let t = form.next_price_ticket();
        assert_eq!(
            t.map(|t| t.request.sell_amount.to_string()).as_deref(),
            Some("38000000000000000")
        );
    }

    #[test]
    fn view_mirrors_state_into_query() {
        let form = priced_form(None);
        let v = form.view();
        assert!(v.query.contains("sellAmount=100"));
        assert!(v.query.contains("chainId=8453"));
        assert_eq!(v.chain, "Base");
    }
}
