//! Async driver for [`SwapForm`]: user commands in, fetches and wallet calls out, views
//! published on a watch channel.
//!
//! Everything runs on one task. At most one price fetch, one quote fetch, one send and one
//! receipt wait are in flight; a fetch whose generation went stale is dropped on the spot.
//!
//! When the command channel closes, a send or receipt wait already under way is still seen
//! through before the session returns. Only [`Command::Quit`] abandons it.

use super::form::{FormView, PriceTicket, QuoteTicket, ReceiptOutcome, SwapForm};
use super::state::SwapAction;
use crate::client::QuoteSource;
use crate::debounce::Debouncer;
use crate::errors::ApiError;
use crate::wallet::Wallet;
use crate::zeroex::{PriceResponse, QuoteResponse, Route};
use alloy::primitives::B256;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// What the user can do to the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Action(SwapAction),
    /// Swap direction using the amount currently shown on the buy side.
    Toggle,
    /// Fetch a firm quote (first button press).
    Review,
    /// Send the quoted transaction (second button press).
    Submit,
    Quit,
}

type Pending<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Resolves with the slot's future, or never when the slot is empty.
async fn settle<T>(slot: &mut Option<Pending<T>>) -> T {
    match slot.as_mut() {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

struct InFlight {
    price: Option<(PriceTicket, Pending<Result<PriceResponse, ApiError>>)>,
    quote: Option<(QuoteTicket, Pending<Result<QuoteResponse, ApiError>>)>,
    send: Option<Pending<eyre::Result<B256>>>,
    receipt: Option<Pending<eyre::Result<ReceiptOutcome>>>,
}

impl InFlight {
    const fn wallet_busy(&self) -> bool {
        self.send.is_some() || self.receipt.is_some()
    }

    /// Drop fetches the form no longer wants.
    fn prune(&mut self, form: &SwapForm) {
        if self
            .price
            .as_ref()
            .is_some_and(|(t, _)| t.generation() != form.price_generation())
        {
            debug!("cancelling stale price fetch");
            self.price = None;
        }
        if self
            .quote
            .as_ref()
            .is_some_and(|(t, _)| t.generation() != form.quote_generation())
        {
            debug!("cancelling stale quote fetch");
            self.quote = None;
        }
    }
}

async fn settle_ticketed<T, R>(slot: &mut Option<(T, Pending<R>)>) -> R {
    match slot.as_mut() {
        Some((_, fut)) => fut.await,
        None => std::future::pending().await,
    }
}

fn publish(views: &watch::Sender<FormView>, form: &SwapForm) {
    let next = form.view();
    views.send_if_modified(|cur| {
        if *cur == next {
            false
        } else {
            *cur = next;
            true
        }
    });
}

/// Drive `form` until a [`Command::Quit`] arrives, or until `commands` closes and no
/// transaction is being sent or tracked, then return it.
pub async fn run<C, W>(
    mut form: SwapForm,
    client: C,
    wallet: W,
    mut commands: mpsc::Receiver<Command>,
    views: watch::Sender<FormView>,
    debounce: Duration,
) -> SwapForm
where
    C: QuoteSource + Clone + Send + Sync + 'static,
    W: Wallet + Clone + Send + Sync + 'static,
{
    form.set_taker(wallet.address());
    info!(taker = ?form.taker(), chain_id = form.state().chain_id, "swap session started");
    let mut debouncer = Debouncer::new(form.state().input_amount.clone(), debounce);
    let mut debounced = debouncer.subscribe();
    let mut inflight = InFlight {
        price: None,
        quote: None,
        send: None,
        receipt: None,
    };
    let mut closed = false;

    loop {
        let state = form.state();
        debouncer.update(state.input_amount.clone(), state.should_debounce);

        if let Some(ticket) = form.next_price_ticket() {
            let c = client.clone();
            let req = ticket.request.clone();
            debug!(generation = ticket.generation(), "price fetch");
            inflight.price = Some((ticket, Box::pin(async move { c.fetch_price(&req).await })));
        }
        inflight.prune(&form);
        publish(&views, &form);
        if closed && !inflight.wallet_busy() {
            break;
        }

        tokio::select! {
            cmd = commands.recv(), if !closed => {
                let Some(cmd) = cmd else {
                    debug!(
                        sending = inflight.send.is_some(),
                        tracking = inflight.receipt.is_some(),
                        "command channel closed"
                    );
                    closed = true;
                    continue;
                };
                match cmd {
                    Command::Action(action) => form.dispatch(action),
                    Command::Toggle => form.toggle(),
                    Command::Review => {
                        if let Some(ticket) = form.confirm() {
                            let c = client.clone();
                            let req = ticket.request.clone();
                            inflight.quote =
                                Some((ticket, Box::pin(async move { c.fetch_quote(&req).await })));
                        }
                    }
                    Command::Submit => {
                        if inflight.send.is_none() {
                            if let Some(tx) = form.accept() {
                                let w = wallet.clone();
                                let chain_id = form.state().chain_id;
                                inflight.send = Some(Box::pin(async move {
                                    w.send_transaction(chain_id, &tx).await
                                }));
                            }
                        }
                    }
                    Command::Quit => break,
                }
            }
            Ok(()) = debounced.changed() => {
                let amount = debounced.borrow_and_update().clone();
                form.set_price_amount(&amount);
            }
            res = settle_ticketed(&mut inflight.price) => {
                if let Some((ticket, _)) = inflight.price.take() {
                    if form.complete_price(&ticket, res) {
                        let sources = form
                            .price()
                            .and_then(|p| p.route.as_ref())
                            .map(Route::sources);
                        debug!(generation = ticket.generation(), ?sources, "price applied");
                    }
                }
            }
            res = settle_ticketed(&mut inflight.quote) => {
                if let Some((ticket, _)) = inflight.quote.take() {
                    form.complete_quote(&ticket, res);
                }
            }
            res = settle(&mut inflight.send) => {
                inflight.send = None;
                match res {
                    Ok(hash) => {
                        info!(%hash, "swap submitted");
                        form.transaction_sent(hash);
                        form.receipt_polling();
                        let w = wallet.clone();
                        let chain_id = form.state().chain_id;
                        inflight.receipt =
                            Some(Box::pin(async move { w.wait_for_receipt(chain_id, hash).await }));
                    }
                    Err(e) => {
                        warn!(error = %e, "wallet did not send");
                        form.transaction_rejected(format!("{e:#}"));
                    }
                }
            }
            res = settle(&mut inflight.receipt) => {
                inflight.receipt = None;
                match res {
                    Ok(outcome) => form.receipt_observed(outcome),
                    Err(e) => {
                        warn!(error = %e, "receipt tracking failed");
                        form.receipt_lost(format!("{e:#}"));
                    }
                }
            }
        }
    }

    debouncer.cancel();
    publish(&views, &form);
    form
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debounce::DEFAULT_DEBOUNCE_MS;
    use crate::swap::form::Phase;
    use crate::swap::state::SwapState;
    use crate::swap::testing::{CannedSource, ScriptedWallet, TAKER, TX_HASH};
    use crate::wallet::Disconnected;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    struct Harness {
        commands: mpsc::Sender<Command>,
        views: watch::Receiver<FormView>,
        task: JoinHandle<SwapForm>,
    }

    impl Harness {
        fn start<W>(source: CannedSource, wallet: W) -> Self
        where
            W: Wallet + Clone + Send + Sync + 'static,
        {
            let form = SwapForm::new(SwapState::default(), None, 50);
            let (commands, rx) = mpsc::channel(32);
            let (view_tx, views) = watch::channel(form.view());
            let debounce = Duration::from_millis(DEFAULT_DEBOUNCE_MS);
            let task = tokio::spawn(run(form, source, wallet, rx, view_tx, debounce));
            Self {
                commands,
                views,
                task,
            }
        }

        async fn send(&self, cmd: Command) -> eyre::Result<()> {
            self.commands.send(cmd).await?;
            Ok(())
        }

        async fn type_amount(&self, amount: &str) -> eyre::Result<()> {
            self.send(Command::Action(SwapAction::TypeSellAmount(amount.to_owned())))
                .await
        }

        async fn wait_for(&mut self, f: impl FnMut(&FormView) -> bool) -> eyre::Result<FormView> {
            let v = timeout(Duration::from_secs(30), self.views.wait_for(f)).await??;
            Ok(v.clone())
        }

        async fn finish(self) -> eyre::Result<SwapForm> {
            drop(self.commands);
            Ok(self.task.await?)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn keystrokes_are_priced_once_after_debounce() -> eyre::Result<()> {
        let source = CannedSource::default();
        let mut h = Harness::start(source.clone(), Disconnected);
        for a in ["1", "10", "100"] {
            h.type_amount(a).await?;
        }
        let v = h.wait_for(|v| v.output_amount.is_some()).await?;
        assert_eq!(v.output_amount.as_deref(), Some("0.038"));
        assert_eq!(v.button, "Connect");

        let form = h.finish().await?;
        assert_eq!(form.phase(), Phase::Pricing);
        let reqs = source.price_requests();
        assert_eq!(reqs.len(), 1, "intermediate keystrokes must not be priced");
        assert_eq!(
            reqs.first().map(|r| r.sell_amount.to_string()).as_deref(),
            Some("100000000")
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_failure_is_inline_and_keeps_amount() -> eyre::Result<()> {
        let mut h = Harness::start(
            CannedSource::failing(503, "Service Unavailable"),
            Disconnected,
        );
        h.type_amount("100").await?;
        let v = h.wait_for(|v| v.error.is_some()).await?;
        assert_eq!(v.error.as_deref(), Some("Service Unavailable"));
        assert_eq!(v.input_amount, "100");
        assert_eq!(v.output_amount, None);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn review_without_wallet_does_nothing() -> eyre::Result<()> {
        let source = CannedSource::default();
        let mut h = Harness::start(source.clone(), Disconnected);
        h.type_amount("100").await?;
        h.wait_for(|v| v.output_amount.is_some()).await?;
        h.send(Command::Review).await?;
        let form = h.finish().await?;
        assert_eq!(form.phase(), Phase::Pricing);
        assert!(source.quote_requests().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn full_swap_completes_and_resets() -> eyre::Result<()> {
        let source = CannedSource::default();
        let wallet = ScriptedWallet::new(ReceiptOutcome::Success);
        let mut h = Harness::start(source.clone(), wallet);
        h.type_amount("100").await?;
        let v = h.wait_for(|v| v.output_amount.is_some()).await?;
        assert_eq!(v.button, "Review");

        h.send(Command::Review).await?;
        h.wait_for(|v| v.button == "Submit").await?;
        assert_eq!(
            source.quote_requests().first().and_then(|r| r.taker),
            Some(TAKER)
        );

        h.send(Command::Submit).await?;
        let v = h.wait_for(|v| v.phase == Phase::Confirming).await?;
        assert_eq!(v.tx_hash, Some(TX_HASH.to_string()));

        let v = h.wait_for(|v| v.phase == Phase::Completed).await?;
        assert!(v.input_amount.is_empty());
        assert_eq!(v.button, "Enter an amount");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn reverted_swap_keeps_amount() -> eyre::Result<()> {
        let wallet = ScriptedWallet::new(ReceiptOutcome::Reverted);
        let mut h = Harness::start(CannedSource::default(), wallet);
        h.type_amount("100").await?;
        h.wait_for(|v| v.output_amount.is_some()).await?;
        h.send(Command::Review).await?;
        h.wait_for(|v| v.button == "Submit").await?;
        h.send(Command::Submit).await?;
        let v = h.wait_for(|v| v.phase == Phase::Reverted).await?;
        assert_eq!(v.input_amount, "100");
        assert_eq!(v.error.as_deref(), Some("Transaction reverted"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn closing_commands_mid_broadcast_still_tracks_the_swap() -> eyre::Result<()> {
        let wallet =
            ScriptedWallet::new(ReceiptOutcome::Success).with_send_delay(Duration::from_millis(500));
        let mut h = Harness::start(CannedSource::default(), wallet.clone());
        h.type_amount("100").await?;
        h.wait_for(|v| v.button == "Review").await?;
        h.send(Command::Review).await?;
        h.wait_for(|v| v.button == "Submit").await?;
        h.send(Command::Submit).await?;

        let form = h.finish().await?;
        assert_eq!(wallet.sent(), 1, "broadcast must not be dropped");
        assert_eq!(wallet.receipts(), 1, "receipt must be awaited");
        assert_eq!(form.tx_hash(), Some(TX_HASH));
        assert_eq!(form.phase(), Phase::Completed);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn quit_abandons_tracking() -> eyre::Result<()> {
        let wallet = ScriptedWallet::new(ReceiptOutcome::Success);
        let mut h = Harness::start(CannedSource::default(), wallet.clone());
        h.type_amount("100").await?;
        h.wait_for(|v| v.button == "Review").await?;
        h.send(Command::Review).await?;
        h.wait_for(|v| v.button == "Submit").await?;
        h.send(Command::Submit).await?;
        h.wait_for(|v| v.phase == Phase::Confirming).await?;
        h.send(Command::Quit).await?;

        let form = timeout(Duration::from_secs(1), h.task).await??;
        assert_eq!(form.phase(), Phase::Confirming);
        assert_eq!(wallet.receipts(), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn chain_switch_reprices_on_new_chain() -> eyre::Result<()> {
        let source = CannedSource::default();
        let mut h = Harness::start(source.clone(), Disconnected);
        h.type_amount("5").await?;
        h.wait_for(|v| v.output_amount.is_some()).await?;
        h.send(Command::Action(SwapAction::SelectChain(
            crate::registry::ARBITRUM_CHAIN_ID,
        )))
        .await?;
        let v = h.wait_for(|v| v.chain == "Arbitrum" && v.output_amount.is_some()).await?;
        assert_eq!(v.sell_symbol, "USDC");
        let chains: Vec<u64> = source.price_requests().iter().map(|r| r.chain_id).collect();
        assert_eq!(chains, vec![8453, 42161]);
        Ok(())
    }
}
