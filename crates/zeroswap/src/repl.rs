//! Line-oriented terminal front end for the swap session.

use crate::amount::is_valid_amount_input;
use crate::cli_output;
use crate::client::QuoteSource;
use crate::params;
use crate::registry::{self, Token};
use crate::swap::form::{FormView, SwapForm};
use crate::swap::session::{self, Command};
use crate::swap::state::{SwapAction, SwapState};
use crate::wallet::Wallet;
use eyre::Context as _;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _};
use tokio::sync::{mpsc, watch};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Empty,
    Help,
    Show,
    Link,
    Command(Command),
}

#[derive(Debug, Clone)]
pub struct ReplOpts {
    pub proxy_base_url: String,
    pub share_base_url: String,
    pub debounce: Duration,
}

fn resolve_token(chain_id: u64, arg: &str) -> Result<Token, String> {
    let chain = registry::chain(chain_id).ok_or_else(|| format!("unsupported chain {chain_id}"))?;
    chain
        .token_by_symbol(arg)
        .or_else(|| chain.token_by_str(arg))
        .ok_or_else(|| format!("unknown token {arg} on {}", chain.name))
}

fn resolve_chain(arg: &str) -> Result<u64, String> {
    arg.parse::<u64>()
        .ok()
        .filter(|id| registry::is_chain_supported(*id))
        .or_else(|| {
            registry::supported_chains()
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(arg))
                .map(|c| c.id)
        })
        .ok_or_else(|| format!("unsupported chain {arg}"))
}

fn amount(arg: &str) -> Result<Line, String> {
    if is_valid_amount_input(arg) {
        Ok(Line::Command(Command::Action(SwapAction::TypeSellAmount(
            arg.to_owned(),
        ))))
    } else {
        Err(format!("not an amount: {arg}"))
    }
}

/// Parse one input line against the chain currently shown.
pub fn parse_line(line: &str, chain_id: u64) -> Result<Line, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(Line::Empty);
    };
    let arg = words.next();
    if words.next().is_some() {
        return Err(format!("too many arguments: {}", line.trim()));
    }
    let need = |what: &str| arg.ok_or_else(|| format!("usage: {head} <{what}>"));

    match head.to_ascii_lowercase().as_str() {
        "help" | "?" => Ok(Line::Help),
        "show" => Ok(Line::Show),
        "link" => Ok(Line::Link),
        "quit" | "exit" => Ok(Line::Command(Command::Quit)),
        "flip" => Ok(Line::Command(Command::Toggle)),
        "review" => Ok(Line::Command(Command::Review)),
        "submit" => Ok(Line::Command(Command::Submit)),
        "clear" => amount(""),
        "amount" => amount(need("amount")?),
        "sell" => {
            let t = resolve_token(chain_id, need("token")?)?;
            Ok(Line::Command(Command::Action(SwapAction::SelectSellToken(t))))
        }
        "buy" => {
            let t = resolve_token(chain_id, need("token")?)?;
            Ok(Line::Command(Command::Action(SwapAction::SelectBuyToken(t))))
        }
        "chain" => {
            let id = resolve_chain(need("chain")?)?;
            Ok(Line::Command(Command::Action(SwapAction::SelectChain(id))))
        }
        _ if arg.is_none() && head.starts_with(|c: char| c.is_ascii_digit() || c == '.') => {
            amount(head)
        }
        _ => Err(format!("unknown command: {head} (try `help`)")),
    }
}

/// Starting state from command-line flags: chain by id or name, tokens by symbol or address.
/// Anything left out falls back the same way a bare share link does.
pub fn seed_state(
    chain: Option<&str>,
    sell: Option<&str>,
    buy: Option<&str>,
    amount: Option<&str>,
) -> eyre::Result<SwapState> {
    let chain_id = match chain {
        Some(c) => resolve_chain(c).map_err(|e| eyre::eyre!(e))?,
        None => registry::DEFAULT_CHAIN_ID,
    };
    let address = |arg: Option<&str>| -> eyre::Result<Option<String>> {
        arg.map(|a| resolve_token(chain_id, a).map(|t| t.address.to_string()))
            .transpose()
            .map_err(|e| eyre::eyre!(e))
    };
    let p = params::SwapParams {
        chain_id: Some(chain_id.to_string()),
        sell_token: address(sell)?,
        buy_token: address(buy)?,
        sell_amount: amount.map(str::to_owned),
    };
    Ok(params::initial_state(&p)?)
}

fn link_for(view: &FormView, base: &str) -> eyre::Result<String> {
    let state = params::initial_state(&params::parse_query(&view.query)?)?;
    params::share_url(base, &state)
}

/// Run the session against `input` until `quit` or EOF. A transaction still being sent or
/// tracked at EOF is seen through first. Returns the form as the session left it.
pub async fn run<C, W, R>(
    form: SwapForm,
    client: C,
    wallet: W,
    opts: ReplOpts,
    input: R,
) -> eyre::Result<SwapForm>
where
    C: QuoteSource + Clone + Send + Sync + 'static,
    W: Wallet + Clone + Send + Sync + 'static,
    R: AsyncBufRead + Unpin,
{
    let wallet_label = wallet.address().map(|a| a.to_string());
    cli_output::print_swap_banner(
        env!("CARGO_PKG_VERSION"),
        &opts.proxy_base_url,
        wallet_label.as_deref(),
    );

    let (commands, rx) = mpsc::channel(32);
    let (view_tx, views) = watch::channel(form.view());
    let session = tokio::spawn(session::run(
        form,
        client,
        wallet,
        rx,
        view_tx,
        opts.debounce,
    ));

    let mut render_rx = views.clone();
    let render = tokio::spawn(async move {
        cli_output::print_view(&render_rx.borrow_and_update().clone());
        while render_rx.changed().await.is_ok() {
            let v = render_rx.borrow_and_update().clone();
            cli_output::print_view(&v);
        }
    });

    let mut lines = input.lines();
    let mut quit = false;
    while !quit {
        if cli_output::interactive_output() {
            cli_output::print_prompt();
        }
        let Some(line) = lines.next_line().await.context("read stdin")? else {
            break;
        };
        let chain_id = views.borrow().chain_id;
        match parse_line(&line, chain_id) {
            Ok(Line::Empty) => {}
            Ok(Line::Help) => cli_output::print_swap_help(),
            Ok(Line::Show) => {
                let v = views.borrow().clone();
                cli_output::print_view(&v);
            }
            Ok(Line::Link) => {
                let v = views.borrow().clone();
                match link_for(&v, &opts.share_base_url) {
                    Ok(url) => cli_output::stderr_writeln(&url),
                    Err(e) => cli_output::print_problem(&format!("{e:#}")),
                }
            }
            Ok(Line::Command(cmd)) => {
                quit = cmd == Command::Quit;
                if commands.send(cmd).await.is_err() {
                    break;
                }
            }
            Err(msg) => cli_output::print_problem(&msg),
        }
    }

    if !quit {
        debug!("input closed; letting any pending transaction finish");
    }
    drop(commands);
    let form = session.await.context("swap session")?;
    render.abort();
    debug!(phase = %form.phase(), tx = ?form.tx_hash(), "swap session ended");
    Ok(form)
}
