#![recursion_limit = "256"]
#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use alloy::primitives::Address;
use clap::{Args, Parser, Subcommand};
use eyre::Context as _;
use std::io::Write as _;
use std::time::Duration;
use tracing_subscriber::prelude::*;

mod amount;
mod cli_output;
mod client;
mod config;
mod debounce;
mod doctor;
mod errors;
mod evm;
mod fsutil;
mod params;
mod paths;
mod registry;
mod repl;
mod retry;
mod server;
mod store;
mod swap;
mod wallet;
mod zeroex;

use client::{QuoteSource as _, SwapClient, SwapRequest};
use config::ZeroswapConfig;

#[derive(Parser, Debug)]
#[command(name = "zeroswap", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

/// Which pair and amount to start from.
#[derive(Args, Debug, Clone)]
struct PairArgs {
    /// Chain id or name (default: Base).
    #[arg(long)]
    chain: Option<String>,
    /// Sell token symbol or address.
    #[arg(long)]
    sell: Option<String>,
    /// Buy token symbol or address.
    #[arg(long)]
    buy: Option<String>,
    /// Sell amount in token units ("100", "0.5").
    #[arg(long)]
    amount: Option<String>,
    /// Seed from a share-link query string instead (`sellToken=...&chainId=...`).
    #[arg(long, conflicts_with_all = ["chain", "sell", "buy", "amount"])]
    query: Option<String>,
}

impl PairArgs {
    fn state(&self) -> eyre::Result<swap::state::SwapState> {
        if let Some(q) = &self.query {
            let p = params::parse_query(q)?;
            return Ok(params::initial_state(&p)?);
        }
        repl::seed_state(
            self.chain.as_deref(),
            self.sell.as_deref(),
            self.buy.as_deref(),
            self.amount.as_deref(),
        )
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the same-origin proxy for the 0x swap API (`/api/price`, `/api/quote`,
    /// `/api/analytics`).
    Serve {
        /// Override `server.listen_addr`.
        #[arg(long)]
        listen: Option<String>,
    },

    /// Open the swap form in the terminal.
    ///
    /// The wallet key comes from `ZEROSWAP_PRIVATE_KEY`; without it the form prices only.
    Swap {
        #[command(flatten)]
        pair: PairArgs,

        /// Prompt for a private key when `ZEROSWAP_PRIVATE_KEY` is unset.
        #[arg(long, default_value_t = false)]
        connect: bool,
    },

    /// Fetch an indicative price through the proxy and print it as JSON.
    Price {
        #[command(flatten)]
        pair: PairArgs,

        #[arg(long)]
        taker: Option<Address>,
    },

    /// Fetch a firm quote (with transaction) through the proxy and print it as JSON.
    Quote {
        #[command(flatten)]
        pair: PairArgs,

        #[arg(long)]
        taker: Address,
    },

    /// List supported chains and tokens as JSON.
    Tokens {
        /// Only this chain (id or name).
        #[arg(long)]
        chain: Option<String>,
    },

    /// Print a shareable swap link.
    Link {
        #[command(flatten)]
        pair: PairArgs,

        /// Override `client.share_base_url`.
        #[arg(long)]
        base: Option<String>,
    },

    /// Print resolved paths (useful for debugging).
    Paths,

    /// Print a quick self-diagnostic report (safe to paste; contains no secrets).
    Doctor {
        /// Emit JSON to stdout (machine-readable).
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn init_logging(paths: &paths::ZeroswapPaths) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let file_name = paths
        .log_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("zeroswap.log.jsonl");
    let file_appender = tracing_appender::rolling::never(&paths.data_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn print_json(v: &serde_json::Value) -> eyre::Result<()> {
    let s = serde_json::to_string_pretty(v).context("serialize output")?;
    writeln!(std::io::stdout().lock(), "{s}").context("write output")?;
    Ok(())
}

fn proxy_client(cfg: &ZeroswapConfig) -> eyre::Result<SwapClient> {
    SwapClient::new(
        &cfg.client.proxy_base_url,
        Duration::from_secs(cfg.http.request_timeout_seconds),
    )
}

async fn one_shot(
    cfg: &ZeroswapConfig,
    pair: &PairArgs,
    taker: Option<Address>,
    firm: bool,
) -> eyre::Result<()> {
    let state = pair.state()?;
    if !state.has_amount() {
        eyre::bail!("--amount is required");
    }
    let req = SwapRequest::from_state(
        &state,
        &state.input_amount,
        taker,
        Some(cfg.client.slippage_bps),
    )?;
    let client = proxy_client(cfg)?;
    let (price, body) = if firm {
        let q = client.fetch_quote(&req).await?;
        let body = serde_json::to_value(&q).context("encode quote")?;
        (q.price, body)
    } else {
        let p = client.fetch_price(&req).await?;
        let body = serde_json::to_value(&p).context("encode price")?;
        (p, body)
    };
    let buy = client::format_buy_amount(&price, &state.buy_token)?;
    print_json(&serde_json::json!({
      "chainId": state.chain_id,
      "sell": { "symbol": state.sell_token.symbol, "amount": state.input_amount },
      "buy": { "symbol": state.buy_token.symbol, "amount": buy },
      "liquidityAvailable": price.liquidity_available,
      "sources": price.route.as_ref().map(zeroex::Route::sources),
      "response": body,
    }))
}

fn tokens_json(chain: Option<&str>) -> eyre::Result<serde_json::Value> {
    let chains: Vec<&registry::Chain> = match chain {
        Some(c) => {
            let state = repl::seed_state(Some(c), None, None, None)?;
            registry::chain(state.chain_id).into_iter().collect()
        }
        None => registry::supported_chains().iter().collect(),
    };
    Ok(chains
        .into_iter()
        .map(|c| {
            serde_json::json!({
              "id": c.id,
              "name": c.name,
              "explorer": c.explorer,
              "tokens": c.tokens(),
            })
        })
        .collect())
}

async fn run_swap(cfg: &ZeroswapConfig, pair: &PairArgs, connect: bool) -> eyre::Result<()> {
    let state = pair.state()?;
    let form = swap::form::SwapForm::new(state, None, cfg.client.slippage_bps);
    let client = proxy_client(cfg)?;
    let opts = repl::ReplOpts {
        proxy_base_url: cfg.client.proxy_base_url.clone(),
        share_base_url: cfg.client.share_base_url.clone(),
        debounce: Duration::from_millis(cfg.client.debounce_ms),
    };
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let form = match wallet::load_private_key(connect)? {
        Some(key) => {
            let w = wallet::LocalWallet::from_secret(
                &key,
                cfg.rpc.clone(),
                Duration::from_secs(cfg.client.receipt_timeout_seconds),
            )?;
            repl::run(form, client, w, opts, stdin).await?
        }
        None => repl::run(form, client, wallet::Disconnected, opts, stdin).await?,
    };
    if form.phase().tracking() {
        cli_output::print_problem("left before the swap confirmed; check the transaction above");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let paths = paths::ZeroswapPaths::discover()?;
    paths.ensure_private_dirs().context("create zeroswap dirs")?;
    let _log_guard = init_logging(&paths);

    match cli.cmd {
        Command::Serve { listen } => {
            let cfg = store::ConfigStore::new(&paths).load_or_init_default()?;
            let addr = listen.unwrap_or_else(|| cfg.server.listen_addr.clone());
            let state = server::ProxyState::from_config(&cfg.http)?;
            if cli_output::interactive_output() {
                cli_output::print_serve_banner(
                    env!("CARGO_PKG_VERSION"),
                    &addr,
                    state.has_api_key(),
                );
            }
            server::serve(&addr, state).await.context("proxy failed")
        }
        Command::Swap { pair, connect } => {
            let cfg = store::ConfigStore::new(&paths).load_or_init_default()?;
            run_swap(&cfg, &pair, connect).await.context("swap failed")
        }
        Command::Price { pair, taker } => {
            let cfg = store::ConfigStore::new(&paths).load_or_init_default()?;
            one_shot(&cfg, &pair, taker, false).await.context("price failed")
        }
        Command::Quote { pair, taker } => {
            let cfg = store::ConfigStore::new(&paths).load_or_init_default()?;
            one_shot(&cfg, &pair, Some(taker), true)
                .await
                .context("quote failed")
        }
        Command::Tokens { chain } => print_json(&tokens_json(chain.as_deref())?),
        Command::Link { pair, base } => {
            let cfg = store::ConfigStore::new(&paths).load_or_init_default()?;
            let base = base.unwrap_or_else(|| cfg.client.share_base_url.clone());
            let url = params::share_url(&base, &pair.state()?)?;
            writeln!(std::io::stdout().lock(), "{url}").context("write link")?;
            Ok(())
        }
        Command::Paths => {
            let s = serde_json::to_string(&paths).context("serialize paths")?;
            writeln!(std::io::stdout().lock(), "{s}").context("write paths")?;
            Ok(())
        }
        Command::Doctor { json } => doctor::run(json).await.context("doctor failed"),
    }
}
