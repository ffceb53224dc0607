use crate::{
    config::ZeroswapConfig, paths::ZeroswapPaths, registry, store::API_KEY_ENV,
    wallet::PRIVATE_KEY_ENV, zeroex::base_url_is_allowed,
};
use eyre::Context as _;
use serde_json::json;
use std::{fs, path::Path, path::PathBuf, time::Duration};
use tokio::net::TcpStream;

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

fn try_parse_config(path: &Path) -> eyre::Result<ZeroswapConfig> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ZeroswapConfig = toml::from_str(&s).context("parse config.toml")?;
    Ok(cfg)
}

/// Raw TCP connect to the proxy; no request is sent.
async fn probe_proxy(base_url: &str) -> (bool, Option<String>) {
    let url = match reqwest::Url::parse(base_url) {
        Ok(u) => u,
        Err(e) => return (false, Some(format!("bad url: {e}"))),
    };
    let (Some(host), Some(port)) = (url.host_str(), url.port_or_known_default()) else {
        return (false, Some("url has no host".to_owned()));
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let fut = TcpStream::connect((host, port));
    match tokio::time::timeout(Duration::from_millis(250), fut).await {
        Ok(Ok(_s)) => (true, None),
        Ok(Err(e)) => (false, Some(format!("connect failed: {e}"))),
        Err(_) => (false, Some("connect timed out".to_owned())),
    }
}

struct ConfigReport {
    path: PathBuf,
    exists: bool,
    parse_ok: bool,
    error: Option<String>,
    zeroex_base_url: Option<String>,
    zeroex_base_url_allowed: Option<bool>,
    api_key_in_file: Option<bool>,
    listen_addr: Option<String>,
    evm_chain_count: usize,
}

struct ProxyReport {
    base_url: String,
    reachable: bool,
    note: Option<String>,
}

struct DoctorReport {
    version: &'static str,
    paths: ZeroswapPaths,
    config: ConfigReport,
    api_key_configured: bool,
    wallet_key_in_env: bool,
    proxy: ProxyReport,
    env: serde_json::Value,
}

async fn collect(paths: &ZeroswapPaths) -> DoctorReport {
    let config_path = paths.config_file();
    let config_exists = config_path.exists();
    let (config_ok, config_err, cfg) = if config_exists {
        match try_parse_config(&config_path) {
            Ok(cfg) => (true, None, Some(cfg)),
            Err(e) => (false, Some(format!("{e:#}")), None),
        }
    } else {
        (false, None, None)
    };

    let api_key_in_file = cfg.as_ref().map(|c| {
        c.http
            .zeroex_api_key
            .as_ref()
            .is_some_and(|k| !k.trim().is_empty())
    });
    let api_key_configured = env_opt(API_KEY_ENV).is_some() || api_key_in_file == Some(true);

    let proxy_base_url = env_opt("ZEROSWAP_PROXY_URL").unwrap_or_else(|| {
        cfg.as_ref().map_or_else(
            || ZeroswapConfig::default().client.proxy_base_url,
            |c| c.client.proxy_base_url.clone(),
        )
    });
    let (reachable, note) = probe_proxy(&proxy_base_url).await;

    let env = json!({
      "ZEROSWAP_CONFIG_DIR": env_opt("ZEROSWAP_CONFIG_DIR"),
      "ZEROSWAP_DATA_DIR": env_opt("ZEROSWAP_DATA_DIR"),
      "ZEROSWAP_PROXY_URL": env_opt("ZEROSWAP_PROXY_URL"),
      "ZEROSWAP_LISTEN_ADDR": env_opt("ZEROSWAP_LISTEN_ADDR"),
      "ZEROSWAP_ZEROEX_BASE_URL": env_opt("ZEROSWAP_ZEROEX_BASE_URL"),
      "ZERO_EX_API_KEY_set": env_opt(API_KEY_ENV).is_some(),
    });

    DoctorReport {
        version: env!("CARGO_PKG_VERSION"),
        paths: paths.clone(),
        config: ConfigReport {
            path: config_path,
            exists: config_exists,
            parse_ok: config_ok,
            error: config_err,
            zeroex_base_url: cfg.as_ref().map(|c| c.http.zeroex_base_url.clone()),
            zeroex_base_url_allowed: cfg
                .as_ref()
                .map(|c| base_url_is_allowed(&c.http.zeroex_base_url)),
            api_key_in_file,
            listen_addr: cfg.as_ref().map(|c| c.server.listen_addr.clone()),
            evm_chain_count: cfg.as_ref().map_or(0, |c| c.rpc.evm_rpc_urls.len()),
        },
        api_key_configured,
        wallet_key_in_env: env_opt(PRIVATE_KEY_ENV).is_some(),
        proxy: ProxyReport {
            base_url: proxy_base_url,
            reachable,
            note,
        },
        env,
    }
}

fn chains_json() -> serde_json::Value {
    registry::supported_chains()
        .iter()
        .map(|c| {
            json!({
              "id": c.id,
              "name": c.name,
              "tokens": c.tokens().iter().map(|t| t.symbol).collect::<Vec<_>>(),
            })
        })
        .collect()
}

fn print_json(out: &mut impl std::io::Write, r: &DoctorReport) -> eyre::Result<()> {
    let s = serde_json::to_string_pretty(&json!({
      "ok": true,
      "version": r.version,
      "paths": r.paths,
      "config": {
        "path": r.config.path,
        "exists": r.config.exists,
        "parse_ok": r.config.parse_ok,
        "error": r.config.error,
        "zeroex_base_url": r.config.zeroex_base_url,
        "zeroex_base_url_allowed": r.config.zeroex_base_url_allowed,
        "api_key_in_file": r.config.api_key_in_file,
        "listen_addr": r.config.listen_addr,
        "evm_chain_count": r.config.evm_chain_count,
      },
      "api_key_configured": r.api_key_configured,
      "wallet_key_in_env": r.wallet_key_in_env,
      "proxy": {
        "base_url": r.proxy.base_url,
        "reachable": r.proxy.reachable,
        "note": r.proxy.note,
      },
      "chains": chains_json(),
      "env": r.env,
      "hints": [
        "The proxy needs ZERO_EX_API_KEY; without it /api/price and /api/quote answer 500.",
        "If proxy.reachable is false, start it with: zeroswap serve",
        "Set ZEROSWAP_PRIVATE_KEY (or answer the prompt) to review and submit swaps.",
      ]
    }))
    .context("serialize doctor json")?;
    writeln!(out, "{s}").context("write doctor json")?;
    Ok(())
}

fn print_human(out: &mut impl std::io::Write, r: &DoctorReport) -> eyre::Result<()> {
    writeln!(out, "zeroswap doctor (v{})", r.version).context("write header")?;
    writeln!(out).context("write newline")?;

    writeln!(out, "Paths:").context("write paths header")?;
    writeln!(out, "  config_dir: {}", r.paths.config_dir.display()).context("write paths")?;
    writeln!(out, "  data_dir:   {}", r.paths.data_dir.display()).context("write paths")?;
    writeln!(out, "  log_file:   {}", r.paths.log_file.display()).context("write paths")?;
    writeln!(out).context("write newline")?;

    writeln!(out, "Config:").context("write config header")?;
    writeln!(out, "  config.toml: {}", r.config.path.display()).context("write config")?;
    if !r.config.exists {
        writeln!(out, "  status: missing (will be created on first run)")
            .context("write config")?;
    } else if r.config.parse_ok {
        writeln!(
            out,
            "  status: ok (0x: {}, listen: {})",
            r.config.zeroex_base_url.as_deref().unwrap_or("?"),
            r.config.listen_addr.as_deref().unwrap_or("?"),
        )
        .context("write config")?;
        if r.config.zeroex_base_url_allowed == Some(false) {
            writeln!(out, "  warning: zeroex_base_url must be https").context("write config")?;
        }
    } else {
        writeln!(out, "  status: parse failed").context("write config")?;
        if let Some(e) = &r.config.error {
            let first = e.lines().next().unwrap_or("parse error");
            writeln!(out, "  error: {first}").context("write config")?;
        }
    }
    writeln!(out).context("write newline")?;

    writeln!(out, "Keys:").context("write keys header")?;
    writeln!(out, "  ZERO_EX_API_KEY configured: {}", r.api_key_configured)
        .context("write keys")?;
    writeln!(out, "  wallet key in env: {}", r.wallet_key_in_env).context("write keys")?;
    writeln!(out).context("write newline")?;

    writeln!(out, "Proxy:").context("write proxy header")?;
    writeln!(out, "  base_url: {}", r.proxy.base_url).context("write proxy")?;
    writeln!(out, "  reachable: {}", r.proxy.reachable).context("write proxy")?;
    if let Some(note) = &r.proxy.note {
        writeln!(out, "  note: {note}").context("write proxy")?;
    }
    writeln!(out).context("write newline")?;

    writeln!(out, "Chains:").context("write chains header")?;
    for c in registry::supported_chains() {
        let symbols: Vec<_> = c.tokens().iter().map(|t| t.symbol).collect();
        writeln!(out, "  {} ({}): {}", c.name, c.id, symbols.join(", ")).context("write chains")?;
    }
    Ok(())
}

pub async fn run(as_json: bool) -> eyre::Result<()> {
    let paths = ZeroswapPaths::discover()?;
    let report = collect(&paths).await;
    let mut out = std::io::stdout().lock();
    if as_json {
        print_json(&mut out, &report)?;
    } else {
        print_human(&mut out, &report)?;
    }
    Ok(())
}
