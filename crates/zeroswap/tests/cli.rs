use std::path::Path;
use std::process::Output;

use eyre::Context as _;
use predicates::str::contains;
use serde_json::Value;

struct Dirs {
    config: tempfile::TempDir,
    data: tempfile::TempDir,
}

impl Dirs {
    fn new() -> eyre::Result<Self> {
        Ok(Self {
            config: tempfile::tempdir()?,
            data: tempfile::tempdir()?,
        })
    }

    fn cmd(&self, args: &[&str]) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("zeroswap"));
        cmd.env("ZEROSWAP_CONFIG_DIR", self.config.path())
            .env("ZEROSWAP_DATA_DIR", self.data.path())
            .env_remove("ZERO_EX_API_KEY")
            .env_remove("ZEROSWAP_PRIVATE_KEY")
            .env_remove("ZEROSWAP_PROXY_URL")
            .args(args);
        cmd
    }

    fn run(&self, args: &[&str]) -> eyre::Result<Output> {
        self.cmd(args)
            .output()
            .with_context(|| format!("run zeroswap {}", args.join(" ")))
    }

    fn run_ok(&self, args: &[&str]) -> eyre::Result<String> {
        let out = self.run(args)?;
        assert!(
            out.status.success(),
            "zeroswap {} exited non-zero: status={:?}, stderr={}",
            args.join(" "),
            out.status.code(),
            String::from_utf8_lossy(&out.stderr)
        );
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    fn config_file(&self) -> std::path::PathBuf {
        self.config.path().join("config.toml")
    }
}

fn json(s: &str) -> eyre::Result<Value> {
    serde_json::from_str(s).context("parse stdout json")
}

#[test]
fn doctor_json_runs_and_returns_valid_json() -> eyre::Result<()> {
    let dirs = Dirs::new()?;
    let v = json(&dirs.run_ok(&["doctor", "--json"])?)?;
    assert_eq!(v.get("ok").and_then(Value::as_bool), Some(true));
    assert!(v.get("version").and_then(|x| x.as_str()).is_some());
    assert!(v.get("paths").and_then(|x| x.as_object()).is_some());
    assert_eq!(
        v.get("api_key_configured").and_then(Value::as_bool),
        Some(false),
        "no key in env or file"
    );
    let chains = v.get("chains").and_then(Value::as_array).map(Vec::len);
    assert_eq!(chains, Some(2));
    Ok(())
}

#[test]
fn doctor_does_not_create_config() -> eyre::Result<()> {
    let dirs = Dirs::new()?;
    dirs.run_ok(&["doctor", "--json"])?;
    assert!(!dirs.config_file().exists(), "doctor must only read");
    Ok(())
}

#[test]
fn tokens_lists_registry() -> eyre::Result<()> {
    let dirs = Dirs::new()?;
    let v = json(&dirs.run_ok(&["tokens", "--chain", "arbitrum"])?)?;
    assert_eq!(v[0]["id"], 42161);
    let symbols: Vec<&str> = v[0]["tokens"]
        .as_array()
        .map(|a| a.iter().filter_map(|t| t["symbol"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(symbols, vec!["USDC", "WETH", "ARB"]);
    Ok(())
}

#[test]
fn link_writes_swap_query_and_creates_config() -> eyre::Result<()> {
    let dirs = Dirs::new()?;
    let out = dirs.run_ok(&[
        "link",
        "--sell",
        "usdc",
        "--buy",
        "weth",
        "--amount",
        "100",
        "--base",
        "https://swap.example/",
    ])?;
    let url = out.trim();
    assert!(url.starts_with("https://swap.example/?"), "{url}");
    assert!(url.contains("sellAmount=100"), "{url}");
    assert!(url.contains("chainId=8453"), "{url}");
    assert!(dirs.config_file().exists(), "first run writes defaults");
    Ok(())
}

#[test]
fn link_rejects_repeated_query_keys() -> eyre::Result<()> {
    let dirs = Dirs::new()?;
    let out = dirs.run(&["link", "--query", "chainId=8453&chainId=42161"])?;
    assert!(!out.status.success(), "repeated chainId must fail");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("chainId"), "{stderr}");
    Ok(())
}

#[test]
fn paths_honours_env_overrides() -> eyre::Result<()> {
    let dirs = Dirs::new()?;
    let v = json(&dirs.run_ok(&["paths"])?)?;
    let data_dir = v["data_dir"].as_str().map(Path::new);
    assert_eq!(data_dir, Some(dirs.data.path()));
    Ok(())
}

#[test]
fn price_without_amount_fails_before_any_request() -> eyre::Result<()> {
    let dirs = Dirs::new()?;
    dirs.cmd(&["price", "--chain", "base"])
        .assert()
        .failure()
        .stderr(contains("--amount is required"));
    Ok(())
}

#[test]
fn quote_requires_taker() -> eyre::Result<()> {
    let dirs = Dirs::new()?;
    dirs.cmd(&["quote", "--amount", "1"])
        .assert()
        .failure()
        .stderr(contains("--taker"));
    Ok(())
}
