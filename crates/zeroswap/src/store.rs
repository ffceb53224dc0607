use crate::{config::ZeroswapConfig, paths::ZeroswapPaths};
use eyre::Context as _;
use std::{fs, path::PathBuf};

pub const API_KEY_ENV: &str = "ZERO_EX_API_KEY";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

/// Environment wins over the file. Values are trimmed; empty values are ignored.
fn apply_env_overrides(cfg: &mut ZeroswapConfig) {
    fn apply_env(var: &str, setter: impl FnOnce(&str)) {
        if let Ok(u) = std::env::var(var) {
            let t = u.trim();
            if !t.is_empty() {
                setter(t);
            }
        }
    }

    apply_env(API_KEY_ENV, |v| {
        cfg.http.zeroex_api_key = Some(v.to_owned());
    });
    apply_env("ZEROSWAP_ZEROEX_BASE_URL", |v| {
        v.clone_into(&mut cfg.http.zeroex_base_url);
    });
    apply_env("ZEROSWAP_ANALYTICS_URL", |v| {
        v.clone_into(&mut cfg.http.analytics_url);
    });
    apply_env("ZEROSWAP_LISTEN_ADDR", |v| {
        v.clone_into(&mut cfg.server.listen_addr);
    });
    apply_env("ZEROSWAP_PROXY_URL", |v| {
        v.clone_into(&mut cfg.client.proxy_base_url);
    });
}

impl ConfigStore {
    pub fn new(paths: &ZeroswapPaths) -> Self {
        Self {
            path: paths.config_file(),
        }
    }

    #[cfg(test)]
    fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Read `config.toml`, writing the defaults first if it does not exist yet. Env overrides
    /// are applied to the returned value only; they are never persisted (the API key in
    /// particular stays out of the file).
    pub fn load_or_init_default(&self) -> eyre::Result<ZeroswapConfig> {
        let mut cfg = if self.path.exists() {
            let s = fs::read_to_string(&self.path).context("read config.toml")?;
            toml::from_str(&s).context("parse config.toml")?
        } else {
            let cfg = ZeroswapConfig::default();
            self.save(&cfg)?;
            cfg
        };
        apply_env_overrides(&mut cfg);
        Ok(cfg)
    }

    pub fn save(&self, cfg: &ZeroswapConfig) -> eyre::Result<()> {
        let s = toml::to_string_pretty(cfg).context("serialize config.toml")?;
        crate::fsutil::write_private(&self.path, s.as_bytes()).context("write config.toml")
    }
}
