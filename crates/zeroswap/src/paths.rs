use directories::ProjectDirs;
use eyre::ContextCompat as _;
use serde::Serialize;
use std::path::PathBuf;

pub const CONFIG_DIR_ENV: &str = "ZEROSWAP_CONFIG_DIR";
pub const DATA_DIR_ENV: &str = "ZEROSWAP_DATA_DIR";

#[derive(Debug, Clone, Serialize)]
pub struct ZeroswapPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_file: PathBuf,
}

impl ZeroswapPaths {
    pub fn discover() -> eyre::Result<Self> {
        let env_dir = |var: &str| {
            std::env::var_os(var)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };

        // Either directory can be overridden on its own (tests, CI, containers).
        let (config_dir, data_dir) = match (env_dir(CONFIG_DIR_ENV), env_dir(DATA_DIR_ENV)) {
            (Some(c), Some(d)) => (c, d),
            (c, d) => {
                // Linux: ~/.config/zeroswap, macOS: ~/Library/Application Support/zeroswap
                let proj = ProjectDirs::from("", "", "zeroswap")
                    .context("failed to resolve project dirs")?;
                (
                    c.unwrap_or_else(|| proj.config_dir().to_path_buf()),
                    d.unwrap_or_else(|| proj.data_dir().to_path_buf()),
                )
            }
        };
        let log_file = data_dir.join("zeroswap.log.jsonl");
        Ok(Self {
            config_dir,
            data_dir,
            log_file,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn ensure_private_dirs(&self) -> eyre::Result<()> {
        crate::fsutil::ensure_private_dir(&self.config_dir)?;
        crate::fsutil::ensure_private_dir(&self.data_dir)?;
        Ok(())
    }
}
