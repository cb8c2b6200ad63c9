use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::SqliteStore;
use crate::window::{TradingWindow, DEFAULT_WINDOW_END, DEFAULT_WINDOW_START};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const CONTROL_DOCUMENT_NAME: &str = "mlops.json";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeConfig {
    pub control_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    pub max_workers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            start: DEFAULT_WINDOW_START.to_string(),
            end: DEFAULT_WINDOW_END.to_string(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { max_workers: 1 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl StoreConfig {
    pub fn open(&self) -> SqliteStore {
        SqliteStore::new(&self.path).with_busy_timeout(Duration::from_millis(self.busy_timeout_ms))
    }
}

impl Config {
    /// Load from `EXPANSION_CONFIG_PATH` or `config/default.toml`, after
    /// pulling `.env` into the environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = std::env::var("EXPANSION_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut config = Self::load_from_path(&config_path)?;

        if config.scope.control_path.is_none() {
            if let Ok(dir) = std::env::var("JOB_CTRLS") {
                config.scope.control_path = Some(Path::new(&dir).join(CONTROL_DOCUMENT_NAME));
            }
        }
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&config_str)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("invalid expansion config")?;
        config.trading_window().context("window is invalid")?;
        Ok(config)
    }

    pub fn trading_window(&self) -> Result<TradingWindow> {
        Ok(TradingWindow::parse(&self.window.start, &self.window.end)?)
    }
}
