use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the snapforge library.
///
/// # Loading
///
/// ```rust,no_run
/// use snapforge::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.transcode.quality = 75;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory the catalog roots at. Defaults to a per-user temp area
    /// when unset.
    pub catalog_root: Option<String>,
    /// Transcode behavior.
    pub transcode: TranscodeConfig,
    /// Output behavior.
    pub output: OutputConfig,
}

/// PNG to JPEG conversion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeConfig {
    /// JPEG quality, 0–100.
    pub quality: u8,
}

/// Output and logging behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Optional path to a log file.
    pub log_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_root: None,
            transcode: TranscodeConfig { quality: 90 },
            output: OutputConfig { log_file: None },
        }
    }
}

impl Config {
    /// Resolve the config file path — same directory as the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// The catalog root to use: configured, or a per-user default.
    pub fn catalog_root(&self) -> PathBuf {
        match &self.catalog_root {
            Some(root) => PathBuf::from(root),
            None => std::env::temp_dir().join("snapforge-catalog"),
        }
    }
}
