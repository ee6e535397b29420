//! Client configuration loaded from `~/.config/moddb/config.toml`.
//!
//! Every field has a default matching the public site, so the file is
//! optional and may set only the values that differ:
//!
//! ```toml
//! base_url = "https://www.moddb.com"
//! timeout_secs = 30
//!
//! [limits.comment]
//! rate = 1
//! window_secs = 60.0
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://www.moddb.com";

/// Longest window or sleep ceiling a config file may ask for: one week.
pub const MAX_LIMIT_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// Budget for one rate limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Calls allowed per window.
    pub rate: u32,
    /// Window length in seconds.
    pub window_secs: f64,
    /// Longest wait a caller accepts before failing. `None` fails fast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_ceiling_secs: Option<f64>,
}

impl LimiterConfig {
    #[must_use]
    pub fn global() -> Self {
        Self {
            rate: 40,
            window_secs: 300.0,
            sleep_ceiling_secs: Some(300.0),
        }
    }

    #[must_use]
    pub fn throttle() -> Self {
        Self {
            rate: 5,
            window_secs: 1.0,
            sleep_ceiling_secs: Some(1.0),
        }
    }

    #[must_use]
    pub fn comment() -> Self {
        Self {
            rate: 1,
            window_secs: 60.0,
            sleep_ceiling_secs: None,
        }
    }

    #[must_use]
    pub fn login() -> Self {
        Self {
            rate: 1,
            window_secs: 5.0,
            sleep_ceiling_secs: None,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !(self.window_secs > 0.0 && self.window_secs <= MAX_LIMIT_SECS) {
            return Err(Error::Config(format!(
                "limits.{name}.window_secs must be a positive number of at most {MAX_LIMIT_SECS} seconds"
            )));
        }
        if let Some(ceiling) = self.sleep_ceiling_secs {
            if !(0.0..=MAX_LIMIT_SECS).contains(&ceiling) {
                return Err(Error::Config(format!(
                    "limits.{name}.sleep_ceiling_secs must be between 0 and {MAX_LIMIT_SECS} seconds"
                )));
            }
        }
        Ok(())
    }
}

/// The four limiter budgets the client uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub global: LimiterConfig,
    pub throttle: LimiterConfig,
    pub comment: LimiterConfig,
    pub login: LimiterConfig,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            global: LimiterConfig::global(),
            throttle: LimiterConfig::throttle(),
            comment: LimiterConfig::comment(),
            login: LimiterConfig::login(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Site root every relative link is joined against.
    pub base_url: String,
    /// Fixed user agent. Rotated from a browser list when unset.
    pub user_agent: Option<String>,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Results per list page, used to turn "(31 - 60 of 200)" into page numbers.
    pub per_page: u32,
    pub limits: LimitsConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: None,
            timeout_secs: 30,
            connect_timeout_secs: 10,
            per_page: 30,
            limits: LimitsConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load from the default location, falling back to defaults when the file
    /// does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load from `path`, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("base_url {:?}: {e}", self.base_url)))?;
        if self.per_page == 0 {
            return Err(Error::Config("per_page must be at least 1".to_string()));
        }
        self.limits.global.validate("global")?;
        self.limits.throttle.validate("throttle")?;
        self.limits.comment.validate("comment")?;
        self.limits.login.validate("login")?;
        Ok(())
    }
}

/// Return the path to the config file.
#[must_use]
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("moddb")
        .join("config.toml")
}
