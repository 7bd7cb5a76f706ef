//! Autosave and HTTP client configuration, loaded from the environment.

use std::time::Duration;

/// Default debounce delay between the last edit and the autosave.
pub const DEFAULT_SAVE_DELAY_MS: u64 = 2000;
/// Default number of unsaved edits that forces an immediate save.
pub const DEFAULT_MAX_CHANGES_BEFORE_SAVE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveConfig {
    /// Quiet period after the last edit before the save fires
    pub save_delay: Duration,
    /// Edits allowed past the last save before the debounce is bypassed
    pub max_changes_before_save: u32,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            save_delay: Duration::from_millis(DEFAULT_SAVE_DELAY_MS),
            max_changes_before_save: DEFAULT_MAX_CHANGES_BEFORE_SAVE,
        }
    }
}

impl AutosaveConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            save_delay: Duration::from_millis(env_parse("SAVE_DELAY_MS", DEFAULT_SAVE_DELAY_MS)?),
            max_changes_before_save: env_parse(
                "MAX_CHANGES_BEFORE_SAVE",
                DEFAULT_MAX_CHANGES_BEFORE_SAVE,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_changes_before_save == 0 {
            return Err(anyhow::anyhow!(
                "MAX_CHANGES_BEFORE_SAVE must be at least 1"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the script REST API, without a trailing slash
    pub api_base_url: String,
    /// Per-request timeout applied by the HTTP client
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        Ok(Self {
            api_base_url: env_str("SCRIPT_API_BASE_URL", &defaults.api_base_url)
                .trim_end_matches('/')
                .to_string(),
            request_timeout: Duration::from_secs(env_parse(
                "SCRIPT_API_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
        })
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}
