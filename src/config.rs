use crate::search::DEFAULT_PAGE_LEN;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://textcritical.net";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const ENV_BASE_URL: &str = "TEXTCRITICAL_BASE_URL";
const ENV_TIMEOUT: &str = "TEXTCRITICAL_TIMEOUT_SECS";
const ENV_SETTINGS: &str = "TEXTCRITICAL_SETTINGS";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub page_len: u32,
    pub user_agent: String,
    pub settings_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            page_len: DEFAULT_PAGE_LEN,
            user_agent: format!("textcritical-rs/{}", env!("CARGO_PKG_VERSION")),
            settings_path: default_settings_path(),
        }
    }
}

fn default_settings_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join(".config").join("textcritical").join("settings.json"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidBaseUrl(String),
    InvalidTimeout(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidBaseUrl(value) => {
                write!(f, "base URL must start with http:// or https://, got {value:?}")
            }
            ConfigError::InvalidTimeout(value) => {
                write!(f, "timeout must be a positive number of seconds, got {value:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl ClientConfig {
    /// Defaults overridden by `TEXTCRITICAL_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            config = config.with_base_url(base_url);
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT) {
            config.timeout = parse_timeout(&timeout)?;
        }
        if let Some(path) = lookup(ENV_SETTINGS).filter(|p| !p.trim().is_empty()) {
            config.settings_path = Some(PathBuf::from(path));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout("0".into()));
        }
        Ok(())
    }
}

pub fn parse_timeout(raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidTimeout(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_public_site() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.page_len, 10);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "http://localhost:8000/"),
            (ENV_TIMEOUT, "5"),
            (ENV_SETTINGS, "/tmp/tc.json"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.settings_path, Some(PathBuf::from("/tmp/tc.json")));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert_eq!(
            ClientConfig::from_lookup(lookup(&[(ENV_TIMEOUT, "soon")])),
            Err(ConfigError::InvalidTimeout("soon".into()))
        );
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[(ENV_BASE_URL, "textcritical.net")])),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
        assert!(parse_timeout("0").is_err());
    }
}
