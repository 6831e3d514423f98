use std::fmt;
use std::sync::{OnceLock, PoisonError, RwLock};

use crate::transport::Transport;

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
        }
    }

    pub fn from_string(level: &str) -> Result<Self, ConfigError> {
        match level {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" => Ok(LogLevel::Warning),
            other => Err(ConfigError::UnknownLogLevel(other.to_string())),
        }
    }

    pub fn logs_requests(&self) -> bool {
        matches!(self, LogLevel::Debug | LogLevel::Info)
    }

    pub fn logs_responses(&self) -> bool {
        matches!(self, LogLevel::Debug)
    }
}

/// Settings read by the requestor at the start of every call.
///
/// Nothing is validated on assignment; `api_base` is checked when a request
/// is built and `proxy` when a transport is built from it.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub api_base: String,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub proxy: Option<String>,
    pub default_transport: Option<Transport>,
    pub log_level: Option<LogLevel>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            api_version: None,
            proxy: None,
            default_transport: None,
            log_level: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidUrl(url::ParseError),
    MissingHost,
    UnsupportedScheme(String),
    InvalidProxy(String),
    InvalidHeader(&'static str),
    UnknownLogLevel(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidUrl(err) => write!(f, "invalid api base: {}", err),
            ConfigError::MissingHost => write!(f, "api base missing host"),
            ConfigError::UnsupportedScheme(scheme) => {
                write!(f, "unsupported url scheme: {}", scheme)
            }
            ConfigError::InvalidProxy(proxy) => write!(f, "invalid proxy url: {}", proxy),
            ConfigError::InvalidHeader(field) => {
                write!(f, "{} is not a valid header value", field)
            }
            ConfigError::UnknownLogLevel(level) => write!(f, "unknown log level: {}", level),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<url::ParseError> for ConfigError {
    fn from(err: url::ParseError) -> Self {
        ConfigError::InvalidUrl(err)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

impl Config {
    /// Defaults overlaid with `STRIPE_API_KEY`, `STRIPE_API_BASE`,
    /// `STRIPE_API_VERSION`, `STRIPE_PROXY` and `STRIPE_LOG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(api_base) = env_value("STRIPE_API_BASE") {
            config.api_base = api_base;
        }
        config.api_key = env_value("STRIPE_API_KEY");
        config.api_version = env_value("STRIPE_API_VERSION");
        config.proxy = env_value("STRIPE_PROXY");
        config.log_level = env_value("STRIPE_LOG")
            .map(|level| LogLevel::from_string(&level))
            .transpose()?;

        Ok(config)
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_default_transport(mut self, transport: Transport) -> Self {
        self.default_transport = Some(transport);
        self
    }

    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = Some(log_level);
        self
    }

    pub fn api_base_url(&self) -> Result<url::Url, ConfigError> {
        let url = url::Url::parse(&self.api_base)?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }

        if url.host_str().is_none() {
            return Err(ConfigError::MissingHost);
        }

        Ok(url)
    }

    /// Absolute URL for an API path, e.g. `/v1/balance`.
    pub fn url_for(&self, path: &str) -> Result<String, ConfigError> {
        self.api_base_url()?;
        Ok(format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    }
}

fn global_slot() -> &'static RwLock<Config> {
    static GLOBAL: OnceLock<RwLock<Config>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(Config::default()))
}

/// Copy of the process-wide configuration as it is right now.
pub fn snapshot() -> Config {
    global_slot()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Mutate the process-wide configuration. Last write wins.
pub fn update_global<F>(mutate: F)
where
    F: FnOnce(&mut Config),
{
    let mut config = global_slot()
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    mutate(&mut config);
}

/// Restores the captured process-wide configuration when dropped.
#[must_use = "the override is reverted as soon as the guard is dropped"]
pub struct ScopedConfig {
    original: Option<Config>,
}

impl ScopedConfig {
    pub fn original(&self) -> Option<&Config> {
        self.original.as_ref()
    }
}

impl Drop for ScopedConfig {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            update_global(|config| *config = original);
        }
    }
}

/// Apply `mutate` to the process-wide configuration until the returned
/// guard goes out of scope.
pub fn override_global<F>(mutate: F) -> ScopedConfig
where
    F: FnOnce(&mut Config),
{
    let original = snapshot();
    update_global(mutate);
    ScopedConfig {
        original: Some(original),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_production() {
        let config = Config::default();
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert!(config.proxy.is_none());
        assert!(config.default_transport.is_none());
        assert_eq!(config.api_base_url().unwrap().scheme(), "https");
    }

    #[test]
    fn url_for_joins_without_double_slashes() {
        let config = Config::default().with_api_base("http://localhost:12111/");
        assert_eq!(
            config.url_for("/v1/balance").unwrap(),
            "http://localhost:12111/v1/balance"
        );
    }

    #[test]
    fn api_base_url_rejects_other_schemes() {
        let config = Config::default().with_api_base("ftp://files.example.com");
        assert!(matches!(
            config.api_base_url(),
            Err(ConfigError::UnsupportedScheme(scheme)) if scheme == "ftp"
        ));
    }

    #[test]
    fn api_base_url_rejects_garbage() {
        let config = Config::default().with_api_base("not a url");
        assert!(matches!(
            config.url_for("/v1/balance"),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn global_holder_recovers_after_a_panicking_update() {
        let outcome = std::panic::catch_unwind(|| {
            update_global(|config| {
                config.api_key = Some("sk_test_partial".to_string());
                panic!("update failed");
            });
        });
        assert!(outcome.is_err());

        assert_eq!(snapshot().api_key.as_deref(), Some("sk_test_partial"));

        update_global(|config| *config = Config::default());
        assert_eq!(snapshot(), Config::default());
    }

    #[test]
    fn log_level_round_trips_known_names() {
        for level in [LogLevel::Debug, LogLevel::Info, LogLevel::Warning] {
            assert_eq!(LogLevel::from_string(level.as_str()).unwrap(), level);
        }
        assert!(matches!(
            LogLevel::from_string("verbose"),
            Err(ConfigError::UnknownLogLevel(level)) if level == "verbose"
        ));
    }

    #[test]
    fn log_level_gates_request_and_response_lines() {
        assert!(LogLevel::Debug.logs_requests());
        assert!(LogLevel::Debug.logs_responses());
        assert!(LogLevel::Info.logs_requests());
        assert!(!LogLevel::Info.logs_responses());
        assert!(!LogLevel::Warning.logs_requests());
    }
}
