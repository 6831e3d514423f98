use std::fmt;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Config(ConfigError),
    Http(reqwest::Error),
    Api { status: u16, message: String },
    InvalidJson(serde_json::Error),
    Poisoned,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(err) => write!(f, "invalid configuration: {}", err),
            Error::Http(err) => write!(f, "request failed: {}", err),
            Error::Api { status, message } => {
                write!(f, "api returned status {}: {}", status, message)
            }
            Error::InvalidJson(err) => write!(f, "invalid json in response body: {}", err),
            Error::Poisoned => write!(f, "client state lock was poisoned"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(err) => Some(err),
            Error::Http(err) => Some(err),
            Error::InvalidJson(err) => Some(err),
            Error::Api { .. } | Error::Poisoned => None,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidJson(err)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Error::Poisoned
    }
}

#[derive(serde::Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(serde::Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

impl Error {
    /// Build an `Api` error from a non-2xx response, preferring the
    /// `error.message` field of a structured error body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ApiErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.error.message)
            .unwrap_or_else(|| body.to_string());

        Error::Api { status, message }
    }
}
