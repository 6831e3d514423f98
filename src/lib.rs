//! Client for the Stripe HTTP API, focused on how each request reaches the
//! network: the configured API base, an optional proxy, or a caller-supplied
//! transport.
//!
//! ```no_run
//! use stripe_wire::{Balance, Config, Requestor};
//!
//! let requestor = Requestor::new();
//! let config = Config::default().with_api_key("sk_test_123");
//! let balance = Balance::retrieve(&requestor, &config)?;
//! # Ok::<(), stripe_wire::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod mock;
pub mod requestor;
pub mod resources;
pub mod transport;

pub use config::{Config, ConfigError, LogLevel};
pub use error::{Error, Result};
pub use requestor::{Requestor, PROXY_UPDATED_WARNING};
pub use resources::Balance;
pub use transport::{HttpClient, HttpRequest, HttpResponse, Transport};

/// Build the stock transport, optionally routed through `proxy`.
///
/// # Errors
/// Returns an error when the proxy URL cannot be parsed or the client fails
/// to build.
pub fn new_default_transport(proxy: Option<&str>) -> Result<Transport> {
    Transport::new_default(proxy)
}

/// Retrieve the balance using the process-wide configuration and requestor.
///
/// # Errors
/// Returns an error when the configuration is invalid, the request fails, or
/// the response is not a successful JSON body.
pub fn retrieve_balance() -> Result<serde_json::Value> {
    let config = config::snapshot();
    Balance::retrieve(Requestor::global(), &config)
}
