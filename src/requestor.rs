use std::sync::Mutex;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Method;

use crate::config::{Config, ConfigError};
use crate::error::{Error, Result};
use crate::transport::{HttpRequest, Transport};

pub const PROXY_UPDATED_WARNING: &str = "stripe.proxy was updated after sending a request - this is a no-op. To use a different proxy, set stripe.default_http_client to a new client configured with the proxy.";

enum Origin {
    /// Handed in through `Config::default_transport`.
    Assigned,
    /// Built by the requestor from the proxy setting of its first request.
    Cached { proxy: Option<String> },
}

struct TransportSlot {
    transport: Transport,
    origin: Origin,
    used: bool,
    warned_for: Option<Option<String>>,
}

impl TransportSlot {
    fn assigned(transport: Transport) -> Self {
        Self {
            transport,
            origin: Origin::Assigned,
            used: false,
            warned_for: None,
        }
    }

    fn cached(transport: Transport, proxy: Option<String>) -> Self {
        Self {
            transport,
            origin: Origin::Cached { proxy },
            used: false,
            warned_for: None,
        }
    }

    fn is_assigned(&self) -> bool {
        matches!(self.origin, Origin::Assigned)
    }

    fn ignores(&self, proxy: &Option<String>) -> bool {
        match &self.origin {
            Origin::Assigned => proxy.is_some() && proxy.as_deref() != self.transport.proxy(),
            Origin::Cached { proxy: built_with } => self.used && proxy != built_with,
        }
    }

    /// Warns once per distinct proxy value that this slot is ignoring.
    fn check_proxy(&mut self, proxy: &Option<String>) {
        if !self.ignores(proxy) {
            self.warned_for = None;
            return;
        }

        if self.warned_for.as_ref() == Some(proxy) {
            return;
        }

        tracing::warn!("{}", PROXY_UPDATED_WARNING);
        self.warned_for = Some(proxy.clone());
    }
}

/// Sends API requests, choosing a transport for each one from the `Config`
/// it is called with.
///
/// Precedence: `config.default_transport`, then the transport cached by an
/// earlier request, then a fresh transport built from `config.proxy`.
pub struct Requestor {
    slot: Mutex<Option<TransportSlot>>,
}

impl Default for Requestor {
    fn default() -> Self {
        Self::new()
    }
}

impl Requestor {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Requestor shared by the process-wide convenience functions.
    pub fn global() -> &'static Requestor {
        static GLOBAL: Requestor = Requestor::new();
        &GLOBAL
    }

    /// Transport the next request would reuse, if one is held.
    pub fn cached_transport(&self) -> Result<Option<Transport>> {
        let slot = self.slot.lock()?;
        Ok(slot.as_ref().map(|slot| slot.transport.clone()))
    }

    /// Forget the held transport so the next request rebuilds from its config.
    pub fn reset(&self) -> Result<()> {
        *self.slot.lock()? = None;
        Ok(())
    }

    fn select_transport(&self, config: &Config) -> Result<Transport> {
        let mut slot = self.slot.lock()?;

        let reusable = match (&config.default_transport, slot.as_ref()) {
            (Some(assigned), Some(current)) => {
                current.is_assigned() && current.transport.same_as(assigned)
            }
            (None, Some(current)) => !current.is_assigned(),
            (_, None) => false,
        };

        let mut current = match slot.take() {
            Some(current) if reusable => current,
            _ => match &config.default_transport {
                Some(assigned) => TransportSlot::assigned(assigned.clone()),
                None => TransportSlot::cached(
                    Transport::new_default(config.proxy.as_deref())?,
                    config.proxy.clone(),
                ),
            },
        };

        current.check_proxy(&config.proxy);
        current.used = true;

        let transport = current.transport.clone();
        *slot = Some(current);
        Ok(transport)
    }

    pub fn request(
        &self,
        config: &Config,
        method: Method,
        path: &str,
    ) -> Result<serde_json::Value> {
        let request = HttpRequest {
            method,
            url: config.url_for(path)?,
            headers: request_headers(config)?,
        };

        let transport = self.select_transport(config)?;
        let log_level = config.log_level;

        if log_level.is_some_and(|level| level.logs_requests()) {
            tracing::info!(
                method = %request.method,
                url = %request.url,
                transport = transport.name(),
                "Request to Stripe api"
            );
        }

        let response = transport.send(&request)?;

        if log_level.is_some_and(|level| level.logs_responses()) {
            tracing::debug!(
                status = response.status,
                body = %response.body,
                "Stripe API response"
            );
        }

        if !response.is_success() {
            return Err(Error::from_response(response.status, &response.body));
        }

        Ok(serde_json::from_str(&response.body)?)
    }

    pub fn get(&self, config: &Config, path: &str) -> Result<serde_json::Value> {
        self.request(config, Method::GET, path)
    }
}

fn request_headers(config: &Config) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!(
            "Stripe/v1 RustBindings/{}",
            env!("CARGO_PKG_VERSION")
        ))
        .map_err(|_| ConfigError::InvalidHeader("user agent"))?,
    );

    if let Some(api_key) = &config.api_key {
        let value = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| ConfigError::InvalidHeader("api_key"))?;
        headers.insert(AUTHORIZATION, value);
    }

    if let Some(api_version) = &config.api_version {
        let value = HeaderValue::from_str(api_version)
            .map_err(|_| ConfigError::InvalidHeader("api_version"))?;
        headers.insert("Stripe-Version", value);
    }

    Ok(headers)
}
