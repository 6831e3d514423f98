use std::fmt;
use std::sync::Arc;

use reqwest::header::HeaderMap;
use reqwest::Method;

use crate::config::ConfigError;
use crate::error::Result;

#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Anything that can put an `HttpRequest` on the wire.
///
/// Implement this to hand the requestor a custom client through
/// `Config::default_transport`.
pub trait HttpClient: Send + Sync {
    fn name(&self) -> &'static str;

    /// Proxy this client routes through, if it was built with one.
    fn proxy(&self) -> Option<&str> {
        None
    }

    fn request(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Blocking `reqwest` client. Ignores proxy environment variables; the only
/// proxy it uses is the one it was built with.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
    proxy: Option<String>,
}

impl ReqwestClient {
    pub fn new(proxy: Option<&str>) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder().no_proxy();

        if let Some(url) = proxy {
            let proxy = reqwest::Proxy::all(url)
                .map_err(|_| ConfigError::InvalidProxy(url.to_string()))?;
            builder = builder.proxy(proxy);
            tracing::debug!(proxy = url, "building http client with proxy");
        }

        Ok(Self {
            client: builder.build()?,
            proxy: proxy.map(str::to_string),
        })
    }
}

impl HttpClient for ReqwestClient {
    fn name(&self) -> &'static str {
        "reqwest"
    }

    fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    fn request(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let response = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone())
            .send()?;

        let status = response.status().as_u16();
        let body = response.text()?;

        Ok(HttpResponse { status, body })
    }
}

/// Shared handle to an `HttpClient`. Clones point at the same client, and
/// two handles compare equal only when they do.
#[derive(Clone)]
pub struct Transport {
    client: Arc<dyn HttpClient>,
}

impl Transport {
    /// Stock transport: direct when `proxy` is `None`, otherwise routed
    /// through that proxy for every scheme.
    pub fn new_default(proxy: Option<&str>) -> Result<Self> {
        Ok(Self::from_client(ReqwestClient::new(proxy)?))
    }

    pub fn from_client<C>(client: C) -> Self
    where
        C: HttpClient + 'static,
    {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn name(&self) -> &'static str {
        self.client.name()
    }

    pub fn proxy(&self) -> Option<&str> {
        self.client.proxy()
    }

    pub fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.client.request(request)
    }

    pub fn same_as(&self, other: &Transport) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.client), Arc::as_ptr(&other.client))
    }
}

impl PartialEq for Transport {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("client", &self.name())
            .field("proxy", &self.proxy())
            .finish()
    }
}
