//! HTTP transport seam.
//!
//! Every network exchange in an acquisition is a single POST. [`Transport`]
//! abstracts that so the protocol can run over `reqwest` in production and
//! over a scripted transport in tests.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use reqwest::blocking::Client;
use reqwest::header::HeaderMap;

use crate::error::{Error, Result};

/// Default user agent sent by [`HttpTransport`].
pub const DEFAULT_USER_AGENT: &str = concat!("rswidevine-keys/", env!("CARGO_PKG_VERSION"));

/// One outbound POST.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Proxy URL to route this request through, passed through uninterpreted.
    pub proxy: Option<String>,
}

/// Status and raw body of a response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Something that can perform a POST and hand back the full response.
///
/// Implementations must not treat non-2xx statuses as errors; status
/// interpretation belongs to the caller.
pub trait Transport: Send + Sync {
    fn post(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// `reqwest::blocking` backed transport.
///
/// reqwest binds proxies per client, so each distinct proxy URL gets its own
/// client, built on first use and shared by clones of the transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    proxied: Arc<Mutex<HashMap<String, Client>>>,
    user_agent: String,
    system_proxy: bool,
}

impl HttpTransport {
    /// Create a transport with the default user agent.
    pub fn new() -> Result<Self> {
        Self::with_options(DEFAULT_USER_AGENT, true)
    }

    /// `system_proxy = false` ignores `HTTP(S)_PROXY` style environment
    /// variables; per request proxies still apply.
    pub fn with_options(user_agent: impl Into<String>, system_proxy: bool) -> Result<Self> {
        let user_agent = user_agent.into();
        let client = build_client(&user_agent, None, system_proxy)?;
        Ok(Self {
            client,
            proxied: Arc::default(),
            user_agent,
            system_proxy,
        })
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client> {
        let Some(proxy) = proxy else {
            return Ok(self.client.clone());
        };

        let mut proxied = self
            .proxied
            .lock()
            .map_err(|_| Error::Other("Proxy client cache is poisoned".to_string()))?;
        if let Some(client) = proxied.get(proxy) {
            return Ok(client.clone());
        }
        let client = build_client(&self.user_agent, Some(proxy), self.system_proxy)?;
        debug!("Built HTTP client for proxy {}", proxy);
        proxied.insert(proxy.to_string(), client.clone());
        Ok(client)
    }
}

impl Transport for HttpTransport {
    fn post(&self, request: HttpRequest) -> Result<HttpResponse> {
        let HttpRequest {
            url,
            headers,
            body,
            proxy,
        } = request;

        let client = self.client_for(proxy.as_deref())?;

        trace!("POST {} ({} bytes)", url, body.len());
        let response = client.post(&url).headers(headers).body(body).send()?;
        let status = response.status().as_u16();
        let body = response.bytes()?.to_vec();
        trace!("POST {} -> {} ({} bytes)", url, status, body.len());

        Ok(HttpResponse { status, body })
    }
}

fn build_client(user_agent: &str, proxy: Option<&str>, system_proxy: bool) -> Result<Client> {
    let mut builder = Client::builder().user_agent(user_agent);
    if !system_proxy {
        builder = builder.no_proxy();
    }
    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| Error::InvalidContext(format!("Invalid proxy '{}': {}", proxy, e)))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| Error::Other(format!("Failed to build HTTP client: {}", e)))
}
