//! Per-attempt request parameters.
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Url;

use crate::error::{Error, Result};
use crate::pssh::Pssh;
use crate::utils::BASE64_LENIENT;

/// Content type used for raw-body license server requests.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Fixed parameters of one license acquisition attempt.
///
/// Construct with [`RequestContext::new`] and the `with_*` builders; the
/// context is read-only once handed to a [`Client`](crate::client::Client).
#[derive(Debug, Clone)]
pub struct RequestContext {
    license_url: String,
    pssh: String,
    headers: HeaderMap,
    proxy: Option<String>,
    build_info: Option<String>,
}

impl RequestContext {
    pub fn new(license_url: impl Into<String>, pssh: impl Into<String>) -> Self {
        Self {
            license_url: license_url.into(),
            pssh: pssh.into(),
            headers: HeaderMap::new(),
            proxy: None,
            build_info: None,
        }
    }

    /// Add a header sent to the license server.
    ///
    /// Setting `Content-Type` here replaces the default octet-stream type.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidHeader(format!("{}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::InvalidHeader(format!("{}: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_headers<I, K, V>(self, headers: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        headers
            .into_iter()
            .try_fold(self, |ctx, (k, v)| ctx.with_header(k.as_ref(), v.as_ref()))
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_build_info(mut self, build_info: impl Into<String>) -> Self {
        self.build_info = Some(build_info.into());
        self
    }

    pub fn license_url(&self) -> &str {
        &self.license_url
    }

    /// Base64 PSSH, exactly as supplied.
    pub fn pssh(&self) -> &str {
        &self.pssh
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn build_info(&self) -> Option<&str> {
        self.build_info.as_deref()
    }

    /// Parse the PSSH for inspection.
    pub fn pssh_box(&self) -> Result<Pssh> {
        Pssh::from_base64(&self.pssh)
    }

    /// Reject contexts that could never produce a valid acquisition.
    ///
    /// The PSSH must be standard-alphabet base64; `=` padding is optional.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.license_url).map_err(|e| {
            Error::InvalidContext(format!("License URL '{}' is invalid: {}", self.license_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidContext(format!(
                "License URL scheme '{}' is not http(s)",
                url.scheme()
            )));
        }

        if self.pssh.trim().is_empty() {
            return Err(Error::InvalidContext("PSSH must not be empty".to_string()));
        }
        BASE64_LENIENT
            .decode(self.pssh.trim())
            .map_err(|e| Error::InvalidContext(format!("PSSH is not valid base64: {}", e)))?;

        Ok(())
    }

    /// Headers for a raw-body license server request.
    pub fn license_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
        headers
    }
}
