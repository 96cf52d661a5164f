//! Key acquisition client.
//!
//! Drives the four network exchanges of an acquisition:
//! certificate (license server) -> challenge (API) -> license (license
//! server) -> submit (API, via [`Session`]).
use std::fmt;
use std::sync::Arc;

use base64::Engine;

use crate::acquisition::{Acquisition, AcquisitionStep, Idle};
use crate::api::{ChallengeRequest, DecryptionApi};
use crate::config::ClientConfig;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::key::KeySet;
use crate::message::{Challenge, LicenseResponse, ServerCertificate, SERVICE_CERTIFICATE_CHALLENGE};
use crate::session::Session;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Transport, DEFAULT_USER_AGENT};

/// Client for the license decryption API.
///
/// Holds no per-attempt state, so one client can serve any number of
/// concurrent acquisitions.
#[derive(Clone)]
pub struct Client {
    api: DecryptionApi,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").field("api", &self.api).finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client over the default reqwest transport.
    pub fn new(api_url: impl Into<String>, api_key: impl AsRef<str>) -> Result<Self> {
        Self::with_transport(api_url, api_key, Arc::new(HttpTransport::new()?))
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let user_agent = config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        let transport = HttpTransport::with_options(user_agent, config.system_proxy)?;
        Self::with_transport(&config.api_url, &config.api_key, Arc::new(transport))
    }

    /// Create a client over a caller supplied transport.
    pub fn with_transport(
        api_url: impl Into<String>,
        api_key: impl AsRef<str>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let api = DecryptionApi::new(api_url, api_key, Arc::clone(&transport))?;
        Ok(Self { api, transport })
    }

    pub fn api(&self) -> &DecryptionApi {
        &self.api
    }

    /// Fetch the privacy mode certificate from the license server.
    pub fn server_certificate(&self, request: &RequestContext) -> Result<ServerCertificate> {
        debug!("Requesting server certificate from {}", request.license_url());
        let response = self.post_license_server(
            AcquisitionStep::Certificate,
            request,
            SERVICE_CERTIFICATE_CHALLENGE.to_vec(),
        )?;
        Ok(ServerCertificate::from_bytes(&response.body))
    }

    /// Fetch a fresh server certificate and request a challenge for it.
    pub fn challenge(&self, request: &RequestContext) -> Result<Challenge> {
        let certificate = self.server_certificate(request)?;
        self.request_challenge(request, &certificate)
    }

    /// Request a challenge from the API for an already fetched certificate.
    pub fn request_challenge(
        &self,
        request: &RequestContext,
        certificate: &ServerCertificate,
    ) -> Result<Challenge> {
        debug!("Requesting challenge from {}", self.api.url());
        let challenge: Challenge = self.api.post(
            AcquisitionStep::Challenge,
            &ChallengeRequest {
                license_url: request.license_url(),
                pssh: request.pssh(),
                certificate: certificate.as_base64(),
                build_info: request.build_info(),
                cache: false,
            },
        )?;
        debug!("Received challenge for session {}", challenge.session_id);
        Ok(challenge)
    }

    /// Send the base64 `challenge` to the license server, returning its reply.
    pub fn license(&self, request: &RequestContext, challenge: &str) -> Result<LicenseResponse> {
        let body = base64::engine::general_purpose::STANDARD
            .decode(challenge)
            .map_err(Error::Base64DecodeError)?;
        debug!("Sending {} byte challenge to {}", body.len(), request.license_url());
        let response = self.post_license_server(AcquisitionStep::License, request, body)?;
        Ok(LicenseResponse::from_bytes(&response.body))
    }

    /// Open a session for `challenge`.
    pub fn session(&self, request: RequestContext, challenge: Challenge) -> Session {
        Session::new(self.api.clone(), request, challenge)
    }

    /// Start a step-by-step acquisition.
    pub fn acquisition(&self, request: RequestContext) -> Acquisition<'_, Idle> {
        Acquisition::new(self, request)
    }

    /// Run a whole acquisition: certificate, challenge, license, keys.
    pub fn keys(&self, request: &RequestContext) -> Result<KeySet> {
        info!("Acquiring keys from {}", request.license_url());
        self.acquisition(request.clone())
            .fetch_certificate()?
            .request_challenge()?
            .fetch_license()?
            .submit()
    }

    fn post_license_server(
        &self,
        step: AcquisitionStep,
        request: &RequestContext,
        body: Vec<u8>,
    ) -> Result<HttpResponse> {
        let response = self.transport.post(HttpRequest {
            url: request.license_url().to_string(),
            headers: request.license_headers(),
            body,
            proxy: request.proxy().map(str::to_string),
        })?;

        if !response.is_success() {
            return Err(Error::Transport {
                step,
                status: response.status,
                body: response.text(),
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};

    use super::Client;
    use crate::acquisition::AcquisitionStep;
    use crate::api::API_KEY_HEADER;
    use crate::context::RequestContext;
    use crate::error::Error;
    use crate::key::{Key, KeySet};
    use crate::message::{ServerCertificate, SERVICE_CERTIFICATE_CHALLENGE};
    use crate::transport::mock::ScriptedTransport;

    const API_URL: &str = "https://api.example/wv";
    const LICENSE_URL: &str = "https://license.example/wv";
    const PSSH: &str = "AAAAW3Bzc2gAAAAA7e+LqXnWSs6jyCfc1R0h7QAAADsIARIQ62dqu8s0Xpa7z2FmMPGj2hoNd2lkZXZpbmVfdGVzdCIQZmtqM2xqYVNkZmFsa3IzaioCSEQyAA==";

    fn client(transport: &Arc<ScriptedTransport>) -> Client {
        Client::with_transport(API_URL, "api-key", transport.clone()).expect("client")
    }

    fn request() -> RequestContext {
        RequestContext::new(LICENSE_URL, PSSH)
            .with_header("Authorization", "Bearer token")
            .expect("header")
            .with_build_info("build-info")
    }

    fn json_body(body: &[u8]) -> Value {
        serde_json::from_slice(body).expect("json body")
    }

    fn full_script() -> ScriptedTransport {
        ScriptedTransport::new()
            .reply(200, b"X".to_vec())
            .reply_json(200, json!({"challenge": "Y2hhbGxlbmdl", "session_id": "S"}))
            .reply(200, b"L".to_vec())
            .reply_json(
                200,
                json!({"kid": "k1", "keys": [{"key": "aa", "license_url": "u", "added_at": 1}]}),
            )
    }

    #[test]
    fn keys_runs_the_four_calls_in_order() {
        let transport = Arc::new(full_script());
        let keys = client(&transport).keys(&request()).expect("keys");

        assert_eq!(
            keys,
            KeySet {
                kid: "k1".to_string(),
                keys: vec![Key {
                    key: "aa".to_string(),
                    license_url: "u".to_string(),
                    added_at: 1.0,
                }],
            }
        );

        let requests = transport.requests();
        let urls: Vec<&str> = requests.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec![LICENSE_URL, API_URL, LICENSE_URL, API_URL]);

        // certificate
        assert_eq!(requests[0].body, SERVICE_CERTIFICATE_CHALLENGE);
        assert_eq!(requests[0].headers.get("authorization").expect("auth"), "Bearer token");
        assert!(requests[0].headers.get(API_KEY_HEADER).is_none());

        // challenge
        let challenge = json_body(&requests[1].body);
        assert_eq!(challenge["certificate"], "WA==");
        assert_eq!(challenge["pssh"], PSSH);
        assert_eq!(challenge["license_url"], LICENSE_URL);
        assert_eq!(challenge["buildInfo"], "build-info");
        assert_eq!(challenge["cache"], false);
        assert_eq!(requests[1].headers.get(API_KEY_HEADER).expect("key"), "api-key");
        assert!(requests[1].headers.get("authorization").is_none());

        // license
        assert_eq!(requests[2].body, b"challenge");
        assert_eq!(
            requests[2].headers.get("content-type").expect("type"),
            "application/octet-stream"
        );

        // submit
        let submit = json_body(&requests[3].body);
        assert_eq!(submit["session_id"], "S");
        assert_eq!(submit["response"], "TA==");
        assert_eq!(submit["buildInfo"], "build-info");
        assert!(submit.get("certificate").is_none());
    }

    #[test]
    fn certificate_failure_stops_before_the_api() {
        let transport = Arc::new(ScriptedTransport::new().reply(500, "upstream exploded"));
        let err = client(&transport).keys(&request()).expect_err("transport error");

        match &err {
            Error::Transport { step, status, body } => {
                assert_eq!(*step, AcquisitionStep::Certificate);
                assert_eq!(*status, 500);
                assert_eq!(body, "upstream exploded");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(err.to_string().contains("upstream exploded"));
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn challenge_api_error_stops_before_the_license() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(200, b"X".to_vec())
                .reply_json(403, json!({"error": true, "code": 403, "message": "bad key"})),
        );
        let err = client(&transport).challenge(&request()).expect_err("api error");

        assert!(matches!(
            err,
            Error::Api { step: AcquisitionStep::Challenge, code: 403, .. }
        ));
        assert!(err.to_string().contains("bad key"));
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn license_failure_never_submits() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(200, b"X".to_vec())
                .reply_json(200, json!({"challenge": "Y2hhbGxlbmdl", "session_id": "S"}))
                .reply(401, "license denied"),
        );
        let err = client(&transport).keys(&request()).expect_err("license error");

        assert_eq!(err.step(), Some(AcquisitionStep::License));
        assert_eq!(transport.requests().len(), 3);
    }

    #[test]
    fn malformed_challenge_is_rejected() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(200, b"X".to_vec())
                .reply(200, "<html>ok</html>"),
        );
        let err = client(&transport).keys(&request()).expect_err("malformed");

        assert!(matches!(
            err,
            Error::MalformedResponse { step: AcquisitionStep::Challenge, .. }
        ));
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn challenge_always_refetches_certificate() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(200, b"first".to_vec())
                .reply_json(200, json!({"challenge": "AA==", "session_id": "1"}))
                .reply(200, b"second".to_vec())
                .reply_json(200, json!({"challenge": "AA==", "session_id": "2"})),
        );
        let client = client(&transport);
        let request = request();

        assert_eq!(client.challenge(&request).expect("first").session_id, "1");
        assert_eq!(client.challenge(&request).expect("second").session_id, "2");

        let requests = transport.requests();
        assert_eq!(json_body(&requests[1].body)["certificate"], "Zmlyc3Q=");
        assert_eq!(json_body(&requests[3].body)["certificate"], "c2Vjb25k");
    }

    #[test]
    fn license_rejects_invalid_challenge_without_a_request() {
        let transport = Arc::new(ScriptedTransport::new());
        let err = client(&transport)
            .license(&request(), "**not base64**")
            .expect_err("decode error");

        assert!(matches!(err, Error::Base64DecodeError(_)));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn proxy_is_passed_to_license_server_calls_only() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply_json(200, json!({"challenge": "AA==", "session_id": "S"}))
                .reply(200, b"X".to_vec()),
        );
        let client = client(&transport);
        let request = request().with_proxy("http://proxy.local:3128");
        client
            .request_challenge(&request, &ServerCertificate::from_bytes(b"X"))
            .expect("challenge");
        client.server_certificate(&request).expect("certificate");

        let requests = transport.requests();
        assert_eq!(requests[0].proxy, None);
        assert_eq!(requests[1].proxy.as_deref(), Some("http://proxy.local:3128"));
    }

    #[test]
    fn build_info_is_omitted_when_unset() {
        let transport = Arc::new(full_script());
        client(&transport)
            .keys(&RequestContext::new(LICENSE_URL, PSSH))
            .expect("keys");

        let requests = transport.requests();
        assert!(json_body(&requests[1].body).get("buildInfo").is_none());
        assert!(json_body(&requests[3].body).get("buildInfo").is_none());
    }
}
