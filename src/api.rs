//! Decryption API boundary.
//!
//! Both API calls are JSON POSTs to the same endpoint, authenticated with an
//! `X-API-Key` header. The HTTP status alone decides whether the body is the
//! success shape or `{error, code, message}`.
use std::fmt;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::acquisition::AcquisitionStep;
use crate::error::{Error, Result};
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Authenticated handle on the decryption API.
///
/// Cloning is cheap; a [`Session`](crate::session::Session) gets its own clone
/// instead of a reference back to the client.
#[derive(Clone)]
pub struct DecryptionApi {
    url: Arc<str>,
    api_key: HeaderValue,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for DecryptionApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionApi")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl DecryptionApi {
    pub fn new(
        url: impl Into<String>,
        api_key: impl AsRef<str>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let mut api_key = HeaderValue::from_str(api_key.as_ref())
            .map_err(|e| Error::Config(format!("Invalid API key: {}", e)))?;
        api_key.set_sensitive(true);

        Ok(Self {
            url: Arc::from(url.into()),
            api_key,
            transport,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST `body` as JSON and decode the success shape.
    pub(crate) fn post<B, T>(&self, step: AcquisitionStep, body: &B) -> Result<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let body = serde_json::to_vec(body)
            .map_err(|e| Error::Other(format!("Failed to encode {} request: {}", step, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(API_KEY_HEADER, self.api_key.clone());

        let response = self.transport.post(HttpRequest {
            url: self.url.to_string(),
            headers,
            body,
            proxy: None,
        })?;

        match ApiReply::from_response(step, &response)? {
            ApiReply::Success(data) => Ok(data),
            ApiReply::Failure(failure) => Err(Error::Api {
                step,
                code: failure.code,
                message: failure.message,
            }),
        }
    }
}

/// Error body returned with a non-success status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    pub error: bool,
    pub code: i64,
    pub message: String,
}

// `message` is required; bodies without it fall back to the raw text.
#[derive(Deserialize)]
struct FailureBody {
    #[serde(default = "default_error")]
    error: bool,
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

fn default_error() -> bool {
    true
}

/// Decoded API response, discriminated by HTTP status.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiReply<T> {
    Success(T),
    Failure(ApiFailure),
}

impl<T: DeserializeOwned> ApiReply<T> {
    /// A 2xx body that is not `T` is a [`Error::MalformedResponse`]. A non-2xx
    /// body that is not JSON is kept as the failure message.
    pub fn from_response(step: AcquisitionStep, response: &HttpResponse) -> Result<Self> {
        if response.is_success() {
            return serde_json::from_slice(&response.body)
                .map(ApiReply::Success)
                .map_err(|e| Error::MalformedResponse {
                    step,
                    reason: e.to_string(),
                });
        }

        let status = i64::from(response.status);
        let failure = match serde_json::from_slice::<FailureBody>(&response.body) {
            Ok(body) => ApiFailure {
                error: body.error,
                code: body.code.unwrap_or(status),
                message: body.message,
            },
            Err(_) => ApiFailure {
                error: true,
                code: status,
                message: response.text(),
            },
        };
        Ok(ApiReply::Failure(failure))
    }
}

/// Challenge request envelope.
#[derive(Debug, Serialize)]
pub(crate) struct ChallengeRequest<'a> {
    pub license_url: &'a str,
    pub pssh: &'a str,
    pub certificate: &'a str,
    #[serde(rename = "buildInfo", skip_serializing_if = "Option::is_none")]
    pub build_info: Option<&'a str>,
    /// Always false: the service must not cache intermediate state.
    pub cache: bool,
}

/// Key submission envelope.
#[derive(Debug, Serialize)]
pub(crate) struct SubmitRequest<'a> {
    pub license_url: &'a str,
    pub pssh: &'a str,
    #[serde(rename = "buildInfo", skip_serializing_if = "Option::is_none")]
    pub build_info: Option<&'a str>,
    pub response: &'a str,
    pub session_id: &'a str,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{ApiFailure, ApiReply, ChallengeRequest, DecryptionApi, API_KEY_HEADER};
    use crate::acquisition::AcquisitionStep;
    use crate::error::Error;
    use crate::message::Challenge;
    use crate::transport::mock::ScriptedTransport;
    use crate::transport::HttpResponse;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn reply_is_discriminated_by_status() {
        let ok = ApiReply::<Challenge>::from_response(
            AcquisitionStep::Challenge,
            &response(200, r#"{"challenge":"CAQ=","session_id":"s"}"#),
        )
        .expect("success");
        assert!(matches!(ok, ApiReply::Success(ref c) if c.session_id == "s"));

        let failed = ApiReply::<Challenge>::from_response(
            AcquisitionStep::Challenge,
            &response(403, r#"{"error":true,"code":403,"message":"bad key"}"#),
        )
        .expect("failure");
        assert_eq!(
            failed,
            ApiReply::Failure(ApiFailure {
                error: true,
                code: 403,
                message: "bad key".to_string()
            })
        );
    }

    #[test]
    fn non_json_failure_keeps_raw_text() {
        let failed = ApiReply::<Challenge>::from_response(
            AcquisitionStep::Submit,
            &response(502, "Bad Gateway"),
        )
        .expect("failure");
        match failed {
            ApiReply::Failure(f) => {
                assert_eq!(f.code, 502);
                assert_eq!(f.message, "Bad Gateway");
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn failure_without_message_keeps_raw_text() {
        let body = r#"{"detail":"upstream license server timed out"}"#;
        let failed =
            ApiReply::<Challenge>::from_response(AcquisitionStep::Challenge, &response(500, body))
                .expect("failure");
        assert_eq!(
            failed,
            ApiReply::Failure(ApiFailure {
                error: true,
                code: 500,
                message: body.to_string()
            })
        );
    }

    #[test]
    fn missing_code_defaults_to_status() {
        let failed = ApiReply::<Challenge>::from_response(
            AcquisitionStep::Submit,
            &response(429, r#"{"message":"slow down"}"#),
        )
        .expect("failure");
        assert_eq!(
            failed,
            ApiReply::Failure(ApiFailure {
                error: true,
                code: 429,
                message: "slow down".to_string()
            })
        );
    }

    #[test]
    fn malformed_success_is_an_error() {
        let err = ApiReply::<Challenge>::from_response(
            AcquisitionStep::Challenge,
            &response(200, r#"{"unexpected":true}"#),
        )
        .expect_err("missing fields");
        assert!(matches!(
            err,
            Error::MalformedResponse {
                step: AcquisitionStep::Challenge,
                ..
            }
        ));
    }

    #[test]
    fn build_info_is_omitted_when_absent() {
        let body = serde_json::to_value(ChallengeRequest {
            license_url: "u",
            pssh: "p",
            certificate: "c",
            build_info: None,
            cache: false,
        })
        .expect("json");
        assert_eq!(
            body,
            json!({"license_url": "u", "pssh": "p", "certificate": "c", "cache": false})
        );
    }

    #[test]
    fn post_sends_json_with_api_key() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply_json(200, json!({"challenge": "CAQ=", "session_id": "s"})),
        );
        let api = DecryptionApi::new("https://api.example/wv", "secret", transport.clone())
            .expect("api");

        let _: Challenge = api
            .post(AcquisitionStep::Challenge, &json!({"hello": "world"}))
            .expect("post");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://api.example/wv");
        assert_eq!(requests[0].headers.get(API_KEY_HEADER).expect("key"), "secret");
        assert_eq!(
            requests[0].headers.get("content-type").expect("type"),
            "application/json"
        );
        assert!(!format!("{:?}", api).contains("secret"));
    }
}
