//! Decryption API session.
//!
//! A session closes out one acquisition attempt: it holds the challenge the
//! API issued and trades the license server's response for the keys.

use crate::acquisition::AcquisitionStep;
use crate::api::{DecryptionApi, SubmitRequest};
use crate::context::RequestContext;
use crate::error::Result;
use crate::key::KeySet;
use crate::message::{Challenge, LicenseResponse};

/// One in-flight challenge/response exchange.
///
/// Single use: [`Session::submit_license_response`] consumes the session, as
/// the service expires the `session_id` after one submission.
#[derive(Debug)]
pub struct Session {
    api: DecryptionApi,
    request: RequestContext,
    challenge: Challenge,
}

impl Session {
    pub fn new(api: DecryptionApi, request: RequestContext, challenge: Challenge) -> Self {
        Self {
            api,
            request,
            challenge,
        }
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn challenge(&self) -> &Challenge {
        &self.challenge
    }

    pub fn session_id(&self) -> &str {
        &self.challenge.session_id
    }

    /// Submit the license server's response and receive the decrypted keys.
    pub fn submit_license_response(self, license: &LicenseResponse) -> Result<KeySet> {
        debug!("Submitting license response for session {}", self.session_id());
        let keys: KeySet = self.api.post(
            AcquisitionStep::Submit,
            &SubmitRequest {
                license_url: self.request.license_url(),
                pssh: self.request.pssh(),
                build_info: self.request.build_info(),
                response: license.as_base64(),
                session_id: &self.challenge.session_id,
            },
        )?;
        info!("Received {} key(s) for kid {}", keys.keys.len(), keys.kid);
        Ok(keys)
    }
}
