//! Blobs exchanged during an acquisition.
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fixed privacy mode request body (`CAQ=`), asking the license server for
/// its service certificate.
pub const SERVICE_CERTIFICATE_CHALLENGE: &[u8] = b"\x08\x04";

/// Privacy mode certificate from the license server, base64 encoded.
///
/// Fetched fresh for each attempt and consumed by the challenge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCertificate(String);

/// License server reply to a challenge, base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseResponse(String);

macro_rules! base64_blob {
    ($name:ident) => {
        impl $name {
            pub fn from_bytes(bytes: &[u8]) -> Self {
                Self(base64::engine::general_purpose::STANDARD.encode(bytes))
            }

            pub fn from_base64(data: impl Into<String>) -> Self {
                Self(data.into())
            }

            pub fn as_base64(&self) -> &str {
                &self.0
            }

            pub fn to_bytes(&self) -> Result<Vec<u8>> {
                base64::engine::general_purpose::STANDARD
                    .decode(&self.0)
                    .map_err(Error::Base64DecodeError)
            }
        }
    };
}

base64_blob!(ServerCertificate);
base64_blob!(LicenseResponse);

/// License challenge issued by the decryption API.
///
/// `session_id` correlates this challenge with the later key submission and
/// must be sent back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Base64 challenge to forward to the license server.
    pub challenge: String,
    pub session_id: String,
}

impl Challenge {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.challenge)
            .map_err(Error::Base64DecodeError)
    }
}
