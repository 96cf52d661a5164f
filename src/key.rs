//! Decrypted content keys as returned by the decryption API.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pssh::Pssh;

/// One decrypted content key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    /// Unix timestamp (seconds) at which the service recorded the key.
    pub added_at: f64,
    /// Key as reported by the service, usually `kid:key` hex.
    pub key: String,
    /// License server the key was obtained from.
    pub license_url: String,
}

impl Key {
    /// Split a `kid:key` value into its two hex halves.
    pub fn kid_and_key(&self) -> Option<(&str, &str)> {
        self.key.split_once(':')
    }

    #[cfg(feature = "chrono")]
    pub fn added_at_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let secs = self.added_at.trunc() as i64;
        let nanos = (self.added_at.fract() * 1e9) as u32;
        chrono::DateTime::from_timestamp(secs, nanos)
    }
}

/// Final output of a successful acquisition.
///
/// `keys` keeps the order the service returned them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeySet {
    pub keys: Vec<Key>,
    pub kid: String,
}

impl KeySet {
    /// Parse `kid` as a UUID (hyphenated or 32 hex digits).
    pub fn kid_uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(self.kid.trim()).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether `kid` is one of the KIDs carried by `pssh`.
    ///
    /// False when `kid` is not a UUID or the PSSH carries no readable KIDs.
    pub fn matches(&self, pssh: &Pssh) -> bool {
        match (self.kid_uuid(), pssh.key_ids()) {
            (Some(kid), Ok(ids)) => ids.contains(&kid),
            _ => false,
        }
    }
}
