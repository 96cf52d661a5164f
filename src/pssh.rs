//! PSSH inspection.
//!
//! The decryption API takes the PSSH as an opaque base64 string; this module
//! only looks inside it for diagnostics and KID cross-checks.
use std::str::FromStr;

use base64::Engine;
use byteorder::{BigEndian, ByteOrder};
use prost::Message;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::utils::BASE64_LENIENT;

/// Widevine DRM system id.
pub const WIDEVINE_SYSTEM_ID: Uuid = Uuid::from_u128(0xedef8ba979d64acea3c827dcd51d21ed);

/// Subset of the Widevine CENC header carried as PSSH init data.
#[derive(Clone, PartialEq, Message)]
pub struct WidevinePsshData {
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub key_ids: Vec<Vec<u8>>,
    #[prost(string, optional, tag = "3")]
    pub provider: Option<String>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub content_id: Option<Vec<u8>>,
}

/// Parsed PSSH box.
///
/// Bare init data (no box header) is wrapped as a v0 Widevine box.
#[derive(Debug, Clone)]
pub struct Pssh {
    pub version: u8,
    pub flags: u32,
    pub system_id: Uuid,
    key_ids: Vec<Uuid>,
    pub init_data: Vec<u8>,
}

impl Pssh {
    /// Parse a PSSH box, or wrap anything else as Widevine init data.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::InvalidInitData("Data must not be empty".to_string()));
        }

        if let Ok(pssh) = parse_pssh_box(data) {
            return Ok(pssh);
        }

        Ok(Self {
            version: 0,
            flags: 0,
            system_id: WIDEVINE_SYSTEM_ID,
            key_ids: Vec::new(),
            init_data: data.to_vec(),
        })
    }

    pub fn from_base64(data_b64: &str) -> Result<Self> {
        let data = BASE64_LENIENT
            .decode(data_b64.trim())
            .map_err(Error::Base64DecodeError)?;
        Self::from_bytes(&data)
    }

    pub fn is_widevine(&self) -> bool {
        self.system_id == WIDEVINE_SYSTEM_ID
    }

    /// KIDs from the v1 box header, falling back to the Widevine init data.
    pub fn key_ids(&self) -> Result<Vec<Uuid>> {
        if self.version == 1 && !self.key_ids.is_empty() {
            return Ok(self.key_ids.clone());
        }

        if !self.is_widevine() {
            return Err(Error::InvalidInitData(format!(
                "Unsupported system ID {} for key_ids",
                self.system_id
            )));
        }

        let pssh_data = WidevinePsshData::decode(self.init_data.as_slice())
            .map_err(|e| Error::DecodeError(format!("Failed to parse WidevinePsshData: {}", e)))?;
        Ok(pssh_data.key_ids.iter().map(|id| key_id_from_bytes(id)).collect())
    }

    /// Serialize as a full PSSH box.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.push(self.version);
        body.extend_from_slice(&self.flags.to_be_bytes()[1..]);
        body.extend_from_slice(self.system_id.as_bytes());
        if self.version == 1 {
            body.extend_from_slice(&(self.key_ids.len() as u32).to_be_bytes());
            for kid in &self.key_ids {
                body.extend_from_slice(kid.as_bytes());
            }
        }
        body.extend_from_slice(&(self.init_data.len() as u32).to_be_bytes());
        body.extend_from_slice(&self.init_data);

        let mut out = Vec::with_capacity(body.len() + 8);
        out.extend_from_slice(&(body.len() as u32 + 8).to_be_bytes());
        out.extend_from_slice(b"pssh");
        out.extend_from_slice(&body);
        out
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }
}

impl FromStr for Pssh {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Pssh::from_base64(s)
    }
}

fn parse_pssh_box(data: &[u8]) -> Result<Pssh> {
    if data.len() < 8 {
        return Err(Error::InvalidInitData("Data too short".to_string()));
    }

    let size = BigEndian::read_u32(&data[0..4]) as usize;
    if &data[4..8] != b"pssh" {
        return Err(Error::InvalidInitData("Not a PSSH box".to_string()));
    }
    let mut offset = 8;

    let box_size = match size {
        0 => data.len(),
        1 => {
            if data.len() < 16 {
                return Err(Error::InvalidInitData("Data too short".to_string()));
            }
            offset += 8;
            BigEndian::read_u64(&data[8..16]) as usize
        }
        n => n,
    };
    if box_size > data.len() {
        return Err(Error::InvalidInitData("PSSH size exceeds data length".to_string()));
    }
    let data = &data[..box_size];

    if data.len() < offset + 4 + 16 {
        return Err(Error::InvalidInitData("PSSH header incomplete".to_string()));
    }
    let version = data[offset];
    let flags = BigEndian::read_u24(&data[offset + 1..offset + 4]);
    offset += 4;
    let system_id = Uuid::from_slice(&data[offset..offset + 16])
        .map_err(|_| Error::InvalidInitData("Invalid system ID".to_string()))?;
    offset += 16;

    let mut key_ids = Vec::new();
    if version == 1 {
        if data.len() < offset + 4 {
            return Err(Error::InvalidInitData("Missing KID count".to_string()));
        }
        let kid_count = BigEndian::read_u32(&data[offset..offset + 4]) as usize;
        offset += 4;
        let end = kid_count
            .checked_mul(16)
            .and_then(|n| n.checked_add(offset))
            .filter(|end| *end <= data.len())
            .ok_or_else(|| Error::InvalidInitData("Missing KIDs".to_string()))?;
        key_ids = data[offset..end].chunks_exact(16).map(key_id_from_bytes).collect();
        offset = end;
    }

    if data.len() < offset + 4 {
        return Err(Error::InvalidInitData("Missing init data length".to_string()));
    }
    let data_size = BigEndian::read_u32(&data[offset..offset + 4]) as usize;
    offset += 4;
    if data.len() < offset + data_size {
        return Err(Error::InvalidInitData("Missing init data".to_string()));
    }

    Ok(Pssh {
        version,
        flags,
        system_id,
        key_ids,
        init_data: data[offset..offset + data_size].to_vec(),
    })
}

// KIDs that are not 16 bytes are zero padded/truncated.
fn key_id_from_bytes(kid: &[u8]) -> Uuid {
    let mut bytes = [0u8; 16];
    let n = kid.len().min(16);
    bytes[..n].copy_from_slice(&kid[..n]);
    Uuid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use prost::Message;
    use uuid::Uuid;

    use super::{Pssh, WidevinePsshData, WIDEVINE_SYSTEM_ID};

    // Bitmovin / shaka test asset.
    const TEST_PSSH: &str = "AAAAW3Bzc2gAAAAA7e+LqXnWSs6jyCfc1R0h7QAAADsIARIQ62dqu8s0Xpa7z2FmMPGj2hoNd2lkZXZpbmVfdGVzdCIQZmtqM2xqYVNkZmFsa3IzaioCSEQyAA==";

    #[test]
    fn parses_real_widevine_box() {
        let pssh = Pssh::from_base64(TEST_PSSH).expect("parse pssh");
        assert_eq!(pssh.version, 0);
        assert!(pssh.is_widevine());

        let ids = pssh.key_ids().expect("key ids");
        assert_eq!(
            ids,
            vec![Uuid::parse_str("eb676abb-cb34-5e96-bbcf-616630f1a3da").expect("uuid")]
        );
        assert_eq!(pssh.to_base64(), TEST_PSSH);
    }

    #[test]
    fn bare_init_data_is_wrapped() {
        let kid = Uuid::new_v4();
        let init_data = WidevinePsshData {
            key_ids: vec![kid.as_bytes().to_vec()],
            ..Default::default()
        }
        .encode_to_vec();

        let pssh = Pssh::from_bytes(&init_data).expect("wrap init data");
        assert_eq!(pssh.system_id, WIDEVINE_SYSTEM_ID);
        assert_eq!(pssh.init_data, init_data);
        assert_eq!(pssh.key_ids().expect("key ids"), vec![kid]);
    }

    #[test]
    fn v1_box_header_kids_win() {
        let kid = Uuid::new_v4();
        let pssh = Pssh {
            version: 1,
            flags: 0,
            system_id: WIDEVINE_SYSTEM_ID,
            key_ids: vec![kid],
            init_data: Vec::new(),
        };

        let parsed = Pssh::from_bytes(&pssh.to_bytes()).expect("parse v1");
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.key_ids().expect("key ids"), vec![kid]);
    }

    #[test]
    fn unpadded_base64_is_accepted() {
        let unpadded = TEST_PSSH.trim_end_matches('=');
        let pssh = Pssh::from_base64(unpadded).expect("parse unpadded");
        assert_eq!(pssh.to_base64(), TEST_PSSH);
    }

    #[test]
    fn empty_base64_is_error() {
        let err = Pssh::from_base64("").expect_err("empty input should fail");
        assert!(err.to_string().contains("empty"));
    }
}
