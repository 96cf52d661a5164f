//! Miscellaneous helper utilities.
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::error::{Error, Result};

/// Standard alphabet; decoding accepts input with or without `=` padding.
pub(crate) const BASE64_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Split a `Name: Value` header line, as accepted by curl's `-H`.
pub fn parse_header_line(line: &str) -> Result<(String, String)> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| Error::InvalidHeader(format!("Expected 'Name: Value', got '{}'", line)))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidHeader(format!("Empty header name in '{}'", line)));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
