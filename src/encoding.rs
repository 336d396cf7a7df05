//! base64url helpers for binary payloads in transit.

use base64::{
    Engine, alphabet,
    engine::{
        DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig, general_purpose::URL_SAFE_NO_PAD,
    },
};

use crate::error::{KmsError, Result};

/// Accepts input with or without trailing `=` and ignores the unused
/// low bits of the final symbol.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode a base64url field, reporting `field` on failure.
pub fn decode(field: &str, text: &str) -> Result<Vec<u8>> {
    URL_SAFE_LENIENT
        .decode(text)
        .map_err(|_| KmsError::invalid_argument(field, "must be a base64url-encoded string."))
}
