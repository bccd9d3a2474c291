//! Unverified payload codec for compact signed identity tokens.
//!
//! This crate reads the claims segment of a `header.payload.signature` token
//! so clients can render a best-effort identity while the backend is away.
//!
//! TRUST
//! =====
//! Nothing here checks the signature. Decoded claims are display hints only
//! and must never feed an authorization decision.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde_json::{Map, Value};

/// Attribute mapping carried in a token payload. Unverified.
pub type DecodedClaims = Map<String, Value>;

/// Standard-alphabet engine that tolerates stripped padding, matching how
/// browsers' `atob` treats JWT segments after alphabet translation.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

const UNSIGNED_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_encode_padding(false),
);

/// Error returned by [`decode_unverified`]. Each variant names the step that failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedToken {
    /// The token does not split into exactly three `.`-separated segments.
    #[error("malformed token: expected 3 segments, found {found}")]
    SegmentCount { found: usize },
    /// The payload segment is not valid base64.
    #[error("malformed token: payload encoding: {0}")]
    Encoding(String),
    /// The decoded payload bytes are not UTF-8.
    #[error("malformed token: payload is not UTF-8")]
    Utf8,
    /// The payload text is not JSON.
    #[error("malformed token: payload JSON: {0}")]
    Json(String),
    /// The payload is JSON but not an object.
    #[error("malformed token: payload is not a JSON object")]
    NotAnObject,
}

/// Decode the payload segment of `token` into its claims **without verifying
/// the signature**.
///
/// # Errors
///
/// Returns a [`MalformedToken`] variant for a missing segment, bad encoding,
/// non-UTF-8 bytes, invalid JSON, or a non-object payload. No partial result
/// is ever returned.
pub fn decode_unverified(token: &str) -> Result<DecodedClaims, MalformedToken> {
    let segments: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(MalformedToken::SegmentCount { found: segments.len() });
    };

    let standard: String = payload
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    let bytes = PAYLOAD_ENGINE
        .decode(standard.as_bytes())
        .map_err(|e| MalformedToken::Encoding(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|_| MalformedToken::Utf8)?;
    let value: Value = serde_json::from_str(&text).map_err(|e| MalformedToken::Json(e.to_string()))?;

    match value {
        Value::Object(claims) => Ok(claims),
        _ => Err(MalformedToken::NotAnObject),
    }
}

/// Return claim `key` when it is present and a string.
#[must_use]
pub fn claim_str<'a>(claims: &'a DecodedClaims, key: &str) -> Option<&'a str> {
    claims.get(key).and_then(Value::as_str)
}

/// Build an unsigned `header.payload.` token carrying `claims`.
///
/// Useful for fixtures and local tooling; a real identity provider issues
/// signed tokens.
#[must_use]
pub fn encode_unsigned(claims: &DecodedClaims) -> String {
    let header = serde_json::json!({ "alg": "none", "typ": "JWT" }).to_string();
    let payload = Value::Object(claims.clone()).to_string();
    format!(
        "{}.{}.",
        UNSIGNED_ENGINE.encode(header.as_bytes()),
        UNSIGNED_ENGINE.encode(payload.as_bytes())
    )
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
