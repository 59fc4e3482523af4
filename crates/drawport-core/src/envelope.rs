//! Self-describing `data:<mime>;base64,<payload>` envelopes.
//!
//! Backends hand images back either as a data URI (the embed surface) or as raw bytes (the
//! desktop tool and the local renderer). Everything leaving the pipeline can be wrapped with
//! [`attach`], and [`strip`] undoes it exactly.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("payload is empty")]
    Empty,
    #[error("not a data URI")]
    NotDataUri,
    #[error("data URI is missing the ',' separator")]
    MissingSeparator,
    #[error("data URI is not base64 encoded")]
    NotBase64,
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload mime type is {found}, expected {expected}")]
    MimeMismatch { expected: String, found: String },
}

/// An image payload with its mime tag, as carried inside an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stripped {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Wraps `bytes` as `data:<mime>;base64,<payload>`.
pub fn attach(bytes: &[u8], mime_type: &str) -> String {
    let encoded = STANDARD.encode(bytes);
    let mut out = String::with_capacity("data:;base64,".len() + mime_type.len() + encoded.len());
    out.push_str("data:");
    out.push_str(mime_type);
    out.push_str(";base64,");
    out.push_str(&encoded);
    out
}

pub fn is_data_uri(text: &str) -> bool {
    text.trim_start()
        .get(..5)
        .is_some_and(|head| head.eq_ignore_ascii_case("data:"))
}

/// Splits a data URI into its mime tag and decoded bytes.
pub fn strip(text: &str) -> Result<Stripped, EnvelopeError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(EnvelopeError::Empty);
    }
    if !is_data_uri(text) {
        return Err(EnvelopeError::NotDataUri);
    }
    let rest = &text["data:".len()..];
    let (header, payload) = rest
        .split_once(',')
        .ok_or(EnvelopeError::MissingSeparator)?;

    let mut params = header.split(';');
    let mime_type = params.next().unwrap_or_default().trim().to_ascii_lowercase();
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(EnvelopeError::NotBase64);
    }

    let bytes = decode_base64(payload)?;
    Ok(Stripped { mime_type, bytes })
}

/// Normalizes a backend payload to raw bytes.
///
/// Accepts either a data URI (whose mime tag must equal `expected_mime`) or bare base64, which
/// is assumed to already be `expected_mime`.
pub fn decode_payload(text: &str, expected_mime: &str) -> Result<Vec<u8>, EnvelopeError> {
    if is_data_uri(text) {
        let stripped = strip(text)?;
        if !stripped.mime_type.eq_ignore_ascii_case(expected_mime) {
            return Err(EnvelopeError::MimeMismatch {
                expected: expected_mime.to_string(),
                found: stripped.mime_type,
            });
        }
        return non_empty(stripped.bytes);
    }
    non_empty(decode_base64(text)?)
}

fn non_empty(bytes: Vec<u8>) -> Result<Vec<u8>, EnvelopeError> {
    if bytes.is_empty() {
        return Err(EnvelopeError::Empty);
    }
    Ok(bytes)
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, EnvelopeError> {
    // Browsers tolerate line-wrapped base64; strip ASCII whitespace before decoding.
    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(STANDARD.decode(compact.as_bytes())?)
}
