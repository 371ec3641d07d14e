//! Realtime payload decoding.
//!
//! Channel messages arrive as JSON envelopes whose `data` field holds a
//! base64 string of a gzip stream. The decompressed bytes are the producer's
//! `unescape(encodeURIComponent(json))` output, so recovering the JSON takes
//! the inverse chain, applied in this exact order:
//!
//! ```text
//! base64 → gzip → bytes as code points → legacy escape → percent-decode → JSON
//! ```
//!
//! The chain must stay bit-compatible with upstream producers; in particular
//! a literal `%` in the payload survives because the legacy escape step turns
//! it into `%25` before percent-decoding.
//!
//! Decoding never fails outward: [`decode`] logs and leaves the envelope
//! un-merged when a payload is corrupt, so one bad message cannot stall the
//! feed.

use std::io::Read;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use flate2::read::MultiGzDecoder;
use serde_json::{Map, Value};
use thiserror::Error;

/// The only compression algorithm producers currently emit.
pub const ALG_GZIP_BASE64: &str = "gzip_base64";

/// Standard alphabet, padding optional, non-zero trailing bits ignored,
/// matching browser `atob`.
const FORGIVING_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Failure modes of a single `gzip_base64` entry.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("gzip decompression failed: {0}")]
    Gzip(#[from] std::io::Error),
    #[error("payload is not valid UTF-8 after unescaping: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("compressed data must be a string")]
    NotAString,
    #[error("decoded payload is not a JSON object")]
    NotAnObject,
}

/// Decode a raw channel message into a plain JSON message.
///
/// The `data` field is moved into a single-entry `cdata` envelope tagged
/// `gzip_base64` and handed to [`decode_compressed`]. Messages without a
/// `data` field are returned unchanged.
pub fn decode(raw: &Value) -> Value {
    let Some(fields) = raw.as_object() else {
        return raw.clone();
    };
    let Some(data) = fields.get("data") else {
        return raw.clone();
    };

    let mut envelope = Map::new();
    envelope.insert(
        "cdata".to_string(),
        Value::Array(vec![serde_json::json!({
            "alg": ALG_GZIP_BASE64,
            "data": data,
        })]),
    );
    for (k, v) in fields {
        if k != "data" {
            envelope.insert(k.clone(), v.clone());
        }
    }

    decode_compressed(Value::Object(envelope))
}

/// Decode a `{ cdata: [{ alg, data }], ...rest }` envelope.
///
/// Every recognized entry that decodes successfully replaces the result with
/// `rest` overlaid by the decoded fields. Unrecognized algorithms are
/// skipped; failing entries are logged and leave the result untouched.
pub fn decode_compressed(envelope: Value) -> Value {
    let Value::Object(fields) = &envelope else {
        return envelope;
    };
    let Some(Value::Array(cdata)) = fields.get("cdata") else {
        return envelope;
    };

    let mut rest = fields.clone();
    rest.remove("cdata");

    let mut message: Option<Map<String, Value>> = None;
    for entry in cdata {
        if entry.get("alg").and_then(Value::as_str) != Some(ALG_GZIP_BASE64) {
            continue;
        }
        let data = entry.get("data").cloned().unwrap_or(Value::String(String::new()));
        let decoded = match &data {
            Value::String(s) => decode_gzip_base64(s),
            _ => Err(DecodeError::NotAString),
        };
        match decoded {
            Ok(parsed) => {
                let mut merged = rest.clone();
                merged.extend(parsed);
                message = Some(merged);
            }
            Err(e) => tracing::warn!(error = %e, "dropping undecodable channel payload"),
        }
    }

    match message {
        Some(m) => Value::Object(m),
        None => envelope,
    }
}

/// Run the full `gzip_base64` chain on one payload string.
pub fn decode_gzip_base64(data: &str) -> Result<Map<String, Value>, DecodeError> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let compressed = FORGIVING_BASE64.decode(compact.as_bytes())?;

    let mut bytes = Vec::new();
    MultiGzDecoder::new(compressed.as_slice()).read_to_end(&mut bytes)?;

    let code_points: String = bytes.iter().map(|&b| char::from(b)).collect();
    let escaped = legacy_escape(&code_points);
    let text = urlencoding::decode(&escaped)?;

    match serde_json::from_str::<Value>(&text)? {
        Value::Object(map) => Ok(map),
        _ => Err(DecodeError::NotAnObject),
    }
}

/// The ES5 global `escape` transform.
///
/// Characters in `A–Z a–z 0–9 @ * _ + - . /` pass through; other code units
/// below 256 become `%XX`, the rest `%uXXXX` (UTF-16 code units, uppercase hex).
pub fn legacy_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 3);
    let mut units = [0u16; 2];
    for c in input.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '@' | '*' | '_' | '+' | '-' | '.' | '/') {
            out.push(c);
            continue;
        }
        for unit in c.encode_utf16(&mut units) {
            if *unit < 256 {
                out.push_str(&format!("%{:02X}", unit));
            } else {
                out.push_str(&format!("%u{:04X}", unit));
            }
        }
    }
    out
}
