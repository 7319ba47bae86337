//! URL-safe base64 without padding
//!
//! Encoding maps `+` to `-` and `/` to `_` and drops `=` padding. Decoding
//! reverses the character map and restores the padding from the input
//! length, so standard-alphabet input is accepted as well.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{Error, Result};

/// Encode bytes as URL-safe, unpadded base64
pub fn b64url_encode(bytes: &[u8]) -> String {
    STANDARD
        .encode(bytes)
        .chars()
        .filter_map(|c| match c {
            '+' => Some('-'),
            '/' => Some('_'),
            '=' => None,
            c => Some(c),
        })
        .collect()
}

/// Decode URL-safe, unpadded base64
pub fn b64url_decode(s: &str) -> Result<Vec<u8>> {
    let s = s.trim_end_matches('=');
    if s.is_empty() {
        return Ok(Vec::new());
    }

    let mut padded: String = s
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();
    let padding = 3 - ((s.len() - 1) % 4);
    padded.extend(std::iter::repeat('=').take(padding));

    STANDARD
        .decode(padded.as_bytes())
        .map_err(|e| Error::InvalidEncoding(e.to_string()))
}
