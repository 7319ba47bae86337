//! Compact recoverable signatures
//!
//! Layout: `recoveryParam (1 byte) || r (32 bytes) || s (32 bytes)`.
//!
//! On the wire the buffer is URL-safe base64 with its first character
//! removed. The leading byte is always 0 or 1, so that character is always
//! `A` and is put back before decoding.

use crate::encoding::{b64url_decode, b64url_encode};
use crate::error::{Error, Result};
use crate::{SCALAR_SIZE, SIGNATURE_SIZE};

/// Character produced by the leading recovery byte
const LEADING_CHAR: char = 'A';

/// A compact ECDSA signature carrying its recovery parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactSignature {
    /// Parity of the signature's R point (0 or 1)
    pub recovery_param: u8,
    /// Big-endian `r` scalar
    pub r: [u8; SCALAR_SIZE],
    /// Big-endian `s` scalar
    pub s: [u8; SCALAR_SIZE],
}

impl CompactSignature {
    /// Create a new compact signature
    pub fn new(recovery_param: u8, r: [u8; SCALAR_SIZE], s: [u8; SCALAR_SIZE]) -> Result<Self> {
        if recovery_param > 1 {
            return Err(Error::MalformedSignature(format!(
                "Recovery parameter out of range: {}",
                recovery_param
            )));
        }
        Ok(Self { recovery_param, r, s })
    }

    /// Serialize to the contiguous byte layout
    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes[0] = self.recovery_param;
        bytes[1..1 + SCALAR_SIZE].copy_from_slice(&self.r);
        bytes[1 + SCALAR_SIZE..].copy_from_slice(&self.s);
        bytes
    }

    /// Parse the contiguous byte layout
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_SIZE {
            return Err(Error::MalformedSignature(format!(
                "Expected {} bytes, got {}",
                SIGNATURE_SIZE,
                bytes.len()
            )));
        }

        let mut r = [0u8; SCALAR_SIZE];
        let mut s = [0u8; SCALAR_SIZE];
        r.copy_from_slice(&bytes[1..1 + SCALAR_SIZE]);
        s.copy_from_slice(&bytes[1 + SCALAR_SIZE..]);

        Self::new(bytes[0], r, s)
    }

    /// Encode for transport (leading character stripped)
    pub fn encode(&self) -> String {
        let mut encoded = b64url_encode(&self.to_bytes());
        encoded.remove(0);
        encoded
    }

    /// Decode a transport string produced by [`CompactSignature::encode`]
    pub fn decode(s: &str) -> Result<Self> {
        let mut restored = String::with_capacity(s.len() + 1);
        restored.push(LEADING_CHAR);
        restored.push_str(s);

        let bytes = b64url_decode(&restored)
            .map_err(|e| Error::MalformedSignature(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// `r || s` as a 64-byte buffer
    pub fn rs_bytes(&self) -> [u8; 2 * SCALAR_SIZE] {
        let mut bytes = [0u8; 2 * SCALAR_SIZE];
        bytes[..SCALAR_SIZE].copy_from_slice(&self.r);
        bytes[SCALAR_SIZE..].copy_from_slice(&self.s);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(recovery_param: u8) -> CompactSignature {
        CompactSignature::new(recovery_param, [0x11; 32], [0xee; 32]).unwrap()
    }

    #[test]
    fn test_encoded_length() {
        // 65 bytes encode to 87 characters, one of which is stripped
        assert_eq!(sample(0).encode().len(), 86);
        assert_eq!(sample(1).encode().len(), 86);
    }

    #[test]
    fn test_leading_char_is_fixed() {
        for param in [0u8, 1u8] {
            let full = b64url_encode(&sample(param).to_bytes());
            assert!(full.starts_with(LEADING_CHAR));
        }
    }

    #[test]
    fn test_decode_restores_recovery_param() {
        let sig = sample(1);
        let decoded = CompactSignature::decode(&sig.encode()).unwrap();
        assert_eq!(decoded, sig);
    }

    #[test]
    fn test_wrong_width_is_malformed() {
        assert!(matches!(
            CompactSignature::from_bytes(&[0u8; 64]),
            Err(Error::MalformedSignature(_))
        ));
        assert!(matches!(
            CompactSignature::from_bytes(&[0u8; 66]),
            Err(Error::MalformedSignature(_))
        ));
        assert!(CompactSignature::decode("abc").is_err());
        assert!(CompactSignature::decode("").is_err());
    }

    #[test]
    fn test_recovery_param_range() {
        let mut bytes = sample(0).to_bytes();
        bytes[0] = 2;
        assert!(CompactSignature::from_bytes(&bytes).is_err());
    }
}
