//! Key pairs, signing, verification and public-key recovery

use std::fmt;
use std::str::FromStr;

use k256::ecdsa::{
    signature::hazmat::PrehashVerifier, RecoveryId, Signature as K256Signature, SigningKey,
    VerifyingKey,
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::encoding::{b64url_decode, b64url_encode};
use crate::error::{Error, Result};
use crate::signature::CompactSignature;
use crate::{PUBLIC_KEY_SIZE, SCALAR_SIZE};

/// Supported elliptic curves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Curve {
    #[default]
    Secp256k1,
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Curve::Secp256k1 => write!(f, "secp256k1"),
        }
    }
}

impl FromStr for Curve {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "secp256k1" => Ok(Curve::Secp256k1),
            other => Err(Error::UnsupportedCurve(other.to_string())),
        }
    }
}

/// SHA-256 digest of a message, the value that is actually signed
pub fn message_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(message);
    hasher.finalize().into()
}

/// A signing key pair, or a public-only key used for verification
#[derive(Clone)]
pub struct KeyPair {
    curve: Curve,
    signing_key: Option<SigningKey>,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a fresh random key pair
    pub fn generate(curve: Curve) -> Self {
        match curve {
            Curve::Secp256k1 => {
                let signing_key = SigningKey::random(&mut OsRng);
                let verifying_key = *signing_key.verifying_key();
                Self {
                    curve,
                    signing_key: Some(signing_key),
                    verifying_key,
                }
            }
        }
    }

    /// Import a private key from its URL-safe base64 scalar
    pub fn from_private(encoded: &str, curve: Curve) -> Result<Self> {
        let bytes = Zeroizing::new(b64url_decode(encoded)?);
        let scalar = Zeroizing::new(left_pad(&bytes, "private key")?);

        let signing_key = SigningKey::from_slice(scalar.as_slice())
            .map_err(|e| Error::InvalidKey(format!("Invalid private key: {}", e)))?;
        let verifying_key = *signing_key.verifying_key();

        Ok(Self {
            curve,
            signing_key: Some(signing_key),
            verifying_key,
        })
    }

    /// Import a public key from its URL-safe base64 `x || y` coordinates
    pub fn from_public(encoded: &str, curve: Curve) -> Result<Self> {
        let bytes = b64url_decode(encoded)?;
        if bytes.is_empty() || bytes.len() % 2 != 0 || bytes.len() > PUBLIC_KEY_SIZE {
            return Err(Error::InvalidKey(format!(
                "Invalid public key length: {}",
                bytes.len()
            )));
        }

        let half = bytes.len() / 2;
        let x = left_pad(&bytes[..half], "x coordinate")?;
        let y = left_pad(&bytes[half..], "y coordinate")?;

        let mut sec1 = [0u8; 1 + PUBLIC_KEY_SIZE];
        sec1[0] = 0x04;
        sec1[1..1 + SCALAR_SIZE].copy_from_slice(&x);
        sec1[1 + SCALAR_SIZE..].copy_from_slice(&y);

        let verifying_key = VerifyingKey::from_sec1_bytes(&sec1)
            .map_err(|e| Error::InvalidKey(format!("Invalid public key: {}", e)))?;

        Ok(Self {
            curve,
            signing_key: None,
            verifying_key,
        })
    }

    /// Recover the signer's public key from a message and its signature
    pub fn recover(message: &[u8], signature: &str, curve: Curve) -> Result<Self> {
        let compact = CompactSignature::decode(signature)?;
        let (sig, recovery_id) = to_k256(&compact)?;

        let digest = message_hash(message);
        let verifying_key = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
            .map_err(|e| Error::Crypto(format!("Public key recovery failed: {}", e)))?;

        Ok(Self {
            curve,
            signing_key: None,
            verifying_key,
        })
    }

    /// Curve this key lives on
    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// Whether this key can sign
    pub fn has_private_key(&self) -> bool {
        self.signing_key.is_some()
    }

    /// Export the private scalar (None for public-only keys)
    pub fn private_key(&self) -> Option<String> {
        self.signing_key
            .as_ref()
            .map(|key| b64url_encode(&key.to_bytes()[..]))
    }

    /// Export the public point as `x || y`
    pub fn public_key(&self) -> String {
        let point = self.verifying_key.to_encoded_point(false);
        // Uncompressed SEC1 is 0x04 || x || y
        b64url_encode(&point.as_bytes()[1..])
    }

    /// Sign a message, returning the transport-encoded compact signature
    pub fn sign(&self, message: &[u8]) -> Result<String> {
        Ok(self.sign_compact(message)?.encode())
    }

    /// Sign a message, returning the decoded compact signature
    pub fn sign_compact(&self, message: &[u8]) -> Result<CompactSignature> {
        let signing_key = self.signing_key.as_ref().ok_or(Error::MissingPrivateKey)?;
        let digest = message_hash(message);

        let (sig, recovery_id) = signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| Error::Crypto(format!("Signing failed: {}", e)))?;

        let (r, s) = sig.split_bytes();
        let r_bytes: [u8; SCALAR_SIZE] = r.into();
        let s_bytes: [u8; SCALAR_SIZE] = s.into();

        CompactSignature::new(recovery_id.is_y_odd() as u8, r_bytes, s_bytes)
    }

    /// Verify a transport-encoded signature over a message
    ///
    /// Never fails: malformed input and curve errors are reported as `false`.
    pub fn verify(&self, message: &[u8], signature: &str) -> bool {
        let Ok(compact) = CompactSignature::decode(signature) else {
            return false;
        };
        let Ok((sig, _)) = to_k256(&compact) else {
            return false;
        };

        let digest = message_hash(message);
        self.verifying_key.verify_prehash(&digest, &sig).is_ok()
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.curve == other.curve && self.verifying_key == other.verifying_key
    }
}

impl Eq for KeyPair {}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("curve", &self.curve)
            .field("public_key", &self.public_key())
            .field("has_private_key", &self.has_private_key())
            .finish()
    }
}

/// Convert to a low-S k256 signature and matching recovery id
///
/// Signers outside this crate may produce high-S signatures; k256 only
/// accepts the normalized form, and normalizing flips the R parity.
fn to_k256(compact: &CompactSignature) -> Result<(K256Signature, RecoveryId)> {
    let sig = K256Signature::from_slice(&compact.rs_bytes())
        .map_err(|e| Error::MalformedSignature(e.to_string()))?;
    let is_y_odd = compact.recovery_param == 1;

    match sig.normalize_s() {
        Some(normalized) => Ok((normalized, RecoveryId::new(!is_y_odd, false))),
        None => Ok((sig, RecoveryId::new(is_y_odd, false))),
    }
}

/// Left-pad big-endian bytes with zeros to the scalar width
fn left_pad(bytes: &[u8], what: &str) -> Result<[u8; SCALAR_SIZE]> {
    if bytes.is_empty() || bytes.len() > SCALAR_SIZE {
        return Err(Error::InvalidKey(format!(
            "Invalid {} length: {}",
            what,
            bytes.len()
        )));
    }
    let mut out = [0u8; SCALAR_SIZE];
    out[SCALAR_SIZE - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify_hello() {
        let key = KeyPair::generate(Curve::Secp256k1);
        let signature = key.sign(b"hello").unwrap();
        assert!(key.verify(b"hello", &signature));
    }

    #[test]
    fn test_flipped_signature_byte_fails() {
        let key = KeyPair::generate(Curve::Secp256k1);
        let compact = key.sign_compact(b"hello").unwrap();

        let mut bytes = compact.to_bytes();
        bytes[40] ^= 0x01;
        let tampered = CompactSignature::from_bytes(&bytes).unwrap().encode();
        assert!(!key.verify(b"hello", &tampered));
    }

    #[test]
    fn test_wrong_message_fails() {
        let key = KeyPair::generate(Curve::Secp256k1);
        let signature = key.sign(b"hello").unwrap();
        assert!(!key.verify(b"hellp", &signature));
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = KeyPair::generate(Curve::Secp256k1);
        let other = KeyPair::generate(Curve::Secp256k1);
        let signature = key.sign(b"hello").unwrap();
        assert!(!other.verify(b"hello", &signature));
    }

    #[test]
    fn test_garbage_signature_is_false() {
        let key = KeyPair::generate(Curve::Secp256k1);
        assert!(!key.verify(b"hello", ""));
        assert!(!key.verify(b"hello", "not a signature"));
        assert!(!key.verify(b"hello", &"A".repeat(86)));
    }

    #[test]
    fn test_recover_public_key() {
        let key = KeyPair::generate(Curve::Secp256k1);
        let signature = key.sign(b"user,identity,1700000000000").unwrap();
        let recovered =
            KeyPair::recover(b"user,identity,1700000000000", &signature, Curve::Secp256k1)
                .unwrap();
        assert_eq!(recovered.public_key(), key.public_key());
        assert!(!recovered.has_private_key());
    }

    #[test]
    fn test_high_s_signature_is_accepted() {
        let key = KeyPair::generate(Curve::Secp256k1);
        let compact = key.sign_compact(b"hello").unwrap();

        // Negate s and flip the parity, as a non-normalizing signer would
        let sig = K256Signature::from_slice(&compact.rs_bytes()).unwrap();
        let low_s: k256::Scalar = *sig.s().as_ref();
        let high_s = -low_s;
        let s_bytes: [u8; SCALAR_SIZE] = high_s.to_bytes().into();
        let flipped = CompactSignature::new(1 - compact.recovery_param, compact.r, s_bytes)
            .unwrap()
            .encode();

        assert!(key.verify(b"hello", &flipped));
        let recovered = KeyPair::recover(b"hello", &flipped, Curve::Secp256k1).unwrap();
        assert_eq!(recovered, key);
    }

    #[test]
    fn test_private_key_roundtrip() {
        let key = KeyPair::generate(Curve::Secp256k1);
        let exported = key.private_key().unwrap();
        let imported = KeyPair::from_private(&exported, Curve::Secp256k1).unwrap();
        assert_eq!(imported, key);
        assert_eq!(imported.private_key().unwrap(), exported);
    }

    #[test]
    fn test_public_key_roundtrip() {
        let key = KeyPair::generate(Curve::Secp256k1);
        let public = KeyPair::from_public(&key.public_key(), Curve::Secp256k1).unwrap();
        assert_eq!(public, key);
        assert!(public.private_key().is_none());
        assert_eq!(public.sign(b"hello"), Err(Error::MissingPrivateKey));
    }

    #[test]
    fn test_public_key_is_64_bytes() {
        let key = KeyPair::generate(Curve::Secp256k1);
        let bytes = b64url_decode(&key.public_key()).unwrap();
        assert_eq!(bytes.len(), PUBLIC_KEY_SIZE);
    }

    #[test]
    fn test_invalid_public_key() {
        assert!(KeyPair::from_public("", Curve::Secp256k1).is_err());
        assert!(KeyPair::from_public(&b64url_encode(&[7u8; 64]), Curve::Secp256k1).is_err());
        assert!(KeyPair::from_public(&b64url_encode(&[7u8; 65]), Curve::Secp256k1).is_err());
    }

    #[test]
    fn test_curve_names() {
        assert_eq!("secp256k1".parse::<Curve>().unwrap(), Curve::Secp256k1);
        assert_eq!(Curve::default().to_string(), "secp256k1");
        assert!(matches!(
            "p256".parse::<Curve>(),
            Err(Error::UnsupportedCurve(_))
        ));
    }
}
