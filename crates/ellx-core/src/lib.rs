//! Ellx Core - Signature codec for the Ellx sync daemon
//!
//! This crate provides the key and signature encodings shared by the daemon
//! and by clients that mint authorization headers:
//! - secp256k1 key generation and import/export
//! - Compact recoverable signatures (`recoveryParam || r || s`)
//! - Verification and public-key recovery over SHA-256 message digests
//! - The URL-safe, unpadded base64 variant used on the wire

pub mod crypto;
pub mod encoding;
pub mod error;
pub mod signature;

pub use crypto::{message_hash, Curve, KeyPair};
pub use encoding::{b64url_decode, b64url_encode};
pub use error::{Error, Result};
pub use signature::CompactSignature;

/// Byte width of a secp256k1 scalar
pub const SCALAR_SIZE: usize = 32;

/// Byte width of an encoded compact signature (`1 + 2k`)
pub const SIGNATURE_SIZE: usize = 1 + 2 * SCALAR_SIZE;

/// Byte width of an encoded public key (`x || y`)
pub const PUBLIC_KEY_SIZE: usize = 2 * SCALAR_SIZE;
