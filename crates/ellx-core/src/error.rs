//! Error types for the Ellx signature codec

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Unsupported curve: {0}")]
    UnsupportedCurve(String),

    #[error("Key pair has no private key")]
    MissingPrivateKey,

    #[error("Cryptographic error: {0}")]
    Crypto(String),
}
