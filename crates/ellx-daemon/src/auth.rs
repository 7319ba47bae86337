//! Request authentication
//!
//! Clients sign `<user>,<identity>,<timestamp>` with the trusted key and send
//! `Authorization: <timestamp>,<signature>`. The timestamp is taken verbatim;
//! no freshness window is enforced.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, info, warn};

use ellx_core::{Curve, KeyPair};

use crate::error::{DaemonError, Result};

/// The single public key every request signature is checked against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustCertificate {
    key: KeyPair,
}

impl TrustCertificate {
    /// Wrap an already decoded key
    pub fn new(key: KeyPair) -> Self {
        Self { key }
    }

    /// Decode the encoded public key served by the trust URL
    pub fn from_encoded(encoded: &str) -> Result<Self> {
        let key = KeyPair::from_public(encoded.trim(), Curve::Secp256k1)?;
        Ok(Self { key })
    }

    /// Fetch the trusted key once from `url`
    pub async fn fetch(url: &str) -> Result<Self> {
        let response = reqwest::get(url)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DaemonError::TrustFetch(e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| DaemonError::TrustFetch(e.to_string()))?;

        let cert = Self::from_encoded(&body)?;
        info!("Successfully fetched {}: {}", url, cert.public_key());
        Ok(cert)
    }

    /// Encoded public key
    pub fn public_key(&self) -> String {
        self.key.public_key()
    }

    /// Verify a signature made with the trusted key
    pub fn verify(&self, message: &str, signature: &str) -> bool {
        self.key.verify(message.as_bytes(), signature)
    }
}

/// Build the exact string a client signs
pub fn auth_payload(user: &str, identity: &str, timestamp: &str) -> String {
    format!("{},{},{}", user, identity, timestamp)
}

/// Signature check guarding every resource operation
#[derive(Debug, Clone)]
pub struct AuthGate {
    trust: TrustCertificate,
    user: String,
    identity: String,
}

impl AuthGate {
    /// Create a gate for the configured user and identity
    pub fn new(trust: TrustCertificate, user: String, identity: String) -> Self {
        Self {
            trust,
            user,
            identity,
        }
    }

    /// Check an `Authorization` header value
    pub fn check(&self, header: Option<&str>) -> Result<()> {
        let header = header.ok_or(DaemonError::AuthMissing)?;

        let mut parts = header.split(',');
        let timestamp = parts.next().unwrap_or_default();
        let signature = parts.next().unwrap_or_default();

        let payload = auth_payload(&self.user, &self.identity, timestamp);
        if self.trust.verify(&payload, signature) {
            debug!("Authorized request signed at {}", timestamp);
            Ok(())
        } else {
            warn!("Rejected signature for timestamp {:?}", timestamp);
            Err(DaemonError::AuthInvalid)
        }
    }

    /// Identity bound into the payload
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

/// axum middleware rejecting requests before the wrapped handler runs
pub async fn require_signature(
    State(gate): State<Arc<AuthGate>>,
    request: Request,
    next: Next,
) -> Response {
    let header = match request.headers().get(AUTHORIZATION) {
        None => None,
        Some(value) => match value.to_str() {
            Ok(value) => Some(value),
            Err(_) => return DaemonError::AuthInvalid.into_response(),
        },
    };

    match gate.check(header) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}
