//! Error types for the Ellx daemon

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Result type alias for daemon operations
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Errors that can occur in the daemon
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Request carried no credential
    #[error("No authorization header")]
    AuthMissing,

    /// Credential present but did not verify
    #[error("Forbidden")]
    AuthInvalid,

    /// Resolved path leaves the served root
    #[error("Unauthorized")]
    PathEscape,

    /// Resource does not exist
    #[error("Not found")]
    NotFound,

    /// Operation not valid for this kind of resource
    #[error("{0}")]
    TypeMismatch(String),

    /// Malformed request body or arguments
    #[error("{0}")]
    BadRequest(String),

    /// Storage failure not otherwise classified
    #[error("{message}")]
    IoFailure {
        /// Native OS error code, when the platform reported one
        code: Option<i32>,
        message: String,
    },

    /// Signature codec error
    #[error("Codec error: {0}")]
    Codec(#[from] ellx_core::Error),

    /// Trust certificate could not be fetched
    #[error("Failed to fetch trust certificate: {0}")]
    TrustFetch(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// HTTP server task failed
    #[error("Server error: {0}")]
    Server(String),
}

impl DaemonError {
    /// HTTP status reported for this error
    pub fn status(&self) -> StatusCode {
        match self {
            DaemonError::AuthMissing | DaemonError::PathEscape => StatusCode::UNAUTHORIZED,
            DaemonError::AuthInvalid => StatusCode::FORBIDDEN,
            DaemonError::NotFound => StatusCode::NOT_FOUND,
            DaemonError::TypeMismatch(_) | DaemonError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for DaemonError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => DaemonError::NotFound,
            _ => DaemonError::IoFailure {
                code: e.raw_os_error(),
                message: e.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for DaemonError {
    fn from(e: serde_json::Error) -> Self {
        DaemonError::Serialization(e.to_string())
    }
}

impl IntoResponse for DaemonError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(DaemonError::AuthMissing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(DaemonError::PathEscape.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(DaemonError::AuthInvalid.status(), StatusCode::FORBIDDEN);
        assert_eq!(DaemonError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            DaemonError::BadRequest("Bad files argument".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DaemonError::Config("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err: DaemonError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(matches!(err, DaemonError::NotFound));
    }

    #[test]
    fn test_io_failure_keeps_os_code() {
        let err: DaemonError = std::io::Error::from_raw_os_error(13).into();
        match err {
            DaemonError::IoFailure { code, .. } => assert_eq!(code, Some(13)),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
