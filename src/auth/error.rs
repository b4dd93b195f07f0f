//! Error taxonomy for authentication and channel linking.

use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::types::UserId;

/// Failures produced by the token codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The signature does not match the server secret
    SignatureInvalid,
    /// The token is outside its `nbf..=exp` validity window
    Expired,
    /// The token is not a well-formed session token
    Malformed(String),
    /// The issuer claim does not carry a `"<login> <password>"` pair
    CredentialFormat,
    /// The credentials now belong to a different identity than the token id
    IdentityChanged,
    /// Encoding a token failed
    Signing(String),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignatureInvalid => write!(f, "Token signature is invalid"),
            Self::Expired => write!(f, "Token has expired"),
            Self::Malformed(msg) => write!(f, "Malformed token: {}", msg),
            Self::CredentialFormat => write!(f, "Token does not carry credentials"),
            Self::IdentityChanged => write!(f, "Token was issued to a different user"),
            Self::Signing(msg) => write!(f, "Failed to sign token: {}", msg),
        }
    }
}

impl std::error::Error for TokenError {}

/// Authentication errors.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// No token was supplied with the request
    MissingToken,
    /// Login/password pair not found in the credential store
    CredentialMismatch,
    /// The session token could not be accepted
    Token(TokenError),
    /// No identity is linked to the secondary channel
    LinkNotFound,
    /// The secondary channel is already linked
    DuplicateLink,
    /// The identity id does not exist (anymore)
    UnknownIdentity(UserId),
    /// Credential or link store failure
    Store(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToken => write!(f, "Authorization token required"),
            Self::CredentialMismatch => write!(f, "Login and password don't match"),
            Self::Token(err) => write!(f, "{}", err),
            Self::LinkNotFound => write!(f, "Channel is not linked to an account"),
            Self::DuplicateLink => write!(f, "Channel is already linked to an account"),
            Self::UnknownIdentity(id) => write!(f, "User {} not found", id),
            Self::Store(msg) => write!(f, "Store error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => Self::Store(msg),
            other => Self::Token(other),
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl AuthError {
    /// HTTP status for this error at the API boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::CredentialMismatch | Self::Token(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::LinkNotFound | Self::UnknownIdentity(_) => StatusCode::NOT_FOUND,
            Self::DuplicateLink => StatusCode::CONFLICT,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this is an infrastructure failure rather than bad caller input.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Error payload written by the API: `{"message": ..., "error": true}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub error: bool,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error: true,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Store details stay in the logs.
        let message = if self.is_infrastructure() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody::new(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display() {
        assert_eq!(
            AuthError::CredentialMismatch.to_string(),
            "Login and password don't match"
        );
        assert_eq!(
            AuthError::Token(TokenError::Expired).to_string(),
            "Token has expired"
        );
        assert_eq!(
            AuthError::DuplicateLink.to_string(),
            "Channel is already linked to an account"
        );
        assert_eq!(
            AuthError::UnknownIdentity(UserId::new(7)).to_string(),
            "User 7 not found"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::MissingToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::CredentialMismatch.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::Token(TokenError::SignatureInvalid).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Token(TokenError::CredentialFormat).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::DuplicateLink.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AuthError::Store("down".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_signing_failure_is_infrastructure() {
        let err: AuthError = TokenError::Signing("bad key".into()).into();
        assert!(err.is_infrastructure());

        let err: AuthError = TokenError::Expired.into();
        assert!(!err.is_infrastructure());
    }
}
