//! User context for request-scoped identity.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::error::AuthError;
use crate::types::{Login, UserId};

/// Verified identity attached to a request by the session gate.
///
/// Handlers behind the gate take it as an extractor argument. It is
/// immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    /// Identity id from the credential store
    user_id: UserId,
    /// Login recovered from the session token
    login: Login,
    /// Token `iat` (unix seconds)
    issued_at: Option<i64>,
    /// Token `exp` (unix seconds)
    expires_at: Option<i64>,
}

impl UserContext {
    /// Create a new user context.
    pub fn new(user_id: UserId, login: Login) -> Self {
        Self {
            user_id,
            login,
            issued_at: None,
            expires_at: None,
        }
    }

    /// Record the validity window of the token that produced this context.
    pub fn with_validity(mut self, issued_at: i64, expires_at: i64) -> Self {
        self.issued_at = Some(issued_at);
        self.expires_at = Some(expires_at);
        self
    }

    /// Get the identity id.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Get the login.
    pub fn login(&self) -> &Login {
        &self.login
    }

    pub fn issued_at(&self) -> Option<i64> {
        self.issued_at
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }
}

impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserContext>()
            .cloned()
            .ok_or(AuthError::MissingToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_user_context_new() {
        let ctx = UserContext::new(UserId::new(1), Login::new("alice"));

        assert_eq!(ctx.user_id(), UserId::new(1));
        assert_eq!(ctx.login().as_str(), "alice");
        assert_eq!(ctx.issued_at(), None);
        assert_eq!(ctx.expires_at(), None);
    }

    #[test]
    fn test_user_context_with_validity() {
        let ctx = UserContext::new(UserId::new(1), Login::new("alice")).with_validity(100, 200);

        assert_eq!(ctx.issued_at(), Some(100));
        assert_eq!(ctx.expires_at(), Some(200));
    }

    #[tokio::test]
    async fn test_extract_from_extensions() {
        let ctx = UserContext::new(UserId::new(3), Login::new("carol"));
        let mut request = Request::new(());
        request.extensions_mut().insert(ctx.clone());
        let (mut parts, _) = request.into_parts();

        let extracted = UserContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(extracted, ctx);
    }

    #[tokio::test]
    async fn test_extract_without_gate_is_rejected() {
        let (mut parts, _) = Request::new(()).into_parts();

        let result = UserContext::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::MissingToken)));
    }
}
