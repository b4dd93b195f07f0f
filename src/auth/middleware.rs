//! Session gate for protected routes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::error::AuthError;
use crate::auth::service::AuthService;

/// Read the session token from the `Authorization` header.
///
/// Accepts both a bare token and `Bearer <token>`.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?
        .trim();
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

/// Verify the request's session token and attach a [`UserContext`] to it.
///
/// Rejects with 401 and `{message, error: true}` on any failure.
///
/// [`UserContext`]: crate::auth::UserContext
pub async fn require_session(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = session_token(request.headers()) else {
        tracing::warn!(path = %request.uri().path(), "Request without session token");
        return AuthError::MissingToken.into_response();
    };

    let verified = auth.authenticate_token(token).await;
    match verified {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn test_session_token_forms() {
        assert_eq!(session_token(&headers("abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(session_token(&headers("Bearer abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(session_token(&headers("Bearer ")), None);
        assert_eq!(session_token(&headers("")), None);
        assert_eq!(session_token(&HeaderMap::new()), None);
    }
}
