//! Session token encoding and verification.
//!
//! Tokens are HS256 JWTs. The issuer claim carries `"<login> <password>"` so
//! that every request can be re-verified against the credential store with
//! the same check used at login.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::auth::error::TokenError;
use crate::config::AuthConfig;
use crate::types::{Credentials, UserId};

/// Subject claim of every session token.
pub const SESSION_SUBJECT: &str = "authorized";

/// Claim set of a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// `"<login> <password>"`
    pub iss: String,
    pub sub: String,
    pub aud: Vec<String>,
    pub exp: i64,
    pub nbf: i64,
    pub iat: i64,
    /// Identity id at issuance, as a decimal string
    pub jti: String,
}

impl SessionClaims {
    /// Build claims valid from `issued_at` for `ttl_seconds`.
    pub fn new(
        user_id: UserId,
        credentials: &Credentials,
        audience: &str,
        issued_at: i64,
        ttl_seconds: i64,
    ) -> Self {
        Self {
            iss: format!(
                "{} {}",
                credentials.login.as_str(),
                credentials.password.as_str()
            ),
            sub: SESSION_SUBJECT.to_string(),
            aud: vec![audience.to_string()],
            exp: issued_at + ttl_seconds,
            nbf: issued_at,
            iat: issued_at,
            jti: user_id.to_string(),
        }
    }

    /// Recover the credential pair from the issuer claim.
    ///
    /// Splits on the first space; both halves must be non-empty.
    pub fn credentials(&self) -> Result<Credentials, TokenError> {
        match self.iss.split_once(' ') {
            Some((login, password)) if !login.is_empty() && !password.is_empty() => {
                Ok(Credentials::new(login, password))
            }
            _ => Err(TokenError::CredentialFormat),
        }
    }

    /// Identity id recorded at issuance.
    pub fn user_id(&self) -> Result<UserId, TokenError> {
        self.jti
            .parse::<i64>()
            .map(UserId::new)
            .map_err(|_| TokenError::Malformed(format!("invalid token id `{}`", self.jti)))
    }
}

/// Signs and verifies session tokens with the server keyword.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    audience: String,
    ttl_seconds: i64,
}

impl TokenCodec {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "aud", "iss", "sub"]);
        validation.sub = Some(SESSION_SUBJECT.to_string());

        Self {
            encoding_key: EncodingKey::from_secret(config.keyword.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.keyword.as_bytes()),
            validation,
            audience: config.audience.clone(),
            ttl_seconds: config.session_ttl_seconds,
        }
    }

    /// Issue a token valid from now.
    pub fn issue(&self, user_id: UserId, credentials: &Credentials) -> Result<String, TokenError> {
        self.issue_at(user_id, credentials, chrono::Utc::now().timestamp())
    }

    /// Issue a token valid from `issued_at` (unix seconds).
    pub fn issue_at(
        &self,
        user_id: UserId,
        credentials: &Credentials,
        issued_at: i64,
    ) -> Result<String, TokenError> {
        let claims = SessionClaims::new(
            user_id,
            credentials,
            &self.audience,
            issued_at,
            self.ttl_seconds,
        );
        self.encode(&claims)
    }

    pub fn encode(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature and validity window, returning the claims.
    pub fn decode(&self, token: &str) -> Result<SessionClaims, TokenError> {
        check_segments(token)?;

        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::SignatureInvalid
                }
                // Header and claims were decodable above, so this is the signature.
                ErrorKind::Base64(_) => TokenError::SignatureInvalid,
                ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => {
                    TokenError::Expired
                }
                _ => TokenError::Malformed(e.to_string()),
            })?;

        Ok(data.claims)
    }
}

/// Require `header.claims.signature` with JSON header and claims.
fn check_segments(token: &str) -> Result<(), TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header, claims, signature] = segments.as_slice() else {
        return Err(TokenError::Malformed(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    };

    for (name, segment) in [("header", header), ("claims", claims)] {
        let bytes = URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|e| TokenError::Malformed(format!("{} is not base64url: {}", name, e)))?;
        serde_json::from_slice::<serde_json::Value>(&bytes)
            .map_err(|e| TokenError::Malformed(format!("{} is not JSON: {}", name, e)))?;
    }

    if signature.is_empty() {
        return Err(TokenError::SignatureInvalid);
    }

    Ok(())
}
