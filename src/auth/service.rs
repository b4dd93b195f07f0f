//! Credential verification, session issuance and secondary-channel linking.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::auth::context::UserContext;
use crate::auth::error::{AuthError, AuthResult, TokenError};
use crate::auth::store::{CredentialStore, Identity, IdentityLinkStore, LinkInsert};
use crate::auth::token::TokenCodec;
use crate::config::AuthConfig;
use crate::types::{ChannelId, Credentials, UserId};

/// Orchestrates the credential store, the link store and the token codec.
///
/// Holds no mutable state; clone the `Arc` freely across tasks.
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    links: Arc<dyn IdentityLinkStore>,
    codec: TokenCodec,
}

impl AuthService {
    pub fn new(
        config: &AuthConfig,
        credentials: Arc<dyn CredentialStore>,
        links: Arc<dyn IdentityLinkStore>,
    ) -> Self {
        Self {
            credentials,
            links,
            codec: TokenCodec::new(config),
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Verify `credentials` and issue a signed session token.
    pub async fn authorize(&self, credentials: &Credentials) -> AuthResult<String> {
        let user_id = self.validate_credentials(credentials).await?;
        let token = self.codec.issue(user_id, credentials)?;
        info!(user_id = %user_id, login = %credentials.login, "Session issued");
        Ok(token)
    }

    /// Look up the exact login/password pair and return the identity id.
    pub async fn validate_credentials(&self, credentials: &Credentials) -> AuthResult<UserId> {
        let identity = self
            .credentials
            .lookup(credentials)
            .await
            .map_err(|e| store_failure("credential lookup", e))?;

        match identity {
            Some(identity) => Ok(identity.id),
            None => {
                warn!(login = %credentials.login, "Credential mismatch");
                Err(AuthError::CredentialMismatch)
            }
        }
    }

    /// Decode a session token and re-verify the credentials it carries.
    ///
    /// The credentials must still resolve to the identity the token was
    /// issued to.
    pub async fn authenticate_token(&self, token: &str) -> AuthResult<UserContext> {
        let claims = self.codec.decode(token).inspect_err(|e| {
            warn!(error = %e, "Rejected session token");
        })?;
        let credentials = claims.credentials().inspect_err(|e| {
            warn!(error = %e, "Rejected session token");
        })?;
        let issued_to = claims.user_id().inspect_err(|e| {
            warn!(error = %e, "Rejected session token");
        })?;

        let user_id = self.validate_credentials(&credentials).await?;
        if user_id != issued_to {
            warn!(user_id = %user_id, issued_to = %issued_to, "Session belongs to another identity");
            return Err(TokenError::IdentityChanged.into());
        }
        debug!(user_id = %user_id, "Session verified");

        Ok(UserContext::new(user_id, credentials.login)
            .with_validity(claims.iat, claims.exp))
    }

    /// Bind `channel_id` to the identity owning `credentials`.
    ///
    /// A channel is linked at most once; a second attempt fails with
    /// `DuplicateLink` whether it is caught by the lookup or by the store's
    /// unique constraint.
    pub async fn link_secondary_channel(
        &self,
        channel_id: ChannelId,
        credentials: &Credentials,
    ) -> AuthResult<UserId> {
        let user_id = self.validate_credentials(credentials).await?;

        match self.resolve_secondary_channel(channel_id).await {
            Ok(existing) => {
                warn!(channel_id = %channel_id, linked_to = %existing, "Channel already linked");
                return Err(AuthError::DuplicateLink);
            }
            Err(AuthError::LinkNotFound) => {}
            Err(e) => return Err(e),
        }

        let outcome = self
            .links
            .insert(channel_id, user_id)
            .await
            .map_err(|e| store_failure("link insert", e))?;

        match outcome {
            LinkInsert::Inserted => {
                info!(channel_id = %channel_id, user_id = %user_id, "Channel linked");
                Ok(user_id)
            }
            LinkInsert::Conflict => {
                warn!(channel_id = %channel_id, "Concurrent link for channel");
                Err(AuthError::DuplicateLink)
            }
        }
    }

    pub async fn resolve_secondary_channel(&self, channel_id: ChannelId) -> AuthResult<UserId> {
        self.links
            .lookup(channel_id)
            .await
            .map_err(|e| store_failure("link lookup", e))?
            .ok_or(AuthError::LinkNotFound)
    }

    /// Fetch identity details for display.
    pub async fn identity(&self, user_id: UserId) -> AuthResult<Identity> {
        self.credentials
            .identity(user_id)
            .await
            .map_err(|e| store_failure("identity lookup", e))?
            .ok_or(AuthError::UnknownIdentity(user_id))
    }

    /// Channels bound to an identity.
    pub async fn linked_channels(&self, user_id: UserId) -> AuthResult<Vec<ChannelId>> {
        self.links
            .channels_for(user_id)
            .await
            .map_err(|e| store_failure("link listing", e))
    }
}

fn store_failure(operation: &str, err: anyhow::Error) -> AuthError {
    error!(operation, error = %err, "Store failure");
    AuthError::Store(format!("{}: {}", operation, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::link_store::LinkStore;
    use crate::auth::store::StoreFuture;
    use crate::auth::token::SessionClaims;
    use crate::auth::user_store::UserStore;
    use crate::config::Keyword;
    use crate::db::{
        create_connection, ensure_schema, DatabaseConfig, Db, Insert, QueryBuilder, UserCreate,
    };

    async fn setup_test_db() -> Db {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        db
    }

    fn config() -> AuthConfig {
        AuthConfig::new(Keyword::new("test-keyword").unwrap())
    }

    fn service(db: &Db) -> AuthService {
        AuthService::new(
            &config(),
            Arc::new(UserStore::new(db.clone())),
            Arc::new(LinkStore::new(db.clone())),
        )
    }

    async fn seed_alice(db: &Db) {
        let created = UserStore::new(db.clone())
            .create_user(&UserCreate::new("alice", "p1", "Alice", None).unwrap())
            .await
            .unwrap();
        assert!(matches!(created, Insert::Created(ref i) if i.id == UserId::new(1)));
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let db = setup_test_db().await;
        seed_alice(&db).await;
        let auth = service(&db);
        let alice = Credentials::new("alice", "p1");

        let token = auth.authorize(&alice).await.unwrap();
        let claims = auth.codec().decode(&token).unwrap();
        assert_eq!(claims.credentials().unwrap(), alice);
        assert_eq!(claims.user_id().unwrap(), UserId::new(1));

        let ctx = auth.authenticate_token(&token).await.unwrap();
        assert_eq!(ctx.user_id(), UserId::new(1));
        assert_eq!(ctx.login().as_str(), "alice");

        let linked = auth
            .link_secondary_channel(ChannelId::new(555), &alice)
            .await
            .unwrap();
        assert_eq!(linked, UserId::new(1));
        assert_eq!(
            auth.resolve_secondary_channel(ChannelId::new(555)).await.unwrap(),
            UserId::new(1)
        );

        let again = auth.link_secondary_channel(ChannelId::new(555), &alice).await;
        assert!(matches!(again, Err(AuthError::DuplicateLink)));

        let rows = QueryBuilder::find_links_for_user(&db, UserId::new(1)).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_authorize_on_empty_store_is_mismatch() {
        let db = setup_test_db().await;
        let auth = service(&db);

        let result = auth.authorize(&Credentials::new("nouser", "wrong")).await;
        assert!(matches!(result, Err(AuthError::CredentialMismatch)));
    }

    #[tokio::test]
    async fn test_wrong_password_is_mismatch() {
        let db = setup_test_db().await;
        seed_alice(&db).await;
        let auth = service(&db);

        let result = auth
            .validate_credentials(&Credentials::new("alice", "p2"))
            .await;
        assert!(matches!(result, Err(AuthError::CredentialMismatch)));
    }

    #[tokio::test]
    async fn test_link_with_bad_credentials_writes_nothing() {
        let db = setup_test_db().await;
        seed_alice(&db).await;
        let auth = service(&db);

        let result = auth
            .link_secondary_channel(ChannelId::new(9), &Credentials::new("alice", "nope"))
            .await;
        assert!(matches!(result, Err(AuthError::CredentialMismatch)));
        assert!(matches!(
            auth.resolve_secondary_channel(ChannelId::new(9)).await,
            Err(AuthError::LinkNotFound)
        ));
    }

    #[tokio::test]
    async fn test_resolve_unknown_channel() {
        let db = setup_test_db().await;
        let auth = service(&db);

        let result = auth.resolve_secondary_channel(ChannelId::new(42)).await;
        assert!(matches!(result, Err(AuthError::LinkNotFound)));
    }

    #[tokio::test]
    async fn test_token_fails_after_password_removed_from_store() {
        let db = setup_test_db().await;
        seed_alice(&db).await;
        let auth = service(&db);
        let token = auth.authorize(&Credentials::new("alice", "p1")).await.unwrap();

        db.query("UPDATE user SET password = 'rotated' WHERE login = 'alice'")
            .await
            .unwrap()
            .check()
            .unwrap();

        let result = auth.authenticate_token(&token).await;
        assert!(matches!(result, Err(AuthError::CredentialMismatch)));
    }

    #[tokio::test]
    async fn test_token_without_credential_pair_is_rejected() {
        let db = setup_test_db().await;
        seed_alice(&db).await;
        let auth = service(&db);

        let now = chrono::Utc::now().timestamp();
        let mut claims =
            SessionClaims::new(UserId::new(1), &Credentials::new("alice", "p1"), "1", now, 60);
        claims.iss = "alice".to_string();
        let token = auth.codec().encode(&claims).unwrap();

        let result = auth.authenticate_token(&token).await;
        assert!(matches!(
            result,
            Err(AuthError::Token(TokenError::CredentialFormat))
        ));
    }

    #[tokio::test]
    async fn test_token_issued_to_another_identity_is_rejected() {
        let db = setup_test_db().await;
        seed_alice(&db).await;
        let auth = service(&db);

        let now = chrono::Utc::now().timestamp();
        let claims =
            SessionClaims::new(UserId::new(2), &Credentials::new("alice", "p1"), "1", now, 60);
        let token = auth.codec().encode(&claims).unwrap();

        let result = auth.authenticate_token(&token).await;
        assert!(matches!(
            result,
            Err(AuthError::Token(TokenError::IdentityChanged))
        ));
    }

    #[tokio::test]
    async fn test_registered_password_with_spaces_round_trips() {
        let db = setup_test_db().await;
        let create = UserCreate::new("bob", "correct horse battery", "Bob", None).unwrap();
        UserStore::new(db.clone()).create_user(&create).await.unwrap();
        let auth = service(&db);

        let token = auth
            .authorize(&Credentials::new("bob", "correct horse battery"))
            .await
            .unwrap();
        let ctx = auth.authenticate_token(&token).await.unwrap();
        assert_eq!(ctx.login().as_str(), "bob");
        assert!(ctx.expires_at() > ctx.issued_at());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_linking_reports_duplicates() {
        let db = setup_test_db().await;
        seed_alice(&db).await;
        let auth = Arc::new(service(&db));

        let mut handles = Vec::new();
        for channel in 0..20 {
            for _ in 0..8 {
                let auth = auth.clone();
                handles.push(tokio::spawn(async move {
                    auth.link_secondary_channel(
                        ChannelId::new(1000 + channel),
                        &Credentials::new("alice", "p1"),
                    )
                    .await
                }));
            }
        }

        let (mut linked, mut duplicate) = (0, 0);
        for handle in handles {
            match handle.await.unwrap() {
                Ok(user_id) => {
                    assert_eq!(user_id, UserId::new(1));
                    linked += 1;
                }
                Err(AuthError::DuplicateLink) => duplicate += 1,
                Err(other) => panic!("unexpected outcome: {:?}", other),
            }
        }
        assert_eq!(linked, 20);
        assert_eq!(duplicate, 140);

        let rows = QueryBuilder::find_links_for_user(&db, UserId::new(1)).await.unwrap();
        assert_eq!(rows.len(), 20);
    }

    #[tokio::test]
    async fn test_identity_lookup() {
        let db = setup_test_db().await;
        seed_alice(&db).await;
        let auth = service(&db);

        let identity = auth.identity(UserId::new(1)).await.unwrap();
        assert_eq!(identity.name, "Alice");

        let missing = auth.identity(UserId::new(99)).await;
        assert!(matches!(missing, Err(AuthError::UnknownIdentity(id)) if id == UserId::new(99)));
    }

    struct UnreachableStore;

    impl CredentialStore for UnreachableStore {
        fn lookup<'a>(&'a self, _: &'a Credentials) -> StoreFuture<'a, Option<Identity>> {
            Box::pin(async { Err(anyhow::anyhow!("connection refused")) })
        }

        fn identity(&self, _: UserId) -> StoreFuture<'_, Option<Identity>> {
            Box::pin(async { Err(anyhow::anyhow!("connection refused")) })
        }
    }

    impl IdentityLinkStore for UnreachableStore {
        fn insert(&self, _: ChannelId, _: UserId) -> StoreFuture<'_, LinkInsert> {
            Box::pin(async { Err(anyhow::anyhow!("connection refused")) })
        }

        fn lookup(&self, _: ChannelId) -> StoreFuture<'_, Option<UserId>> {
            Box::pin(async { Err(anyhow::anyhow!("connection refused")) })
        }

        fn channels_for(&self, _: UserId) -> StoreFuture<'_, Vec<ChannelId>> {
            Box::pin(async { Err(anyhow::anyhow!("connection refused")) })
        }
    }

    #[tokio::test]
    async fn test_store_outage_is_infrastructure_error() {
        let store = Arc::new(UnreachableStore);
        let auth = AuthService::new(&config(), store.clone(), store);

        let err = auth
            .authorize(&Credentials::new("alice", "p1"))
            .await
            .unwrap_err();
        assert!(err.is_infrastructure());

        let err = auth
            .resolve_secondary_channel(ChannelId::new(1))
            .await
            .unwrap_err();
        assert!(err.is_infrastructure());
    }
}
