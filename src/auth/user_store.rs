//! User storage and management.

use anyhow::Result;

use crate::auth::store::{CredentialStore, Identity, StoreFuture};
use crate::db::{Db, Insert, QueryBuilder, UserCreate};
use crate::types::{Credentials, UserId};

/// User store for database operations.
pub struct UserStore {
    db: Db,
}

impl UserStore {
    /// Create a new user store.
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Register a new identity.
    ///
    /// Returns `Insert::Conflict` when the login is already taken.
    pub async fn create_user(&self, create: &UserCreate) -> Result<Insert<Identity>> {
        let outcome = QueryBuilder::create_user(&self.db, create).await?;
        Ok(match outcome {
            Insert::Created(record) => {
                tracing::info!(user_id = %record.uid, login = %record.login, "User created");
                Insert::Created(record.into())
            }
            Insert::Conflict => Insert::Conflict,
        })
    }

    /// Get a user by identity id.
    pub async fn get_user_by_id(&self, user_id: UserId) -> Result<Option<Identity>> {
        let record = QueryBuilder::find_user_by_id(&self.db, user_id).await?;
        Ok(record.map(Identity::from))
    }

    /// Get the user whose login and password both match.
    pub async fn get_user_by_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<Identity>> {
        let record = QueryBuilder::find_user_by_credentials(
            &self.db,
            &credentials.login,
            &credentials.password,
        )
        .await?;
        Ok(record.map(Identity::from))
    }
}

impl CredentialStore for UserStore {
    fn lookup<'a>(&'a self, credentials: &'a Credentials) -> StoreFuture<'a, Option<Identity>> {
        Box::pin(self.get_user_by_credentials(credentials))
    }

    fn identity(&self, id: UserId) -> StoreFuture<'_, Option<Identity>> {
        Box::pin(self.get_user_by_id(id))
    }
}
