//! Capability interfaces the auth core depends on.
//!
//! The service only talks to these traits; SurrealDB adapters live in
//! `user_store` and `link_store`.

use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use serde::Serialize;

use crate::db::UserRecord;
use crate::types::{ChannelId, Credentials, Login, UserId};

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Identity as seen by the auth core. The password never leaves the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: UserId,
    pub login: Login,
    pub name: String,
    pub description: Option<String>,
}

impl From<UserRecord> for Identity {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.uid,
            login: record.login,
            name: record.name,
            description: record.description,
        }
    }
}

/// Outcome of inserting an identity link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkInsert {
    Inserted,
    /// A link for the channel already exists; nothing was written.
    Conflict,
}

/// System of record for login/password to identity resolution.
pub trait CredentialStore: Send + Sync {
    /// Find the identity whose stored credentials equal `credentials` exactly.
    fn lookup<'a>(&'a self, credentials: &'a Credentials) -> StoreFuture<'a, Option<Identity>>;

    /// Find an identity by id.
    fn identity(&self, id: UserId) -> StoreFuture<'_, Option<Identity>>;
}

/// Persistent mapping from secondary-channel ids to identity ids.
pub trait IdentityLinkStore: Send + Sync {
    /// Insert a link unless one already exists for `channel_id`.
    ///
    /// Must be atomic with respect to concurrent inserts for the same channel.
    fn insert(&self, channel_id: ChannelId, user_id: UserId) -> StoreFuture<'_, LinkInsert>;

    fn lookup(&self, channel_id: ChannelId) -> StoreFuture<'_, Option<UserId>>;

    /// Channels linked to an identity, ascending.
    fn channels_for(&self, user_id: UserId) -> StoreFuture<'_, Vec<ChannelId>>;
}
