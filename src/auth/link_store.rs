//! Identity link storage.

use anyhow::Result;

use crate::auth::store::{IdentityLinkStore, LinkInsert, StoreFuture};
use crate::db::{Db, Insert, QueryBuilder};
use crate::types::{ChannelId, UserId};

/// SurrealDB-backed identity link store.
pub struct LinkStore {
    db: Db,
}

impl LinkStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create_link(&self, channel_id: ChannelId, user_id: UserId) -> Result<LinkInsert> {
        let outcome = QueryBuilder::create_identity_link(&self.db, channel_id, user_id).await?;
        Ok(match outcome {
            Insert::Created(_) => LinkInsert::Inserted,
            Insert::Conflict => LinkInsert::Conflict,
        })
    }

    pub async fn get_user_for_channel(&self, channel_id: ChannelId) -> Result<Option<UserId>> {
        let link = QueryBuilder::find_identity_link(&self.db, channel_id).await?;
        Ok(link.map(|l| l.user_id))
    }

    pub async fn get_channels_for_user(&self, user_id: UserId) -> Result<Vec<ChannelId>> {
        let links = QueryBuilder::find_links_for_user(&self.db, user_id).await?;
        Ok(links.into_iter().map(|l| l.channel_id).collect())
    }
}

impl IdentityLinkStore for LinkStore {
    fn insert(&self, channel_id: ChannelId, user_id: UserId) -> StoreFuture<'_, LinkInsert> {
        Box::pin(self.create_link(channel_id, user_id))
    }

    fn lookup(&self, channel_id: ChannelId) -> StoreFuture<'_, Option<UserId>> {
        Box::pin(self.get_user_for_channel(channel_id))
    }

    fn channels_for(&self, user_id: UserId) -> StoreFuture<'_, Vec<ChannelId>> {
        Box::pin(self.get_channels_for_user(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_connection, ensure_schema, DatabaseConfig};

    async fn setup_store() -> LinkStore {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        LinkStore::new(db)
    }

    #[tokio::test]
    async fn test_insert_then_lookup() {
        let store = setup_store().await;

        let outcome = store.insert(ChannelId::new(555), UserId::new(1)).await.unwrap();
        assert_eq!(outcome, LinkInsert::Inserted);

        let user = store.lookup(ChannelId::new(555)).await.unwrap();
        assert_eq!(user, Some(UserId::new(1)));
    }

    #[tokio::test]
    async fn test_lookup_unknown_channel() {
        let store = setup_store().await;
        assert_eq!(store.lookup(ChannelId::new(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_second_insert_conflicts_and_keeps_first() {
        let store = setup_store().await;

        store.insert(ChannelId::new(555), UserId::new(1)).await.unwrap();
        let outcome = store.insert(ChannelId::new(555), UserId::new(2)).await.unwrap();
        assert_eq!(outcome, LinkInsert::Conflict);

        assert_eq!(
            store.lookup(ChannelId::new(555)).await.unwrap(),
            Some(UserId::new(1))
        );
    }

    #[tokio::test]
    async fn test_one_user_many_channels() {
        let store = setup_store().await;

        store.insert(ChannelId::new(20), UserId::new(1)).await.unwrap();
        store.insert(ChannelId::new(10), UserId::new(1)).await.unwrap();

        let channels = store.channels_for(UserId::new(1)).await.unwrap();
        assert_eq!(channels, vec![ChannelId::new(10), ChannelId::new(20)]);
    }
}
