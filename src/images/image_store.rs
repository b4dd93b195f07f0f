use anyhow::Result;

use crate::auth::StoreFuture;
use crate::db::{Db, ImageCreate, ImageMeta, QueryBuilder};
use crate::images::store::{Image, ImageStore};
use crate::types::UserId;

/// SurrealDB-backed image store.
pub struct SurrealImageStore {
    db: Db,
}

impl SurrealImageStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn add_image(&self, image: &ImageCreate) -> Result<ImageMeta> {
        let meta = QueryBuilder::create_image(&self.db, image).await?;
        tracing::info!(
            user_id = %meta.user_id,
            key = %meta.key,
            size = meta.size,
            "Image stored"
        );
        Ok(meta)
    }

    pub async fn images_for_user(&self, user_id: UserId) -> Result<Vec<ImageMeta>> {
        QueryBuilder::find_images_for_user(&self.db, user_id).await
    }

    pub async fn get_image(&self, key: &str) -> Result<Option<Image>> {
        let found = QueryBuilder::find_image(&self.db, key).await?;
        Ok(found.map(|(meta, data)| Image { meta, data }))
    }
}

impl ImageStore for SurrealImageStore {
    fn put<'a>(&'a self, image: &'a ImageCreate) -> StoreFuture<'a, ImageMeta> {
        Box::pin(self.add_image(image))
    }

    fn list(&self, user_id: UserId) -> StoreFuture<'_, Vec<ImageMeta>> {
        Box::pin(self.images_for_user(user_id))
    }

    fn fetch<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Image>> {
        Box::pin(self.get_image(key))
    }
}
