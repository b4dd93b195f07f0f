use crate::auth::StoreFuture;
use crate::db::{ImageCreate, ImageMeta};
use crate::types::UserId;

/// Image with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub meta: ImageMeta,
    pub data: Vec<u8>,
}

/// Where uploaded images live. Keys are opaque and unique.
pub trait ImageStore: Send + Sync {
    fn put<'a>(&'a self, image: &'a ImageCreate) -> StoreFuture<'a, ImageMeta>;

    /// Images owned by `user_id`, oldest first.
    fn list(&self, user_id: UserId) -> StoreFuture<'_, Vec<ImageMeta>>;

    fn fetch<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Image>>;
}
