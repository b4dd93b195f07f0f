//! Per-identity image storage.
//!
//! Uploads arrive through the session-gated HTTP routes and are listed back
//! to the owner, both over HTTP and through the bot's `show` action.

mod image_store;
mod store;

pub use image_store::SurrealImageStore;
pub use store::{Image, ImageStore};
