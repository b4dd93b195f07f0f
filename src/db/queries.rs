// Database query helpers for the identity tables.
//
// Writes that must not produce duplicates rely on the UNIQUE indexes defined
// in `ensure_schema`; a violated index is reported as `Insert::Conflict`
// instead of an error so callers can map it to a domain outcome.

use crate::db::schema::*;
use crate::types::{ChannelId, Login, Password, UserId};
use anyhow::{anyhow, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::time::Duration;
use surrealdb::{engine::any::Any, Surreal};

/// Attempts for a write that keeps losing optimistic transaction conflicts.
const MAX_WRITE_ATTEMPTS: u32 = 32;

/// Result of an insert guarded by a unique index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insert<T> {
    Created(T),
    Conflict,
}

/// Whether a SurrealDB error reports a unique index or record id collision.
pub fn is_conflict(err: &surrealdb::Error) -> bool {
    let msg = err.to_string();
    msg.contains("already contains") || msg.contains("already exists")
}

/// Whether a write failed only because a concurrent transaction committed first.
pub fn is_retryable(err: &surrealdb::Error) -> bool {
    let msg = err.to_string();
    msg.contains("can be retried") || msg.contains("read or write conflict")
}

/// Backoff before retry `attempt` (1-based), with a little clock jitter so
/// colliding writers spread out.
fn retry_delay(attempt: u32) -> Duration {
    let base = 1u64 << attempt.min(6);
    let jitter = u64::from(chrono::Utc::now().timestamp_subsec_nanos() % 4);
    Duration::from_millis(base + jitter)
}

pub struct QueryBuilder;

impl QueryBuilder {
    /// Allocate the next integer identity id.
    ///
    /// A single UPSERT statement, so concurrent callers never observe the
    /// same value. Ids burned by a failed insert are not reused.
    pub async fn next_user_id(db: &Surreal<Any>) -> Result<UserId> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match Self::try_next_user_id(db).await {
                Ok(Some(next)) => return Ok(UserId::new(next)),
                Ok(None) => return Err(anyhow!("failed to allocate user id")),
                Err(e) if is_retryable(&e) && attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!(attempt, "Retrying user id allocation");
                    tokio::time::sleep(retry_delay(attempt)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn try_next_user_id(db: &Surreal<Any>) -> surrealdb::Result<Option<i64>> {
        let mut res = db
            .query("UPSERT counter:user SET seq += 1 RETURN VALUE seq")
            .await?;
        res.take(0)
    }

    /// Insert a new identity. A taken login yields `Insert::Conflict`.
    pub async fn create_user(
        db: &Surreal<Any>,
        data: &UserCreate,
    ) -> Result<Insert<UserRecord>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let uid = Self::next_user_id(db).await?;
            match Self::try_create_user(db, uid, data).await {
                Ok(Some(user)) => return Ok(Insert::Created(user)),
                Ok(None) => return Err(anyhow!("failed to create user record")),
                Err(e) if is_conflict(&e) => return Ok(Insert::Conflict),
                Err(e) if is_retryable(&e) => {
                    // A racing writer may have taken the login.
                    if Self::login_exists(db, &data.login).await? {
                        return Ok(Insert::Conflict);
                    }
                    if attempt >= MAX_WRITE_ATTEMPTS {
                        return Err(e.into());
                    }
                    tracing::debug!(attempt, login = %data.login, "Retrying user insert");
                    tokio::time::sleep(retry_delay(attempt)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn try_create_user(
        db: &Surreal<Any>,
        uid: UserId,
        data: &UserCreate,
    ) -> surrealdb::Result<Option<UserRecord>> {
        let mut res = db
            .query(
                r#"
                CREATE user CONTENT {
                    uid: $uid,
                    login: $login,
                    password: $password,
                    name: $name,
                    description: $description
                }
                "#,
            )
            .bind(("uid", uid.get()))
            .bind(("login", data.login.as_str().to_string()))
            .bind(("password", data.password.as_str().to_string()))
            .bind(("name", data.name.clone()))
            .bind(("description", data.description.clone()))
            .await?;
        res.take(0)
    }

    async fn login_exists(db: &Surreal<Any>, login: &Login) -> Result<bool> {
        let mut res = db
            .query("SELECT VALUE uid FROM user WHERE login = $login LIMIT 1")
            .bind(("login", login.as_str().to_string()))
            .await?;
        let uids: Vec<i64> = res.take(0)?;
        Ok(!uids.is_empty())
    }

    /// Find the identity matching an exact login/password pair.
    pub async fn find_user_by_credentials(
        db: &Surreal<Any>,
        login: &Login,
        password: &Password,
    ) -> Result<Option<UserRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT uid, login, password, name, description FROM user
                WHERE login = $login AND password = $password
                LIMIT 1
                "#,
            )
            .bind(("login", login.as_str().to_string()))
            .bind(("password", password.as_str().to_string()))
            .await?;

        let user: Option<UserRecord> = res.take(0)?;
        Ok(user)
    }

    pub async fn find_user_by_id(
        db: &Surreal<Any>,
        uid: UserId,
    ) -> Result<Option<UserRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT uid, login, password, name, description FROM user
                WHERE uid = $uid
                LIMIT 1
                "#,
            )
            .bind(("uid", uid.get()))
            .await?;

        let user: Option<UserRecord> = res.take(0)?;
        Ok(user)
    }

    /// Bind a channel id to an identity.
    ///
    /// The UNIQUE index on `channel_id` makes this an atomic insert-if-absent:
    /// of two concurrent inserts for the same channel exactly one succeeds.
    pub async fn create_identity_link(
        db: &Surreal<Any>,
        channel_id: ChannelId,
        user_id: UserId,
    ) -> Result<Insert<IdentityLinkRecord>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match Self::try_create_identity_link(db, channel_id, user_id).await {
                Ok(Some(link)) => return Ok(Insert::Created(link)),
                Ok(None) => return Err(anyhow!("failed to create identity link")),
                Err(e) if is_conflict(&e) => return Ok(Insert::Conflict),
                Err(e) if is_retryable(&e) => {
                    // Lost to a concurrent writer: either the same channel,
                    // which is a conflict, or an unrelated one, which is retried.
                    if Self::find_identity_link(db, channel_id).await?.is_some() {
                        return Ok(Insert::Conflict);
                    }
                    if attempt >= MAX_WRITE_ATTEMPTS {
                        return Err(e.into());
                    }
                    tracing::debug!(attempt, channel_id = %channel_id, "Retrying link insert");
                    tokio::time::sleep(retry_delay(attempt)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn try_create_identity_link(
        db: &Surreal<Any>,
        channel_id: ChannelId,
        user_id: UserId,
    ) -> surrealdb::Result<Option<IdentityLinkRecord>> {
        let mut res = db
            .query(
                r#"
                CREATE identity_link CONTENT {
                    channel_id: $channel_id,
                    user_id: $user_id
                }
                "#,
            )
            .bind(("channel_id", channel_id.get()))
            .bind(("user_id", user_id.get()))
            .await?;
        res.take(0)
    }

    pub async fn find_identity_link(
        db: &Surreal<Any>,
        channel_id: ChannelId,
    ) -> Result<Option<IdentityLinkRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT channel_id, user_id FROM identity_link
                WHERE channel_id = $channel_id
                LIMIT 1
                "#,
            )
            .bind(("channel_id", channel_id.get()))
            .await?;

        let link: Option<IdentityLinkRecord> = res.take(0)?;
        Ok(link)
    }

    /// All channels bound to an identity.
    pub async fn find_links_for_user(
        db: &Surreal<Any>,
        user_id: UserId,
    ) -> Result<Vec<IdentityLinkRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT channel_id, user_id FROM identity_link
                WHERE user_id = $user_id
                ORDER BY channel_id
                "#,
            )
            .bind(("user_id", user_id.get()))
            .await?;

        let links: Vec<IdentityLinkRecord> = res.take(0)?;
        Ok(links)
    }

    /// Store an image under a fresh `<uuid>.<extension>` key.
    pub async fn create_image(db: &Surreal<Any>, data: &ImageCreate) -> Result<ImageMeta> {
        let key = format!("{}.{}", uuid::Uuid::new_v4(), data.extension());
        let encoded = STANDARD.encode(&data.data);
        let uploaded_at = chrono::Utc::now().timestamp_millis();

        let mut attempt = 0;
        loop {
            attempt += 1;
            match Self::try_create_image(db, &key, data, &encoded, uploaded_at).await {
                Ok(Some(meta)) => return Ok(meta),
                Ok(None) => return Err(anyhow!("failed to create image record")),
                Err(e) if is_retryable(&e) && attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!(attempt, key = %key, "Retrying image insert");
                    tokio::time::sleep(retry_delay(attempt)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn try_create_image(
        db: &Surreal<Any>,
        key: &str,
        data: &ImageCreate,
        encoded: &str,
        uploaded_at: i64,
    ) -> surrealdb::Result<Option<ImageMeta>> {
        let mut res = db
            .query(
                r#"
                CREATE image CONTENT {
                    key: $key,
                    user_id: $user_id,
                    name: $name,
                    content_type: $content_type,
                    size: $size,
                    uploaded_at: $uploaded_at,
                    data: $data
                }
                RETURN key, user_id, name, content_type, size, uploaded_at
                "#,
            )
            .bind(("key", key.to_string()))
            .bind(("user_id", data.user_id.get()))
            .bind(("name", data.name.clone()))
            .bind(("content_type", data.content_type.clone()))
            .bind(("size", data.data.len() as i64))
            .bind(("uploaded_at", uploaded_at))
            .bind(("data", encoded.to_string()))
            .await?;
        res.take(0)
    }

    /// Images owned by an identity, oldest first. Payloads are not loaded.
    pub async fn find_images_for_user(
        db: &Surreal<Any>,
        user_id: UserId,
    ) -> Result<Vec<ImageMeta>> {
        let mut res = db
            .query(
                r#"
                SELECT key, user_id, name, content_type, size, uploaded_at FROM image
                WHERE user_id = $user_id
                ORDER BY uploaded_at, key
                "#,
            )
            .bind(("user_id", user_id.get()))
            .await?;

        let images: Vec<ImageMeta> = res.take(0)?;
        Ok(images)
    }

    /// Load one image with its decoded payload.
    pub async fn find_image(db: &Surreal<Any>, key: &str) -> Result<Option<(ImageMeta, Vec<u8>)>> {
        let mut res = db
            .query(
                r#"
                SELECT key, user_id, name, content_type, size, uploaded_at, data FROM image
                WHERE key = $key
                LIMIT 1
                "#,
            )
            .bind(("key", key.to_string()))
            .await?;

        let record: Option<ImageRecord> = res.take(0)?;
        record
            .map(|record| {
                let (meta, data) = record.into_parts();
                let bytes = STANDARD
                    .decode(data)
                    .map_err(|e| anyhow!("image {} has a corrupt payload: {}", meta.key, e))?;
                Ok((meta, bytes))
            })
            .transpose()
    }
}
