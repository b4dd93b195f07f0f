use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, Login, Password, UserId};

/// Persisted identity (table: `user`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Integer identity id, unique across the table.
    pub uid: UserId,
    /// Login name, unique across the table.
    pub login: Login,
    /// Password credential as stored.
    pub password: Password,
    /// Display name.
    pub name: String,
    /// Free-form profile text.
    pub description: Option<String>,
}

/// Payload used when inserting a new identity.
///
/// Built through [`UserCreate::new`] so every identity can round-trip
/// through a session token.
#[derive(Debug, Clone)]
pub struct UserCreate {
    pub(crate) login: Login,
    pub(crate) password: Password,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
}

/// Why a new identity was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidUser {
    EmptyLogin,
    /// The session token stores `"<login> <password>"` and splits on the first space
    LoginWhitespace,
    EmptyPassword,
}

impl fmt::Display for InvalidUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyLogin => write!(f, "login must not be empty"),
            Self::LoginWhitespace => write!(f, "login must not contain whitespace"),
            Self::EmptyPassword => write!(f, "password must not be empty"),
        }
    }
}

impl std::error::Error for InvalidUser {}

impl UserCreate {
    pub fn new(
        login: impl Into<Login>,
        password: impl Into<Password>,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<Self, InvalidUser> {
        let login = login.into();
        let password = password.into();

        if login.as_str().is_empty() {
            return Err(InvalidUser::EmptyLogin);
        }
        if login.as_str().chars().any(char::is_whitespace) {
            return Err(InvalidUser::LoginWhitespace);
        }
        if password.as_str().is_empty() {
            return Err(InvalidUser::EmptyPassword);
        }

        Ok(Self {
            login,
            password,
            name: name.into(),
            description,
        })
    }

    pub fn login(&self) -> &Login {
        &self.login
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Persisted binding of a secondary-channel id to an identity (table: `identity_link`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityLinkRecord {
    pub channel_id: ChannelId,
    pub user_id: UserId,
}

/// Largest accepted image payload.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Stored image without its payload (table: `image`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMeta {
    /// `<uuid>.<extension>`, unique across the table.
    pub key: String,
    /// Owning identity.
    pub user_id: UserId,
    /// File name as uploaded.
    pub name: String,
    pub content_type: String,
    pub size: i64,
    /// Unix milliseconds.
    pub uploaded_at: i64,
}

/// Full image row. `data` holds the payload as standard base64.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageRecord {
    pub key: String,
    pub user_id: UserId,
    pub name: String,
    pub content_type: String,
    pub size: i64,
    pub uploaded_at: i64,
    pub data: String,
}

impl ImageRecord {
    pub fn into_parts(self) -> (ImageMeta, String) {
        let meta = ImageMeta {
            key: self.key,
            user_id: self.user_id,
            name: self.name,
            content_type: self.content_type,
            size: self.size,
            uploaded_at: self.uploaded_at,
        };
        (meta, self.data)
    }
}

/// Payload used when storing a new image. Built through [`ImageCreate::new`].
#[derive(Debug, Clone)]
pub struct ImageCreate {
    pub(crate) user_id: UserId,
    pub(crate) name: String,
    pub(crate) content_type: String,
    pub(crate) data: Vec<u8>,
}

/// Why an upload was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidImage {
    Empty,
    NotAnImage(String),
    TooLarge(usize),
}

impl fmt::Display for InvalidImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "image is empty"),
            Self::NotAnImage(content_type) => {
                write!(f, "content type {:?} is not an image", content_type)
            }
            Self::TooLarge(size) => write!(
                f,
                "image is {} bytes, the limit is {} bytes",
                size, MAX_IMAGE_BYTES
            ),
        }
    }
}

impl std::error::Error for InvalidImage {}

impl ImageCreate {
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<Self, InvalidImage> {
        // Drop parameters such as "; charset=..."
        let content_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if !content_type.starts_with("image/") {
            return Err(InvalidImage::NotAnImage(content_type));
        }
        if data.is_empty() {
            return Err(InvalidImage::Empty);
        }
        if data.len() > MAX_IMAGE_BYTES {
            return Err(InvalidImage::TooLarge(data.len()));
        }

        Ok(Self {
            user_id,
            name: name.into(),
            content_type,
            data,
        })
    }

    /// File extension for the stored key, derived from the content type.
    pub fn extension(&self) -> &str {
        match self.content_type.trim_start_matches("image/") {
            "jpeg" | "pjpeg" => "jpg",
            "svg+xml" => "svg",
            sub if !sub.is_empty() && sub.chars().all(|c| c.is_ascii_alphanumeric()) => sub,
            _ => "img",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_create_accepts_token_safe_credentials() {
        let create = UserCreate::new("alice", "p1 with spaces", "Alice", None).unwrap();
        assert_eq!(create.login().as_str(), "alice");
        assert_eq!(create.name(), "Alice");
    }

    #[test]
    fn test_user_create_rejects_unsplittable_credentials() {
        assert_eq!(
            UserCreate::new("", "p1", "A", None).unwrap_err(),
            InvalidUser::EmptyLogin
        );
        assert_eq!(
            UserCreate::new("bob smith", "p1", "B", None).unwrap_err(),
            InvalidUser::LoginWhitespace
        );
        assert_eq!(
            UserCreate::new("alice", "", "A", None).unwrap_err(),
            InvalidUser::EmptyPassword
        );
    }

    #[test]
    fn test_image_create_normalizes_content_type() {
        let image =
            ImageCreate::new(UserId::new(1), "cat.JPG", "Image/JPEG; q=1", vec![1, 2, 3]).unwrap();
        assert_eq!(image.content_type, "image/jpeg");
        assert_eq!(image.extension(), "jpg");

        let png = ImageCreate::new(UserId::new(1), "a.png", "image/png", vec![1]).unwrap();
        assert_eq!(png.extension(), "png");

        let odd = ImageCreate::new(UserId::new(1), "a", "image/x.weird", vec![1]).unwrap();
        assert_eq!(odd.extension(), "img");
    }

    #[test]
    fn test_image_create_rejects_bad_uploads() {
        assert_eq!(
            ImageCreate::new(UserId::new(1), "a.txt", "text/plain", vec![1]).unwrap_err(),
            InvalidImage::NotAnImage("text/plain".to_string())
        );
        assert_eq!(
            ImageCreate::new(UserId::new(1), "a.png", "image/png", Vec::new()).unwrap_err(),
            InvalidImage::Empty
        );
        let big = vec![0u8; MAX_IMAGE_BYTES + 1];
        assert_eq!(
            ImageCreate::new(UserId::new(1), "a.png", "image/png", big).unwrap_err(),
            InvalidImage::TooLarge(MAX_IMAGE_BYTES + 1)
        );
    }
}
