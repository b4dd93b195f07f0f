//! Chat commands: the `/start` menu, channel registration, and the profile
//! plus uploaded images of the linked account.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::auth::{AuthError, AuthService};
use crate::images::{Image, ImageStore};
use crate::types::{ChannelId, Credentials, UserId};

pub const START_COMMAND: &str = "/start";
pub const SHOW_ACTION: &str = "show";
pub const REGISTER_ACTION: &str = "register";

pub const MENU_TEXT: &str = "Select the action";
pub const REGISTER_PROMPT: &str = "Enter your username and password.\nExample: test test";
pub const REGISTERED: &str = "You are registered!";
pub const ALREADY_REGISTERED: &str = "This chat is already linked to an account";
pub const INCORRECT_CREDENTIALS: &str = "Incorrect login or password";
pub const SIGN_UP: &str = "Sign up!";
pub const UNKNOWN_COMMAND: &str = "Unknown command, enter:/start";
pub const TRY_AGAIN: &str = "Something went wrong, please try again later";

/// Inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: data.into(),
        }
    }
}

/// Message to send back to the chat, followed by any photos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub buttons: Vec<Button>,
    /// Message id to reply to
    pub reply_to: Option<i64>,
    pub photos: Vec<Image>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
            reply_to: None,
            photos: Vec::new(),
        }
    }
}

/// Maps chat input to auth service calls. The chat id is the channel id.
pub struct BotHandler {
    auth: Arc<AuthService>,
    images: Arc<dyn ImageStore>,
}

impl BotHandler {
    pub fn new(auth: Arc<AuthService>, images: Arc<dyn ImageStore>) -> Self {
        Self { auth, images }
    }

    /// Handle a text message.
    pub async fn on_message(&self, chat_id: ChannelId, message_id: i64, text: &str) -> Reply {
        if text.trim() == START_COMMAND {
            return Reply {
                text: MENU_TEXT.to_string(),
                buttons: vec![
                    Button::new("Show profile", SHOW_ACTION),
                    Button::new("Registration", REGISTER_ACTION),
                ],
                reply_to: Some(message_id),
                photos: Vec::new(),
            };
        }

        match Credentials::from_chat_text(text) {
            Some(credentials) => self.register(chat_id, &credentials).await,
            None => Reply::text(UNKNOWN_COMMAND),
        }
    }

    /// Handle an inline button press.
    pub async fn on_callback(&self, chat_id: ChannelId, data: &str) -> Reply {
        match data {
            SHOW_ACTION => self.show(chat_id).await,
            REGISTER_ACTION => Reply::text(REGISTER_PROMPT),
            other => {
                warn!(channel_id = %chat_id, data = other, "Unknown callback");
                Reply::text(UNKNOWN_COMMAND)
            }
        }
    }

    async fn register(&self, chat_id: ChannelId, credentials: &Credentials) -> Reply {
        match self.auth.link_secondary_channel(chat_id, credentials).await {
            Ok(user_id) => {
                info!(channel_id = %chat_id, user_id = %user_id, "Chat registered");
                Reply::text(REGISTERED)
            }
            Err(AuthError::DuplicateLink) => Reply::text(ALREADY_REGISTERED),
            Err(e) if e.is_infrastructure() => Reply::text(TRY_AGAIN),
            Err(_) => Reply::text(INCORRECT_CREDENTIALS),
        }
    }

    async fn show(&self, chat_id: ChannelId) -> Reply {
        let user_id = match self.auth.resolve_secondary_channel(chat_id).await {
            Ok(user_id) => user_id,
            Err(AuthError::LinkNotFound) => return Reply::text(SIGN_UP),
            Err(_) => return Reply::text(TRY_AGAIN),
        };

        let identity = match self.auth.identity(user_id).await {
            Ok(identity) => identity,
            // Linked identity was removed from the store.
            Err(AuthError::UnknownIdentity(_)) => return Reply::text(SIGN_UP),
            Err(_) => return Reply::text(TRY_AGAIN),
        };

        let mut text = format!("{} ({})", identity.name, identity.login);
        if let Some(description) = identity.description.filter(|d| !d.is_empty()) {
            text.push('\n');
            text.push_str(&description);
        }

        let mut reply = Reply::text(text);
        reply.photos = self.photos(user_id).await;
        reply
    }

    /// Images of `user_id`. A failing image store still leaves the profile text.
    async fn photos(&self, user_id: UserId) -> Vec<Image> {
        let listed = match self.images.list(user_id).await {
            Ok(listed) => listed,
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to list images");
                return Vec::new();
            }
        };

        let mut photos = Vec::with_capacity(listed.len());
        for meta in listed {
            match self.images.fetch(&meta.key).await {
                Ok(Some(image)) => photos.push(image),
                Ok(None) => warn!(key = %meta.key, "Image vanished before it was sent"),
                Err(e) => error!(key = %meta.key, error = %e, "Failed to load image"),
            }
        }
        photos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{LinkStore, UserStore};
    use crate::config::{AuthConfig, Keyword};
    use crate::db::{DatabaseConfig, Db, ImageCreate, UserCreate, create_connection, ensure_schema};
    use crate::images::SurrealImageStore;

    async fn setup() -> (Db, BotHandler) {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();

        let users = Arc::new(UserStore::new(db.clone()));
        users
            .create_user(
                &UserCreate::new("alice", "p1", "Alice", Some("first user".to_string())).unwrap(),
            )
            .await
            .unwrap();

        let auth = AuthService::new(
            &AuthConfig::new(Keyword::new("test-keyword").unwrap()),
            users,
            Arc::new(LinkStore::new(db.clone())),
        );
        let images = Arc::new(SurrealImageStore::new(db.clone()));
        (db, BotHandler::new(Arc::new(auth), images))
    }

    #[tokio::test]
    async fn test_start_shows_menu() {
        let (_db, bot) = setup().await;
        let reply = bot.on_message(ChannelId::new(555), 7, "/start").await;

        assert_eq!(reply.text, MENU_TEXT);
        assert_eq!(reply.reply_to, Some(7));
        let actions: Vec<&str> = reply.buttons.iter().map(|b| b.data.as_str()).collect();
        assert_eq!(actions, vec![SHOW_ACTION, REGISTER_ACTION]);
    }

    #[tokio::test]
    async fn test_register_then_show() {
        let (_db, bot) = setup().await;
        let chat = ChannelId::new(555);

        let reply = bot.on_callback(chat, SHOW_ACTION).await;
        assert_eq!(reply.text, SIGN_UP);

        let reply = bot.on_callback(chat, REGISTER_ACTION).await;
        assert_eq!(reply.text, REGISTER_PROMPT);

        let reply = bot.on_message(chat, 1, "alice p1").await;
        assert_eq!(reply.text, REGISTERED);

        let reply = bot.on_callback(chat, SHOW_ACTION).await;
        assert_eq!(reply.text, "Alice (alice)\nfirst user");
        assert!(reply.photos.is_empty());
    }

    #[tokio::test]
    async fn test_show_sends_linked_users_images() {
        let (db, bot) = setup().await;
        let chat = ChannelId::new(555);
        let images = SurrealImageStore::new(db);
        for (name, data) in [("a.png", b"first".to_vec()), ("b.png", b"second".to_vec())] {
            images
                .add_image(&ImageCreate::new(UserId::new(1), name, "image/png", data).unwrap())
                .await
                .unwrap();
        }
        images
            .add_image(&ImageCreate::new(UserId::new(2), "x.png", "image/png", b"x".to_vec()).unwrap())
            .await
            .unwrap();

        assert_eq!(bot.on_message(chat, 1, "alice p1").await.text, REGISTERED);

        let reply = bot.on_callback(chat, SHOW_ACTION).await;
        assert_eq!(reply.text, "Alice (alice)\nfirst user");
        let mut payloads: Vec<&[u8]> = reply.photos.iter().map(|p| p.data.as_slice()).collect();
        payloads.sort();
        assert_eq!(payloads, vec![b"first".as_slice(), b"second".as_slice()]);
        assert!(reply.photos.iter().all(|p| p.meta.user_id == UserId::new(1)));
    }

    #[tokio::test]
    async fn test_second_registration_reports_duplicate() {
        let (db, bot) = setup().await;
        let chat = ChannelId::new(555);

        assert_eq!(bot.on_message(chat, 1, "alice p1").await.text, REGISTERED);
        assert_eq!(
            bot.on_message(chat, 2, "alice p1").await.text,
            ALREADY_REGISTERED
        );

        let links = crate::db::QueryBuilder::find_links_for_user(&db, UserId::new(1))
            .await
            .unwrap();
        assert_eq!(links.len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let (_db, bot) = setup().await;
        let reply = bot.on_message(ChannelId::new(555), 1, "alice nope").await;
        assert_eq!(reply.text, INCORRECT_CREDENTIALS);
    }

    #[tokio::test]
    async fn test_unrecognised_text() {
        let (_db, bot) = setup().await;
        for text in ["hello", "one two three", ""] {
            let reply = bot.on_message(ChannelId::new(555), 1, text).await;
            assert_eq!(reply.text, UNKNOWN_COMMAND, "{:?}", text);
        }
    }
}
