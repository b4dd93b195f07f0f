//! Telegram front end for secondary-channel registration.

pub mod handler;
pub mod telegram;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::auth::AuthService;
use crate::config::BotConfig;
use crate::images::ImageStore;
use crate::types::ChannelId;

pub use handler::{BotHandler, Button, Reply};
pub use telegram::{TelegramClient, Update};

/// Pause after a failed poll before retrying.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Long-poll the Bot API and handle each update on its own task.
///
/// Runs until the future is dropped.
pub async fn run(
    config: BotConfig,
    auth: Arc<AuthService>,
    images: Arc<dyn ImageStore>,
) -> Result<()> {
    let client = Arc::new(TelegramClient::new(config)?);
    let handler = Arc::new(BotHandler::new(auth, images));

    let me = client.get_me().await?;
    tracing::info!(
        bot = me.username.as_deref().unwrap_or(&me.first_name),
        "Telegram bot started"
    );

    let mut offset = 0;
    loop {
        let updates = match client.get_updates(offset).await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!(error = %e, "Polling for updates failed");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let client = client.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                let update_id = update.update_id;
                if let Err(e) = dispatch(&client, &handler, update).await {
                    tracing::error!(update_id, error = %e, "Failed to handle update");
                }
            });
        }
    }
}

async fn dispatch(client: &TelegramClient, handler: &BotHandler, update: Update) -> Result<()> {
    if let Some(message) = update.message {
        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };
        let chat_id = message.chat.id;
        let reply = handler
            .on_message(ChannelId::new(chat_id), message.message_id, text)
            .await;
        send_reply(client, chat_id, &reply).await?;
    } else if let Some(callback) = update.callback_query {
        client.answer_callback_query(&callback.id).await?;
        let chat_id = callback.chat_id();
        let data = callback.data.as_deref().unwrap_or_default();
        tracing::debug!(channel_id = chat_id, data, "Callback query");

        let reply = handler.on_callback(ChannelId::new(chat_id), data).await;
        send_reply(client, chat_id, &reply).await?;
    }
    Ok(())
}

async fn send_reply(client: &TelegramClient, chat_id: i64, reply: &Reply) -> Result<()> {
    client.send_message(chat_id, reply).await?;
    for photo in &reply.photos {
        client.send_photo(chat_id, photo).await?;
    }
    Ok(())
}
