//! Minimal Telegram Bot API client: long polling, replies and photo uploads.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::bot::handler::Reply;
use crate::config::BotConfig;
use crate::images::Image;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

impl CallbackQuery {
    /// Chat the button was pressed in, falling back to the presser's private chat.
    pub fn chat_id(&self) -> i64 {
        self.message
            .as_ref()
            .map(|m| m.chat.id)
            .unwrap_or(self.from.id)
    }
}

/// Bot API response wrapper.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetUpdates<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

/// Client for one bot token.
pub struct TelegramClient {
    client: reqwest::Client,
    config: BotConfig,
}

impl TelegramClient {
    pub fn new(config: BotConfig) -> Result<Self> {
        // Must outlive the long-poll window.
        let timeout = Duration::from_secs(config.poll_timeout_seconds + 10);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.config.method_url(method)?;
        let response = self
            .client
            .post(url)
            .json(params)
            .send()
            .await
            .with_context(|| format!("Bot API {} request failed", method))?;
        Self::read_envelope(method, response).await
    }

    async fn read_envelope<R: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<R> {
        let status = response.status();
        let envelope: ApiEnvelope<R> = response
            .json()
            .await
            .with_context(|| format!("Bot API {} returned invalid JSON ({})", method, status))?;

        if !envelope.ok {
            bail!(
                "Bot API {} failed: {}",
                method,
                envelope.description.unwrap_or_else(|| status.to_string())
            );
        }
        envelope
            .result
            .with_context(|| format!("Bot API {} returned no result", method))
    }

    /// Identify the bot; doubles as a token check at startup.
    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &json!({})).await
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let params = GetUpdates {
            offset,
            timeout: self.config.poll_timeout_seconds,
            allowed_updates: &["message", "callback_query"],
        };
        self.call("getUpdates", &params).await
    }

    pub async fn send_message(&self, chat_id: i64, reply: &Reply) -> Result<()> {
        let _: Value = self
            .call("sendMessage", &send_message_body(chat_id, reply))
            .await?;
        Ok(())
    }

    /// Upload a photo with `multipart/form-data`.
    pub async fn send_photo(&self, chat_id: i64, photo: &Image) -> Result<()> {
        let url = self.config.method_url("sendPhoto")?;
        let form = send_photo_form(chat_id, photo)?;
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .context("Bot API sendPhoto request failed")?;
        let _: Value = Self::read_envelope("sendPhoto", response).await?;
        Ok(())
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<()> {
        let _: Value = self
            .call(
                "answerCallbackQuery",
                &json!({ "callback_query_id": callback_query_id }),
            )
            .await?;
        Ok(())
    }
}

fn send_photo_form(chat_id: i64, photo: &Image) -> Result<Form> {
    let part = Part::bytes(photo.data.clone())
        .file_name(photo.meta.key.clone())
        .mime_str(&photo.meta.content_type)
        .with_context(|| format!("Invalid content type {:?}", photo.meta.content_type))?;
    Ok(Form::new()
        .text("chat_id", chat_id.to_string())
        .part("photo", part))
}

fn send_message_body(chat_id: i64, reply: &Reply) -> Value {
    let mut body = json!({
        "chat_id": chat_id,
        "text": reply.text,
    });

    if let Some(message_id) = reply.reply_to {
        body["reply_parameters"] = json!({ "message_id": message_id });
    }

    if !reply.buttons.is_empty() {
        let row: Vec<Value> = reply
            .buttons
            .iter()
            .map(|b| json!({ "text": b.text, "callback_data": b.data }))
            .collect();
        body["reply_markup"] = json!({ "inline_keyboard": [row] });
    }

    body
}
