use std::fmt;

use serde::Deserialize;
use url::Url;

/// Lifetime of an issued session token (24 hours).
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Audience marker written into every session token.
pub const SESSION_AUDIENCE: &str = "1";

/// Default HTTP bind address.
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Default Telegram Bot API endpoint.
pub const DEFAULT_BOT_API_URL: &str = "https://api.telegram.org";

/// Long-poll timeout passed to `getUpdates`, in seconds.
pub const DEFAULT_POLL_TIMEOUT_SECONDS: u64 = 60;

/// Server-held signing secret.
///
/// Loaded once at startup and shared read-only for the process lifetime.
/// Deserialize only: the secret is never written back out.
#[derive(Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct Keyword(String);

impl Keyword {
    pub fn new(value: impl Into<String>) -> anyhow::Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(anyhow::anyhow!("signing keyword must not be empty"));
        }
        Ok(Self(value))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<String> for Keyword {
    type Error = anyhow::Error;

    fn try_from(value: String) -> anyhow::Result<Self> {
        Self::new(value)
    }
}

impl fmt::Debug for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Keyword(***)")
    }
}

/// Settings for token issuance and validation.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for signing and verifying session tokens
    pub keyword: Keyword,
    /// Audience claim written into and required from every token
    #[serde(default = "default_audience")]
    pub audience: String,
    /// Token lifetime in seconds
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: i64,
}

fn default_audience() -> String {
    SESSION_AUDIENCE.to_string()
}

fn default_session_ttl() -> i64 {
    DEFAULT_SESSION_TTL_SECONDS
}

impl AuthConfig {
    /// Create a config with the default audience and a 24h token lifetime.
    pub fn new(keyword: Keyword) -> Self {
        Self {
            keyword,
            audience: default_audience(),
            session_ttl_seconds: default_session_ttl(),
        }
    }

    pub fn with_session_ttl(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }
}

/// Settings for the Telegram front end.
#[derive(Clone)]
pub struct BotConfig {
    pub token: String,
    pub api_url: Url,
    pub poll_timeout_seconds: u64,
}

impl BotConfig {
    pub fn new(token: impl Into<String>) -> anyhow::Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(anyhow::anyhow!("bot token must not be empty"));
        }
        Ok(Self {
            token,
            api_url: Url::parse(DEFAULT_BOT_API_URL)?,
            poll_timeout_seconds: DEFAULT_POLL_TIMEOUT_SECONDS,
        })
    }

    pub fn with_api_url(mut self, api_url: Url) -> Self {
        self.api_url = api_url;
        self
    }

    /// URL of a Bot API method, e.g. `.../bot<token>/sendMessage`.
    pub fn method_url(&self, method: &str) -> anyhow::Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("bot API url `{}` cannot be a base", self.api_url))?
            .pop_if_empty()
            .push(&format!("bot{}", self.token))
            .push(method);
        Ok(url)
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"***")
            .field("api_url", &self.api_url.as_str())
            .field("poll_timeout_seconds", &self.poll_timeout_seconds)
            .finish()
    }
}
