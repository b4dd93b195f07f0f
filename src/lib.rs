// Core modules
pub mod config;
pub mod db;
pub mod types;

// Identity and session core
pub mod auth;

// Uploaded images
pub mod images;

// Front ends
pub mod api;
pub mod bot;

// Re-export key types and functions
pub use api::{AppState, create_router};
pub use auth::{AuthError, AuthService, UserContext};
pub use config::{AuthConfig, BotConfig, Keyword};
pub use db::{DatabaseConfig, create_connection, ensure_schema};
pub use types::{ChannelId, Credentials, Login, Password, UserId};

use anyhow::Result;

/// Connect to the database, bootstrap the schema and wire the services.
pub async fn create_state(db_config: DatabaseConfig, auth_config: &AuthConfig) -> Result<AppState> {
    let db = create_connection(db_config).await?;
    ensure_schema(&db).await?;
    Ok(AppState::new(db, auth_config))
}
