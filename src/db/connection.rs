use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL")
                .unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE")
                .unwrap_or_else(|_| "identity".to_string()),
            database: env::var("SURREALDB_DATABASE")
                .unwrap_or_else(|_| "gate".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

/// Define tables and indexes. Safe to run against an already initialised database.
pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = [
        // Identities: the credential store
        "DEFINE TABLE IF NOT EXISTS user SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS uid ON TABLE user TYPE int;
         DEFINE FIELD IF NOT EXISTS login ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS password ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS name ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS description ON TABLE user TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE user TYPE datetime DEFAULT time::now();",

        // Secondary-channel bindings; one row per channel id
        "DEFINE TABLE IF NOT EXISTS identity_link SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS channel_id ON TABLE identity_link TYPE int;
         DEFINE FIELD IF NOT EXISTS user_id ON TABLE identity_link TYPE int;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE identity_link TYPE datetime DEFAULT time::now();",

        // Uploaded images, payload as base64
        "DEFINE TABLE IF NOT EXISTS image SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS key ON TABLE image TYPE string;
         DEFINE FIELD IF NOT EXISTS user_id ON TABLE image TYPE int;
         DEFINE FIELD IF NOT EXISTS name ON TABLE image TYPE string;
         DEFINE FIELD IF NOT EXISTS content_type ON TABLE image TYPE string;
         DEFINE FIELD IF NOT EXISTS size ON TABLE image TYPE int;
         DEFINE FIELD IF NOT EXISTS uploaded_at ON TABLE image TYPE int;
         DEFINE FIELD IF NOT EXISTS data ON TABLE image TYPE string;",

        // Sequences for integer ids
        "DEFINE TABLE IF NOT EXISTS counter SCHEMALESS;",

        // Uniqueness is enforced here, not by read-then-write in the service
        "DEFINE INDEX IF NOT EXISTS user_uid ON TABLE user COLUMNS uid UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_login ON TABLE user COLUMNS login UNIQUE;
         DEFINE INDEX IF NOT EXISTS identity_link_channel ON TABLE identity_link COLUMNS channel_id UNIQUE;
         DEFINE INDEX IF NOT EXISTS identity_link_user ON TABLE identity_link COLUMNS user_id;
         DEFINE INDEX IF NOT EXISTS image_key ON TABLE image COLUMNS key UNIQUE;
         DEFINE INDEX IF NOT EXISTS image_user ON TABLE image COLUMNS user_id;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        ensure_schema(&db).await.unwrap();
    }
}
