use anyhow::Result;
use clap::{Parser, Subcommand};
use identity_gate::config::DEFAULT_BIND;
use identity_gate::db::{Insert, UserCreate};
use identity_gate::{
    AuthConfig, BotConfig, Credentials, DatabaseConfig, Keyword, create_router, create_state,
};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "identity-gate")]
#[command(about = "Credential login, session tokens and Telegram account linking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API, plus the Telegram bot when a token is configured
    Serve {
        #[arg(long, env = "APP_BIND", default_value = DEFAULT_BIND)]
        bind: String,
        #[arg(long, default_value = "memory")]
        db_url: String,
        /// Secret used to sign session tokens
        #[arg(long, env = "JWT_KEYWORD", hide_env_values = true)]
        keyword: String,
        /// Telegram bot token
        #[arg(long, env = "TGBOT_API_KEY", hide_env_values = true)]
        bot_token: Option<String>,
    },
    /// Run only the Telegram bot
    Bot {
        #[arg(long, default_value = "memory")]
        db_url: String,
        #[arg(long, env = "JWT_KEYWORD", hide_env_values = true)]
        keyword: String,
        #[arg(long, env = "TGBOT_API_KEY", hide_env_values = true)]
        bot_token: String,
    },
    /// Initialize the database
    Init {
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
    /// Create an identity
    AddUser {
        login: String,
        password: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
    /// Log in and print a session token
    IssueToken {
        login: String,
        password: String,
        #[arg(long, default_value = "memory")]
        db_url: String,
        #[arg(long, env = "JWT_KEYWORD", hide_env_values = true)]
        keyword: String,
    },
}

fn database(db_url: String) -> DatabaseConfig {
    DatabaseConfig {
        url: db_url,
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("identity_gate=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            db_url,
            keyword,
            bot_token,
        } => {
            let auth_config = AuthConfig::new(Keyword::new(keyword)?);
            let bot_config = bot_token.map(BotConfig::new).transpose()?;

            let db_config = database(db_url);
            info!("Using database url for server: {}", db_config.url);
            let state = create_state(db_config, &auth_config).await?;
            let auth = state.auth.clone();
            let images = state.images.clone();
            let app = create_router(state);

            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("Server listening on http://{}", bind);
            let server = async { axum::serve(listener, app).await.map_err(anyhow::Error::from) };

            match bot_config {
                Some(bot_config) => {
                    tokio::try_join!(server, identity_gate::bot::run(bot_config, auth, images))?;
                }
                None => {
                    info!("TGBOT_API_KEY not set, Telegram bot disabled");
                    server.await?;
                }
            }
        }
        Commands::Bot {
            db_url,
            keyword,
            bot_token,
        } => {
            let auth_config = AuthConfig::new(Keyword::new(keyword)?);
            let bot_config = BotConfig::new(bot_token)?;

            let state = create_state(database(db_url), &auth_config).await?;
            identity_gate::bot::run(bot_config, state.auth, state.images).await?;
        }
        Commands::Init { db_url } => {
            let db_config = database(db_url);
            info!("Using database url for initialization: {}", db_config.url);

            info!("Initializing database...");
            let db = identity_gate::create_connection(db_config).await?;
            identity_gate::ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
        Commands::AddUser {
            login,
            password,
            name,
            description,
            db_url,
        } => {
            let create = UserCreate::new(
                login.clone(),
                password,
                name.unwrap_or(login),
                description,
            )?;

            let db = identity_gate::create_connection(database(db_url)).await?;
            identity_gate::ensure_schema(&db).await?;
            let users = identity_gate::auth::UserStore::new(db);

            match users.create_user(&create).await? {
                Insert::Created(identity) => {
                    println!("User created successfully!");
                    println!();
                    println!("  Id:    {}", identity.id);
                    println!("  Login: {}", identity.login);
                    println!("  Name:  {}", identity.name);
                }
                Insert::Conflict => {
                    println!("Login '{}' is already taken.", create.login());
                }
            }
        }
        Commands::IssueToken {
            login,
            password,
            db_url,
            keyword,
        } => {
            let auth_config = AuthConfig::new(Keyword::new(keyword)?);
            let state = create_state(database(db_url), &auth_config).await?;

            let token = state
                .auth
                .authorize(&Credentials::new(login, password))
                .await?;
            println!("{}", token);
        }
    }

    Ok(())
}
