//! Identity and session core.
//!
//! Credentials are checked against a [`CredentialStore`]; a successful
//! login yields a stateless HS256 session token that carries the login
//! pair, which [`require_session`] re-verifies against the store on every
//! request. A secondary channel (the chat bot) is bound to an identity
//! through an [`IdentityLinkStore`].
//!
//! ## Usage
//!
//! ```ignore
//! let auth = AuthService::new(&config, Arc::new(UserStore::new(db.clone())), Arc::new(LinkStore::new(db)));
//! let token = auth.authorize(&Credentials::new("alice", "p1")).await?;
//! let ctx = auth.authenticate_token(&token).await?;
//! ```

mod context;
pub mod error;
mod link_store;
mod middleware;
mod service;
pub mod store;
pub mod token;
mod user_store;

pub use context::UserContext;
pub use error::{AuthError, AuthResult, ErrorBody, TokenError};
pub use link_store::LinkStore;
pub use middleware::{require_session, session_token};
pub use service::AuthService;
pub use store::{CredentialStore, Identity, IdentityLinkStore, LinkInsert, StoreFuture};
pub use token::{SessionClaims, TokenCodec};
pub use user_store::UserStore;
