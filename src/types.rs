//! NewType wrappers for the identity domain.
//!
//! These types keep the internal identity id, the messaging-channel id and
//! the two halves of a credential pair from being mixed up at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a string NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Macro to generate an integer NewType wrapper.
macro_rules! newtype_int {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Create a new instance.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Get the raw integer value.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(v: i64) -> Self {
                Self(v)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

newtype_int!(
    /// Internal identity id, assigned by the credential store.
    ///
    /// This is the value carried as the token id claim and written into
    /// identity links.
    UserId
);

newtype_int!(
    /// Identifier of a conversation on the secondary channel (Telegram chat id).
    ChannelId
);

newtype_string!(
    /// Login name of an identity.
    Login
);

newtype_string!(
    /// Password credential, compared verbatim by the credential store.
    ///
    /// `Debug` never prints the value.
    Password
);

impl fmt::Debug for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Login").field(&self.0).finish()
    }
}

impl fmt::Display for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// A login/password pair supplied by a caller.
///
/// Transient: it is handed to the credential store for a single check and
/// never persisted by the auth core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: Login,
    pub password: Password,
}

impl Credentials {
    pub fn new(login: impl Into<Login>, password: impl Into<Password>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    /// Parse the `"<login> <password>"` form typed into the bot.
    ///
    /// Exactly two whitespace separated words are accepted.
    pub fn from_chat_text(text: &str) -> Option<Self> {
        let mut parts = text.split_whitespace();
        let login = parts.next()?;
        let password = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(login, password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_debug_is_redacted() {
        let creds = Credentials::new("alice", "p1");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("p1"));
    }

    #[test]
    fn test_user_id_serde_is_transparent() {
        let id = UserId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let back: UserId = serde_json::from_str("42").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_credentials_from_chat_text() {
        let creds = Credentials::from_chat_text("alice p1").unwrap();
        assert_eq!(creds.login.as_str(), "alice");
        assert_eq!(creds.password.as_str(), "p1");

        assert!(Credentials::from_chat_text("  bob   secret ").is_some());
        assert!(Credentials::from_chat_text("alice").is_none());
        assert!(Credentials::from_chat_text("a b c").is_none());
        assert!(Credentials::from_chat_text("").is_none());
    }
}
