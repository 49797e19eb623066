//! Secret types for credentials that must never reach the logs.
//!
//! Re-exports [`secrecy`] so every crate wraps the Discord bot token (and any
//! future credential) the same way. `SecretString` redacts itself in `Debug`,
//! so a struct deriving `Debug` around it is safe to hand to `tracing`.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct BotCredentials {
//!     application: String,
//!     token: SecretString,
//! }
//!
//! let creds = BotCredentials {
//!     application: "sitter".to_string(),
//!     token: SecretString::from("MTIz.abc.def"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("MTIz"));
//! assert_eq!(creds.token.expose_secret(), "MTIz.abc.def");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
