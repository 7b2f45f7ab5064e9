//! # Launchpad Auth
//!
//! Verification-only JWT authentication driven by configuration.
//!
//! Each configured client trusts one issuer and names the keys that sign
//! its tokens: inline PEM public keys, a remote JWK set, or both. A token
//! is routed to its client by the `iss` claim, then its signature, `exp`
//! and `nbf` are checked.
//!
//! ## Example
//!
//! ```no_run
//! use launchpad_auth::JwtAuthProvider;
//! use launchpad_core::ConfigTree;
//! use serde_json::json;
//!
//! # async fn run(token: &str) -> Result<(), launchpad_auth::AuthError> {
//! let config = ConfigTree::new(json!({
//!     "clients": [{
//!         "issuer": "https://login.example.com",
//!         "jwks-uri": { "uri": "https://login.example.com/keys" }
//!     }]
//! }));
//!
//! let provider = JwtAuthProvider::from_config(&config)?;
//! let user = provider.authenticate(token).await?;
//! println!("authenticated {:?}", user.subject());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod keys;
pub mod provider;

pub use config::{CacheOptions, ClientOptions, InlineKey, JwksUriOptions, ProxyOptions};
pub use error::{AuthError, Result};
pub use provider::{JwtAuthProvider, User};
