//! Authgate - OAuth2 provider management and token lifecycle
//!
//! This library lets an application authenticate end-users or itself
//! against one or more OAuth2 authorization servers (authorization-code,
//! client-credentials, and password grants) and persist and refresh the
//! resulting access tokens.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `oauth`: state tokens, provider instances, and the provider registry
//! - `token`: token model, repository contract, and the directory store
//! - `config`: configuration model, YAML loading, and validation
//! - `error`: error types and result aliases
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use authgate::config::AuthConfig;
//! use authgate::oauth::registry::{ProviderRegistry, RegistryOptions};
//! use authgate::oauth::{OAuth2, Scope};
//! use authgate::token::{DirectoryBackend, Repository, TokenRepository};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AuthConfig::load("oauth2.yaml")?;
//!     let registry = Arc::new(ProviderRegistry::from_config(
//!         config,
//!         RegistryOptions::default(),
//!     )?);
//!
//!     // Redirect the user agent to the returned URL, then hand the
//!     // callback URL to `receive` to obtain the token.
//!     let authorization = registry.authorize(None, Scope::from("read")).await?;
//!
//!     // Tokens are persisted and refreshed through a repository.
//!     let tokens = Repository::new(
//!         Arc::clone(&registry),
//!         DirectoryBackend::new("/var/lib/app/tokens"),
//!     );
//!     let token = tokens.get_token("github:profile", 300).await?;
//!
//!     let _ = (authorization, token);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod oauth;
pub mod token;

// Re-export commonly used types
pub use config::{AuthConfig, ProviderDefinition, ProviderSettings};
pub use error::{AuthgateError, Result};
pub use oauth::{
    Authorization, OAuth2, ProviderInstance, ProviderRegistry, RegistryOptions, Scope,
};
pub use token::{
    DirectoryBackend, DirectoryTokenRepository, Repository, Token, TokenKey, TokenRepository,
};
