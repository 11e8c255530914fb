//! OAuth2 protocol flows and provider management
//!
//! This module implements the provider-facing half of the library: state
//! tokens for the redirect round-trip, provider materialization, and the
//! three OAuth2 operations (authorize, receive, refresh).
//!
//! # Module Layout
//!
//! - [`state`]    -- stateless anti-forgery state tokens (HMAC-SHA256)
//! - [`template`] -- `${param}` substitution over configuration trees
//! - [`client`]   -- the delegated OAuth2 client seam and its default
//!   implementation
//! - [`provider`] -- a single materialized provider and its flow operations
//! - [`registry`] -- named provider definitions, usage resolution, and the
//!   instance cache

use async_trait::async_trait;

use crate::error::Result;
use crate::token::Token;

pub mod client;
pub mod provider;
pub mod registry;
pub mod state;
pub mod template;

pub use client::{ClientFactory, GenericClient, OAuth2Client};
pub use provider::{CallbackBinding, ProviderInstance};
pub use registry::{ProviderRegistry, RegistryOptions};

// ---------------------------------------------------------------------------
// GrantType
// ---------------------------------------------------------------------------

/// The OAuth2 flow variant determining how a token is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    /// Authorization-code flow: redirect, callback, code exchange.
    Code,
    /// Direct token request authenticated by the client credentials.
    ClientCredentials,
    /// Direct token request carrying resource-owner credentials.
    Password,
}

impl GrantType {
    /// Wire/configuration string for this grant type.
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::Code => "code",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::Password => "password",
        }
    }

    /// Parse a configuration string; unknown values yield `None`.
    pub fn parse(value: &str) -> Option<GrantType> {
        match value {
            "code" => Some(GrantType::Code),
            "client_credentials" => Some(GrantType::ClientCredentials),
            "password" => Some(GrantType::Password),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Scope requested for an authorization.
///
/// `Default` falls back to the provider's configured scopes; lists are
/// joined with the provider's configured separator.
#[derive(Debug, Clone, Default)]
pub enum Scope {
    /// Use the provider's configured default scopes.
    #[default]
    Default,
    /// A single pre-joined scope string.
    One(String),
    /// A scope list joined with the configured separator.
    Many(Vec<String>),
}

impl From<&str> for Scope {
    fn from(scope: &str) -> Self {
        Scope::One(scope.to_string())
    }
}

impl From<String> for Scope {
    fn from(scope: String) -> Self {
        Scope::One(scope)
    }
}

impl From<Vec<String>> for Scope {
    fn from(scopes: Vec<String>) -> Self {
        Scope::Many(scopes)
    }
}

impl From<&[&str]> for Scope {
    fn from(scopes: &[&str]) -> Self {
        Scope::Many(scopes.iter().map(|s| s.to_string()).collect())
    }
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

/// Outcome of [`OAuth2::authorize`].
///
/// The authorization-code flow yields a redirect URL carrying the state
/// token; the direct grants yield the token itself.
#[derive(Debug, Clone)]
pub enum Authorization {
    /// URL to redirect the user agent to.
    Redirect(String),
    /// Token obtained directly from the token endpoint.
    Token(Token),
}

impl Authorization {
    /// The redirect URL, when this is a redirect outcome.
    pub fn redirect_url(&self) -> Option<&str> {
        match self {
            Authorization::Redirect(url) => Some(url),
            Authorization::Token(_) => None,
        }
    }

    /// The token, when this is a direct-grant outcome.
    pub fn into_token(self) -> Option<Token> {
        match self {
            Authorization::Redirect(_) => None,
            Authorization::Token(token) => Some(token),
        }
    }
}

// ---------------------------------------------------------------------------
// OAuth2 operations
// ---------------------------------------------------------------------------

/// The OAuth2 operation interface.
///
/// Implemented by [`ProviderInstance`] for a single provider and by
/// [`ProviderRegistry`], which forwards every operation to its default
/// provider. The token repository accepts any implementation as a refresh
/// override.
#[async_trait]
pub trait OAuth2: Send + Sync {
    /// Name of the provider answering the operations.
    fn name(&self) -> Result<String>;

    /// Redirect URI the authorization server will call back.
    fn redirect_uri(&self) -> Result<String>;

    /// Obtain an authorization: a redirect URL for the code flow, or a
    /// token for the direct grants.
    async fn authorize(&self, grant: Option<&str>, scope: Scope) -> Result<Authorization>;

    /// Process a callback URL from the authorization endpoint, verifying
    /// the state token and exchanging the authorization code.
    async fn receive(&self, url: &str) -> Result<Token>;

    /// Refresh a token expiring within `ttl_seconds`.
    ///
    /// Returns `Ok(None)` both when no refresh is needed and when no
    /// refresh mechanism applies.
    async fn refresh(&self, token: &Token, ttl_seconds: i64) -> Result<Option<Token>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_type_parse_known_values() {
        assert_eq!(GrantType::parse("code"), Some(GrantType::Code));
        assert_eq!(
            GrantType::parse("client_credentials"),
            Some(GrantType::ClientCredentials)
        );
        assert_eq!(GrantType::parse("password"), Some(GrantType::Password));
    }

    #[test]
    fn test_grant_type_parse_unknown_is_none() {
        assert_eq!(GrantType::parse("implicit"), None);
        assert_eq!(GrantType::parse(""), None);
    }

    #[test]
    fn test_grant_type_roundtrip() {
        for grant in [
            GrantType::Code,
            GrantType::ClientCredentials,
            GrantType::Password,
        ] {
            assert_eq!(GrantType::parse(grant.as_str()), Some(grant));
        }
    }

    #[test]
    fn test_scope_conversions() {
        assert!(matches!(Scope::from("read"), Scope::One(s) if s == "read"));
        assert!(matches!(
            Scope::from(vec!["a".to_string(), "b".to_string()]),
            Scope::Many(v) if v.len() == 2
        ));
        assert!(matches!(Scope::default(), Scope::Default));
    }

    #[test]
    fn test_authorization_accessors() {
        let redirect = Authorization::Redirect("https://example.com".to_string());
        assert_eq!(redirect.redirect_url(), Some("https://example.com"));
        assert!(redirect.into_token().is_none());
    }
}
