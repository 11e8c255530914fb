//! OAuth2 token model and persistence
//!
//! # Module Layout
//!
//! - [`repository`] -- token repository contract and the reusable
//!   refresh-on-read orchestration
//! - [`directory`]  -- reference store persisting tokens as JSON documents
//!   in a provider-scoped directory
//!
//! This module itself defines the [`Token`] shape and the [`TokenKey`]
//! addressing scheme (`<provider>:<usage>`).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod directory;
pub mod repository;

pub use directory::DirectoryBackend;
pub use repository::{Repository, TokenBackend, TokenRepository};

/// Reference token repository over the directory store.
pub type DirectoryTokenRepository = Repository<DirectoryBackend>;

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// An OAuth2 access token with passthrough for provider-specific fields.
///
/// Fields map to the token endpoint response defined in RFC 6749. The
/// `expires` field is an absolute UTC epoch timestamp in seconds; the
/// client collaborator normalizes relative `expires_in` values to it at
/// parse time. Anything the provider returns beyond the known fields is
/// preserved in `extra` and survives serialization round-trips.
///
/// # Examples
///
/// ```
/// use authgate::token::Token;
///
/// let token = Token {
///     access_token: "abc".to_string(),
///     token_type: "Bearer".to_string(),
///     expires: None,
///     refresh_token: None,
///     extra: Default::default(),
/// };
///
/// // A token with no expiry is always considered due for refresh.
/// assert!(token.expires_within(300));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The access token string issued by the authorization server.
    pub access_token: String,

    /// The token type, typically `"Bearer"`.
    pub token_type: String,

    /// UTC epoch seconds at which the access token expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,

    /// Refresh token usable to obtain a new access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Provider-specific passthrough fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Token {
    /// Whether the token expires within the next `ttl_seconds`.
    ///
    /// A token without an expiry indicator is treated as due: there is no
    /// way to know it is still good, so a refresh is attempted.
    pub fn expires_within(&self, ttl_seconds: i64) -> bool {
        match self.expires {
            Some(expires) => expires <= Utc::now().timestamp() + ttl_seconds,
            None => true,
        }
    }

    /// Merge a refresh response over this token.
    ///
    /// Fields present in the refreshed token win; fields the refresh
    /// response omitted (commonly the `refresh_token`) are preserved from
    /// the original.
    pub fn merged_with(&self, refreshed: Token) -> Token {
        let mut extra = self.extra.clone();
        for (key, value) in refreshed.extra {
            extra.insert(key, value);
        }

        Token {
            access_token: refreshed.access_token,
            token_type: refreshed.token_type,
            expires: refreshed.expires.or(self.expires),
            refresh_token: refreshed.refresh_token.or_else(|| self.refresh_token.clone()),
            extra,
        }
    }
}

// ---------------------------------------------------------------------------
// TokenKey
// ---------------------------------------------------------------------------

/// External identifier for a stored token: `<provider>:<usage>`.
///
/// Parsing splits on the first colon. A key without a colon, or with an
/// empty provider segment, addresses the default provider; the remainder
/// is the usage.
///
/// # Examples
///
/// ```
/// use authgate::token::TokenKey;
///
/// let key = TokenKey::parse("github:profile");
/// assert_eq!(key.provider.as_deref(), Some("github"));
/// assert_eq!(key.usage, "profile");
///
/// let key = TokenKey::parse("profile");
/// assert!(key.provider.is_none());
/// assert_eq!(key.usage, "profile");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey {
    /// Provider name; `None` addresses the default provider.
    pub provider: Option<String>,
    /// Usage segment naming the token within the provider.
    pub usage: String,
}

impl TokenKey {
    /// Parse a key string, splitting on the first colon.
    pub fn parse(key: &str) -> Self {
        match key.split_once(':') {
            Some((provider, usage)) => TokenKey {
                provider: if provider.is_empty() {
                    None
                } else {
                    Some(provider.to_string())
                },
                usage: usage.to_string(),
            },
            None => TokenKey {
                provider: None,
                usage: key.to_string(),
            },
        }
    }

    /// The key with its provider segment pinned to `name` when absent.
    pub fn or_provider(mut self, name: &str) -> Self {
        if self.provider.is_none() {
            self.provider = Some(name.to_string());
        }
        self
    }
}

impl std::fmt::Display for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.provider {
            Some(provider) => write!(f, "{}:{}", provider, self.usage),
            None => write!(f, "{}", self.usage),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bearer(access: &str) -> Token {
        Token {
            access_token: access.to_string(),
            token_type: "Bearer".to_string(),
            expires: None,
            refresh_token: None,
            extra: Map::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Token::expires_within
    // -----------------------------------------------------------------------

    #[test]
    fn test_expires_within_true_when_inside_window() {
        let mut token = bearer("tok");
        token.expires = Some(Utc::now().timestamp() + 100);
        assert!(token.expires_within(300));
    }

    #[test]
    fn test_expires_within_false_when_outside_window() {
        let mut token = bearer("tok");
        token.expires = Some(Utc::now().timestamp() + 100);
        assert!(!token.expires_within(50));
    }

    #[test]
    fn test_expires_within_true_when_no_expiry() {
        assert!(bearer("tok").expires_within(1));
    }

    // -----------------------------------------------------------------------
    // Token::merged_with
    // -----------------------------------------------------------------------

    #[test]
    fn test_merge_preserves_omitted_refresh_token() {
        let mut original = bearer("old");
        original.refresh_token = Some("keep-me".to_string());

        let merged = original.merged_with(bearer("new"));
        assert_eq!(merged.access_token, "new");
        assert_eq!(merged.refresh_token.as_deref(), Some("keep-me"));
    }

    #[test]
    fn test_merge_refreshed_fields_win() {
        let mut original = bearer("old");
        original.refresh_token = Some("old-refresh".to_string());
        original.expires = Some(100);

        let mut refreshed = bearer("new");
        refreshed.refresh_token = Some("new-refresh".to_string());
        refreshed.expires = Some(200);

        let merged = original.merged_with(refreshed);
        assert_eq!(merged.refresh_token.as_deref(), Some("new-refresh"));
        assert_eq!(merged.expires, Some(200));
    }

    #[test]
    fn test_merge_unions_extra_fields() {
        let mut original = bearer("old");
        original
            .extra
            .insert("account_id".to_string(), json!("acct-1"));

        let mut refreshed = bearer("new");
        refreshed.extra.insert("scope".to_string(), json!("read"));

        let merged = original.merged_with(refreshed);
        assert_eq!(merged.extra.get("account_id"), Some(&json!("acct-1")));
        assert_eq!(merged.extra.get("scope"), Some(&json!("read")));
    }

    // -----------------------------------------------------------------------
    // Token serialization
    // -----------------------------------------------------------------------

    #[test]
    fn test_token_roundtrip_preserves_extra_fields() {
        let json = json!({
            "access_token": "abc",
            "token_type": "Bearer",
            "expires": 1_800_000_000i64,
            "refresh_token": "ref",
            "account_id": "acct-9"
        });

        let token: Token = serde_json::from_value(json.clone()).expect("deserialize");
        assert_eq!(token.extra.get("account_id"), Some(&json!("acct-9")));

        let back = serde_json::to_value(&token).expect("serialize");
        assert_eq!(back, json);
    }

    #[test]
    fn test_token_omits_absent_optionals() {
        let json = serde_json::to_value(bearer("abc")).expect("serialize");
        assert_eq!(
            json,
            json!({"access_token": "abc", "token_type": "Bearer"})
        );
    }

    // -----------------------------------------------------------------------
    // TokenKey
    // -----------------------------------------------------------------------

    #[test]
    fn test_key_with_provider_and_usage() {
        let key = TokenKey::parse("github:profile");
        assert_eq!(key.provider.as_deref(), Some("github"));
        assert_eq!(key.usage, "profile");
    }

    #[test]
    fn test_key_without_provider_is_all_usage() {
        let key = TokenKey::parse("profile");
        assert!(key.provider.is_none());
        assert_eq!(key.usage, "profile");
    }

    #[test]
    fn test_key_splits_on_first_colon_only() {
        let key = TokenKey::parse("github:user:mail");
        assert_eq!(key.provider.as_deref(), Some("github"));
        assert_eq!(key.usage, "user:mail");
    }

    #[test]
    fn test_key_empty_provider_segment_means_default() {
        let key = TokenKey::parse(":profile");
        assert!(key.provider.is_none());
        assert_eq!(key.usage, "profile");
    }

    #[test]
    fn test_key_or_provider_fills_absent_segment() {
        let key = TokenKey::parse("profile").or_provider("github");
        assert_eq!(key.provider.as_deref(), Some("github"));

        let pinned = TokenKey::parse("gitlab:profile").or_provider("github");
        assert_eq!(pinned.provider.as_deref(), Some("gitlab"));
    }

    #[test]
    fn test_key_display_roundtrip() {
        assert_eq!(TokenKey::parse("github:profile").to_string(), "github:profile");
        assert_eq!(TokenKey::parse("profile").to_string(), "profile");
    }
}
