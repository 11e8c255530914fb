//! Delegated OAuth2 client collaborator
//!
//! The flow logic never speaks HTTP itself; it calls through the narrow
//! [`OAuth2Client`] seam: one method to build an authorization URL and one
//! to request a token from the token endpoint. [`GenericClient`] is the
//! default implementation, driven entirely by [`ProviderSettings`].
//!
//! Alternative implementations are plugged in through named
//! [`ClientFactory`] functions registered on the registry options and
//! selected per provider via the `collaborators.client` configuration key.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::config::ProviderSettings;
use crate::error::{AuthgateError, Result};
use crate::token::Token;

// ---------------------------------------------------------------------------
// OAuth2Client seam
// ---------------------------------------------------------------------------

/// The external OAuth2 client capability consumed by a provider instance.
///
/// Implementations own the wire-level exchange with the authorization and
/// token endpoints. Options are flat string maps; the caller supplies
/// grant-specific parameters (`code`, `refresh_token`, `scope`, `state`,
/// ...) and the implementation contributes endpoint URLs and client
/// credentials from its own configuration.
#[async_trait]
pub trait OAuth2Client: Send + Sync {
    /// Build the authorization-endpoint URL for a user-agent redirect.
    fn authorization_url(&self, options: &BTreeMap<String, String>) -> Result<String>;

    /// Request a token from the token endpoint with the given grant type.
    async fn access_token(
        &self,
        grant_type: &str,
        options: &BTreeMap<String, String>,
    ) -> Result<Token>;
}

/// Factory producing an [`OAuth2Client`] from provider settings.
pub type ClientFactory = Arc<dyn Fn(&ProviderSettings) -> Arc<dyn OAuth2Client> + Send + Sync>;

/// Resolve the client factory for a provider definition.
///
/// The `collaborators.client` key selects a named factory from the
/// registered set; absence selects [`GenericClient`]. Unknown names are a
/// configuration error rather than being silently skipped.
pub(crate) fn resolve_factory(
    collaborators: &HashMap<String, String>,
    factories: &HashMap<String, ClientFactory>,
) -> Result<ClientFactory> {
    match collaborators.get("client") {
        None => Ok(Arc::new(|settings: &ProviderSettings| {
            Arc::new(GenericClient::new(settings.clone())) as Arc<dyn OAuth2Client>
        })),
        Some(name) => factories.get(name).cloned().ok_or_else(|| {
            AuthgateError::Config(format!("unknown client collaborator factory '{name}'")).into()
        }),
    }
}

// ---------------------------------------------------------------------------
// Token endpoint response (raw deserialization)
// ---------------------------------------------------------------------------

/// Raw JSON response from an OAuth2 token endpoint.
///
/// Used only inside [`GenericClient`] to deserialize the response before
/// normalizing it into the canonical [`Token`].
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    /// Normalize into a [`Token`].
    ///
    /// A relative `expires_in` is converted to an absolute UTC epoch
    /// timestamp; an absolute `expires` from the server wins when both are
    /// present.
    fn into_token(self) -> Token {
        let expires = self.expires.or_else(|| {
            self.expires_in
                .map(|secs| chrono::Utc::now().timestamp() + secs)
        });

        Token {
            access_token: self.access_token,
            token_type: self.token_type,
            expires,
            refresh_token: self.refresh_token,
            extra: self.extra,
        }
    }
}

// ---------------------------------------------------------------------------
// GenericClient
// ---------------------------------------------------------------------------

/// Default [`OAuth2Client`] backed by `reqwest`.
///
/// Configuration comes from [`ProviderSettings`]: `url_authorize` and
/// `url_access_token` name the endpoints, and the client credentials are
/// added to every token request. Caller-supplied options override the
/// defaults on collision.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use authgate::config::ProviderSettings;
/// use authgate::oauth::client::{GenericClient, OAuth2Client};
///
/// let settings = ProviderSettings {
///     client_id: Some("abc".to_string()),
///     url_authorize: Some("https://auth.example.com/authorize".to_string()),
///     ..Default::default()
/// };
/// let client = GenericClient::new(settings);
///
/// let mut options = BTreeMap::new();
/// options.insert("state".to_string(), "xyz".to_string());
/// let url = client.authorization_url(&options).unwrap();
/// assert!(url.contains("client_id=abc"));
/// assert!(url.contains("state=xyz"));
/// ```
pub struct GenericClient {
    settings: ProviderSettings,
    http: reqwest::Client,
}

impl GenericClient {
    /// Create a new client from provider settings.
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl OAuth2Client for GenericClient {
    fn authorization_url(&self, options: &BTreeMap<String, String>) -> Result<String> {
        let base = self.settings.url_authorize.as_deref().ok_or_else(|| {
            AuthgateError::Config("url_authorize is not configured".to_string())
        })?;
        let mut url = Url::parse(base)
            .map_err(|e| AuthgateError::Config(format!("invalid url_authorize: {e}")))?;

        let mut params: BTreeMap<String, String> = BTreeMap::new();
        params.insert("response_type".to_string(), "code".to_string());
        if let Some(client_id) = &self.settings.client_id {
            params.insert("client_id".to_string(), client_id.clone());
        }
        if let Some(redirect_uri) = &self.settings.redirect_uri {
            params.insert("redirect_uri".to_string(), redirect_uri.clone());
        }
        for (key, value) in options {
            params.insert(key.clone(), value.clone());
        }

        {
            let mut query = url.query_pairs_mut();
            for (key, value) in &params {
                query.append_pair(key, value);
            }
        }

        Ok(url.to_string())
    }

    async fn access_token(
        &self,
        grant_type: &str,
        options: &BTreeMap<String, String>,
    ) -> Result<Token> {
        let endpoint = self.settings.url_access_token.as_deref().ok_or_else(|| {
            AuthgateError::Config("url_access_token is not configured".to_string())
        })?;

        let mut params: BTreeMap<String, String> = BTreeMap::new();
        params.insert("grant_type".to_string(), grant_type.to_string());
        if let Some(client_id) = &self.settings.client_id {
            params.insert("client_id".to_string(), client_id.clone());
        }
        if let Some(client_secret) = &self.settings.client_secret {
            params.insert("client_secret".to_string(), client_secret.clone());
        }
        for (key, value) in options {
            params.insert(key.clone(), value.clone());
        }

        let resp = self
            .http
            .post(endpoint)
            .form(&params)
            .send()
            .await
            .map_err(AuthgateError::Http)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(
                AuthgateError::TokenEndpoint(format!("token endpoint returned {status}: {body}"))
                    .into(),
            );
        }

        let raw: TokenResponse = resp.json().await.map_err(|e| {
            AuthgateError::TokenEndpoint(format!("failed to parse token response: {e}"))
        })?;

        Ok(raw.into_token())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
