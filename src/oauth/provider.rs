//! A single materialized OAuth2 provider
//!
//! A [`ProviderInstance`] binds one fully-resolved configuration (usage
//! overrides applied, template parameters substituted) to the three OAuth2
//! operations: `authorize`, `receive`, and `refresh`. It carries no state
//! beyond the resolved salt and a lazily built client handle; the state
//! token in the redirect round-trip is self-verifying.
//!
//! Instances are created and cached by the
//! [`ProviderRegistry`](super::registry::ProviderRegistry) and live until
//! their definition is reconfigured.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::{error, warn};

use crate::config::ProviderDefinition;
use crate::error::{AuthgateError, Result};
use crate::oauth::client::{resolve_factory, ClientFactory, OAuth2Client};
use crate::oauth::registry::RegistryOptions;
use crate::oauth::{state, Authorization, GrantType, OAuth2, Scope};
use crate::token::Token;

// ---------------------------------------------------------------------------
// CallbackBinding
// ---------------------------------------------------------------------------

/// Correlation data for an eventual authorization callback.
///
/// Passed to the preserve callback of
/// [`ProviderInstance::authorize_with`] so a caller can persist the
/// redirect/state pairing out-of-band instead of relying purely on the
/// stateless token, and later feed it back through
/// [`ProviderInstance::receive_with`].
#[derive(Debug, Clone)]
pub struct CallbackBinding {
    /// The redirect URI the authorization request was built with.
    pub redirect_uri: String,
    /// The state token embedded in the authorization URL.
    pub state: String,
}

/// Callback invoked with the correlation data of a pending authorization.
pub type PreserveCallback<'a> = &'a (dyn Fn(&CallbackBinding) + Send + Sync);

// ---------------------------------------------------------------------------
// ProviderInstance
// ---------------------------------------------------------------------------

/// One provider's configuration and flow operations.
pub struct ProviderInstance {
    /// Slot name this instance was cached under (`name` or `name:usage`).
    name: String,
    /// Materialized definition: usage merged, template resolved.
    definition: ProviderDefinition,
    /// HMAC key for state tokens.
    salt: String,
    /// Factory for the lazily built client collaborator.
    factory: ClientFactory,
    /// Client handle, built on first use.
    client: OnceLock<Arc<dyn OAuth2Client>>,
}

impl ProviderInstance {
    /// Build an instance from a materialized definition.
    ///
    /// Salt resolution order: explicit `salt` from the definition, then a
    /// deterministic derivation from the registry `state_secret` and the
    /// instance name, then a random in-memory salt as a last resort. The
    /// random fallback is logged because state tokens minted from it
    /// cannot be verified after a process restart.
    pub(crate) fn new(
        name: String,
        definition: ProviderDefinition,
        options: &RegistryOptions,
    ) -> Result<Self> {
        let salt = match (&definition.salt, &options.state_secret) {
            (Some(salt), _) => salt.clone(),
            (None, Some(secret)) => state::derive(&name, &BTreeMap::new(), secret),
            (None, None) => {
                warn!(
                    provider = %name,
                    "no salt configured; state tokens will not survive a restart"
                );
                generate_salt()
            }
        };

        let factory = resolve_factory(&definition.collaborators, &options.client_factories)?;

        Ok(Self {
            name,
            definition,
            salt,
            factory,
            client: OnceLock::new(),
        })
    }

    /// Name of this instance (its cache slot key).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Redirect URI for the authorization server to call back.
    ///
    /// Falls back to a deterministic development URL built from the
    /// instance name when none is configured.
    pub fn redirect_uri(&self) -> String {
        if let Some(uri) = &self.definition.provider.redirect_uri {
            return uri.clone();
        }
        format!(
            "https://localhost/{}/callback",
            urlencoding::encode(&self.name)
        )
    }

    /// Obtain an authorization with default redirect handling.
    ///
    /// See [`authorize_with`](Self::authorize_with) for the full form.
    pub async fn authorize(&self, grant: Option<&str>, scope: Scope) -> Result<Authorization> {
        self.authorize_with(grant, scope, None, None).await
    }

    /// Obtain an authorization.
    ///
    /// The effective grant type is the explicit argument, else the
    /// configured `grant_type`, else `code`.
    ///
    /// - `code`: returns [`Authorization::Redirect`] with a URL carrying
    ///   the requested scope and a state token bound to the response type,
    ///   client id, and redirect URI. A supplied `preserve` callback is
    ///   invoked with the [`CallbackBinding`] before the URL is returned.
    /// - `client_credentials` / `password`: calls the token endpoint
    ///   directly and returns [`Authorization::Token`].
    ///
    /// # Arguments
    ///
    /// * `grant` - Explicit grant type, overriding the configured one.
    /// * `scope` - Scope request; [`Scope::Default`] uses configured scopes.
    /// * `redirect` - Redirect URI override for this authorization.
    /// * `preserve` - Out-of-band correlation callback.
    ///
    /// # Errors
    ///
    /// Returns [`AuthgateError::UnsupportedGrantType`] for any other grant
    /// type, [`AuthgateError::Config`] when the password grant lacks
    /// credentials.
    pub async fn authorize_with(
        &self,
        grant: Option<&str>,
        scope: Scope,
        redirect: Option<&str>,
        preserve: Option<PreserveCallback<'_>>,
    ) -> Result<Authorization> {
        let effective = grant
            .map(str::to_string)
            .or_else(|| self.definition.grant_type.clone())
            .unwrap_or_else(|| GrantType::Code.as_str().to_string());

        match GrantType::parse(&effective) {
            Some(GrantType::Code) => {
                let redirect_uri = redirect
                    .map(str::to_string)
                    .unwrap_or_else(|| self.redirect_uri());
                let info = self.state_info(&redirect_uri);
                let state = state::derive(&self.name, &info, &self.salt);

                if let Some(preserve) = preserve {
                    preserve(&CallbackBinding {
                        redirect_uri: redirect_uri.clone(),
                        state: state.clone(),
                    });
                }

                let mut options = BTreeMap::new();
                if let Some(scope) = self.scope_string(&scope) {
                    options.insert("scope".to_string(), scope);
                }
                options.insert("state".to_string(), state);
                options.insert("redirect_uri".to_string(), redirect_uri);

                let url = self.client().authorization_url(&options)?;
                Ok(Authorization::Redirect(url))
            }
            Some(grant @ (GrantType::ClientCredentials | GrantType::Password)) => {
                let token = self.direct_grant(grant, &scope).await?;
                Ok(Authorization::Token(token))
            }
            None => {
                error!(provider = %self.name, grant = %effective, "unsupported OAuth2 grant type");
                Err(AuthgateError::UnsupportedGrantType(effective).into())
            }
        }
    }

    /// Process a callback URL with default redirect handling.
    pub async fn receive(&self, url: &str) -> Result<Token> {
        self.receive_with(url, None).await
    }

    /// Process a callback URL from the authorization endpoint.
    ///
    /// Requires a `state` query parameter. When a `code` parameter is
    /// present, the expected state is recomputed (using the preserved
    /// redirect URI when supplied) and verified before the code is
    /// exchanged via the `authorization_code` grant.
    ///
    /// # Errors
    ///
    /// Returns [`AuthgateError::InvalidCallback`] when `state` is missing,
    /// verification fails, or the callback shape is not recognized.
    pub async fn receive_with(
        &self,
        url: &str,
        preserved: Option<&CallbackBinding>,
    ) -> Result<Token> {
        let query = url.split_once('?').map(|(_, query)| query).unwrap_or("");
        let params: BTreeMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        let state = match params.get("state") {
            Some(state) => state,
            None => {
                error!(provider = %self.name, "invalid callback: missing/invalid state");
                return Err(
                    AuthgateError::InvalidCallback("missing/invalid state".to_string()).into(),
                );
            }
        };

        let code = match params.get("code") {
            Some(code) => code,
            None => {
                error!(provider = %self.name, "invalid callback: cannot determine callback type");
                return Err(AuthgateError::InvalidCallback(
                    "cannot determine callback type".to_string(),
                )
                .into());
            }
        };

        let redirect_uri = preserved
            .map(|binding| binding.redirect_uri.clone())
            .unwrap_or_else(|| self.redirect_uri());
        let info = self.state_info(&redirect_uri);

        if !state::verify(&self.name, state, &info, &self.salt) {
            error!(provider = %self.name, "invalid callback: state cannot be verified");
            return Err(
                AuthgateError::InvalidCallback("state verification failed".to_string()).into(),
            );
        }

        let mut options = BTreeMap::new();
        options.insert("code".to_string(), code.clone());
        options.insert("redirect_uri".to_string(), redirect_uri);

        self.client().access_token("authorization_code", &options).await
    }

    /// Refresh a token that expires within `ttl_seconds`.
    ///
    /// Returns `Ok(None)` when no refresh is needed (the token is good for
    /// longer than the requested window) and when no refresh mechanism
    /// applies (no refresh token and a redirect-based grant); the latter is
    /// logged. A non-positive `ttl_seconds` forces the refresh.
    ///
    /// On success the refreshed fields are merged over the original token,
    /// preserving fields the refresh response omitted.
    pub async fn refresh(&self, token: &Token, ttl_seconds: i64) -> Result<Option<Token>> {
        if ttl_seconds > 0 && !token.expires_within(ttl_seconds) {
            return Ok(None);
        }

        if let Some(refresh_token) = &token.refresh_token {
            let mut options = BTreeMap::new();
            options.insert("refresh_token".to_string(), refresh_token.clone());
            // The redirect URI plays no part in a refresh request.
            let refreshed = self.client().access_token("refresh_token", &options).await?;
            return Ok(Some(token.merged_with(refreshed)));
        }

        let configured = self
            .definition
            .grant_type
            .as_deref()
            .and_then(GrantType::parse);
        let fresh = match configured {
            Some(grant @ (GrantType::ClientCredentials | GrantType::Password)) => {
                self.direct_grant(grant, &Scope::Default).await?
            }
            _ => {
                warn!(provider = %self.name, "OAuth2 token cannot be refreshed");
                return Ok(None);
            }
        };

        Ok(Some(token.merged_with(fresh)))
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Call the token endpoint directly for a non-redirect grant.
    async fn direct_grant(&self, grant: GrantType, scope: &Scope) -> Result<Token> {
        let mut options = self.definition.options.token.clone();
        if let Some(scope) = self.scope_string(scope) {
            options.insert("scope".to_string(), scope);
        }

        if grant == GrantType::Password {
            let settings = &self.definition.provider;
            let username = settings.username.clone().ok_or_else(|| {
                AuthgateError::Config("password grant requires a username".to_string())
            })?;
            let password = settings.password.clone().ok_or_else(|| {
                AuthgateError::Config("password grant requires a password".to_string())
            })?;
            options.insert("username".to_string(), username);
            options.insert("password".to_string(), password);
        }

        self.client().access_token(grant.as_str(), &options).await
    }

    /// State attributes bound into the redirect round-trip.
    fn state_info(&self, redirect_uri: &str) -> BTreeMap<String, String> {
        let mut info = BTreeMap::new();
        info.insert("response_type".to_string(), "code".to_string());
        info.insert(
            "client_id".to_string(),
            self.definition.provider.client_id.clone().unwrap_or_default(),
        );
        info.insert("redirect_uri".to_string(), redirect_uri.to_string());
        info
    }

    /// Scope normalized to a single string; `None` when nothing resolves.
    ///
    /// An empty request falls back to the configured default scopes; lists
    /// are joined with the configured separator.
    fn scope_string(&self, scope: &Scope) -> Option<String> {
        let settings = &self.definition.provider;
        let separator = settings.separator();
        let configured = || {
            settings
                .scopes
                .as_ref()
                .map(|scopes| scopes.join(separator))
                .unwrap_or_default()
        };

        let resolved = match scope {
            Scope::Default => configured(),
            Scope::One(scope) if scope.is_empty() => configured(),
            Scope::One(scope) => scope.clone(),
            Scope::Many(scopes) if scopes.is_empty() => configured(),
            Scope::Many(scopes) => scopes.join(separator),
        };

        if resolved.is_empty() {
            None
        } else {
            Some(resolved)
        }
    }

    /// The client collaborator, built on first use.
    fn client(&self) -> Arc<dyn OAuth2Client> {
        self.client
            .get_or_init(|| (self.factory)(&self.definition.provider))
            .clone()
    }
}

/// Random fallback salt: 18 bytes, base64-encoded.
fn generate_salt() -> String {
    use base64::Engine as _;
    use rand::RngCore as _;

    let mut bytes = [0u8; 18];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[async_trait]
impl OAuth2 for ProviderInstance {
    fn name(&self) -> Result<String> {
        Ok(self.name.clone())
    }

    fn redirect_uri(&self) -> Result<String> {
        Ok(ProviderInstance::redirect_uri(self))
    }

    async fn authorize(&self, grant: Option<&str>, scope: Scope) -> Result<Authorization> {
        ProviderInstance::authorize(self, grant, scope).await
    }

    async fn receive(&self, url: &str) -> Result<Token> {
        ProviderInstance::receive(self, url).await
    }

    async fn refresh(&self, token: &Token, ttl_seconds: i64) -> Result<Option<Token>> {
        ProviderInstance::refresh(self, token, ttl_seconds).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
