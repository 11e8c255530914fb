//! Token repository contract and refresh-on-read orchestration
//!
//! The repository addresses tokens by `<provider>:<usage>` keys and layers
//! a refresh-before-expiry policy over a storage backend. The
//! orchestration in [`Repository`] is backend-agnostic: backends only
//! implement [`TokenBackend::load`] and [`TokenBackend::save`].
//!
//! Concurrent access to one token key is serialized by a per-key async
//! mutex held across the whole load-refresh-save sequence, so at most one
//! in-flight refresh takes effect and no stale token overwrites a
//! refreshed one.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{AuthgateError, Result};
use crate::oauth::{OAuth2, ProviderRegistry};
use crate::token::{Token, TokenKey};

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Repository of OAuth2 tokens addressed by `<provider>:<usage>` keys.
///
/// `get_token` with a positive `valid_seconds` refreshes a token expiring
/// within that window (when the issuing provider can refresh it) and
/// persists the refreshed value before returning it.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Retrieve a token by key, refreshing it when requested.
    ///
    /// Returns `Ok(None)` when no token is stored under the key.
    async fn get_token(&self, key: &str, valid_seconds: i64) -> Result<Option<Token>>;

    /// Store a token by key unconditionally.
    ///
    /// Returns the stored token, which a backend may have adjusted.
    async fn put_token(&self, key: &str, token: &Token) -> Result<Token>;
}

/// Storage backend for [`Repository`].
///
/// `load` may produce a `Handle` that makes the follow-up `save` for the
/// same key cheaper (for example an already-computed file path); the
/// orchestration passes it back verbatim.
#[async_trait]
pub trait TokenBackend: Send + Sync {
    /// Opaque carry-over between a `load` and its follow-up `save`.
    type Handle: Send;

    /// Load the token stored under `key`, if any.
    async fn load(&self, key: &TokenKey) -> Result<(Option<Token>, Self::Handle)>;

    /// Persist `token` under `key`, returning the persisted value.
    async fn save(
        &self,
        key: &TokenKey,
        token: &Token,
        handle: Option<Self::Handle>,
    ) -> Result<Token>;
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Backend-agnostic token repository with refresh-on-read.
///
/// Holds the provider registry used to resolve a key's issuing provider
/// when a refresh is requested.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use authgate::oauth::registry::{ProviderRegistry, RegistryOptions};
/// use authgate::token::{DirectoryBackend, Repository, TokenRepository};
///
/// # async fn example() -> authgate::error::Result<()> {
/// let registry = Arc::new(ProviderRegistry::new(RegistryOptions::default()));
/// let repository = Repository::new(registry, DirectoryBackend::new("/var/lib/app/tokens"));
///
/// if let Some(token) = repository.get_token("github:profile", 300).await? {
///     println!("bearer {}", token.access_token);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Repository<B: TokenBackend> {
    registry: Arc<ProviderRegistry>,
    backend: B,
    /// Per-key critical sections for load-refresh-save sequences.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<B: TokenBackend> Repository<B> {
    /// Create a repository over the given backend.
    pub fn new(registry: Arc<ProviderRegistry>, backend: B) -> Self {
        Self {
            registry,
            backend,
            locks: DashMap::new(),
        }
    }

    /// `get_token` with an explicit issuing provider.
    ///
    /// The override replaces registry resolution for the refresh step;
    /// storage addressing is unchanged.
    pub async fn get_token_with(
        &self,
        key: &str,
        valid_seconds: i64,
        oauth_override: Option<&dyn OAuth2>,
    ) -> Result<Option<Token>> {
        let key = self.resolve_key(key)?;

        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let (loaded, handle) = self.backend.load(&key).await?;
        let token = match loaded {
            Some(token) => token,
            None => return Ok(None),
        };

        if valid_seconds <= 0 {
            return Ok(Some(token));
        }

        let refreshed = match oauth_override {
            Some(oauth) => oauth.refresh(&token, valid_seconds).await?,
            None => match self.registry.get(key.provider.as_deref(), None, None)? {
                Some(provider) => provider.refresh(&token, valid_seconds).await?,
                None => {
                    warn!(
                        key = %key,
                        "cannot resolve issuing provider; returning stored token unrefreshed"
                    );
                    None
                }
            },
        };

        match refreshed {
            Some(refreshed) => {
                let saved = self.backend.save(&key, &refreshed, Some(handle)).await?;
                Ok(Some(saved))
            }
            None => Ok(Some(token)),
        }
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Parse a key and pin its provider segment to the default provider.
    ///
    /// A key without a provider segment cannot be addressed (or refreshed)
    /// without a default provider, so an empty registry is an error here.
    fn resolve_key(&self, key: &str) -> Result<TokenKey> {
        let parsed = TokenKey::parse(key);
        if parsed.provider.is_some() {
            return Ok(parsed);
        }

        let default = self.registry.get(None, None, None)?.ok_or_else(|| {
            AuthgateError::ProviderNotFound(format!(
                "token key '{key}' has no provider segment and no default provider is configured"
            ))
        })?;
        Ok(parsed.or_provider(default.name()))
    }

    /// The per-key lock, created on first use.
    fn lock_for(&self, key: &TokenKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl<B: TokenBackend> TokenRepository for Repository<B> {
    async fn get_token(&self, key: &str, valid_seconds: i64) -> Result<Option<Token>> {
        self.get_token_with(key, valid_seconds, None).await
    }

    async fn put_token(&self, key: &str, token: &Token) -> Result<Token> {
        let key = self.resolve_key(key)?;

        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        self.backend.save(&key, token, None).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
