//! Directory-backed reference token store
//!
//! Each provider maps to a percent-encoded subdirectory under the base
//! directory, and each usage to a percent-encoded `<usage>.json` file
//! holding one pretty-printed token document. Directories are created on
//! demand; failures to create or write are storage errors, never silent.

use std::path::PathBuf;

use async_trait::async_trait;
use directories::ProjectDirs;

use crate::error::{AuthgateError, Result};
use crate::token::repository::TokenBackend;
use crate::token::{Token, TokenKey};

/// Filesystem [`TokenBackend`] storing tokens as JSON documents.
///
/// The load handle is the already-computed file path, so the follow-up
/// save after a refresh does not recompute it.
///
/// # Examples
///
/// ```no_run
/// use authgate::token::DirectoryBackend;
///
/// let backend = DirectoryBackend::new("/var/lib/app/tokens");
/// ```
pub struct DirectoryBackend {
    /// Base directory; provider subdirectories live underneath.
    base_dir: PathBuf,
}

impl DirectoryBackend {
    /// Create a backend rooted at `base_dir`.
    ///
    /// The directory itself is created lazily on the first save.
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Create a backend rooted in the user's application data directory.
    ///
    /// # Errors
    ///
    /// Returns [`AuthgateError::Storage`] when the platform data directory
    /// cannot be determined.
    pub fn in_project_dirs(
        qualifier: &str,
        organization: &str,
        application: &str,
    ) -> Result<Self> {
        let dirs = ProjectDirs::from(qualifier, organization, application).ok_or_else(|| {
            AuthgateError::Storage("could not determine data directory".to_string())
        })?;
        Ok(Self::new(dirs.data_dir().join("oauth2-tokens")))
    }

    /// File path storing the token for `key`.
    ///
    /// Both path segments are percent-encoded so arbitrary provider and
    /// usage names stay within one directory level.
    fn token_file_path(&self, key: &TokenKey) -> PathBuf {
        let provider = key.provider.as_deref().unwrap_or_default();
        self.base_dir
            .join(urlencoding::encode(provider).into_owned())
            .join(format!("{}.json", urlencoding::encode(&key.usage)))
    }
}

#[async_trait]
impl TokenBackend for DirectoryBackend {
    type Handle = PathBuf;

    async fn load(&self, key: &TokenKey) -> Result<(Option<Token>, PathBuf)> {
        let path = self.token_file_path(key);

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let token = serde_json::from_slice(&bytes).map_err(|e| {
                    AuthgateError::Storage(format!(
                        "malformed token document '{}': {e}",
                        path.display()
                    ))
                })?;
                Ok((Some(token), path))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok((None, path)),
            Err(e) => Err(AuthgateError::Storage(format!(
                "failed to read OAuth token from '{}': {e}",
                path.display()
            ))
            .into()),
        }
    }

    async fn save(
        &self,
        key: &TokenKey,
        token: &Token,
        handle: Option<PathBuf>,
    ) -> Result<Token> {
        let path = handle.unwrap_or_else(|| self.token_file_path(key));

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AuthgateError::Storage(format!(
                    "failed to create OAuth token directory '{}': {e}",
                    parent.display()
                ))
            })?;
        }

        let json = serde_json::to_string_pretty(token).map_err(AuthgateError::Serialization)?;
        tokio::fs::write(&path, json).await.map_err(|e| {
            AuthgateError::Storage(format!(
                "failed to save OAuth token to '{}': {e}",
                path.display()
            ))
        })?;

        Ok(token.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
