//! Configuration management for Authgate
//!
//! This module defines the provider configuration model, loading from
//! YAML files, and validation. A [`ProviderDefinition`] is the stored
//! form of a provider; the registry materializes it into a concrete
//! instance after usage overrides and template substitution.

use crate::error::{AuthgateError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Grant types this library implements.
pub const GRANT_TYPES: [&str; 3] = ["code", "client_credentials", "password"];

/// Top-level configuration file shape
///
/// Holds every named provider definition plus registry-wide settings.
/// Loaded from YAML and handed to `ProviderRegistry::from_config`.
///
/// # Examples
///
/// ```
/// use authgate::config::AuthConfig;
///
/// let config = AuthConfig::from_yaml(
///     r#"
///     default: github
///     providers:
///       github:
///         grant_type: code
///         provider:
///           client_id: abc
///     "#,
/// )
/// .unwrap();
/// assert_eq!(config.default.as_deref(), Some("github"));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Name of the default provider
    #[serde(default)]
    pub default: Option<String>,

    /// Registry-wide secret used to derive per-provider state salts
    ///
    /// When a provider definition carries no explicit `salt`, its salt is
    /// derived deterministically from this secret and the provider name,
    /// so state tokens survive a process restart.
    #[serde(default)]
    pub state_secret: Option<String>,

    /// Provider definitions by name
    #[serde(default)]
    pub providers: HashMap<String, ProviderDefinition>,
}

impl AuthConfig {
    /// Load configuration from a YAML file and validate it.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`AuthgateError::Io`] if the file cannot be read,
    /// [`AuthgateError::Yaml`] if it cannot be parsed, or
    /// [`AuthgateError::Config`] if validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(AuthgateError::Io)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AuthConfig = serde_yaml::from_str(yaml).map_err(AuthgateError::Yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Checks that every configured grant type is one this library
    /// implements and that the default name, when set, refers to a
    /// configured provider.
    pub fn validate(&self) -> Result<()> {
        for (name, definition) in &self.providers {
            definition.validate(name)?;
        }
        if let Some(default) = &self.default {
            if !self.providers.contains_key(default) {
                return Err(AuthgateError::Config(format!(
                    "default provider '{default}' is not configured"
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// Stored definition of one OAuth2 provider
///
/// This is the pre-materialization form: usage overrides are still maps,
/// and template placeholders are still unresolved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderDefinition {
    /// Default grant type (`code`, `client_credentials`, or `password`)
    ///
    /// Falls back to `code` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_type: Option<String>,

    /// Whether this definition is a template requiring parameter substitution
    #[serde(default)]
    pub template: bool,

    /// HMAC key for state tokens
    ///
    /// When absent the salt is derived from the registry's `state_secret`,
    /// or generated randomly as a last resort.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,

    /// Provider sub-configuration handed to the OAuth2 client collaborator
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Usage-specific overrides, keyed by usage name
    ///
    /// A string value aliases another usage (one hop only); a map value is
    /// shallow-merged over [`ProviderDefinition::provider`].
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub usage: HashMap<String, UsageOverride>,

    /// Collaborator role to factory name overrides
    ///
    /// Factories are registered by name on the registry options; the only
    /// role currently consulted is `client`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub collaborators: HashMap<String, String>,

    /// Extra request options
    #[serde(default, skip_serializing_if = "RequestOptions::is_empty")]
    pub options: RequestOptions,
}

impl ProviderDefinition {
    /// Validate one definition against the closed grant-type set.
    pub fn validate(&self, name: &str) -> Result<()> {
        if let Some(grant) = &self.grant_type {
            if !GRANT_TYPES.contains(&grant.as_str()) {
                return Err(AuthgateError::Config(format!(
                    "provider '{name}': unknown grant_type '{grant}'"
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// Provider sub-configuration
///
/// Known fields are typed; anything else passes through `extra` untouched
/// so provider-specific options survive usage merging and template
/// substitution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// OAuth2 client identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// OAuth2 client secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Redirect URI registered with the authorization server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// Authorization endpoint URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_authorize: Option<String>,

    /// Token endpoint URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_access_token: Option<String>,

    /// Default scopes requested when the caller supplies none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<ScopeList>,

    /// Separator used to join scope lists (default single space)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_separator: Option<String>,

    /// Resource-owner username for the password grant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Resource-owner password for the password grant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Provider-specific passthrough options
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProviderSettings {
    /// Scope separator with the single-space default applied.
    pub fn separator(&self) -> &str {
        self.scope_separator.as_deref().unwrap_or(" ")
    }
}

/// One or many scope strings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeList {
    /// A single pre-joined scope string
    One(String),
    /// A list joined with the configured separator
    Many(Vec<String>),
}

impl ScopeList {
    /// Join into a single scope string using `separator`.
    pub fn join(&self, separator: &str) -> String {
        match self {
            ScopeList::One(scope) => scope.clone(),
            ScopeList::Many(scopes) => scopes.join(separator),
        }
    }
}

/// Usage-specific override of the provider sub-configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UsageOverride {
    /// Shallow-merged override map
    Override(Map<String, Value>),
    /// Alias for another usage name, resolved exactly one hop
    Alias(String),
}

/// Extra request options forwarded to the OAuth2 client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Extra parameters added to direct token-endpoint requests
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub token: BTreeMap<String, String>,
}

impl RequestOptions {
    /// True when no extra options are configured.
    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
        default: github
        state_secret: registry-secret
        providers:
          github:
            grant_type: code
            provider:
              client_id: gh-client
              client_secret: gh-secret
              url_authorize: https://github.com/login/oauth/authorize
              url_access_token: https://github.com/login/oauth/access_token
              scopes:
                - read:user
                - user:email
              scope_separator: " "
            usage:
              profile:
                scopes: read:user
              account: profile
          service:
            grant_type: client_credentials
            provider:
              client_id: svc
              client_secret: svc-secret
              url_access_token: https://auth.example.com/token
            options:
              token:
                audience: https://api.example.com
        "#
    }

    #[test]
    fn test_from_yaml_parses_providers() {
        let config = AuthConfig::from_yaml(sample_yaml()).unwrap();
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.default.as_deref(), Some("github"));
        assert_eq!(config.state_secret.as_deref(), Some("registry-secret"));
    }

    #[test]
    fn test_usage_override_untagged_forms() {
        let config = AuthConfig::from_yaml(sample_yaml()).unwrap();
        let github = &config.providers["github"];
        assert!(matches!(
            github.usage.get("profile"),
            Some(UsageOverride::Override(_))
        ));
        assert!(matches!(
            github.usage.get("account"),
            Some(UsageOverride::Alias(alias)) if alias == "profile"
        ));
    }

    #[test]
    fn test_scope_list_join() {
        assert_eq!(ScopeList::One("read".to_string()).join(","), "read");
        assert_eq!(
            ScopeList::Many(vec!["read".to_string(), "write".to_string()]).join(" "),
            "read write"
        );
    }

    #[test]
    fn test_token_options_parsed() {
        let config = AuthConfig::from_yaml(sample_yaml()).unwrap();
        let service = &config.providers["service"];
        assert_eq!(
            service.options.token.get("audience").map(String::as_str),
            Some("https://api.example.com")
        );
    }

    #[test]
    fn test_extra_provider_settings_passthrough() {
        let config = AuthConfig::from_yaml(
            r#"
            providers:
              custom:
                provider:
                  client_id: abc
                  tenant: contoso
            "#,
        )
        .unwrap();
        let custom = &config.providers["custom"];
        assert_eq!(
            custom.provider.extra.get("tenant"),
            Some(&Value::String("contoso".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_unknown_grant_type() {
        let result = AuthConfig::from_yaml(
            r#"
            providers:
              bad:
                grant_type: implicit
            "#,
        );
        assert!(result.is_err());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("implicit"), "error should name the grant: {msg}");
    }

    #[test]
    fn test_validate_rejects_unknown_default() {
        let result = AuthConfig::from_yaml(
            r#"
            default: missing
            providers:
              present:
                grant_type: code
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_separator_defaults_to_space() {
        let settings = ProviderSettings::default();
        assert_eq!(settings.separator(), " ");
    }
}
