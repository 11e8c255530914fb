//! Provider registry: definitions, resolution, and the instance cache
//!
//! The registry owns named [`ProviderDefinition`]s and materializes them
//! into cached [`ProviderInstance`]s on demand. Materialization applies
//! usage overrides (one-hop aliases, shallow merge) and `${param}`
//! substitution for templated definitions. Reconfiguring a name evicts
//! every cached instance sharing that name prefix, so stale configuration
//! never leaks.
//!
//! The registry also implements the [`OAuth2`] operation interface by
//! forwarding to its default provider, so application code holding only a
//! registry can run the flows directly.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::{AuthConfig, ProviderDefinition, UsageOverride};
use crate::error::{AuthgateError, Result};
use crate::oauth::client::ClientFactory;
use crate::oauth::provider::ProviderInstance;
use crate::oauth::{template, Authorization, OAuth2, Scope};
use crate::token::Token;

// ---------------------------------------------------------------------------
// RegistryOptions
// ---------------------------------------------------------------------------

/// Registry-wide options shared by every provider instance.
#[derive(Clone, Default)]
pub struct RegistryOptions {
    /// Secret used to derive per-provider state salts when a definition
    /// carries no explicit `salt`.
    pub state_secret: Option<String>,

    /// Named client collaborator factories selectable via a definition's
    /// `collaborators.client` key.
    pub client_factories: HashMap<String, ClientFactory>,
}

// ---------------------------------------------------------------------------
// ProviderRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RegistryState {
    /// Provider definitions by name.
    defines: HashMap<String, ProviderDefinition>,
    /// Configuration order, for the implicit-default fallback.
    order: Vec<String>,
    /// Explicit default provider name.
    default: Option<String>,
    /// Materialized instances by slot key (`name`, `name:usage`, or
    /// `name:usage:instance`).
    instances: HashMap<String, Arc<ProviderInstance>>,
}

/// Registry of OAuth2 providers.
///
/// Construct one explicitly and pass it (typically as an `Arc`) to
/// whatever needs provider access; there is no process-wide singleton.
///
/// # Examples
///
/// ```
/// use authgate::config::ProviderDefinition;
/// use authgate::oauth::registry::{ProviderRegistry, RegistryOptions};
///
/// let registry = ProviderRegistry::new(RegistryOptions::default());
/// registry
///     .configure("github", ProviderDefinition::default(), true)
///     .unwrap();
///
/// let provider = registry.get(Some("github"), None, None).unwrap();
/// assert!(provider.is_some());
/// ```
pub struct ProviderRegistry {
    state: RwLock<RegistryState>,
    options: RegistryOptions,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new(options: RegistryOptions) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            options,
        }
    }

    /// Build a registry from a loaded configuration file.
    ///
    /// Providers are configured in name order (a parsed mapping has no
    /// stable insertion order), the file's `default` becomes the default
    /// provider, and the file's `state_secret` is used unless the options
    /// already carry one.
    pub fn from_config(config: AuthConfig, mut options: RegistryOptions) -> Result<Self> {
        if options.state_secret.is_none() {
            options.state_secret = config.state_secret.clone();
        }

        let registry = Self::new(options);
        let mut names: Vec<&String> = config.providers.keys().collect();
        names.sort();
        for name in names {
            let is_default = config.default.as_deref() == Some(name.as_str());
            registry.configure(name, config.providers[name].clone(), is_default)?;
        }
        Ok(registry)
    }

    /// Configure (or replace) a provider definition.
    ///
    /// Replacing a definition evicts every cached instance whose slot key
    /// is `name` or starts with `name:`, so subsequent `get` calls rebuild
    /// from the new configuration.
    ///
    /// # Arguments
    ///
    /// * `name` - Unique provider name.
    /// * `definition` - The definition to store.
    /// * `is_default` - Whether this provider becomes the default.
    pub fn configure(
        &self,
        name: &str,
        definition: ProviderDefinition,
        is_default: bool,
    ) -> Result<()> {
        definition.validate(name)?;

        let mut state = self.state.write().unwrap();
        if state.defines.contains_key(name) {
            // Clear out previous instances.
            let prefix = format!("{name}:");
            state
                .instances
                .retain(|slot, _| slot != name && !slot.starts_with(&prefix));
        } else {
            state.order.push(name.to_string());
        }

        state.defines.insert(name.to_string(), definition);
        if is_default {
            state.default = Some(name.to_string());
        }
        Ok(())
    }

    /// Get (materializing and caching if needed) a provider instance.
    ///
    /// Resolution order for the name: explicit argument, then the
    /// configured default, then the first configured name. `Ok(None)` means
    /// no matching definition exists, which is a normal bootstrap state.
    ///
    /// For templated definitions the usage may take the form
    /// `usage:instance`, where the instance id only diversifies the cache
    /// slot; override lookup uses the bare usage.
    ///
    /// # Arguments
    ///
    /// * `name` - Provider name; `None` selects the default.
    /// * `usage` - Usage qualifier; `None`/empty selects the base slot.
    /// * `params` - Template parameters for templated definitions.
    pub fn get(
        &self,
        name: Option<&str>,
        usage: Option<&str>,
        params: Option<&HashMap<String, String>>,
    ) -> Result<Option<Arc<ProviderInstance>>> {
        let usage = usage.unwrap_or("");

        let (resolved_name, cached, definition) = {
            let state = self.state.read().unwrap();
            let resolved_name = match name {
                Some(explicit) => explicit.to_string(),
                None => match state.default.clone().or_else(|| state.order.first().cloned()) {
                    Some(fallback) => fallback,
                    None => return Ok(None),
                },
            };

            let slot = slot_key(&resolved_name, usage);
            let cached = state.instances.get(&slot).cloned();
            let definition = state.defines.get(&resolved_name).cloned();
            (resolved_name, cached, definition)
        };

        if let Some(instance) = cached {
            return Ok(Some(instance));
        }

        let definition = match definition {
            Some(definition) => definition,
            None => return Ok(None),
        };

        let slot = slot_key(&resolved_name, usage);
        debug!(slot = %slot, "materializing OAuth2 provider instance");
        let instance = Arc::new(self.materialize(&slot, definition, usage, params)?);

        let mut state = self.state.write().unwrap();
        // A concurrent get may have materialized the slot first; keep the
        // existing instance so every caller shares one.
        let entry = state.instances.entry(slot).or_insert(instance);
        Ok(Some(entry.clone()))
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Materialize a definition into an instance for one slot.
    fn materialize(
        &self,
        slot: &str,
        mut definition: ProviderDefinition,
        usage: &str,
        params: Option<&HashMap<String, String>>,
    ) -> Result<ProviderInstance> {
        let is_template = definition.template;

        // For templates, the usage may carry an instance discriminator;
        // only the bare usage participates in override lookup.
        let bare_usage = if is_template {
            usage.split_once(':').map(|(bare, _)| bare).unwrap_or(usage)
        } else {
            usage
        };

        if !bare_usage.is_empty() {
            let mut specific = definition.usage.get(bare_usage).cloned();
            if let Some(UsageOverride::Alias(alias)) = specific.clone() {
                // One hop only; an alias pointing at another alias resolves
                // to no override at all.
                specific = definition.usage.get(&alias).cloned();
                if matches!(specific, Some(UsageOverride::Alias(_))) {
                    specific = None;
                }
            }
            if let Some(UsageOverride::Override(overrides)) = specific {
                let mut settings = serde_json::to_value(&definition.provider)
                    .map_err(AuthgateError::Serialization)?;
                if let Value::Object(entries) = &mut settings {
                    for (key, value) in overrides {
                        entries.insert(key, value);
                    }
                }
                definition.provider =
                    serde_json::from_value(settings).map_err(AuthgateError::Serialization)?;
            }
        }
        definition.usage.clear();

        if is_template {
            let empty = HashMap::new();
            let mut tree =
                serde_json::to_value(&definition).map_err(AuthgateError::Serialization)?;
            template::inject(&mut tree, params.unwrap_or(&empty));
            definition =
                serde_json::from_value(tree).map_err(AuthgateError::Serialization)?;
            definition.template = false;
        }

        ProviderInstance::new(slot.to_string(), definition, &self.options)
    }

    /// The default instance, required for delegation.
    fn default_instance(&self) -> Result<Arc<ProviderInstance>> {
        self.get(None, None, None)?.ok_or_else(|| {
            AuthgateError::ProviderNotFound("no default provider configured".to_string()).into()
        })
    }
}

/// Cache slot key for a (name, usage) pair.
fn slot_key(name: &str, usage: &str) -> String {
    if usage.is_empty() {
        name.to_string()
    } else {
        format!("{name}:{usage}")
    }
}

#[async_trait]
impl OAuth2 for ProviderRegistry {
    fn name(&self) -> Result<String> {
        Ok(self.default_instance()?.name().to_string())
    }

    fn redirect_uri(&self) -> Result<String> {
        Ok(self.default_instance()?.redirect_uri())
    }

    async fn authorize(&self, grant: Option<&str>, scope: Scope) -> Result<Authorization> {
        self.default_instance()?.authorize(grant, scope).await
    }

    async fn receive(&self, url: &str) -> Result<Token> {
        self.default_instance()?.receive(url).await
    }

    async fn refresh(&self, token: &Token, ttl_seconds: i64) -> Result<Option<Token>> {
        self.default_instance()?.refresh(token, ttl_seconds).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
