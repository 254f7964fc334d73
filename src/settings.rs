//! Settings stores for provider credentials and identifiers
//!
//! Values are looked up by key at call time and never cached, so a rotated
//! token takes effect on the next request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::{Error, Result};

/// ZeroTier Central API token
pub const ZEROTIER_API_TOKEN: &str = "zerotier_central_api_token";

/// ZeroTier network identifier
pub const ZEROTIER_NETWORK_ID: &str = "zerotier_network_id";

/// Postmark server token
pub const POSTMARK_SERVER_TOKEN: &str = "postmark_server_token";

/// Prefix applied to settings keys when read from the environment
pub const ENV_PREFIX: &str = "HOLO_AUTH_";

/// Key/value settings provider
#[async_trait]
pub trait Settings: Send + Sync {
    /// Look up a value by key
    ///
    /// # Errors
    ///
    /// Returns `Error::SettingNotFound` when the key is absent
    async fn get(&self, key: &str) -> Result<SecretString>;
}

/// Environment variable lookup function
type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Settings read from environment variables
///
/// Key `zerotier_network_id` maps to `HOLO_AUTH_ZEROTIER_NETWORK_ID`.
#[derive(Clone)]
pub struct EnvSettings {
    prefix: String,
    lookup: EnvLookup,
}

impl EnvSettings {
    /// Read from the process environment with the default prefix
    #[must_use]
    pub fn new() -> Self {
        Self::with_lookup(ENV_PREFIX, |name| std::env::var(name).ok())
    }

    /// Read through a custom lookup function
    #[must_use]
    pub fn with_lookup(
        prefix: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            lookup: Arc::new(lookup),
        }
    }

    /// Environment variable name for a settings key
    #[must_use]
    pub fn var_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_ascii_uppercase())
    }
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EnvSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvSettings")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Settings for EnvSettings {
    async fn get(&self, key: &str) -> Result<SecretString> {
        let name = self.var_name(key);
        (self.lookup)(&name)
            .filter(|value| !value.is_empty())
            .map(SecretString::from)
            .ok_or_else(|| Error::SettingNotFound(key.to_string()))
    }
}

/// In-memory settings, loaded from the config file or built in tests
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: HashMap<String, SecretString>,
}

impl MemorySettings {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a value
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Add or replace a value in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .insert(key.into(), SecretString::from(value.into()));
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the store holds no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MemorySettings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut settings = Self::new();
        for (key, value) in iter {
            settings.insert(key, value);
        }
        settings
    }
}

#[async_trait]
impl Settings for MemorySettings {
    async fn get(&self, key: &str) -> Result<SecretString> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| Error::SettingNotFound(key.to_string()))
    }
}

/// Ordered list of stores; the first one holding a key wins
#[derive(Clone, Default)]
pub struct ChainedSettings {
    stores: Vec<Arc<dyn Settings>>,
}

impl ChainedSettings {
    /// Create an empty chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a store with lower precedence than those already added
    #[must_use]
    pub fn then(mut self, store: impl Settings + 'static) -> Self {
        self.stores.push(Arc::new(store));
        self
    }
}

#[async_trait]
impl Settings for ChainedSettings {
    async fn get(&self, key: &str) -> Result<SecretString> {
        for store in &self.stores {
            match store.get(key).await {
                Ok(value) => return Ok(value),
                Err(Error::SettingNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Err(Error::SettingNotFound(key.to_string()))
    }
}
