#![warn(missing_docs)]
//! # pocket-booth-config
//!
//! ## Purpose
//! Resolves the effective upload configuration and photo quota for a booth.
//!
//! ## Responsibilities
//! - Capture the session configuration key from the page URL and forget it
//!   when the base URL (origin + path) changes.
//! - Resolve, in priority order, the key-based configuration, the manual
//!   configuration, or a disabled default.
//! - Track strips consumed against an optional quota per configuration key.
//!
//! ## Data flow
//! Page URL -> [`ConfigResolver::initialize_from_url`] -> session store.
//! [`ConfigResolver::resolve`] reads the session key, the [`ConfigSource`],
//! and the durable store on every call and returns a fresh [`UploadConfig`].
//!
//! ## Ownership and lifetimes
//! The resolver holds shared handles to its stores; it never caches a
//! resolved configuration.
//!
//! ## Error model
//! Malformed key-based configuration strings are logged and skipped so the
//! next tier applies. Storage failures and edits to a locked configuration
//! surface as [`ConfigError`].
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use pocket_booth_config::{ConfigResolver, ConfigTier, MapConfigSource, MemoryStore};
//!
//! let resolver = ConfigResolver::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MapConfigSource::new([("party", "true,folder-1,3")])),
//! );
//! resolver
//!     .initialize_from_url("https://booth.example/?key=party")
//!     .unwrap();
//! let config = resolver.resolve();
//! assert_eq!(config.tier, ConfigTier::KeyBased);
//! assert!(config.locked);
//! ```

mod store;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

pub use store::{
    ConfigSource, ENV_CONFIG_PREFIX, EnvConfigSource, JsonFileStore, KeyValueStore,
    MapConfigSource, MemoryStore,
};

/// Session store entry holding the active configuration key.
pub const SESSION_KEY_ENTRY: &str = "config_key";
/// Session store entry holding the last seen base URL.
pub const SESSION_URL_ENTRY: &str = "session_url";
/// Durable store entry for the manual enable flag.
pub const MANUAL_ENABLED_ENTRY: &str = "upload_enabled";
/// Durable store entry for the manual destination id.
pub const MANUAL_DESTINATION_ENTRY: &str = "upload_destination_id";

const PHOTO_COUNT_PREFIX: &str = "photo_count_";

/// Which tier produced a resolved configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigTier {
    /// Key-based configuration from the session key.
    KeyBased,
    /// User-edited configuration from the durable store.
    Manual,
    /// Nothing configured.
    Disabled,
}

/// Effective upload configuration, recomputed on every resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Whether uploads should happen.
    pub enabled: bool,
    /// Remote folder id; may be empty.
    pub destination_id: String,
    /// Maximum strips allowed, when limited.
    pub photo_limit: Option<u32>,
    /// `true` when derived from a key and not user-editable.
    pub locked: bool,
    /// Source tier.
    pub tier: ConfigTier,
}

impl UploadConfig {
    /// Configuration with uploads off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            destination_id: String::new(),
            photo_limit: None,
            locked: false,
            tier: ConfigTier::Disabled,
        }
    }
}

/// Parsed `enabled,destinationId[,quota]` configuration string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyConfig {
    /// `true` only for a case-insensitive `true`.
    pub enabled: bool,
    /// Remote folder id; may be empty.
    pub destination_id: String,
    /// Positive quota; zero or non-numeric values mean unlimited.
    pub photo_limit: Option<u32>,
}

/// User-editable upload settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManualConfig {
    /// Whether uploads are on.
    pub enabled: bool,
    /// Remote folder id.
    pub destination_id: String,
}

/// Parses a key-based configuration string.
///
/// # Errors
/// Returns [`ConfigError::MalformedConfig`] unless the string has two or
/// three comma-separated parts.
pub fn parse_config_string(raw: &str) -> Result<KeyConfig, ConfigError> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if raw.trim().is_empty() || !(2..=3).contains(&parts.len()) {
        return Err(ConfigError::MalformedConfig(format!(
            "expected enabled,destinationId[,quota] but got {} part(s)",
            parts.len()
        )));
    }

    let photo_limit = parts
        .get(2)
        .and_then(|quota| quota.parse::<u32>().ok())
        .filter(|quota| *quota > 0);

    Ok(KeyConfig {
        enabled: parts[0].eq_ignore_ascii_case("true"),
        destination_id: parts[1].to_string(),
        photo_limit,
    })
}

/// Base URL (origin + path, no query or fragment) of a page URL.
pub fn base_url(page_url: &Url) -> String {
    format!("{}{}", page_url.origin().ascii_serialization(), page_url.path())
}

/// Layered configuration resolver.
#[derive(Clone)]
pub struct ConfigResolver {
    session: Arc<dyn KeyValueStore>,
    durable: Arc<dyn KeyValueStore>,
    source: Arc<dyn ConfigSource>,
}

impl ConfigResolver {
    /// Creates a resolver over a session-scoped store, a durable store and a
    /// key-based configuration source.
    pub fn new(
        session: Arc<dyn KeyValueStore>,
        durable: Arc<dyn KeyValueStore>,
        source: Arc<dyn ConfigSource>,
    ) -> Self {
        Self {
            session,
            durable,
            source,
        }
    }

    /// Records the page URL of a new load and captures its `key` parameter.
    ///
    /// A stored key is dropped when the base URL differs from the previous
    /// load. A `key` parameter is stored only when a configuration exists
    /// for it. Returns the active key afterwards.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidUrl`] for an unparsable URL and
    /// [`ConfigError::Storage`] when the session store fails.
    pub fn initialize_from_url(&self, page_url: &str) -> Result<Option<String>, ConfigError> {
        let parsed = Url::parse(page_url)
            .map_err(|error| ConfigError::InvalidUrl(format!("{page_url}: {error}")))?;
        let current_base = base_url(&parsed);

        if let Some(previous) = self.session.get(SESSION_URL_ENTRY)
            && previous != current_base
        {
            info!(
                previous = %previous,
                current = %current_base,
                "base url changed; clearing session key"
            );
            self.session.remove(SESSION_KEY_ENTRY)?;
            self.session.remove(SESSION_URL_ENTRY)?;
        }
        self.session.set(SESSION_URL_ENTRY, &current_base)?;

        let key = parsed
            .query_pairs()
            .find(|(name, _)| name == "key")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty());

        if let Some(key) = key {
            if self.source.lookup(&key).is_some() {
                self.session.set(SESSION_KEY_ENTRY, &key)?;
                info!(key = %key, "configuration loaded for key");
            } else {
                warn!(key = %key, "no configuration found for key");
                self.session.remove(SESSION_KEY_ENTRY)?;
            }
        }

        Ok(self.current_key())
    }

    /// Active session configuration key.
    pub fn current_key(&self) -> Option<String> {
        self.session.get(SESSION_KEY_ENTRY)
    }

    /// Resolves the effective configuration.
    ///
    /// An enabled key-based configuration wins and is locked. Otherwise the
    /// manual or disabled tier applies, still bounded by the quota of a
    /// valid key-based configuration whose uploads are off.
    pub fn resolve(&self) -> UploadConfig {
        let key_config = self.key_config();
        if let Some(parsed) = &key_config
            && parsed.enabled
        {
            return UploadConfig {
                enabled: true,
                destination_id: parsed.destination_id.clone(),
                photo_limit: parsed.photo_limit,
                locked: true,
                tier: ConfigTier::KeyBased,
            };
        }

        let manual = self.manual();
        let mut config = if manual.enabled {
            UploadConfig {
                enabled: true,
                destination_id: manual.destination_id,
                photo_limit: None,
                locked: false,
                tier: ConfigTier::Manual,
            }
        } else {
            UploadConfig::disabled()
        };

        // A key with uploads off still limits the number of strips.
        config.photo_limit = key_config.and_then(|parsed| parsed.photo_limit);
        config
    }

    fn key_config(&self) -> Option<KeyConfig> {
        let key = self.current_key()?;
        let raw = self.source.lookup(&key)?;

        match parse_config_string(&raw) {
            Ok(parsed) => {
                if !parsed.enabled {
                    debug!(
                        key = %key,
                        photo_limit = ?parsed.photo_limit,
                        "key-based uploads are disabled; falling through"
                    );
                }
                Some(parsed)
            }
            Err(error) => {
                warn!(key = %key, %error, "ignoring malformed key-based configuration");
                None
            }
        }
    }

    /// Stored manual configuration, whether or not it is in effect.
    pub fn manual(&self) -> ManualConfig {
        ManualConfig {
            enabled: self.durable.get(MANUAL_ENABLED_ENTRY).as_deref() == Some("true"),
            destination_id: self.durable.get(MANUAL_DESTINATION_ENTRY).unwrap_or_default(),
        }
    }

    /// Persists the manual configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError::Locked`] while a key-based configuration is in
    /// effect and [`ConfigError::Storage`] when the durable store fails.
    pub fn save_manual(&self, config: &ManualConfig) -> Result<(), ConfigError> {
        if self.resolve().locked {
            return Err(ConfigError::Locked);
        }

        self.durable
            .set(MANUAL_ENABLED_ENTRY, if config.enabled { "true" } else { "false" })?;
        self.durable
            .set(MANUAL_DESTINATION_ENTRY, config.destination_id.trim())?;
        info!(enabled = config.enabled, "manual upload configuration saved");
        Ok(())
    }

    /// Forgets the session key so the manual configuration applies.
    ///
    /// # Errors
    /// Returns [`ConfigError::Storage`] when the session store fails.
    pub fn clear_key(&self) -> Result<(), ConfigError> {
        self.session.remove(SESSION_KEY_ENTRY)
    }

    fn counter_entry(&self) -> String {
        match self.current_key() {
            Some(key) => format!("{PHOTO_COUNT_PREFIX}{key}"),
            None => format!("{PHOTO_COUNT_PREFIX}default"),
        }
    }

    /// Strips taken under the current configuration scope.
    pub fn photos_taken(&self) -> u32 {
        let entry = self.counter_entry();
        match self.durable.get(&entry) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(
                    entry = %entry,
                    value = %raw,
                    "photo counter is not a number; treating as zero"
                );
                0
            }),
            None => 0,
        }
    }

    /// Counts one completed strip when a quota is active.
    ///
    /// Returns the new count, or `None` when no quota is tracked.
    ///
    /// # Errors
    /// Returns [`ConfigError::Storage`] when the durable store fails.
    pub fn record_strip(&self) -> Result<Option<u32>, ConfigError> {
        if self.resolve().photo_limit.is_none() {
            return Ok(None);
        }

        let next = self.photos_taken().saturating_add(1);
        self.durable.set(&self.counter_entry(), &next.to_string())?;
        debug!(count = next, "photo counter incremented");
        Ok(Some(next))
    }

    /// Returns `true` when a quota exists and is used up.
    pub fn has_reached_photo_limit(&self) -> bool {
        self.resolve()
            .photo_limit
            .is_some_and(|limit| self.photos_taken() >= limit)
    }

    /// Strips left under the quota, never negative; `None` when unlimited.
    pub fn photos_remaining(&self) -> Option<u32> {
        self.resolve()
            .photo_limit
            .map(|limit| limit.saturating_sub(self.photos_taken()))
    }
}

impl std::fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigResolver")
            .field("current_key", &self.current_key())
            .finish_non_exhaustive()
    }
}

/// Configuration resolution errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A key-based configuration string could not be parsed.
    #[error("malformed configuration: {0}")]
    MalformedConfig(String),
    /// The page URL could not be parsed.
    #[error("invalid page url: {0}")]
    InvalidUrl(String),
    /// The manual configuration cannot change while a key is in effect.
    #[error("configuration is locked by the session key")]
    Locked,
    /// The backing store failed.
    #[error("configuration storage failed: {0}")]
    Storage(String),
}
