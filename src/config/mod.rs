//! Configuration management for the holo-auth relay
//!
//! Precedence is env > toml > default, resolved once at startup. Settings
//! values (tokens, network id) are different: they are looked up per request
//! through [`crate::settings`].

pub mod file;

use std::path::Path;

use url::Url;

use crate::settings::{ChainedSettings, EnvSettings, MemorySettings};
use crate::zerotier::CleanupPolicy;
use crate::{Error, Result, postmark, zerotier};

use self::file::AuthConfigFile;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8787;

/// Relay configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// ZeroTier Central configuration
    pub zerotier: ZeroTierConfig,

    /// Postmark configuration
    pub postmark: PostmarkConfig,

    /// Settings from the config file's `[settings]` table
    pub file_settings: MemorySettings,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
}

/// ZeroTier Central configuration
#[derive(Debug, Clone)]
pub struct ZeroTierConfig {
    /// API base URL
    pub api_url: String,

    /// What to do with stale members
    pub cleanup: CleanupPolicy,
}

/// Postmark configuration
#[derive(Debug, Clone)]
pub struct PostmarkConfig {
    /// API base URL
    pub api_url: String,

    /// `From` address
    pub sender: String,

    /// Template alias for failed registrations
    pub template_alias: String,

    /// Recipients on this domain are tagged `Internal`
    pub internal_domain: String,
}

impl Config {
    /// Load configuration from the environment and an optional config file
    ///
    /// # Errors
    ///
    /// Returns error if the config file or a value is invalid
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path)?;
        Self::from_sources(fc, |name| std::env::var(name).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a URL or the cleanup policy is invalid
    pub fn from_sources(fc: AuthConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let server = ServerConfig {
            port: match env("HOLO_AUTH_PORT").or_else(|| env("PORT")) {
                Some(port) => port
                    .parse()
                    .map_err(|e| Error::Config(format!("invalid port '{port}': {e}")))?,
                None => fc.server.port.unwrap_or(DEFAULT_PORT),
            },
        };

        let cleanup = env("HOLO_AUTH_ZEROTIER_CLEANUP")
            .or(fc.zerotier.cleanup)
            .map(|s| s.parse::<CleanupPolicy>())
            .transpose()?
            .unwrap_or_default();

        let zerotier = ZeroTierConfig {
            api_url: validate_url(
                env("HOLO_AUTH_ZEROTIER_API_URL")
                    .or(fc.zerotier.api_url)
                    .unwrap_or_else(|| zerotier::DEFAULT_API_URL.to_string()),
            )?,
            cleanup,
        };

        let postmark = PostmarkConfig {
            api_url: validate_url(
                env("HOLO_AUTH_POSTMARK_API_URL")
                    .or(fc.postmark.api_url)
                    .unwrap_or_else(|| postmark::DEFAULT_API_URL.to_string()),
            )?,
            sender: env("HOLO_AUTH_POSTMARK_SENDER")
                .or(fc.postmark.sender)
                .unwrap_or_else(|| postmark::DEFAULT_SENDER.to_string()),
            template_alias: env("HOLO_AUTH_POSTMARK_TEMPLATE_ALIAS")
                .or(fc.postmark.template_alias)
                .unwrap_or_else(|| postmark::DEFAULT_TEMPLATE_ALIAS.to_string()),
            internal_domain: env("HOLO_AUTH_POSTMARK_INTERNAL_DOMAIN")
                .or(fc.postmark.internal_domain)
                .unwrap_or_else(|| postmark::DEFAULT_INTERNAL_DOMAIN.to_string()),
        };

        let file_settings: MemorySettings = fc.settings.into_iter().collect();

        Ok(Self {
            server,
            zerotier,
            postmark,
            file_settings,
        })
    }

    /// Settings store: process environment first, then the config file
    #[must_use]
    pub fn settings_store(&self) -> ChainedSettings {
        ChainedSettings::new()
            .then(EnvSettings::new())
            .then(self.file_settings.clone())
    }
}

/// Check that `raw` is an absolute http(s) URL and strip any trailing slash
fn validate_url(raw: String) -> Result<String> {
    let url = Url::parse(&raw).map_err(|e| Error::Config(format!("invalid URL '{raw}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "unsupported URL scheme '{}' in '{raw}'",
            url.scheme()
        )));
    }

    Ok(raw.trim_end_matches('/').to_string())
}
