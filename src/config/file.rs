//! TOML configuration file loading
//!
//! Supports `~/.config/holo/auth/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AuthConfigFile {
    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// ZeroTier Central configuration
    #[serde(default)]
    pub zerotier: ZeroTierFileConfig,

    /// Postmark configuration
    #[serde(default)]
    pub postmark: PostmarkFileConfig,

    /// Settings store entries (tokens, network id)
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Port to listen on
    pub port: Option<u16>,
}

/// ZeroTier Central configuration
#[derive(Debug, Default, Deserialize)]
pub struct ZeroTierFileConfig {
    /// API base URL
    pub api_url: Option<String>,

    /// Stale member cleanup policy ("deauthorize" or "delete")
    pub cleanup: Option<String>,
}

/// Postmark configuration
#[derive(Debug, Default, Deserialize)]
pub struct PostmarkFileConfig {
    pub api_url: Option<String>,
    pub sender: Option<String>,
    pub template_alias: Option<String>,
    pub internal_domain: Option<String>,
}

/// Parse a config file from a string
///
/// # Errors
///
/// Returns an error if the content is not valid TOML for the schema
pub fn parse_config_file(content: &str) -> Result<AuthConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the config file
///
/// An explicit `path` must exist and parse. Without one, the default location
/// is tried and any problem there falls back to defaults with a warning.
///
/// # Errors
///
/// Returns an error if an explicit path cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<AuthConfigFile> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path)?;
        let config = parse_config_file(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(AuthConfigFile::default());
    };

    if !path.exists() {
        return Ok(AuthConfigFile::default());
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                Ok(AuthConfigFile::default())
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            Ok(AuthConfigFile::default())
        }
    }
}

/// Default config file location
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.config_dir().join("holo").join("auth").join("config.toml"))
}
