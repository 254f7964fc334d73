//! Error types for the holo-auth relay

use thiserror::Error;

/// Result type alias for holo-auth operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while relaying onboarding events
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A settings key was not present in any store
    #[error("setting not found: {0}")]
    SettingNotFound(String),

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Transport failure not originating from reqwest (fake transports, URL building)
    #[error("transport error: {0}")]
    Transport(String),

    /// Provider answered with a non-success status where a value was required
    #[error("provider returned {status}: {body}")]
    Provider {
        /// HTTP status code returned by the provider
        status: u16,
        /// Response body, as text
        body: String,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether the error came from talking to a remote party rather than local setup
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Transport(_))
    }
}
