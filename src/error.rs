//! Error types for the TuneFlow DevKit
//!
//! This module defines all error types used throughout the devkit.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! Registration errors (`InvalidIdentifier`, `MissingManifestEntry`,
//! `OrphanManifestEntry`, `DuplicatePlugin`) are fatal at construction.
//! Everything else is per-request and is turned into a wire status by the
//! transport that observed it. Plugin faults and authorizer rejections are
//! not errors of this type: the dispatcher reports them as an
//! `ExecutionResult`.

use thiserror::Error;

/// The primary error type for devkit operations.
#[derive(Error, Debug)]
pub enum DevkitError {
    /// A provider or plugin identifier failed the syntax rules.
    #[error("Invalid {field} '{value}': {reason}")]
    InvalidIdentifier {
        /// Either `providerId` or `pluginId`.
        field: &'static str,
        value: String,
        reason: String,
    },

    /// A registered plugin has no entry in the bundle manifest.
    #[error("Plugin {provider_id} {plugin_id} is not specified in the bundle manifest")]
    MissingManifestEntry {
        provider_id: String,
        plugin_id: String,
    },

    /// A manifest entry has no registered plugin code.
    #[error("Plugin {provider_id} {plugin_id} has no corresponding source code in the plugin list")]
    OrphanManifestEntry {
        provider_id: String,
        plugin_id: String,
    },

    /// The same identity was registered twice.
    #[error("Plugin {provider_id} {plugin_id} is registered more than once")]
    DuplicatePlugin {
        provider_id: String,
        plugin_id: String,
    },

    /// No plugin is registered under the requested identity.
    #[error("Cannot find plugin by id {provider_id} {plugin_id}")]
    NotFound {
        provider_id: String,
        plugin_id: String,
    },

    /// A session phase was requested out of order.
    #[error("Not ready: {0}")]
    NotReady(String),

    /// A callback query could not reach the connected caller.
    #[error("Callback unavailable: {0}")]
    CallbackUnavailable(String),

    /// Malformed request payload.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Configuration-related errors (invalid config, unreadable bundle, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Async result store failures (upload rejected, unreachable store)
    #[error("Store error: {0}")]
    Store(String),

    /// MessagePack encode/decode errors
    #[error("Codec error: {0}")]
    Codec(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rmp_serde::encode::Error> for DevkitError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        DevkitError::Codec(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for DevkitError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        DevkitError::Codec(err.to_string())
    }
}

/// A specialized `Result` type for devkit operations.
pub type Result<T> = std::result::Result<T, DevkitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_identifier_display() {
        let err = DevkitError::InvalidIdentifier {
            field: "pluginId",
            value: "0abc".to_string(),
            reason: "must start with a letter".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid pluginId '0abc': must start with a letter"
        );
    }

    #[test]
    fn test_not_found_display() {
        let err = DevkitError::NotFound {
            provider_id: "andantei".into(),
            plugin_id: "missing".into(),
        };
        assert_eq!(err.to_string(), "Cannot find plugin by id andantei missing");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DevkitError = io_err.into();
        assert!(matches!(err, DevkitError::Io(_)));
    }

    #[test]
    fn test_codec_error_conversion() {
        let decode: std::result::Result<String, _> = rmp_serde::from_slice(&[0xc1]);
        let err: DevkitError = decode.unwrap_err().into();
        assert!(matches!(err, DevkitError::Codec(_)));
    }
}
