//! Identifier validation for provider and plugin ids.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DevkitError, Result};

use super::types::SongPlugin;

/// Maximum length of a provider or plugin identifier.
pub const MAX_ID_LENGTH: usize = 100;

static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9-]*$").unwrap());

/// Check a single identifier. `field` names it in the error (`providerId`
/// or `pluginId`).
pub fn validate_identifier(field: &'static str, value: &str) -> Result<()> {
    if value.chars().count() > MAX_ID_LENGTH {
        return Err(DevkitError::InvalidIdentifier {
            field,
            value: value.to_string(),
            reason: format!("must not be longer than {}", MAX_ID_LENGTH),
        });
    }

    if !ID_RE.is_match(value) {
        return Err(DevkitError::InvalidIdentifier {
            field,
            value: value.to_string(),
            reason: "must only use [0-9a-zA-Z-] and the first letter cannot be a digit".to_string(),
        });
    }

    Ok(())
}

/// Check both identifiers of a plugin.
pub fn validate_plugin(plugin: &dyn SongPlugin) -> Result<()> {
    validate_identifier("providerId", plugin.provider_id())?;
    validate_identifier("pluginId", plugin.plugin_id())?;
    Ok(())
}
