//! Bundle manifest loading for the TuneFlow DevKit
//!
//! A bundle is one or more plugins shipped together. Their display metadata
//! lives in a `bundle.json` manifest next to the code:
//!
//! ```json
//! {
//!   "plugins": [
//!     {
//!       "providerId": "andantei",
//!       "pluginId": "hello-world",
//!       "providerDisplayName": "Andantei",
//!       "pluginDisplayName": { "en": "Hello World", "zh": "你好世界" },
//!       "pluginDescription": { "en": "Does nothing, politely" },
//!       "version": "1.0.0",
//!       "triggers": [{ "type": "song" }]
//!     }
//!   ]
//! }
//! ```
//!
//! The raw document is kept verbatim so `plugin-bundle-info` can serve it
//! unchanged; typed entries are used for validation and display.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DevkitError, Result};
use crate::utils::translate::{translate, LabelText};

/// Metadata of one plugin as declared in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub provider_id: String,
    pub plugin_id: String,

    #[serde(default = "empty_label")]
    pub provider_display_name: LabelText,

    #[serde(default = "empty_label")]
    pub plugin_display_name: LabelText,

    #[serde(default)]
    pub plugin_description: Option<LabelText>,

    /// Any other manifest fields (version, triggers, options...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn empty_label() -> LabelText {
    LabelText::Plain(String::new())
}

impl PluginInfo {
    pub fn matches(&self, provider_id: &str, plugin_id: &str) -> bool {
        self.provider_id == provider_id && self.plugin_id == plugin_id
    }
}

#[derive(Deserialize)]
struct ManifestDoc {
    plugins: Vec<PluginInfo>,
}

/// A parsed bundle manifest.
#[derive(Debug, Clone)]
pub struct BundleManifest {
    raw: Value,
    plugins: Vec<PluginInfo>,
}

impl BundleManifest {
    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DevkitError::Config(format!(
                "Failed to read bundle manifest {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(content)?;
        Self::from_value(raw)
    }

    pub fn from_value(raw: Value) -> Result<Self> {
        if raw.get("plugins").is_none() {
            return Err(DevkitError::Config(
                "Bundle manifest must contain a 'plugins' list".to_string(),
            ));
        }
        let doc: ManifestDoc = serde_json::from_value(raw.clone())?;
        Ok(Self {
            raw,
            plugins: doc.plugins,
        })
    }

    /// The manifest exactly as it was read.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Entries in manifest order.
    pub fn plugins(&self) -> &[PluginInfo] {
        &self.plugins
    }

    /// First entry matching the identity, if any.
    pub fn find(&self, provider_id: &str, plugin_id: &str) -> Option<&PluginInfo> {
        self.plugins
            .iter()
            .find(|info| info.matches(provider_id, plugin_id))
    }
}

/// Render the plugin info banner shown when a debug session starts.
pub fn describe_plugin(info: &PluginInfo, locale: &str) -> String {
    let header = translate(
        &LabelText::localized([
            ("en", "============= Plugin Info ============="),
            ("zh", "=============== 插件信息 ==============="),
        ]),
        locale,
    );
    let description = info
        .plugin_description
        .as_ref()
        .map(|d| translate(d, locale))
        .unwrap_or_else(|| "None".to_string());

    [
        header,
        format!("Provider ID: {}", info.provider_id),
        format!(
            "Provider Name: {}",
            translate(&info.provider_display_name, locale)
        ),
        format!("Plugin ID: {}", info.plugin_id),
        format!(
            "Plugin Name: {}",
            translate(&info.plugin_display_name, locale)
        ),
        format!("Plugin Description: {}", description),
        "=======================================".to_string(),
    ]
    .join("\n")
}
