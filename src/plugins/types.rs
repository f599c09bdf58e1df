//! Plugin types for the TuneFlow DevKit
//!
//! This module defines the capability interface every song-transform plugin
//! implements, the identity used to look plugins up, and the parameter
//! schema a plugin publishes during initialization.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::PluginContext;
use crate::error::DevkitError;
use crate::song::Song;
use crate::utils::translate::LabelText;

/// Parameter values keyed by parameter name.
pub type Params = BTreeMap<String, rmpv::Value>;

/// Parameter schema keyed by parameter name.
pub type ParamsConfig = BTreeMap<String, ParamDescriptor>;

/// A song-transform plugin.
///
/// Plugins are plain Rust types registered with a [`PluginRegistry`]. Both
/// hooks run on a blocking worker thread, never on the thread servicing the
/// connection, so they may block (including on [`PluginContext::query`]).
/// Returning an error, or panicking, is reported to the caller as an
/// initialization or run failure; the process keeps serving.
///
/// # Example
///
/// ```rust
/// use tuneflow_devkit::engine::PluginContext;
/// use tuneflow_devkit::plugins::{Params, SongPlugin};
/// use tuneflow_devkit::song::Song;
///
/// struct SetTempo;
///
/// impl SongPlugin for SetTempo {
///     fn provider_id(&self) -> &str { "andantei" }
///     fn plugin_id(&self) -> &str { "set-tempo" }
///
///     fn run(&self, song: &mut Song, _params: &Params, _ctx: &PluginContext) -> anyhow::Result<()> {
///         song.set("bpm", 120);
///         Ok(())
///     }
/// }
/// ```
///
/// [`PluginRegistry`]: super::PluginRegistry
pub trait SongPlugin: Send + Sync + 'static {
    /// Identifier of the plugin's provider, e.g. `andantei`.
    fn provider_id(&self) -> &str;

    /// Identifier of the plugin within its provider, e.g. `hello-world`.
    fn plugin_id(&self) -> &str;

    /// Parameter schema for `song`. Defaults to no parameters.
    fn params(&self, _song: &Song, _ctx: &PluginContext) -> anyhow::Result<ParamsConfig> {
        Ok(ParamsConfig::new())
    }

    /// Transform `song` in place using fully-resolved `params`.
    fn run(&self, song: &mut Song, params: &Params, ctx: &PluginContext) -> anyhow::Result<()>;

    /// The `(providerId, pluginId)` pair of this plugin.
    fn identity(&self) -> PluginIdentity {
        PluginIdentity::new(self.provider_id(), self.plugin_id())
    }
}

/// The `(providerId, pluginId)` pair identifying a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginIdentity {
    pub provider_id: String,
    pub plugin_id: String,
}

impl PluginIdentity {
    pub fn new(provider_id: &str, plugin_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            plugin_id: plugin_id.to_string(),
        }
    }

    pub fn matches(&self, provider_id: &str, plugin_id: &str) -> bool {
        self.provider_id == provider_id && self.plugin_id == plugin_id
    }
}

impl fmt::Display for PluginIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider_id, self.plugin_id)
    }
}

impl FromStr for PluginIdentity {
    type Err = DevkitError;

    /// Parse `provider/plugin`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((provider, plugin)) if !provider.is_empty() && !plugin.is_empty() => {
                Ok(Self::new(provider, plugin))
            }
            _ => Err(DevkitError::Config(format!(
                "Invalid plugin reference '{}': expected <providerId>/<pluginId>",
                s
            ))),
        }
    }
}

/// Widget used by the host to edit a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WidgetType {
    None,
    Input,
    InputNumber,
    Switch,
    Select,
    SliderNumber,
    TrackSelector,
    MultiTrackSelector,
    Pitch,
    TextArea,
}

/// Widget selection plus its widget-specific config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetDescriptor {
    #[serde(rename = "type")]
    pub widget_type: WidgetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<rmpv::Value>,
}

impl WidgetDescriptor {
    pub fn new(widget_type: WidgetType) -> Self {
        Self {
            widget_type,
            config: None,
        }
    }

    pub fn with_config(mut self, config: rmpv::Value) -> Self {
        self.config = Some(config);
        self
    }
}

/// Schema entry for one plugin parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamDescriptor {
    pub display_name: LabelText,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<LabelText>,

    /// Value used when the caller has not chosen one yet.
    pub default_value: rmpv::Value,

    pub widget: WidgetDescriptor,

    #[serde(default)]
    pub optional: bool,

    #[serde(default)]
    pub hidden: bool,

    /// Whether the host may offer to re-run with a tweaked value.
    #[serde(default = "default_adjustable")]
    pub adjustable: bool,
}

fn default_adjustable() -> bool {
    true
}

impl ParamDescriptor {
    pub fn new(
        display_name: impl Into<LabelText>,
        default_value: impl Into<rmpv::Value>,
        widget: WidgetDescriptor,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            description: None,
            default_value: default_value.into(),
            widget,
            optional: false,
            hidden: false,
            adjustable: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<LabelText>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// Default values derived from a parameter schema.
pub fn default_params(config: &ParamsConfig) -> Params {
    config
        .iter()
        .map(|(name, descriptor)| (name.clone(), descriptor.default_value.clone()))
        .collect()
}
