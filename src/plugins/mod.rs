//! Plugin system for the TuneFlow DevKit
//!
//! Song-transform plugins are Rust types implementing [`SongPlugin`]. A
//! bundle ships one or more of them together with a `bundle.json` manifest
//! holding their display metadata. The [`PluginRegistry`] checks code and
//! manifest against each other once, at startup, and then serves lookups
//! for every request.
//!
//! # Architecture
//!
//! - **types**: The plugin capability trait, identities and parameter schema
//! - **manifest**: Bundle manifest parsing and the plugin info banner
//! - **validation**: Provider/plugin identifier rules
//! - **registry**: Immutable identity lookup with bundle consistency checks
//! - **builtin**: Plugins shipped with the devkit binary
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use tuneflow_devkit::plugins::{HelloWorldPlugin, PluginRegistry};
//!
//! let registry = PluginRegistry::from_manifest_file(
//!     vec![Arc::new(HelloWorldPlugin)],
//!     Path::new("bundle.json"),
//! )
//! .unwrap();
//!
//! println!("Loaded {} plugins", registry.len());
//! ```

pub mod builtin;
pub mod manifest;
pub mod registry;
pub mod types;
pub mod validation;

pub use builtin::{HelloWorldPlugin, HELLO_WORLD_BUNDLE};
pub use manifest::{describe_plugin, BundleManifest, PluginInfo};
pub use registry::{PluginRegistry, RegisteredPlugin};
pub use types::{
    default_params, ParamDescriptor, Params, ParamsConfig, PluginIdentity, SongPlugin,
    WidgetDescriptor, WidgetType,
};
pub use validation::{validate_identifier, validate_plugin, MAX_ID_LENGTH};
