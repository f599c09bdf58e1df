//! Plugin registry for the TuneFlow DevKit
//!
//! This module provides the `PluginRegistry` struct, which binds plugin code
//! to its bundle manifest entry. All validation happens once, when the
//! registry is built: identifiers must be well formed, every plugin must be
//! declared in the manifest, and every manifest entry must have code. A
//! registry that exists is therefore consistent, and it is never mutated
//! afterwards, so it can be shared freely between connections.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::error::{DevkitError, Result};

use super::manifest::{BundleManifest, PluginInfo};
use super::types::SongPlugin;
use super::validation::validate_plugin;

/// A plugin paired with its manifest metadata.
#[derive(Clone)]
pub struct RegisteredPlugin {
    pub info: PluginInfo,
    pub plugin: Arc<dyn SongPlugin>,
}

impl std::fmt::Debug for RegisteredPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredPlugin")
            .field("provider_id", &self.info.provider_id)
            .field("plugin_id", &self.info.plugin_id)
            .finish()
    }
}

/// Immutable lookup table from `(providerId, pluginId)` to plugin.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tuneflow_devkit::plugins::{BundleManifest, HelloWorldPlugin, PluginRegistry};
///
/// let manifest = BundleManifest::from_json_str(
///     r#"{"plugins": [{"providerId": "andantei", "pluginId": "hello-world"}]}"#,
/// ).unwrap();
/// let registry = PluginRegistry::register(vec![Arc::new(HelloWorldPlugin)], manifest).unwrap();
///
/// assert_eq!(registry.len(), 1);
/// assert!(registry.resolve("andantei", "hello-world").is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    /// Entries in manifest order.
    entries: Vec<RegisteredPlugin>,
    manifest: BundleManifest,
}

impl PluginRegistry {
    /// Validate `plugins` against `manifest` and build the registry.
    ///
    /// # Errors
    /// - `InvalidIdentifier` if a plugin id or provider id is malformed
    /// - `DuplicatePlugin` if two plugins share an identity
    /// - `MissingManifestEntry` if a plugin is not declared in the manifest
    /// - `OrphanManifestEntry` if a manifest entry has no plugin
    pub fn register(plugins: Vec<Arc<dyn SongPlugin>>, manifest: BundleManifest) -> Result<Self> {
        for (idx, plugin) in plugins.iter().enumerate() {
            validate_plugin(plugin.as_ref())?;

            let duplicate = plugins[..idx].iter().any(|other| {
                other.provider_id() == plugin.provider_id()
                    && other.plugin_id() == plugin.plugin_id()
            });
            if duplicate {
                return Err(DevkitError::DuplicatePlugin {
                    provider_id: plugin.provider_id().to_string(),
                    plugin_id: plugin.plugin_id().to_string(),
                });
            }

            if manifest
                .find(plugin.provider_id(), plugin.plugin_id())
                .is_none()
            {
                return Err(DevkitError::MissingManifestEntry {
                    provider_id: plugin.provider_id().to_string(),
                    plugin_id: plugin.plugin_id().to_string(),
                });
            }
        }

        let mut entries = Vec::with_capacity(manifest.plugins().len());
        for info in manifest.plugins() {
            let plugin = plugins
                .iter()
                .find(|p| info.matches(p.provider_id(), p.plugin_id()))
                .ok_or_else(|| DevkitError::OrphanManifestEntry {
                    provider_id: info.provider_id.clone(),
                    plugin_id: info.plugin_id.clone(),
                })?;

            // Repeated manifest entries resolve to the first one.
            if entries
                .iter()
                .any(|e: &RegisteredPlugin| e.info.matches(&info.provider_id, &info.plugin_id))
            {
                continue;
            }

            info!(
                provider_id = %info.provider_id,
                plugin_id = %info.plugin_id,
                "Registered plugin"
            );
            entries.push(RegisteredPlugin {
                info: info.clone(),
                plugin: Arc::clone(plugin),
            });
        }

        Ok(Self { entries, manifest })
    }

    /// Load the manifest at `path` and register `plugins` against it.
    pub fn from_manifest_file(plugins: Vec<Arc<dyn SongPlugin>>, path: &Path) -> Result<Self> {
        let manifest = BundleManifest::load(path)?;
        Self::register(plugins, manifest)
    }

    /// Look up a plugin by identity.
    pub fn resolve(&self, provider_id: &str, plugin_id: &str) -> Result<&RegisteredPlugin> {
        self.entries
            .iter()
            .find(|e| e.info.matches(provider_id, plugin_id))
            .ok_or_else(|| DevkitError::NotFound {
                provider_id: provider_id.to_string(),
                plugin_id: plugin_id.to_string(),
            })
    }

    /// The manifest this registry was validated against.
    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    /// Registered plugins in manifest order.
    pub fn entries(&self) -> &[RegisteredPlugin] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PluginContext;
    use crate::plugins::types::Params;
    use crate::song::Song;
    use crate::utils::translate::LabelText;
    use serde_json::json;

    struct TestPlugin {
        provider: String,
        plugin: String,
    }

    impl SongPlugin for TestPlugin {
        fn provider_id(&self) -> &str {
            &self.provider
        }
        fn plugin_id(&self) -> &str {
            &self.plugin
        }
        fn run(&self, _: &mut Song, _: &Params, _: &PluginContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn plugin(provider: &str, id: &str) -> Arc<dyn SongPlugin> {
        Arc::new(TestPlugin {
            provider: provider.to_string(),
            plugin: id.to_string(),
        })
    }

    fn manifest(ids: &[(&str, &str)]) -> BundleManifest {
        let plugins: Vec<_> = ids
            .iter()
            .map(|(provider, id)| {
                json!({
                    "providerId": provider,
                    "pluginId": id,
                    "pluginDisplayName": format!("Plugin {}", id),
                })
            })
            .collect();
        BundleManifest::from_value(json!({ "plugins": plugins })).unwrap()
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = PluginRegistry::register(
            vec![plugin("acme", "alpha"), plugin("acme", "beta")],
            manifest(&[("acme", "alpha"), ("acme", "beta")]),
        )
        .unwrap();

        assert_eq!(registry.len(), 2);
        let found = registry.resolve("acme", "beta").unwrap();
        assert_eq!(found.plugin.plugin_id(), "beta");
        assert_eq!(
            found.info.plugin_display_name,
            LabelText::from("Plugin beta")
        );
    }

    #[test]
    fn test_resolve_not_found() {
        let manifest = manifest(&[("acme", "alpha")]);
        let registry = PluginRegistry::register(vec![plugin("acme", "alpha")], manifest).unwrap();

        let err = registry.resolve("acme", "gamma").unwrap_err();
        assert!(matches!(err, DevkitError::NotFound { .. }));
        assert!(registry.resolve("other", "alpha").is_err());
    }

    #[test]
    fn test_entries_follow_manifest_order() {
        let registry = PluginRegistry::register(
            vec![plugin("acme", "beta"), plugin("acme", "alpha")],
            manifest(&[("acme", "alpha"), ("acme", "beta")]),
        )
        .unwrap();

        let ids: Vec<_> = registry
            .entries()
            .iter()
            .map(|e| e.info.plugin_id.as_str())
            .collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_missing_manifest_entry() {
        let err = PluginRegistry::register(
            vec![plugin("acme", "alpha"), plugin("acme", "beta")],
            manifest(&[("acme", "alpha")]),
        )
        .unwrap_err();

        match err {
            DevkitError::MissingManifestEntry {
                provider_id,
                plugin_id,
            } => {
                assert_eq!(provider_id, "acme");
                assert_eq!(plugin_id, "beta");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_orphan_manifest_entry() {
        let err = PluginRegistry::register(
            vec![plugin("acme", "alpha")],
            manifest(&[("acme", "alpha"), ("acme", "ghost")]),
        )
        .unwrap_err();

        assert!(matches!(err, DevkitError::OrphanManifestEntry { .. }));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_invalid_identifier_fails_registration() {
        let err = PluginRegistry::register(
            vec![plugin("0acme", "alpha")],
            manifest(&[("0acme", "alpha")]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DevkitError::InvalidIdentifier {
                field: "providerId",
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_plugin_rejected() {
        let err = PluginRegistry::register(
            vec![plugin("acme", "alpha"), plugin("acme", "alpha")],
            manifest(&[("acme", "alpha")]),
        )
        .unwrap_err();
        assert!(matches!(err, DevkitError::DuplicatePlugin { .. }));
    }

    #[test]
    fn test_repeated_manifest_entry_resolves_to_first() {
        let raw = json!({
            "plugins": [
                { "providerId": "acme", "pluginId": "alpha", "pluginDisplayName": "First" },
                { "providerId": "acme", "pluginId": "alpha", "pluginDisplayName": "Second" },
            ]
        });
        let registry = PluginRegistry::register(
            vec![plugin("acme", "alpha")],
            BundleManifest::from_value(raw).unwrap(),
        )
        .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.resolve("acme", "alpha").unwrap().info.plugin_display_name,
            LabelText::from("First")
        );
    }

    #[test]
    fn test_empty_registry() {
        let registry = PluginRegistry::register(vec![], manifest(&[])).unwrap();
        assert!(registry.is_empty());
    }
}
