//! Plugins compiled into the devkit binary.

use crate::engine::PluginContext;
use crate::song::Song;

use super::types::{Params, SongPlugin};

/// A plugin that accepts no parameters and leaves the song untouched.
///
/// Handy for checking that a host can reach the devkit at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct HelloWorldPlugin;

impl SongPlugin for HelloWorldPlugin {
    fn provider_id(&self) -> &str {
        "andantei"
    }

    fn plugin_id(&self) -> &str {
        "hello-world"
    }

    fn run(&self, _song: &mut Song, _params: &Params, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Manifest entry matching [`HelloWorldPlugin`], used when no bundle file
/// is given on the command line.
pub const HELLO_WORLD_BUNDLE: &str = r#"{
  "plugins": [
    {
      "providerId": "andantei",
      "pluginId": "hello-world",
      "providerDisplayName": "Andantei",
      "pluginDisplayName": { "en": "Hello World", "zh": "你好世界" },
      "pluginDescription": { "en": "A plugin that does nothing", "zh": "什么也不做的插件" },
      "version": "1.0.0",
      "triggers": [{ "type": "song" }]
    }
  ]
}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{BundleManifest, PluginRegistry};
    use std::sync::Arc;

    #[test]
    fn test_builtin_bundle_matches_plugin() {
        let manifest = BundleManifest::from_json_str(HELLO_WORLD_BUNDLE).unwrap();
        let registry =
            PluginRegistry::register(vec![Arc::new(HelloWorldPlugin)], manifest).unwrap();
        assert!(registry.resolve("andantei", "hello-world").is_ok());
    }

    #[test]
    fn test_hello_world_is_noop() {
        let mut song = Song::new();
        song.set("title", "untouched");
        let before = song.clone();
        HelloWorldPlugin
            .run(&mut song, &Params::new(), &PluginContext::detached())
            .unwrap();
        assert_eq!(song, before);
    }
}
