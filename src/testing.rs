//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use crate::engine::PluginContext;
use crate::plugins::{
    BundleManifest, ParamDescriptor, Params, ParamsConfig, PluginRegistry, SongPlugin,
    WidgetDescriptor, WidgetType,
};
use crate::song::Song;

/// Counts calls and stamps songs so tests can see whether plugin code ran.
#[derive(Default)]
pub struct Recording {
    pub params_calls: AtomicUsize,
    pub run_calls: AtomicUsize,
    /// `params` fails once it has succeeded this many times.
    pub params_limit: Option<usize>,
}

impl Recording {
    pub fn with_params_limit(limit: usize) -> Self {
        Self {
            params_limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.params_calls.load(Ordering::SeqCst) + self.run_calls.load(Ordering::SeqCst)
    }
}

impl SongPlugin for Recording {
    fn provider_id(&self) -> &str {
        "test"
    }
    fn plugin_id(&self) -> &str {
        "recording"
    }
    fn params(&self, _: &Song, _: &PluginContext) -> anyhow::Result<ParamsConfig> {
        let previous = self.params_calls.fetch_add(1, Ordering::SeqCst);
        if self.params_limit.is_some_and(|limit| previous >= limit) {
            anyhow::bail!("schema no longer available");
        }
        let mut config = ParamsConfig::new();
        config.insert(
            "amount".to_string(),
            ParamDescriptor::new("Amount", 1, WidgetDescriptor::new(WidgetType::SliderNumber)),
        );
        Ok(config)
    }
    fn run(&self, song: &mut Song, params: &Params, _: &PluginContext) -> anyhow::Result<()> {
        let run = self.run_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let amount = params
            .get("amount")
            .and_then(rmpv::Value::as_i64)
            .unwrap_or(0);
        song.set("amount", amount);
        song.set("runs", run as u64);
        Ok(())
    }
}

/// Fails both phases, by error or by panic.
pub struct Faulty {
    pub panics: bool,
}

impl SongPlugin for Faulty {
    fn provider_id(&self) -> &str {
        "test"
    }
    fn plugin_id(&self) -> &str {
        "faulty"
    }
    fn params(&self, _: &Song, _: &PluginContext) -> anyhow::Result<ParamsConfig> {
        if self.panics {
            panic!("secret init detail");
        }
        anyhow::bail!("secret init detail")
    }
    fn run(&self, _: &mut Song, _: &Params, _: &PluginContext) -> anyhow::Result<()> {
        if self.panics {
            panic!("secret run detail");
        }
        anyhow::bail!("secret run detail")
    }
}

/// Asks the caller for its extensions and writes the answer into the song.
pub struct Extensions;

impl SongPlugin for Extensions {
    fn provider_id(&self) -> &str {
        "test"
    }
    fn plugin_id(&self) -> &str {
        "extensions"
    }
    fn run(&self, song: &mut Song, _: &Params, ctx: &PluginContext) -> anyhow::Result<()> {
        let reply = ctx.available_extensions()?;
        song.set("extensions", reply);
        Ok(())
    }
}

/// Registry of `recording`, `faulty` and `extensions`, in that order.
pub fn registry(recording: Arc<Recording>) -> Arc<PluginRegistry> {
    let plugins: Vec<Arc<dyn SongPlugin>> = vec![
        recording,
        Arc::new(Faulty { panics: false }),
        Arc::new(Extensions),
    ];
    let manifest = BundleManifest::from_value(json!({
        "plugins": [
            { "providerId": "test", "pluginId": "recording", "pluginDisplayName": "Recording" },
            { "providerId": "test", "pluginId": "faulty", "pluginDisplayName": "Faulty" },
            { "providerId": "test", "pluginId": "extensions", "pluginDisplayName": "Extensions" },
        ]
    }))
    .unwrap();
    Arc::new(PluginRegistry::register(plugins, manifest).unwrap())
}

/// Encode a song with a single `title` field.
pub fn titled_song(title: &str) -> Vec<u8> {
    let mut song = Song::new();
    song.set("title", title);
    song.to_bytes().unwrap()
}
