use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tuneflow_devkit::gateway::{runner, Debugger};
use tuneflow_devkit::plugins::{
    BundleManifest, HelloWorldPlugin, PluginIdentity, PluginRegistry, SongPlugin,
    HELLO_WORLD_BUNDLE,
};
use tuneflow_devkit::{DevkitConfig, DispatcherOptions, ExecutionEngine, JobDispatcher};

#[derive(Parser)]
#[command(name = "tuneflow-devkit")]
#[command(about = "Debug and serve TuneFlow song-transform plugins", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the bundle over stateless HTTP routes
    Runner {
        /// Bundle manifest (defaults to the built-in bundle)
        #[arg(short, long)]
        bundle: Option<PathBuf>,
        /// Config file (defaults to ~/.tuneflow-devkit/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Route prefix
        #[arg(long)]
        prefix: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Debug one plugin over a WebSocket session
    Debugger {
        #[arg(short, long)]
        bundle: Option<PathBuf>,
        /// Plugin to debug as provider/plugin (defaults to the first in the bundle)
        #[arg(long)]
        plugin: Option<String>,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Check a bundle manifest against the built-in plugins
    Validate {
        #[arg(short, long)]
        bundle: Option<PathBuf>,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Some(Commands::Version) | None => {
            println!("tuneflow-devkit {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Validate { bundle }) => {
            let registry = load_registry(bundle.as_deref())?;
            for entry in registry.entries() {
                println!("ok  {}/{}", entry.info.provider_id, entry.info.plugin_id);
            }
            println!("{} plugin(s) validated", registry.len());
        }
        Some(Commands::Runner {
            bundle,
            config,
            prefix,
            port,
        }) => {
            let mut config = DevkitConfig::load(config.as_deref())?;
            if let Some(prefix) = prefix {
                config.path_prefix = prefix;
            }
            if let Some(port) = port {
                config.port = port;
            }

            let dispatcher = build_dispatcher(bundle.as_deref(), &config)?;
            runner::serve(dispatcher, &config, shutdown_signal())
                .await
                .context("Runner failed")?;
        }
        Some(Commands::Debugger {
            bundle,
            plugin,
            config,
            port,
        }) => {
            let mut config = DevkitConfig::load(config.as_deref())?;
            if let Some(port) = port {
                config.port = port;
            }
            let selected = plugin
                .map(|p| p.parse::<PluginIdentity>())
                .transpose()?;

            let dispatcher = build_dispatcher(bundle.as_deref(), &config)?;
            let debugger = Debugger::new(dispatcher, selected.as_ref(), &config)?;
            debugger
                .serve(&config, shutdown_signal())
                .await
                .context("Debugger failed")?;
        }
    }

    Ok(())
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Plugins compiled into this binary.
fn builtin_plugins() -> Vec<Arc<dyn SongPlugin>> {
    vec![Arc::new(HelloWorldPlugin)]
}

fn load_registry(bundle: Option<&Path>) -> anyhow::Result<PluginRegistry> {
    let manifest = match bundle {
        Some(path) => BundleManifest::load(path)?,
        None => BundleManifest::from_json_str(HELLO_WORLD_BUNDLE)?,
    };
    PluginRegistry::register(builtin_plugins(), manifest).context("Bundle validation failed")
}

fn build_dispatcher(bundle: Option<&Path>, config: &DevkitConfig) -> anyhow::Result<JobDispatcher> {
    let registry = Arc::new(load_registry(bundle)?);
    let engine = ExecutionEngine::new(config.max_workers);
    info!(
        plugins = registry.len(),
        workers = engine.max_workers(),
        "Bundle loaded"
    );
    let options = DispatcherOptions::from_config(config)?;
    Ok(JobDispatcher::new(registry, engine, options))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
