//! Plugin execution engine.
//!
//! Runs the two plugin phases, schema initialization and song transform, on
//! tokio's blocking pool so plugin code never occupies the threads that
//! accept connections and pump sockets. A semaphore bounds how many plugin
//! calls run at once.
//!
//! This is the only place plugin code is invoked. Whatever a plugin does
//! wrong (returns an error, panics) comes back as a [`PluginFault`] and goes
//! no further: callers turn it into a status code, the fault itself is
//! logged here and optionally handed to the host's exception hook.

mod context;

pub use context::{CallbackChannel, PluginContext, GET_AVAILABLE_EXTENSIONS};

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error};

use crate::plugins::{default_params, Params, ParamsConfig, PluginIdentity, SongPlugin};
use crate::song::Song;

/// Which plugin phase a fault happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialize,
    Execute,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Initialize => write!(f, "init"),
            Phase::Execute => write!(f, "run"),
        }
    }
}

/// A failure raised by plugin code, captured at the engine boundary.
#[derive(Debug)]
pub struct PluginFault {
    pub phase: Phase,
    pub plugin: PluginIdentity,
    /// The original error or panic message. Never sent over the wire.
    pub error: anyhow::Error,
}

impl fmt::Display for PluginFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed during {}: {:#}",
            self.plugin, self.phase, self.error
        )
    }
}

/// Output of a successful initialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Initialized {
    pub params_config: ParamsConfig,
    /// Defaults derived from `params_config`.
    pub params: Params,
}

/// Runs plugin phases off the async executor.
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    permits: Arc<Semaphore>,
    max_workers: usize,
}

impl ExecutionEngine {
    /// Create an engine running at most `max_workers` plugin calls at once.
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Ask `plugin` for its parameter schema against `song` and derive the
    /// default parameter values.
    pub async fn initialize(
        &self,
        plugin: Arc<dyn SongPlugin>,
        song: Song,
        ctx: PluginContext,
    ) -> Result<Initialized, PluginFault> {
        let identity = plugin.identity();
        self.offload(Phase::Initialize, identity, move || {
            let params_config = plugin.params(&song, &ctx)?;
            let params = default_params(&params_config);
            Ok(Initialized {
                params_config,
                params,
            })
        })
        .await
    }

    /// Run `plugin` over `song` and return the transformed song. On failure
    /// the partially transformed song is dropped.
    pub async fn execute(
        &self,
        plugin: Arc<dyn SongPlugin>,
        song: Song,
        params: Params,
        ctx: PluginContext,
    ) -> Result<Song, PluginFault> {
        let identity = plugin.identity();
        self.offload(Phase::Execute, identity, move || {
            let mut song = song;
            plugin.run(&mut song, &params, &ctx)?;
            Ok(song)
        })
        .await
    }

    async fn offload<T, F>(
        &self,
        phase: Phase,
        plugin: PluginIdentity,
        f: F,
    ) -> Result<T, PluginFault>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                let error = anyhow::anyhow!("worker pool closed: {}", e);
                return Err(self.fault(phase, plugin, error));
            }
        };

        debug!(plugin = %plugin, phase = %phase, "Dispatching plugin phase");
        let outcome = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await;

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.fault(phase, plugin, e)),
            Err(join_err) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                Err(self.fault(
                    phase,
                    plugin,
                    anyhow::anyhow!("plugin panicked: {}", message),
                ))
            }
            Err(join_err) => Err(self.fault(
                phase,
                plugin,
                anyhow::anyhow!("plugin task cancelled: {}", join_err),
            )),
        }
    }

    fn fault(&self, phase: Phase, plugin: PluginIdentity, error: anyhow::Error) -> PluginFault {
        error!(
            plugin = %plugin,
            phase = %phase,
            error = ?error,
            "Plugin raised an exception"
        );
        PluginFault {
            phase,
            plugin,
            error,
        }
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new(default_workers())
    }
}

/// Available parallelism, at least one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
