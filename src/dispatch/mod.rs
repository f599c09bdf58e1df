//! Job dispatch for the TuneFlow DevKit
//!
//! The dispatcher sits between a transport (HTTP runner or debugger socket)
//! and the [`ExecutionEngine`]. For every request it:
//!
//! 1. resolves the plugin (`NotFound` short-circuits),
//! 2. asks the host authorizer (`Unauthorized` short-circuits),
//! 3. decodes the song,
//! 4. runs the phase on the engine, or for async runs, hands back a job id
//!    and runs it in the background, uploading the result when done.
//!
//! Whether runs are sync or async is fixed when the dispatcher is built.

pub mod hooks;
pub mod store;

pub use hooks::{
    AuthRejection, AuthRequest, Authorizer, BearerTokenAuthorizer, ExceptionHook, RequestKind,
    ResultStore,
};
pub use store::HttpResultStore;

use std::sync::Arc;

use axum::http::HeaderMap;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::DevkitConfig;
use crate::engine::{ExecutionEngine, Initialized, Phase, PluginContext, PluginFault};
use crate::error::Result;
use crate::plugins::{Params, PluginRegistry, SongPlugin};
use crate::protocol::{InitPluginRequest, Response, RunPluginRequest, Status};
use crate::song::Song;

/// Host-supplied behaviour. Every field is optional.
#[derive(Clone, Default)]
pub struct DispatcherOptions {
    /// Checked before any plugin code runs. `None` allows everything.
    pub authorizer: Option<Arc<dyn Authorizer>>,
    /// Enables async mode when set.
    pub result_store: Option<Arc<dyn ResultStore>>,
    /// Receives run faults.
    pub exception_hook: Option<Arc<dyn ExceptionHook>>,
}

impl DispatcherOptions {
    /// Options implied by `config`: an HTTP result store if one is configured.
    pub fn from_config(config: &DevkitConfig) -> Result<Self> {
        let result_store = match &config.async_store {
            Some(store) => {
                let store: Arc<dyn ResultStore> = Arc::new(HttpResultStore::new(store)?);
                Some(store)
            }
            None => None,
        };
        Ok(Self {
            result_store,
            ..Default::default()
        })
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn with_result_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.result_store = Some(store);
        self
    }

    pub fn with_exception_hook(mut self, hook: Arc<dyn ExceptionHook>) -> Self {
        self.exception_hook = Some(hook);
        self
    }
}

/// Outcome of one init or run request. Never partially populated.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Initialized(Initialized),
    /// Encoded song after a successful run.
    Completed(Vec<u8>),
    InitError,
    RunError,
    NotFound { provider_id: String, plugin_id: String },
    Unauthorized(AuthRejection),
    BadRequest(String),
}

/// How plugin faults are reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultReporting {
    /// Both phases report `ERROR` (runner).
    Collapsed,
    /// `INIT_PLUGIN_EXCEPTION` / `RUN_PLUGIN_EXCEPTION` (debugger).
    PerPhase,
}

impl ExecutionResult {
    pub fn status(&self, faults: FaultReporting) -> Status {
        match (self, faults) {
            (Self::Initialized(_) | Self::Completed(_), _) => Status::Ok,
            (Self::InitError | Self::RunError, FaultReporting::Collapsed) => Status::Error,
            (Self::InitError, FaultReporting::PerPhase) => Status::InitPluginException,
            (Self::RunError, FaultReporting::PerPhase) => Status::RunPluginException,
            (Self::NotFound { .. }, _) => Status::NotFound,
            (Self::Unauthorized(_), _) => Status::Unauthorized,
            (Self::BadRequest(_), _) => Status::BadRequest,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Initialized(_) | Self::Completed(_))
    }

    /// The wire response for this result.
    pub fn into_response(self, faults: FaultReporting) -> Response {
        let status = self.status(faults);
        match self {
            Self::Initialized(init) => Response::initialized(init),
            Self::Completed(song) => Response::song(song),
            Self::InitError | Self::RunError => Response::status(status),
            Self::NotFound {
                provider_id,
                plugin_id,
            } => Response::failure(
                status,
                format!("Cannot find plugin by id {} {}", provider_id, plugin_id),
            ),
            Self::Unauthorized(rejection) => Response::failure(status, rejection.message),
            Self::BadRequest(message) => Response::failure(status, message),
        }
    }
}

/// An accepted async run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    /// Where the result will be available once uploaded.
    pub result_url: String,
}

/// What a run request produced.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Done(ExecutionResult),
    Accepted(Job),
}

#[derive(Clone)]
enum DispatchMode {
    Sync,
    Async(Arc<dyn ResultStore>),
}

/// Routes init and run requests to plugins.
#[derive(Clone)]
pub struct JobDispatcher {
    registry: Arc<PluginRegistry>,
    engine: ExecutionEngine,
    mode: DispatchMode,
    authorizer: Option<Arc<dyn Authorizer>>,
    exception_hook: Option<Arc<dyn ExceptionHook>>,
}

impl JobDispatcher {
    pub fn new(
        registry: Arc<PluginRegistry>,
        engine: ExecutionEngine,
        options: DispatcherOptions,
    ) -> Self {
        let mode = match options.result_store {
            Some(store) => DispatchMode::Async(store),
            None => DispatchMode::Sync,
        };
        Self {
            registry,
            engine,
            mode,
            authorizer: options.authorizer,
            exception_hook: options.exception_hook,
        }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn is_async(&self) -> bool {
        matches!(self.mode, DispatchMode::Async(_))
    }

    /// Run the host authorizer, if any.
    pub async fn authorize(&self, request: &AuthRequest) -> std::result::Result<(), AuthRejection> {
        match &self.authorizer {
            Some(authorizer) => {
                let verdict = authorizer.authorize(request).await;
                if let Err(rejection) = &verdict {
                    warn!(
                        provider_id = %request.provider_id,
                        plugin_id = %request.plugin_id,
                        status = %rejection.status,
                        "Request rejected by authorizer"
                    );
                }
                verdict
            }
            None => Ok(()),
        }
    }

    /// Handle `init-plugin-params`.
    pub async fn init_plugin(
        &self,
        request: InitPluginRequest,
        headers: HeaderMap,
    ) -> ExecutionResult {
        let plugin = match self
            .admit(
                RequestKind::InitPlugin,
                &request.provider_id,
                &request.plugin_id,
                headers,
            )
            .await
        {
            Ok(plugin) => plugin,
            Err(result) => return result,
        };
        let song = match Song::from_bytes(&request.song) {
            Ok(song) => song,
            Err(e) => return ExecutionResult::BadRequest(e.to_string()),
        };
        self.initialize(plugin, song, PluginContext::detached()).await
    }

    /// Handle `jobs`. In async mode this returns as soon as the job is
    /// scheduled.
    pub async fn run_job(&self, request: RunPluginRequest, headers: HeaderMap) -> DispatchOutcome {
        let plugin = match self
            .admit(
                RequestKind::RunPlugin,
                &request.provider_id,
                &request.plugin_id,
                headers,
            )
            .await
        {
            Ok(plugin) => plugin,
            Err(result) => return DispatchOutcome::Done(result),
        };
        let song = match Song::from_bytes(&request.song) {
            Ok(song) => song,
            Err(e) => return DispatchOutcome::Done(ExecutionResult::BadRequest(e.to_string())),
        };

        match &self.mode {
            DispatchMode::Sync => DispatchOutcome::Done(
                self.execute(plugin, song, request.params, PluginContext::detached())
                    .await,
            ),
            DispatchMode::Async(store) => {
                let id = Uuid::new_v4().to_string();
                let job = Job {
                    result_url: store.result_url(&id),
                    id,
                };
                info!(job_id = %job.id, plugin = %plugin.identity(), "Accepted async job");

                let dispatcher = self.clone();
                let store = Arc::clone(store);
                let job_id = job.id.clone();
                tokio::spawn(async move {
                    dispatcher
                        .complete_job(store, job_id, plugin, song, request.params)
                        .await;
                });
                DispatchOutcome::Accepted(job)
            }
        }
    }

    /// Run the schema phase and map a fault to `InitError`.
    pub async fn initialize(
        &self,
        plugin: Arc<dyn SongPlugin>,
        song: Song,
        ctx: PluginContext,
    ) -> ExecutionResult {
        match self.engine.initialize(plugin, song, ctx).await {
            Ok(init) => ExecutionResult::Initialized(init),
            Err(_fault) => ExecutionResult::InitError,
        }
    }

    /// Run the transform phase, encode the song, and map a fault to
    /// `RunError` after handing it to the exception hook.
    pub async fn execute(
        &self,
        plugin: Arc<dyn SongPlugin>,
        song: Song,
        params: Params,
        ctx: PluginContext,
    ) -> ExecutionResult {
        let identity = plugin.identity();
        match self.engine.execute(plugin, song, params, ctx).await {
            Ok(song) => match song.to_bytes() {
                Ok(bytes) => ExecutionResult::Completed(bytes),
                Err(e) => {
                    error!(plugin = %identity, error = %e, "Failed to encode song after run");
                    self.report_fault(&PluginFault {
                        phase: Phase::Execute,
                        plugin: identity,
                        error: e.into(),
                    });
                    ExecutionResult::RunError
                }
            },
            Err(fault) => {
                self.report_fault(&fault);
                ExecutionResult::RunError
            }
        }
    }

    fn report_fault(&self, fault: &PluginFault) {
        if let Some(hook) = &self.exception_hook {
            hook.on_fault(fault);
        }
    }

    /// Resolve, then authorize.
    async fn admit(
        &self,
        kind: RequestKind,
        provider_id: &str,
        plugin_id: &str,
        headers: HeaderMap,
    ) -> std::result::Result<Arc<dyn SongPlugin>, ExecutionResult> {
        let entry = self.registry.resolve(provider_id, plugin_id).map_err(|_| {
            warn!(provider_id, plugin_id, "Unknown plugin requested");
            ExecutionResult::NotFound {
                provider_id: provider_id.to_string(),
                plugin_id: plugin_id.to_string(),
            }
        })?;

        let request = AuthRequest {
            kind,
            provider_id: provider_id.to_string(),
            plugin_id: plugin_id.to_string(),
            headers,
        };
        self.authorize(&request)
            .await
            .map_err(ExecutionResult::Unauthorized)?;

        Ok(Arc::clone(&entry.plugin))
    }

    async fn complete_job(
        &self,
        store: Arc<dyn ResultStore>,
        job_id: String,
        plugin: Arc<dyn SongPlugin>,
        song: Song,
        params: Params,
    ) {
        let result = self
            .execute(plugin, song, params, PluginContext::detached())
            .await;
        let response = result
            .into_response(FaultReporting::Collapsed)
            .with_job_id(&job_id);

        let payload = match response.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to encode job result");
                return;
            }
        };

        match store.upload(&job_id, payload).await {
            Ok(()) => info!(job_id = %job_id, status = ?response.status, "Uploaded job result"),
            Err(e) => error!(job_id = %job_id, error = %e, "Failed to upload job result"),
        }
    }
}
