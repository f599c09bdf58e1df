//! Per-connection debug session.
//!
//! A [`SessionChannel`] owns everything one connected caller can change:
//! the active song and the initialized plugin instance. It is created when
//! the socket connects, driven one request at a time, and dropped on
//! disconnect. Nothing in it is shared with other connections.
//!
//! ```text
//! Connected ──set-song──▶ SongSet ──init-plugin──▶ PluginInitialized
//!                            ▲                          │
//!                            └──────── set-song ────────┘
//! ```

use std::sync::Arc;

use axum::http::HeaderMap;
use rmpv::Value;
use tracing::{debug, info, warn};

use crate::dispatch::{AuthRequest, ExecutionResult, FaultReporting, JobDispatcher, RequestKind};
use crate::engine::{CallbackChannel, PluginContext};
use crate::error::DevkitError;
use crate::plugins::{default_params, Params, ParamsConfig, RegisteredPlugin};
use crate::protocol::{self, Envelope, EnvelopeKind, Response, RunPayload, SongPayload};
use crate::song::Song;

/// Caller event names.
pub mod events {
    pub const GET_BUNDLE_INFO: &str = "get-bundle-info";
    pub const SET_SONG: &str = "set-song";
    pub const INIT_PLUGIN: &str = "init-plugin";
    pub const RUN_PLUGIN: &str = "run-plugin";
}

/// A plugin initialized against the session's song.
#[derive(Debug, Clone)]
pub struct PluginInstance {
    pub params_config: ParamsConfig,
}

impl PluginInstance {
    /// Defaults from the schema overlaid with `params`.
    pub fn resolve_params(&self, params: Params) -> Params {
        let mut resolved = default_params(&self.params_config);
        resolved.extend(params);
        resolved
    }
}

/// The mutable state of one session.
#[derive(Debug, Default)]
pub struct Session {
    song: Option<Song>,
    instance: Option<PluginInstance>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active song. Any plugin instance was bound to the old
    /// song and is discarded.
    pub fn set_song(&mut self, song: Song) {
        self.reset_instance();
        self.song = Some(song);
    }

    pub fn song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    pub fn instance(&self) -> Option<&PluginInstance> {
        self.instance.as_ref()
    }

    /// Drop the plugin instance, keeping the song.
    pub fn reset_instance(&mut self) {
        if self.instance.take().is_some() {
            debug!("Discarded plugin instance for re-initialization");
        }
    }

    pub fn install(&mut self, instance: PluginInstance) {
        self.instance = Some(instance);
    }

    pub fn is_initialized(&self) -> bool {
        self.instance.is_some()
    }
}

/// Request handler for one connected caller.
pub struct SessionChannel {
    id: String,
    dispatcher: JobDispatcher,
    plugin: RegisteredPlugin,
    session: Session,
    callbacks: Arc<CallbackChannel>,
    headers: HeaderMap,
}

impl SessionChannel {
    /// `headers` are those of the connection request; they are shown to the
    /// authorizer on every init and run.
    pub fn new(
        id: String,
        dispatcher: JobDispatcher,
        plugin: RegisteredPlugin,
        callbacks: Arc<CallbackChannel>,
        headers: HeaderMap,
    ) -> Self {
        Self {
            id,
            dispatcher,
            plugin,
            session: Session::new(),
            callbacks,
            headers,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Answer one request envelope.
    pub async fn handle(&mut self, request: Envelope) -> Envelope {
        let response = if request.kind != EnvelopeKind::Request {
            Response::from_error(&DevkitError::BadRequest(
                "Expected a request envelope".to_string(),
            ))
        } else {
            let event = request.event.as_deref().unwrap_or_default();
            debug!(session = %self.id, id = request.id, event, "Handling request");
            match event {
                events::GET_BUNDLE_INFO => Response::plugin_info(self.plugin.info.clone()),
                events::SET_SONG => self.set_song(&request.payload),
                events::INIT_PLUGIN => self.init_plugin(&request.payload).await,
                events::RUN_PLUGIN => self.run_plugin(&request.payload).await,
                other => {
                    warn!(session = %self.id, event = other, "Unknown event");
                    Response::from_error(&DevkitError::BadRequest(format!(
                        "Unknown event '{}'",
                        other
                    )))
                }
            }
        };

        let payload = protocol::to_value(&response).unwrap_or_else(|e| {
            warn!(session = %self.id, error = %e, "Failed to encode response");
            Value::Nil
        });
        Envelope::response(request.id, payload)
    }

    fn set_song(&mut self, payload: &Value) -> Response {
        let song = match decode_song(payload) {
            Ok(Some(song)) => song,
            Ok(None) => {
                return Response::from_error(&DevkitError::BadRequest(
                    "set-song requires a song".to_string(),
                ))
            }
            Err(response) => return response,
        };
        self.session.set_song(song);
        info!(session = %self.id, "Song updated");
        Response::plugin_info(self.plugin.info.clone())
    }

    async fn init_plugin(&mut self, payload: &Value) -> Response {
        let incoming = match decode_song(payload) {
            Ok(song) => song,
            Err(response) => return response,
        };
        if incoming.is_none() && self.session.song().is_none() {
            return not_ready("song not ready");
        }
        if let Err(response) = self.authorize(RequestKind::InitPlugin).await {
            return response;
        }

        // Until this initialization succeeds the session has no instance.
        match incoming {
            Some(song) => self.session.set_song(song),
            None => self.session.reset_instance(),
        }
        let Some(song) = self.session.song().cloned() else {
            return not_ready("song not ready");
        };

        let result = self
            .dispatcher
            .initialize(Arc::clone(&self.plugin.plugin), song, self.context())
            .await;
        if let ExecutionResult::Initialized(init) = &result {
            self.session.install(PluginInstance {
                params_config: init.params_config.clone(),
            });
            info!(session = %self.id, "Plugin initialized");
        }
        result.into_response(FaultReporting::PerPhase)
    }

    async fn run_plugin(&mut self, payload: &Value) -> Response {
        let request: RunPayload = if payload.is_nil() {
            RunPayload::default()
        } else {
            match protocol::from_value(payload) {
                Ok(request) => request,
                Err(e) => return Response::from_error(&e),
            }
        };
        let song = match request.song {
            Some(bytes) => match Song::from_bytes(&bytes) {
                Ok(song) => Some(song),
                Err(e) => return Response::from_error(&e),
            },
            None => self.session.song().cloned(),
        };
        let (Some(song), Some(instance)) = (song, self.session.instance()) else {
            return not_ready("song or plugin not ready");
        };
        let params = instance.resolve_params(request.params);
        if let Err(response) = self.authorize(RequestKind::RunPlugin).await {
            return response;
        }

        let plugin = Arc::clone(&self.plugin.plugin);
        self.dispatcher
            .execute(plugin, song, params, self.context())
            .await
            .into_response(FaultReporting::PerPhase)
    }

    async fn authorize(&self, kind: RequestKind) -> std::result::Result<(), Response> {
        let request = AuthRequest {
            kind,
            provider_id: self.plugin.info.provider_id.clone(),
            plugin_id: self.plugin.info.plugin_id.clone(),
            headers: self.headers.clone(),
        };
        self.dispatcher
            .authorize(&request)
            .await
            .map_err(|rejection| {
                ExecutionResult::Unauthorized(rejection).into_response(FaultReporting::PerPhase)
            })
    }

    fn context(&self) -> PluginContext {
        PluginContext::with_callbacks(Arc::clone(&self.callbacks))
    }
}

fn not_ready(reason: &str) -> Response {
    Response::from_error(&DevkitError::NotReady(reason.to_string()))
}

/// Decode the optional `song` field of a `set-song` / `init-plugin` payload.
fn decode_song(payload: &Value) -> std::result::Result<Option<Song>, Response> {
    if payload.is_nil() {
        return Ok(None);
    }
    let payload: SongPayload =
        protocol::from_value(payload).map_err(|e| Response::from_error(&e))?;
    payload
        .song
        .map(|bytes| Song::from_bytes(&bytes))
        .transpose()
        .map_err(|e| Response::from_error(&e))
}
