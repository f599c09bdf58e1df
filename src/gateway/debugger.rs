//! Interactive debugger for a single plugin.
//!
//! The host connects a WebSocket to `/daw` and drives one [`SessionChannel`]
//! per connection. Every binary frame carries one MessagePack [`Envelope`].
//! Each connection runs three pieces:
//!
//! - a writer task draining an mpsc queue into the socket,
//! - a session task answering caller requests one at a time,
//! - the reader loop, which routes caller replies straight to the
//!   [`CallbackChannel`] so a plugin blocked on a query can be woken while
//!   the session task is busy running it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::DevkitConfig;
use crate::dispatch::JobDispatcher;
use crate::engine::CallbackChannel;
use crate::error::{DevkitError, Result};
use crate::plugins::{describe_plugin, PluginIdentity, RegisteredPlugin};
use crate::protocol::{Envelope, EnvelopeKind};
use crate::utils::translate::{system_language, translate_label, LabelText};

use super::session::SessionChannel;

/// Path of the debugger socket.
pub const DEBUGGER_PATH: &str = "/daw";

const RULE: &str = "===========================================================================";

#[derive(Clone)]
struct DebuggerState {
    dispatcher: JobDispatcher,
    plugin: RegisteredPlugin,
    callback_timeout: Duration,
    max_message_bytes: usize,
    connections: Arc<AtomicU64>,
}

/// Debug server bound to one plugin of a registry.
pub struct Debugger {
    state: DebuggerState,
}

impl Debugger {
    /// Debug `selected`, or the first plugin of the bundle when `None`.
    pub fn new(
        dispatcher: JobDispatcher,
        selected: Option<&PluginIdentity>,
        config: &DevkitConfig,
    ) -> Result<Self> {
        let plugin = match selected {
            Some(identity) => dispatcher
                .registry()
                .resolve(&identity.provider_id, &identity.plugin_id)?
                .clone(),
            None => dispatcher
                .registry()
                .entries()
                .first()
                .cloned()
                .ok_or_else(|| DevkitError::Config("Bundle contains no plugins".to_string()))?,
        };

        Ok(Self {
            state: DebuggerState {
                dispatcher,
                plugin,
                callback_timeout: config.callback_timeout(),
                max_message_bytes: config.max_body_bytes,
                connections: Arc::new(AtomicU64::new(0)),
            },
        })
    }

    /// The plugin under debugging.
    pub fn plugin(&self) -> &RegisteredPlugin {
        &self.state.plugin
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(DEBUGGER_PATH, get(handle_upgrade))
            .with_state(self.state.clone())
    }

    /// Bind `config.bind_addr()` and serve until `shutdown` resolves.
    pub async fn serve<F>(self, config: &DevkitConfig, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        let addr = listener.local_addr()?;

        info!(
            "\n{}\n",
            describe_plugin(&self.state.plugin.info, &system_language())
        );
        info!(
            "\n{}\n{}\n{}",
            RULE,
            translate_label(&LabelText::localized([
                (
                    "en",
                    "IMPORTANT: Install this plugin in debug mode from the TuneFlow plugin library panel, then run this plugin from the right-click menu specified in the triggers",
                ),
                (
                    "zh",
                    "注意: 从 TuneFlow 库中以debug模式安装此插件，随后即可从各级右键菜单中运行此插件",
                ),
            ])),
            RULE
        );
        info!("Debugger listening on ws://{}{}", addr, DEBUGGER_PATH);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

async fn handle_upgrade(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<DebuggerState>,
) -> Response {
    let max = state.max_message_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| handle_socket(socket, state, headers))
}

async fn handle_socket(socket: WebSocket, state: DebuggerState, headers: HeaderMap) {
    let session_id = format!(
        "session-{}",
        state.connections.fetch_add(1, Ordering::Relaxed) + 1
    );
    info!(session = %session_id, "\n{}\nTuneFlow connected\n{}", RULE, RULE);

    let (mut sink, mut stream) = socket.split();
    let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Envelope>();

    let writer_session = session_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(envelope) = outgoing_rx.recv().await {
            let bytes = match envelope.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(session = %writer_session, error = %e, "Dropping unencodable envelope");
                    continue;
                }
            };
            if sink.send(Message::Binary(bytes)).await.is_err() {
                break;
            }
        }
    });

    let callbacks = Arc::new(CallbackChannel::new(
        outgoing_tx.clone(),
        state.callback_timeout,
    ));
    let mut channel = SessionChannel::new(
        session_id.clone(),
        state.dispatcher,
        state.plugin,
        Arc::clone(&callbacks),
        headers,
    );

    let (request_tx, mut request_rx) = mpsc::unbounded_channel::<Envelope>();
    tokio::spawn(async move {
        while let Some(request) = request_rx.recv().await {
            let reply = channel.handle(request).await;
            if outgoing_tx.send(reply).is_err() {
                debug!("Caller gone; discarding reply");
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Binary(bytes)) => match Envelope::decode(&bytes) {
                Ok(envelope) if envelope.kind == EnvelopeKind::Response => {
                    if !callbacks.resolve(envelope.id, envelope.payload) {
                        debug!(session = %session_id, id = envelope.id, "Reply to unknown query");
                    }
                }
                Ok(envelope) => {
                    if request_tx.send(envelope).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(session = %session_id, error = %e, "Ignoring malformed frame"),
            },
            Ok(Message::Text(_)) => {
                warn!(session = %session_id, "Ignoring text frame; envelopes must be binary")
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(session = %session_id, error = %e, "Socket error");
                break;
            }
        }
    }

    // Wake plugins blocked on a query, stop accepting requests and drop
    // whatever the session task still produces.
    callbacks.close();
    drop(request_tx);
    writer.abort();

    info!(
        session = %session_id,
        "\n{}\nTuneFlow disconnected\n\n{}\n{}",
        RULE,
        translate_label(&LabelText::localized([
            (
                "en",
                "IMPORTANT: Please undo the plugin under debugging and re-run it after you restart the DevKit.",
            ),
            (
                "zh",
                "注意: 请在TuneFlow中撤销正在调试的插件，并在DevKit重新启动后重新运行该插件",
            ),
        ])),
        RULE
    );
}
