//! Per-execution context handed to plugin code.
//!
//! The context is how a running plugin talks back to whoever asked for the
//! run. In a debug session that is the connected host, reached through a
//! [`CallbackChannel`]; for stateless runner jobs there is nobody to ask and
//! every query fails with `CallbackUnavailable`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rmpv::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::error::{DevkitError, Result};
use crate::protocol::Envelope;

/// Event name of the "list available extensions" callback.
pub const GET_AVAILABLE_EXTENSIONS: &str = "get-available-extensions";

/// Context passed to [`SongPlugin`] hooks.
///
/// [`SongPlugin`]: crate::plugins::SongPlugin
#[derive(Clone, Default)]
pub struct PluginContext {
    callbacks: Option<Arc<CallbackChannel>>,
}

impl PluginContext {
    /// A context with no caller attached.
    pub fn detached() -> Self {
        Self { callbacks: None }
    }

    /// A context whose queries go to the caller behind `channel`.
    pub fn with_callbacks(channel: Arc<CallbackChannel>) -> Self {
        Self {
            callbacks: Some(channel),
        }
    }

    /// Whether a caller is attached.
    pub fn has_caller(&self) -> bool {
        self.callbacks.as_ref().is_some_and(|c| !c.is_closed())
    }

    /// Ask the caller `event` and block until it replies.
    ///
    /// Fails with `CallbackUnavailable` when no caller is attached, the
    /// caller disconnects before replying, or the reply does not arrive
    /// within the channel timeout.
    pub fn query(&self, event: &str, payload: Value) -> Result<Value> {
        match &self.callbacks {
            Some(channel) => channel.query(event, payload),
            None => Err(DevkitError::CallbackUnavailable(format!(
                "no caller attached to answer '{}'",
                event
            ))),
        }
    }

    /// Ask the caller which extensions it has available.
    pub fn available_extensions(&self) -> Result<Value> {
        self.query(GET_AVAILABLE_EXTENSIONS, Value::Nil)
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("has_caller", &self.has_caller())
            .finish()
    }
}

/// Request/reply rendezvous between plugin threads and one connected caller.
///
/// A query registers a one-slot reply channel under a fresh id, pushes a
/// request envelope to the connection's writer and waits on the slot. The
/// connection's reader hands replies back through [`CallbackChannel::resolve`].
/// Closing the channel drops every pending slot, which wakes the waiters.
pub struct CallbackChannel {
    outgoing: UnboundedSender<Envelope>,
    pending: Mutex<HashMap<u64, SyncSender<Value>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    timeout: Duration,
}

impl CallbackChannel {
    pub fn new(outgoing: UnboundedSender<Envelope>, timeout: Duration) -> Self {
        Self {
            outgoing,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            timeout,
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<u64, SyncSender<Value>>> {
        // A poisoned map is still a valid map of senders.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Blocking query; see [`PluginContext::query`].
    pub fn query(&self, event: &str, payload: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = sync_channel(1);
        {
            // Checked under the lock so a concurrent close() cannot miss the slot.
            let mut pending = self.pending();
            if self.is_closed() {
                return Err(DevkitError::CallbackUnavailable(
                    "caller disconnected".to_string(),
                ));
            }
            pending.insert(id, tx);
        }

        if self
            .outgoing
            .send(Envelope::request(id, event, payload))
            .is_err()
        {
            self.pending().remove(&id);
            return Err(DevkitError::CallbackUnavailable(
                "caller disconnected".to_string(),
            ));
        }
        debug!(id, event, "Sent callback query");

        match rx.recv_timeout(self.timeout) {
            Ok(reply) => Ok(reply),
            Err(RecvTimeoutError::Disconnected) => Err(DevkitError::CallbackUnavailable(
                "caller disconnected".to_string(),
            )),
            Err(RecvTimeoutError::Timeout) => {
                self.pending().remove(&id);
                Err(DevkitError::CallbackUnavailable(format!(
                    "no reply to '{}' within {}s",
                    event,
                    self.timeout.as_secs()
                )))
            }
        }
    }

    /// Deliver the caller's reply to query `id`. Returns `false` if nobody
    /// is waiting for it (unknown id, already timed out).
    pub fn resolve(&self, id: u64, reply: Value) -> bool {
        match self.pending().remove(&id) {
            Some(tx) => tx.try_send(reply).is_ok(),
            None => false,
        }
    }

    /// Fail all pending and future queries.
    pub fn close(&self) {
        let mut pending = self.pending();
        self.closed.store(true, Ordering::SeqCst);
        pending.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }
}
