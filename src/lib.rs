//! TuneFlow DevKit - local debugger and job runner for song-transform plugins
//!
//! Plugins are registered against a bundle manifest ([`plugins`]), run off
//! the connection threads by the [`engine`], and reached either through the
//! stateless HTTP runner or the per-connection debugger ([`gateway`]), both
//! of which go through the [`dispatch`] layer.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod plugins;
pub mod protocol;
pub mod song;
pub mod utils;

#[cfg(test)]
mod testing;

pub use config::DevkitConfig;
pub use dispatch::{DispatcherOptions, JobDispatcher};
pub use engine::{ExecutionEngine, PluginContext};
pub use error::{DevkitError, Result};
pub use plugins::{PluginRegistry, SongPlugin};
pub use song::Song;
