//! Network front ends for the TuneFlow DevKit
//!
//! - [`runner`]: stateless HTTP routes, sync or async
//! - [`debugger`]: WebSocket sessions for debugging one plugin

pub mod debugger;
pub mod runner;
pub mod session;

pub use debugger::{Debugger, DEBUGGER_PATH};
pub use session::{PluginInstance, Session, SessionChannel};
