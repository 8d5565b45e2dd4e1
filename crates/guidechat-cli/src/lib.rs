//! Guide chat terminal client
//!
//! Line-oriented front end for the room session layer. Chat output goes to
//! stdout, logs go to stderr.
//!
//! - [`TerminalDriver`]: [`guidechat_app::Driver`] over stdin/stdout, the REST
//!   client and the broker WebSocket
//! - [`Renderer`]: incremental text rendering of a session
//! - [`input`]: parsing of typed lines into runtime events
//! - [`commands`]: one-shot room directory commands and the polling watcher

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod commands;
mod driver;
mod error;
pub mod input;
mod render;

pub use driver::TerminalDriver;
pub use error::RuntimeError;
pub use render::Renderer;
