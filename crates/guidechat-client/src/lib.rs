//! Guide chat production client
//!
//! The I/O side of the session layer. Everything here talks to a real server:
//!
//! - [`HttpApi`]: REST client for room metadata, history and the room
//!   directory; implements [`guidechat_app::ChatApi`]
//! - [`transport`]: WebSocket link carrying STOMP text to and from the broker
//! - [`TokenStore`]: shared bearer token; implements
//!   [`guidechat_app::TokenProvider`]
//! - [`SystemEnv`]: wall-clock [`guidechat_core::env::Environment`]
//! - [`ClientConfig`]: endpoints and page sizes

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod http;
mod system_env;
mod token;
pub mod transport;

pub use config::{ClientConfig, DEFAULT_API_URL, DEFAULT_WS_URL};
pub use http::{ApiError, HttpApi};
pub use system_env::SystemEnv;
pub use token::TokenStore;
pub use transport::{ConnectedLink, LinkWriter, TransportError};
