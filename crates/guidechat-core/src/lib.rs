//! Guide chat core
//!
//! Pure state machines behind a room chat session. Nothing in this crate
//! performs I/O: methods take the current time as input and return actions
//! for the caller to execute, which keeps every transition testable with a
//! virtual clock.
//!
//! # Components
//!
//! - [`ConnectionManager`]: one broker connection per room (connect,
//!   subscribe, publish, heart-beats, reconnect, teardown)
//! - [`MessageReconciler`]: merges fetched history with the live stream into
//!   one ordered, duplicate-free sequence
//! - [`env::Environment`]: time source abstraction shared by production and
//!   simulation

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
mod credential;
pub mod env;
pub mod error;
mod reconciler;

pub use connection::{
    ConnectionAction, ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionStatus,
    SubscriptionId,
};
pub use credential::BearerToken;
pub use error::ConnectionError;
pub use reconciler::MessageReconciler;
