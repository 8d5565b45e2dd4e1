//! Application layer for guide chat
//!
//! Pure session state machine and generic runtime for the real-time room chat,
//! enabling deterministic simulation testing with the same code that runs in
//! production.
//!
//! # Components
//!
//! - [`RoomSession`]: binds the selected room to a connection and a message
//!   buffer; owns room switching, teardown, and send validation
//! - [`ChatApi`] / [`TokenProvider`]: collaborators the session consumes
//! - [`RefetchSchedule`]: interval helper for polling-based views
//! - [`Driver`]: Trait for platform-specific I/O abstraction
//! - [`Runtime`]: Generic orchestration loop using Driver

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod action;
mod collaborators;
mod driver;
mod event;
mod refetch;
mod runtime;
mod session;
mod state;

pub use action::{Notice, SessionAction};
pub use collaborators::{ChatApi, StaticToken, TokenProvider};
pub use driver::{Driver, DriverEvent};
pub use event::{FetchError, SessionEvent};
pub use refetch::RefetchSchedule;
pub use runtime::Runtime;
pub use session::RoomSession;
pub use state::{MessageSide, SessionState, SessionTag, Unavailability};
