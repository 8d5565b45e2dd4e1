//! Deterministic simulation harness for guide chat.
//!
//! In-memory implementations of the REST API, the STOMP broker and the
//! runtime [`Driver`](guidechat_app::Driver), all running on tokio's paused
//! clock. The production [`guidechat_app::Runtime`] runs unchanged on top, so
//! reconnect delays, fetch latency and heart-beat deadlines are crossed
//! instantly and reproducibly.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. [`SimDriver`] checks [`InvariantRegistry::standard()`]
//! on every render and records violations for the test to assert on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_server;

pub use invariants::{
    ClosedSessionIsEmpty, ConnectedOnlyWhenActive, Invariant, InvariantRegistry, InvariantResult,
    NoForeignMessages, SessionSnapshot, UniqueMessageIds, Violation,
};
pub use sim_driver::{Recording, SimDriver, SimDriverError, SimHandle, TICK_INTERVAL};
pub use sim_env::SimEnv;
pub use sim_server::{Delivery, SimServer};
