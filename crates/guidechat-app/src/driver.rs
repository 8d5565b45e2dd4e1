//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the session runtime from specific I/O
//! implementations. Each frontend implements the trait to provide
//! platform-specific I/O, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::{future::Future, ops::Sub, time::Duration};

use guidechat_proto::{Frame, MessageId};

use crate::{Notice, RoomSession, SessionEvent, SessionTag};

/// Input delivered by a driver to the runtime.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// Event for the session state machine.
    Session(SessionEvent),
    /// User submitted the message input.
    Send(String),
    /// Shut the runtime down.
    Quit,
}

/// Abstracts I/O operations for the session runtime.
///
/// Implementations provide platform-specific I/O while the generic
/// [`Runtime`](crate::Runtime) handles orchestration logic. This ensures
/// the same orchestration code runs in the production CLI and simulation.
///
/// Fetches and transport opens are fire-and-forget: the driver starts the
/// work and later reports the outcome through [`Driver::poll_event`], tagged
/// with the [`SessionTag`] it was started with.
///
/// # Implementations
///
/// - **CLI**: reqwest for REST, tokio-tungstenite for the broker socket
/// - **Simulation**: in-memory API and broker on tokio's paused clock
///
/// # Associated Types
///
/// - [`Error`](Driver::Error): Platform-specific error type
/// - [`Instant`](Driver::Instant): Time representation (real or virtual)
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Wait for the next input.
    ///
    /// Returns `None` when the input source is exhausted. Drivers are expected
    /// to yield [`SessionEvent::Tick`] periodically.
    fn poll_event(&mut self) -> impl Future<Output = Result<Option<DriverEvent>, Self::Error>> + Send;

    /// Start fetching room metadata.
    fn fetch_room(&mut self, tag: SessionTag);

    /// Start fetching history, optionally only after `after`.
    fn fetch_history(&mut self, tag: SessionTag, after: Option<MessageId>);

    /// Start opening a transport link.
    fn open_transport(&mut self, tag: SessionTag);

    /// Write a frame on the link opened for `tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no such link or the write fails.
    fn send_frame(
        &mut self,
        tag: SessionTag,
        frame: Frame,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Write a heart-beat on the link opened for `tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no such link or the write fails.
    fn send_heartbeat(&mut self, tag: SessionTag) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Close the link opened for `tag`. Unknown tags are ignored.
    fn close_transport(&mut self, tag: SessionTag);

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Render the session state.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render(&mut self, session: &RoomSession<Self::Instant>) -> Result<(), Self::Error>;

    /// Show a notice to the user.
    ///
    /// # Errors
    ///
    /// Returns an error if the notice cannot be shown.
    fn notify(&mut self, notice: &Notice) -> Result<(), Self::Error>;

    /// Clear the message input after a successful send.
    fn clear_input(&mut self);

    /// Stop all in-flight work and clean up resources.
    fn stop(&mut self);
}
