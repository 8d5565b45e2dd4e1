//! Generic runtime for session orchestration.
//!
//! The Runtime drives the session event loop, coordinating between:
//! - [`RoomSession`]: room binding state machine
//! - [`Driver`]: Platform-specific I/O

use crate::{Driver, DriverEvent, Notice, RoomSession, SessionAction, SessionEvent};

/// Generic runtime that orchestrates a [`RoomSession`] and a [`Driver`].
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
pub struct Runtime<D>
where
    D: Driver,
{
    driver: D,
    session: RoomSession<D::Instant>,
}

impl<D> Runtime<D>
where
    D: Driver,
{
    /// Create a new runtime with the given driver and session.
    pub fn new(driver: D, session: RoomSession<D::Instant>) -> Self {
        Self { driver, session }
    }

    /// Run the main event loop until the driver is exhausted or asks to quit.
    ///
    /// The session is unmounted on the way out, including when the loop fails,
    /// so the broker link is always closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run(mut self) -> Result<(), D::Error> {
        let result = self.event_loop().await;

        if let Err(e) = &result {
            tracing::warn!(error = %e, "runtime failed, tearing down session");
            if let Err(e) = self.shutdown().await {
                tracing::debug!(error = %e, "teardown after failure also failed");
            }
        }

        self.driver.stop();
        result
    }

    async fn event_loop(&mut self) -> Result<(), D::Error> {
        self.driver.render(&self.session)?;

        loop {
            if self.process_cycle().await? {
                return Ok(());
            }
        }
    }

    /// Process one input.
    ///
    /// Returns `true` if the runtime should quit.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn process_cycle(&mut self) -> Result<bool, D::Error> {
        let Some(event) = self.driver.poll_event().await? else {
            self.shutdown().await?;
            return Ok(true);
        };

        let now = self.driver.now();
        match event {
            DriverEvent::Session(event) => {
                let actions = self.session.handle(event, now);
                self.process_actions(actions).await?;
            },
            DriverEvent::Send(input) => {
                let actions = self.session.send(&input, now);
                self.process_actions(actions).await?;
            },
            DriverEvent::Quit => {
                self.shutdown().await?;
                return Ok(true);
            },
        }

        Ok(false)
    }

    /// Execute session actions in order.
    ///
    /// A frame the transport refuses does not abort the batch; it suppresses
    /// the batch's [`SessionAction::ClearInput`] and surfaces
    /// [`Notice::SendFailed`] instead, so the user keeps the typed text.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering or notifying fails.
    pub async fn process_actions(&mut self, actions: Vec<SessionAction>) -> Result<(), D::Error> {
        let mut write_failed = false;

        for action in actions {
            match action {
                SessionAction::FetchRoom { tag } => self.driver.fetch_room(tag),
                SessionAction::FetchHistory { tag, after } => self.driver.fetch_history(tag, after),
                SessionAction::OpenTransport { tag } => self.driver.open_transport(tag),
                SessionAction::CloseTransport { tag } => self.driver.close_transport(tag),

                SessionAction::SendFrame { tag, frame } => {
                    let command = frame.command;
                    if let Err(e) = self.driver.send_frame(tag, frame).await {
                        tracing::warn!(room_id = tag.room_id, %command, error = %e, "frame write failed");
                        write_failed = true;
                    }
                },

                SessionAction::SendHeartbeat { tag } => {
                    if let Err(e) = self.driver.send_heartbeat(tag).await {
                        tracing::debug!(room_id = tag.room_id, error = %e, "heart-beat write failed");
                    }
                },

                SessionAction::ClearInput => {
                    if write_failed {
                        self.session.set_notice(Notice::SendFailed);
                        self.driver.notify(&Notice::SendFailed)?;
                        self.driver.render(&self.session)?;
                    } else {
                        self.driver.clear_input();
                    }
                },

                SessionAction::Notify(notice) => self.driver.notify(&notice)?,
                SessionAction::Render => self.driver.render(&self.session)?,
            }
        }

        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), D::Error> {
        let now = self.driver.now();
        let actions = self.session.handle(SessionEvent::Unmount, now);
        self.process_actions(actions).await
    }

    /// Get a reference to the session
    pub fn session(&self) -> &RoomSession<D::Instant> {
        &self.session
    }

    /// Get a mutable reference to the session
    pub fn session_mut(&mut self) -> &mut RoomSession<D::Instant> {
        &mut self.session
    }

    /// Get a reference to the driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Get a mutable reference to the driver
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}
