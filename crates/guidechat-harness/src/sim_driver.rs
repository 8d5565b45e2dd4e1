//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the CLI's terminal driver but
//! for deterministic testing. It implements [`Driver`] so the same
//! [`guidechat_app::Runtime`] orchestration code runs in both production and
//! simulation.
//!
//! Fetches and transport opens are spawned as tasks that sleep on the
//! simulated clock and report back through the event channel. Tests script
//! inputs and server-side behavior through a [`SimHandle`].

use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use guidechat_app::{ChatApi, Driver, DriverEvent, Notice, RoomSession, SessionEvent, SessionTag};
use guidechat_core::env::Environment;
use guidechat_proto::{Frame, MessageId, RoomId, UserId};
use tokio::{
    sync::mpsc,
    task::JoinSet,
    time::{Instant, Interval, MissedTickBehavior},
};

use crate::{
    invariants::{InvariantRegistry, SessionSnapshot, Violation},
    sim_env::SimEnv,
    sim_server::{Delivery, SimServer},
};

/// Interval between [`SessionEvent::Tick`]s.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// Everything the driver observed, for assertions.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    /// Session state at every render.
    pub renders: Vec<SessionSnapshot>,
    /// Notices shown, in order.
    pub notices: Vec<Notice>,
    /// Times the input was cleared after a send.
    pub cleared_inputs: usize,
    /// History fetches started, with their cursor.
    pub history_fetches: Vec<(SessionTag, Option<MessageId>)>,
    /// Transport links requested.
    pub opened: Vec<SessionTag>,
    /// Transport links closed by the client.
    pub closed: Vec<SessionTag>,
    /// Invariant violations seen at render time.
    pub violations: Vec<Violation>,
}

impl Recording {
    /// Most recent render. Idle state if nothing rendered yet.
    pub fn last(&self) -> SessionSnapshot {
        self.renders.last().cloned().unwrap_or_default()
    }
}

fn lock(recording: &Mutex<Recording>) -> MutexGuard<'_, Recording> {
    recording.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripting handle for a running [`SimDriver`].
///
/// Cheap to clone; usable while the runtime owns the driver.
#[derive(Debug, Clone)]
pub struct SimHandle {
    server: SimServer,
    events: mpsc::UnboundedSender<DriverEvent>,
    recording: Arc<Mutex<Recording>>,
    fail_renders: Arc<AtomicBool>,
}

impl SimHandle {
    /// Queue an input event.
    pub fn inject(&self, event: DriverEvent) {
        // Receiver gone means the runtime already stopped
        let _ = self.events.send(event);
    }

    /// User selects a room.
    pub fn select_room(&self, room_id: RoomId) {
        self.inject(DriverEvent::Session(SessionEvent::SelectRoom { room_id }));
    }

    /// User submits the message input.
    pub fn send_input(&self, text: &str) {
        self.inject(DriverEvent::Send(text.to_string()));
    }

    /// View torn down.
    pub fn unmount(&self) {
        self.inject(DriverEvent::Session(SessionEvent::Unmount));
    }

    /// Stop the runtime.
    pub fn quit(&self) {
        self.inject(DriverEvent::Quit);
    }

    /// Another participant posts to `room_id`; subscribed links receive it.
    pub fn post(&self, room_id: RoomId, sender_id: UserId, content: &str) {
        dispatch(&self.events, self.server.post(room_id, sender_id, content));
    }

    /// Server drops every open link.
    pub fn drop_links(&self) {
        dispatch(&self.events, self.server.drop_links());
    }

    /// Deliver a raw frame on `tag`'s link after `delay`, whether or not the
    /// link is still current by then.
    pub fn deliver_after(&self, tag: SessionTag, frame: Frame, delay: Duration) {
        let events = self.events.clone();
        tokio::spawn(async move {
            SimEnv.sleep(delay).await;
            let _ = events.send(DriverEvent::Session(SessionEvent::FrameReceived { tag, frame }));
        });
    }

    /// Make every render fail, as a broken terminal would.
    pub fn fail_renders(&self, fail: bool) {
        self.fail_renders.store(fail, Ordering::SeqCst);
    }

    /// The simulated server.
    pub fn server(&self) -> &SimServer {
        &self.server
    }

    /// Copy of everything observed so far.
    pub fn recording(&self) -> Recording {
        lock(&self.recording).clone()
    }

    /// Session state at the most recent render.
    pub fn last(&self) -> SessionSnapshot {
        lock(&self.recording).last()
    }
}

/// Simulation driver for deterministic testing.
///
/// Implements [`Driver`] trait so the same [`guidechat_app::Runtime`]
/// orchestration code runs in both the production CLI and simulation tests.
pub struct SimDriver {
    env: SimEnv,
    server: SimServer,
    events_tx: mpsc::UnboundedSender<DriverEvent>,
    events_rx: mpsc::UnboundedReceiver<DriverEvent>,
    ticks: Interval,
    tasks: JoinSet<()>,
    recording: Arc<Mutex<Recording>>,
    fail_renders: Arc<AtomicBool>,
    invariants: InvariantRegistry,
}

impl SimDriver {
    /// Create a driver talking to `server`, checking the standard invariants
    /// on every render.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(server: SimServer) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut ticks = tokio::time::interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            env: SimEnv,
            server,
            events_tx,
            events_rx,
            ticks,
            tasks: JoinSet::new(),
            recording: Arc::new(Mutex::new(Recording::default())),
            fail_renders: Arc::new(AtomicBool::new(false)),
            invariants: InvariantRegistry::standard(),
        }
    }

    /// Replace the invariant registry.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = registry;
        self
    }

    /// Scripting handle.
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            server: self.server.clone(),
            events: self.events_tx.clone(),
            recording: Arc::clone(&self.recording),
            fail_renders: Arc::clone(&self.fail_renders),
        }
    }
}

/// Route server output back into the event stream.
fn dispatch(events: &mpsc::UnboundedSender<DriverEvent>, deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        let event = match delivery {
            Delivery::Frame(tag, frame) => SessionEvent::FrameReceived { tag, frame },
            Delivery::Close(tag) => SessionEvent::TransportClosed { tag },
        };
        let _ = events.send(DriverEvent::Session(event));
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = Instant;

    async fn poll_event(&mut self) -> Result<Option<DriverEvent>, Self::Error> {
        tokio::select! {
            biased;
            event = self.events_rx.recv() => Ok(event),
            _ = self.ticks.tick() => Ok(Some(DriverEvent::Session(SessionEvent::Tick))),
        }
    }

    fn fetch_room(&mut self, tag: SessionTag) {
        let server = self.server.clone();
        let events = self.events_tx.clone();
        self.tasks.spawn(async move {
            let result = server.fetch_room(tag.room_id).await;
            let _ = events.send(DriverEvent::Session(SessionEvent::RoomLoaded { tag, result }));
        });
    }

    fn fetch_history(&mut self, tag: SessionTag, after: Option<MessageId>) {
        lock(&self.recording).history_fetches.push((tag, after));

        let server = self.server.clone();
        let events = self.events_tx.clone();
        self.tasks.spawn(async move {
            let result = server.fetch_history(tag.room_id, after).await;
            let _ = events.send(DriverEvent::Session(SessionEvent::HistoryLoaded { tag, result }));
        });
    }

    fn open_transport(&mut self, tag: SessionTag) {
        lock(&self.recording).opened.push(tag);

        let env = self.env;
        let server = self.server.clone();
        let events = self.events_tx.clone();
        self.tasks.spawn(async move {
            let latency = server.connect_latency();
            if !latency.is_zero() {
                env.sleep(latency).await;
            }
            let event = if server.accept_link(tag) {
                SessionEvent::TransportOpened { tag }
            } else {
                SessionEvent::TransportClosed { tag }
            };
            let _ = events.send(DriverEvent::Session(event));
        });
    }

    async fn send_frame(&mut self, tag: SessionTag, frame: Frame) -> Result<(), Self::Error> {
        let deliveries = self.server.client_frame(tag, frame).map_err(SimDriverError)?;
        dispatch(&self.events_tx, deliveries);
        Ok(())
    }

    async fn send_heartbeat(&mut self, tag: SessionTag) -> Result<(), Self::Error> {
        if self.server.open_links().contains(&tag) {
            Ok(())
        } else {
            Err(SimDriverError("heart-beat on closed link".into()))
        }
    }

    fn close_transport(&mut self, tag: SessionTag) {
        lock(&self.recording).closed.push(tag);
        self.server.close_link(tag);
    }

    fn now(&self) -> Self::Instant {
        self.env.now()
    }

    fn render(&mut self, session: &RoomSession<Self::Instant>) -> Result<(), Self::Error> {
        if self.fail_renders.load(Ordering::SeqCst) {
            return Err(SimDriverError("render failed".into()));
        }

        let snapshot = SessionSnapshot::of(session);
        let violations = self.invariants.check_all(&snapshot).err().unwrap_or_default();

        let mut recording = lock(&self.recording);
        for violation in &violations {
            tracing::error!(%violation, "invariant violated");
        }
        recording.violations.extend(violations);
        recording.renders.push(snapshot);
        Ok(())
    }

    fn notify(&mut self, notice: &Notice) -> Result<(), Self::Error> {
        lock(&self.recording).notices.push(notice.clone());
        Ok(())
    }

    fn clear_input(&mut self) {
        lock(&self.recording).cleared_inputs += 1;
    }

    fn stop(&mut self) {
        self.tasks.abort_all();
    }
}
