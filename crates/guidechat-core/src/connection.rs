//! Broker connection state machine.
//!
//! Manages one STOMP session to the chat broker for a single room: handshake,
//! subscriptions, publishing, heart-beats, reconnection and teardown. Uses the
//! action pattern: methods take time as input and return actions for the
//! driver to execute. No sockets, no timers.
//!
//! # State Machine
//!
//! ```text
//!                open            CONNECTED
//! ┌──────────────┐ ───> ┌────────────┐ ───> ┌───────────┐
//! │ Disconnected │      │ Connecting │      │ Connected │
//! └──────────────┘ <─── └────────────┘      └───────────┘
//!     ^    │     closed      │ ERROR              │ │
//!     │    │  (retry timer)  ↓                    │ │ ERROR
//!     │    └──────────> ┌────────┐ <──────────────┘ │
//!     │                 │ Failed │                  │
//!     │                 └────────┘                  │
//!     └─────────────── transport closed ────────────┘
//! ```
//!
//! Transport closure while active schedules a reconnect after
//! [`ConnectionConfig::reconnect_delay`]. A broker `ERROR` frame lands in
//! `Failed`, which is never left automatically.

use std::{
    collections::BTreeMap,
    fmt,
    ops::Sub,
    str::FromStr,
    time::{Duration, Instant},
};

use guidechat_proto::{Command, Frame, HeartBeat, RoomId};
use serde::Serialize;

use crate::{credential::BearerToken, error::ConnectionError};

/// Delay before reopening a transport that closed unexpectedly.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Interval at which we promise to send heart-beats.
pub const DEFAULT_HEARTBEAT_OUTGOING: Duration = Duration::from_millis(4000);

/// Interval at which we ask the broker to send heart-beats.
pub const DEFAULT_HEARTBEAT_INCOMING: Duration = Duration::from_millis(4000);

/// Connection status observable by the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No transport, or waiting for the reconnect timer.
    Disconnected,
    /// Transport opening or handshake in flight.
    Connecting,
    /// Handshake complete; subscriptions are live.
    Connected,
    /// Broker rejected the session. Not retried automatically.
    Failed,
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Delay between an unexpected closure and the next connection attempt
    pub reconnect_delay: Duration,
    /// Heart-beat interval we offer to send
    pub heartbeat_outgoing: Duration,
    /// Heart-beat interval we ask the broker for
    pub heartbeat_incoming: Duration,
}

impl ConnectionConfig {
    /// Heart-beat offer sent in the `CONNECT` frame.
    pub fn heartbeat(&self) -> HeartBeat {
        HeartBeat::new(self.heartbeat_outgoing, self.heartbeat_incoming)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            heartbeat_outgoing: DEFAULT_HEARTBEAT_OUTGOING,
            heartbeat_incoming: DEFAULT_HEARTBEAT_INCOMING,
        }
    }
}

/// Identifier of a subscription registration.
///
/// Stable across reconnects: the same id is re-sent in every `SUBSCRIBE` and
/// echoed back by the broker in the `subscription` header of `MESSAGE` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

impl FromStr for SubscriptionId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("sub-").and_then(|n| n.parse().ok()).map(Self).ok_or(())
    }
}

/// Notifications for the owner of the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Handshake completed and subscriptions were (re-)sent.
    Connected {
        /// `true` when this follows an earlier successful connection.
        reconnected: bool,
    },
    /// Transport closed unexpectedly; a reconnect is scheduled.
    TransportClosed {
        /// Delay before the next attempt.
        reconnect_in: Duration,
    },
    /// Broker rejected the session or a frame.
    ProtocolError {
        /// Short reason from the `message` header.
        message: String,
        /// Frame body, often a longer explanation.
        details: String,
    },
}

/// Actions returned by the connection state machine.
///
/// The driver executes these in order:
/// - `OpenTransport`: open a new transport link to the broker
/// - `SendFrame`: encode and write the frame
/// - `SendHeartbeat`: write a bare end-of-line
/// - `CloseTransport`: close the current link
/// - `Deliver`: route a `MESSAGE` frame to the subscription's consumer
/// - `Notify`: report a status change to the owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a transport link.
    OpenTransport,
    /// Send this frame to the broker.
    SendFrame(Frame),
    /// Send a heart-beat.
    SendHeartbeat,
    /// Close the transport link.
    CloseTransport,
    /// Inbound message for a registered subscription.
    Deliver {
        /// Subscription the broker addressed.
        subscription: SubscriptionId,
        /// The `MESSAGE` frame.
        frame: Frame,
    },
    /// Status change for the owner.
    Notify(ConnectionEvent),
}

/// Connection state machine
///
/// Owns one logical broker connection for one room. Subscription
/// registrations are retained across reconnects and replayed after every
/// `CONNECTED`, so consumers never re-subscribe.
///
/// This is a pure state machine - no I/O, no Environment storage.
/// Time is passed as parameters to methods that need it.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct ConnectionManager<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Room this connection serves (for logging)
    room_id: RoomId,
    /// Current status
    status: ConnectionStatus,
    /// Opened and not yet closed by the owner
    active: bool,
    /// Transport link currently open
    transport_up: bool,
    /// Credential captured at open time
    credential: Option<BearerToken>,
    /// Configuration
    config: ConnectionConfig,
    /// Registered subscriptions (id -> destination)
    subscriptions: BTreeMap<SubscriptionId, String>,
    /// Next subscription id to hand out
    next_subscription: u64,
    /// Negotiated heart-beat intervals
    heartbeat: HeartBeat,
    /// Last frame or heart-beat we sent
    last_sent: I,
    /// Last frame or heart-beat we received
    last_received: I,
    /// When the transport closed unexpectedly. `Some` while a reconnect is
    /// pending.
    closed_at: Option<I>,
    /// Reached `Connected` at least once
    connected_once: bool,
}

impl<I> ConnectionManager<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create an inactive connection in [`ConnectionStatus::Disconnected`].
    pub fn new(room_id: RoomId, config: ConnectionConfig, now: I) -> Self {
        Self {
            room_id,
            status: ConnectionStatus::Disconnected,
            active: false,
            transport_up: false,
            credential: None,
            config,
            subscriptions: BTreeMap::new(),
            next_subscription: 0,
            heartbeat: HeartBeat::disabled(),
            last_sent: now,
            last_received: now,
            closed_at: None,
            connected_once: false,
        }
    }

    /// Current connection status
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Opened by the owner and not yet closed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Room this connection serves.
    #[must_use]
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Heart-beat intervals negotiated with the broker. Disabled until
    /// connected.
    #[must_use]
    pub fn heartbeat(&self) -> HeartBeat {
        self.heartbeat
    }

    /// Registered subscriptions and their destinations.
    pub fn subscriptions(&self) -> impl Iterator<Item = (SubscriptionId, &str)> {
        self.subscriptions.iter().map(|(id, dest)| (*id, dest.as_str()))
    }

    /// Start connecting with the given credential.
    ///
    /// Returns immediately with [`ConnectionAction::OpenTransport`]; progress
    /// is reported through [`Self::transport_opened`] and
    /// [`Self::handle_frame`].
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if already active
    pub fn open(
        &mut self,
        credential: Option<BearerToken>,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.active {
            return Err(ConnectionError::InvalidState { status: self.status, operation: "open" });
        }

        tracing::debug!(room_id = self.room_id, has_token = credential.is_some(), "opening connection");

        self.active = true;
        self.credential = credential;
        self.status = ConnectionStatus::Connecting;
        self.closed_at = None;
        self.last_sent = now;
        self.last_received = now;

        Ok(vec![ConnectionAction::OpenTransport])
    }

    /// Transport link is up: send the `CONNECT` handshake.
    pub fn transport_opened(&mut self, now: I) -> Vec<ConnectionAction> {
        if !self.active || self.status != ConnectionStatus::Connecting {
            tracing::debug!(room_id = self.room_id, status = ?self.status, "ignoring late transport open");
            return vec![];
        }

        self.transport_up = true;
        self.last_sent = now;
        self.last_received = now;

        let token = self.credential.as_ref().map(BearerToken::expose);
        vec![ConnectionAction::SendFrame(Frame::connect(self.config.heartbeat(), token))]
    }

    /// Process an inbound frame.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::UnexpectedFrame` for a client-only command, or a
    ///   server frame that is invalid in the current status
    /// - `ConnectionError::Protocol` for a malformed `heart-beat` header
    pub fn handle_frame(
        &mut self,
        frame: Frame,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if !self.active {
            tracing::debug!(room_id = self.room_id, command = %frame.command, "discarding frame on inactive connection");
            return Ok(vec![]);
        }

        self.last_received = now;

        match (self.status, frame.command) {
            (ConnectionStatus::Connecting, Command::Connected) => self.handle_connected(&frame),

            (ConnectionStatus::Connected, Command::Message) => {
                let Some(subscription) =
                    frame.header("subscription").and_then(|s| s.parse::<SubscriptionId>().ok())
                else {
                    tracing::debug!(room_id = self.room_id, "MESSAGE without a known subscription header");
                    return Ok(vec![]);
                };

                if !self.subscriptions.contains_key(&subscription) {
                    tracing::debug!(room_id = self.room_id, %subscription, "MESSAGE for dropped subscription");
                    return Ok(vec![]);
                }

                Ok(vec![ConnectionAction::Deliver { subscription, frame }])
            },

            (ConnectionStatus::Connected, Command::Receipt) => Ok(vec![]),

            (status, Command::Error) if status != ConnectionStatus::Failed => {
                let message = frame.header("message").unwrap_or("broker error").to_string();
                let details = String::from_utf8_lossy(&frame.body).into_owned();

                tracing::warn!(room_id = self.room_id, %message, "broker rejected session");

                self.status = ConnectionStatus::Failed;
                self.closed_at = None;

                let mut actions = Vec::new();
                if self.transport_up {
                    self.transport_up = false;
                    actions.push(ConnectionAction::CloseTransport);
                }
                actions.push(ConnectionAction::Notify(ConnectionEvent::ProtocolError {
                    message,
                    details,
                }));
                Ok(actions)
            },

            (status, command) => Err(ConnectionError::UnexpectedFrame { status, command }),
        }
    }

    /// Record inbound heart-beat activity.
    pub fn heartbeat_received(&mut self, now: I) {
        if self.active {
            self.last_received = now;
        }
    }

    /// Transport link closed.
    ///
    /// Unexpected closure of an active connection schedules a reconnect. A
    /// closure after [`Self::close`], after a broker `ERROR`, or while a
    /// reconnect is already pending is expected and produces nothing.
    pub fn transport_closed(&mut self, now: I) -> Vec<ConnectionAction> {
        self.transport_up = false;

        if !self.active
            || matches!(self.status, ConnectionStatus::Failed | ConnectionStatus::Disconnected)
        {
            return vec![];
        }

        self.schedule_reconnect(now)
    }

    /// Process periodic maintenance: reconnect timer, outgoing heart-beats,
    /// and the incoming liveness deadline.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        if !self.active {
            return vec![];
        }

        match self.status {
            ConnectionStatus::Disconnected => {
                let due = self.closed_at.is_some_and(|at| now - at >= self.config.reconnect_delay);
                if !due {
                    return vec![];
                }

                tracing::info!(room_id = self.room_id, "reconnecting");
                self.closed_at = None;
                self.status = ConnectionStatus::Connecting;
                vec![ConnectionAction::OpenTransport]
            },

            ConnectionStatus::Connected => {
                // Peer is considered gone after two missed beats
                let incoming = self.heartbeat.incoming;
                if !incoming.is_zero() && now - self.last_received > incoming * 2 {
                    tracing::warn!(
                        room_id = self.room_id,
                        silent_for = ?(now - self.last_received),
                        "broker heart-beat missed"
                    );
                    self.transport_up = false;
                    let mut actions = vec![ConnectionAction::CloseTransport];
                    actions.extend(self.schedule_reconnect(now));
                    return actions;
                }

                let outgoing = self.heartbeat.outgoing;
                if !outgoing.is_zero() && now - self.last_sent >= outgoing {
                    self.last_sent = now;
                    return vec![ConnectionAction::SendHeartbeat];
                }

                vec![]
            },

            ConnectionStatus::Connecting | ConnectionStatus::Failed => vec![],
        }
    }

    /// Register interest in `destination`.
    ///
    /// The `SUBSCRIBE` frame is sent now if connected, otherwise it is
    /// deferred until the handshake completes. Either way the registration is
    /// kept and replayed after every reconnect.
    pub fn subscribe(
        &mut self,
        destination: impl Into<String>,
    ) -> (SubscriptionId, Vec<ConnectionAction>) {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;

        let destination = destination.into();
        let actions = if self.status == ConnectionStatus::Connected {
            vec![ConnectionAction::SendFrame(Frame::subscribe(&id.to_string(), &destination))]
        } else {
            tracing::debug!(room_id = self.room_id, subscription = %id, %destination, "subscription deferred until connected");
            vec![]
        };

        self.subscriptions.insert(id, destination);
        (id, actions)
    }

    /// Drop a subscription registration.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Vec<ConnectionAction> {
        if self.subscriptions.remove(&id).is_some() && self.status == ConnectionStatus::Connected {
            vec![ConnectionAction::SendFrame(Frame::unsubscribe(&id.to_string()))]
        } else {
            vec![]
        }
    }

    /// Publish `payload` as JSON to `destination`.
    ///
    /// Never queues: callers must surface the error to the user.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::NotConnected` unless status is `Connected`
    /// - `ConnectionError::Protocol` if the payload cannot be encoded
    pub fn publish<T: Serialize>(
        &mut self,
        destination: &str,
        payload: &T,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.status != ConnectionStatus::Connected {
            return Err(ConnectionError::NotConnected { status: self.status });
        }

        let frame = Frame::send_json(destination, payload)?;
        self.last_sent = now;
        Ok(vec![ConnectionAction::SendFrame(frame)])
    }

    /// Deactivate the connection.
    ///
    /// Idempotent: closing an inactive or never-opened connection does
    /// nothing. Registrations are dropped because a manager is never reused
    /// for another session.
    pub fn close(&mut self) -> Vec<ConnectionAction> {
        if !self.active {
            return vec![];
        }

        tracing::debug!(room_id = self.room_id, status = ?self.status, "closing connection");

        let mut actions = Vec::new();
        if self.status == ConnectionStatus::Connected {
            actions.push(ConnectionAction::SendFrame(Frame::disconnect()));
        }
        if self.transport_up {
            actions.push(ConnectionAction::CloseTransport);
        }

        self.active = false;
        self.transport_up = false;
        self.status = ConnectionStatus::Disconnected;
        self.closed_at = None;
        self.subscriptions.clear();
        self.heartbeat = HeartBeat::disabled();

        actions
    }

    fn handle_connected(&mut self, frame: &Frame) -> Result<Vec<ConnectionAction>, ConnectionError> {
        let server = match frame.header("heart-beat") {
            Some(value) => HeartBeat::parse(value)?,
            None => HeartBeat::disabled(),
        };
        self.heartbeat = HeartBeat::negotiate(self.config.heartbeat(), server);

        let reconnected = self.connected_once;
        self.connected_once = true;
        self.status = ConnectionStatus::Connected;

        tracing::info!(
            room_id = self.room_id,
            reconnected,
            subscriptions = self.subscriptions.len(),
            "connected to broker"
        );

        let mut actions: Vec<ConnectionAction> = self
            .subscriptions
            .iter()
            .map(|(id, destination)| {
                ConnectionAction::SendFrame(Frame::subscribe(&id.to_string(), destination))
            })
            .collect();
        actions.push(ConnectionAction::Notify(ConnectionEvent::Connected { reconnected }));
        Ok(actions)
    }

    fn schedule_reconnect(&mut self, now: I) -> Vec<ConnectionAction> {
        let reconnect_in = self.config.reconnect_delay;
        tracing::info!(room_id = self.room_id, ?reconnect_in, "transport closed, reconnect scheduled");

        self.status = ConnectionStatus::Disconnected;
        self.closed_at = Some(now);
        self.heartbeat = HeartBeat::disabled();

        vec![ConnectionAction::Notify(ConnectionEvent::TransportClosed { reconnect_in })]
    }
}
