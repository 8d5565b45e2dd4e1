//! Room session state machine.
//!
//! This module defines [`RoomSession`], which binds the currently selected
//! chat room to one broker connection and one message buffer. It consumes
//! [`crate::SessionEvent`] inputs and produces [`crate::SessionAction`]
//! instructions for the runtime to execute.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──select──> Loading ──history──> Connecting ──CONNECTED──> Active
//!                     │                     ^                      │
//!                     │ not found / error   └──── transport closed ┘
//!                     ↓                                            │ ERROR
//!                Unavailable                      Failed <─────────┘
//! ```
//!
//! Selecting another room tears the previous binding down first. Unmounting
//! from any state lands in `Closed`.
//!
//! # Staleness
//!
//! Every request and transport link carries the [`SessionTag`] current when it
//! was issued. Completions whose tag no longer matches are dropped, so a slow
//! response for an earlier room can never reach the current buffer.

use std::{
    ops::Sub,
    sync::Arc,
    time::{Duration, Instant},
};

use guidechat_core::{
    ConnectionAction, ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionStatus,
    MessageReconciler, SubscriptionId,
};
use guidechat_proto::{ChatMessage, Frame, OutgoingMessage, RoomId, RoomInfo, UserId, destination};

use crate::{
    FetchError, MessageSide, Notice, SessionAction, SessionEvent, SessionState, SessionTag,
    TokenProvider, Unavailability,
};

/// Everything bound to one room selection.
#[derive(Debug)]
struct Binding<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    tag: SessionTag,
    room: Option<RoomInfo>,
    connection: ConnectionManager<I>,
    reconciler: MessageReconciler,
    subscription: Option<SubscriptionId>,
}

/// Room session state machine.
///
/// Pure state machine that processes events and produces actions.
/// No I/O dependencies - fully testable in simulation.
pub struct RoomSession<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Lifecycle state.
    state: SessionState,
    /// Current room binding. `None` while idle or after unmount.
    binding: Option<Binding<I>>,
    /// Selection counter, bumped on every room selection.
    generation: u64,
    /// Connection configuration for every binding.
    config: ConnectionConfig,
    /// Credential source, read when a connection opens.
    tokens: Arc<dyn TokenProvider>,
    /// Signed-in user, for message sides.
    user_id: Option<UserId>,
    /// Latest notice. `None` once cleared.
    notice: Option<Notice>,
}

impl<I> RoomSession<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create an idle session.
    pub fn new(config: ConnectionConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            state: SessionState::Idle,
            binding: None,
            generation: 0,
            config,
            tokens,
            user_id: None,
            notice: None,
        }
    }

    /// Set the signed-in user used to classify messages as sent or received.
    #[must_use]
    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: SessionEvent, now: I) -> Vec<SessionAction> {
        if self.state == SessionState::Closed {
            if let SessionEvent::TransportOpened { tag } = event {
                return vec![SessionAction::CloseTransport { tag }];
            }
            tracing::debug!(?event, "session closed, ignoring event");
            return vec![];
        }

        match event {
            SessionEvent::SelectRoom { room_id } => self.select_room(room_id, now),
            SessionEvent::Unmount => self.unmount(),
            SessionEvent::Tick => self.tick(now),

            SessionEvent::RoomLoaded { tag, result } => {
                if !self.is_current(tag) {
                    return vec![];
                }
                self.room_loaded(result)
            },

            SessionEvent::HistoryLoaded { tag, result } => {
                if !self.is_current(tag) {
                    return vec![];
                }
                self.history_loaded(result, now)
            },

            SessionEvent::TransportOpened { tag } => {
                if !self.is_current(tag) {
                    // The link outlived its selection
                    return vec![SessionAction::CloseTransport { tag }];
                }
                match self.connection_mut() {
                    Some(connection) if connection.is_active() => {
                        let actions = connection.transport_opened(now);
                        self.apply(actions)
                    },
                    _ => vec![SessionAction::CloseTransport { tag }],
                }
            },

            SessionEvent::TransportClosed { tag } => {
                if !self.is_current(tag) {
                    return vec![];
                }
                let actions = self.connection_mut().map(|c| c.transport_closed(now)).unwrap_or_default();
                self.apply(actions)
            },

            SessionEvent::FrameReceived { tag, frame } => {
                if !self.is_current(tag) {
                    return vec![];
                }
                self.frame_received(frame, now)
            },

            SessionEvent::HeartbeatReceived { tag } => {
                if self.is_current(tag)
                    && let Some(connection) = self.connection_mut()
                {
                    connection.heartbeat_received(now);
                }
                vec![]
            },
        }
    }

    /// Validate and publish a message typed by the user.
    ///
    /// Surrounding whitespace is trimmed. Never queues: unless the session is
    /// `Active` the send is rejected with a notice and nothing is written. On
    /// success the actions end with [`SessionAction::ClearInput`].
    pub fn send(&mut self, input: &str, now: I) -> Vec<SessionAction> {
        if self.state == SessionState::Closed {
            return vec![];
        }

        let content = input.trim();
        if content.is_empty() {
            return self.notify(Notice::EmptyMessage);
        }

        if self.state != SessionState::Active {
            tracing::debug!(state = ?self.state, "send rejected, not connected");
            return self.notify(Notice::NotConnected);
        }

        let Some(binding) = self.binding.as_mut() else {
            return self.notify(Notice::NotConnected);
        };

        let target = destination::room_publish(binding.tag.room_id);
        let payload = OutgoingMessage { content: content.to_string() };
        match binding.connection.publish(&target, &payload, now) {
            Ok(actions) => {
                let mut out = self.apply(actions);
                out.push(SessionAction::ClearInput);
                out
            },
            Err(e) if e.is_transient() => {
                tracing::debug!(error = %e, "send rejected by connection");
                self.notify(Notice::NotConnected)
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode outgoing message");
                self.notify(Notice::SendFailed)
            },
        }
    }

    /// Record a notice raised outside the state machine, e.g. by the runtime
    /// when the transport refused a frame.
    pub fn set_notice(&mut self, notice: Notice) {
        self.notice = Some(notice);
    }

    /// Clear the current notice.
    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// Lifecycle state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Selected room. `None` while idle or closed.
    pub fn room_id(&self) -> Option<RoomId> {
        self.binding.as_ref().map(|b| b.tag.room_id)
    }

    /// Tag of the current selection.
    pub fn tag(&self) -> Option<SessionTag> {
        self.binding.as_ref().map(|b| b.tag)
    }

    /// Metadata of the selected room, once loaded.
    pub fn room(&self) -> Option<&RoomInfo> {
        self.binding.as_ref().and_then(|b| b.room.as_ref())
    }

    /// Status of the selected room's connection.
    pub fn connection_status(&self) -> ConnectionStatus {
        self.binding
            .as_ref()
            .map_or(ConnectionStatus::Disconnected, |b| b.connection.status())
    }

    /// Connected and subscribed; sending is allowed.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Displayed messages, history first then live in arrival order.
    pub fn messages(&self) -> &[ChatMessage] {
        self.binding.as_ref().map_or(&[], |b| b.reconciler.snapshot())
    }

    /// Latest notice.
    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// Signed-in user.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// Whether `message` was written by the signed-in user.
    pub fn side(&self, message: &ChatMessage) -> MessageSide {
        MessageSide::of(message, self.user_id)
    }

    fn select_room(&mut self, room_id: RoomId, now: I) -> Vec<SessionAction> {
        let retry = matches!(self.state, SessionState::Failed | SessionState::Unavailable(_));
        if self.room_id() == Some(room_id) && !retry {
            tracing::debug!(room_id, "room already selected");
            return vec![];
        }

        let mut actions = self.teardown();

        self.generation += 1;
        let tag = SessionTag { room_id, generation: self.generation };
        self.binding = Some(Binding {
            tag,
            room: None,
            connection: ConnectionManager::new(room_id, self.config.clone(), now),
            reconciler: MessageReconciler::new(),
            subscription: None,
        });
        self.state = SessionState::Loading;
        self.notice = None;

        tracing::info!(room_id, generation = tag.generation, "room selected");

        actions.extend([
            SessionAction::FetchRoom { tag },
            SessionAction::FetchHistory { tag, after: None },
            SessionAction::Render,
        ]);
        actions
    }

    fn unmount(&mut self) -> Vec<SessionAction> {
        let mut actions = self.teardown();
        self.state = SessionState::Closed;
        self.notice = None;
        actions.push(SessionAction::Render);
        actions
    }

    /// Close the current binding's connection and discard its buffer.
    fn teardown(&mut self) -> Vec<SessionAction> {
        let Some(mut binding) = self.binding.take() else {
            return vec![];
        };
        let tag = binding.tag;

        let actions = close_connection(&mut binding);
        binding.reconciler.reset();

        tracing::debug!(room_id = tag.room_id, generation = tag.generation, "room binding torn down");
        actions
    }

    fn tick(&mut self, now: I) -> Vec<SessionAction> {
        let actions = self.connection_mut().map(|c| c.tick(now)).unwrap_or_default();
        self.apply(actions)
    }

    fn room_loaded(&mut self, result: Result<Option<RoomInfo>, FetchError>) -> Vec<SessionAction> {
        if matches!(self.state, SessionState::Unavailable(_)) {
            return vec![];
        }

        match result {
            Ok(Some(room)) => {
                if let Some(binding) = self.binding.as_mut() {
                    binding.room = Some(room);
                }
                vec![SessionAction::Render]
            },
            Ok(None) | Err(FetchError::NotFound) => self.unavailable(Unavailability::NotFound),
            Err(FetchError::Failed(reason)) => self.unavailable(Unavailability::Failed(reason)),
        }
    }

    fn history_loaded(
        &mut self,
        result: Result<Vec<ChatMessage>, FetchError>,
        now: I,
    ) -> Vec<SessionAction> {
        let Some(binding) = self.binding.as_mut() else {
            return vec![];
        };

        if binding.reconciler.is_initialized() {
            return self.catch_up_loaded(result);
        }

        if self.state != SessionState::Loading {
            tracing::debug!(state = ?self.state, "history arrived after room became unavailable");
            return vec![];
        }

        let history = match result {
            Ok(history) => history,
            Err(FetchError::NotFound) => return self.unavailable(Unavailability::NotFound),
            Err(FetchError::Failed(reason)) => {
                return self.unavailable(Unavailability::Failed(reason));
            },
        };

        let room_id = binding.tag.room_id;
        tracing::debug!(room_id, messages = history.len(), "history loaded");
        binding.reconciler.initialize(history);

        let mut connection_actions = match binding.connection.open(self.tokens.token(), now) {
            Ok(actions) => actions,
            Err(e) => {
                tracing::warn!(room_id, error = %e, "connection already open");
                vec![]
            },
        };
        let (subscription, subscribe_actions) =
            binding.connection.subscribe(destination::room_topic(room_id));
        binding.subscription = Some(subscription);
        connection_actions.extend(subscribe_actions);

        self.state = SessionState::Connecting;

        let mut actions = self.apply(connection_actions);
        actions.push(SessionAction::Render);
        actions
    }

    /// Merge a catch-up page fetched after a handshake.
    fn catch_up_loaded(&mut self, result: Result<Vec<ChatMessage>, FetchError>) -> Vec<SessionAction> {
        let Some(binding) = self.binding.as_mut() else {
            return vec![];
        };

        match result {
            Ok(page) => {
                let added = binding.reconciler.extend(page);
                tracing::debug!(room_id = binding.tag.room_id, added, "catch-up merged");
                if added > 0 { vec![SessionAction::Render] } else { vec![] }
            },
            Err(e) => {
                tracing::warn!(room_id = binding.tag.room_id, error = %e, "catch-up fetch failed");
                vec![]
            },
        }
    }

    fn frame_received(&mut self, frame: Frame, now: I) -> Vec<SessionAction> {
        let Some(connection) = self.connection_mut() else {
            return vec![];
        };

        match connection.handle_frame(frame, now) {
            Ok(actions) => self.apply(actions),
            Err(e) => {
                tracing::warn!(error = %e, "dropping inbound frame");
                vec![]
            },
        }
    }

    /// Translate connection actions into session actions for the current
    /// binding, folding deliveries and notifications into session state.
    fn apply(&mut self, actions: Vec<ConnectionAction>) -> Vec<SessionAction> {
        let Some(tag) = self.tag() else {
            return vec![];
        };

        let mut out = Vec::new();
        for action in actions {
            match action {
                ConnectionAction::Deliver { subscription, frame } => {
                    out.extend(self.deliver(subscription, &frame));
                },
                ConnectionAction::Notify(event) => out.extend(self.connection_event(event)),
                other => out.extend(link_action(tag, other)),
            }
        }
        out
    }

    fn deliver(&mut self, subscription: SubscriptionId, frame: &Frame) -> Vec<SessionAction> {
        let Some(binding) = self.binding.as_mut() else {
            return vec![];
        };
        let room_id = binding.tag.room_id;

        if binding.subscription != Some(subscription) {
            tracing::debug!(room_id, %subscription, "message for foreign subscription");
            return vec![];
        }

        if let Some(topic) = frame.header("destination")
            && destination::room_of_topic(topic) != Some(room_id)
        {
            tracing::debug!(room_id, topic, "message for another room's topic");
            return vec![];
        }

        let message = match ChatMessage::from_frame(frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(room_id, error = %e, "undecodable chat message");
                return vec![];
            },
        };

        if message.room_id != room_id {
            tracing::warn!(room_id, message_room = message.room_id, "message for another room");
            return vec![];
        }

        if binding.reconciler.append(message) { vec![SessionAction::Render] } else { vec![] }
    }

    fn connection_event(&mut self, event: ConnectionEvent) -> Vec<SessionAction> {
        let Some(binding) = self.binding.as_ref() else {
            return vec![];
        };
        let tag = binding.tag;

        match event {
            ConnectionEvent::Connected { reconnected } => {
                self.state = SessionState::Active;

                // Messages posted between the history snapshot (or the drop)
                // and the subscription only reach us through a catch-up page
                let after = binding.reconciler.last_id();
                let mut actions = vec![SessionAction::FetchHistory { tag, after }];
                if reconnected {
                    self.notice = Some(Notice::Reconnected);
                    actions.push(SessionAction::Notify(Notice::Reconnected));
                }
                actions.push(SessionAction::Render);
                actions
            },

            ConnectionEvent::TransportClosed { reconnect_in } => {
                tracing::info!(room_id = tag.room_id, ?reconnect_in, "connection lost");
                self.state = SessionState::Connecting;
                self.notify(Notice::Reconnecting)
            },

            ConnectionEvent::ProtocolError { message, details } => {
                tracing::warn!(room_id = tag.room_id, %message, %details, "connection failed");
                self.state = SessionState::Failed;
                self.notify(Notice::ConnectionError { message })
            },
        }
    }

    /// Stop the binding's connection and mark the room unavailable. Any
    /// history already shown is kept.
    fn unavailable(&mut self, reason: Unavailability) -> Vec<SessionAction> {
        let Some(binding) = self.binding.as_mut() else {
            return vec![];
        };
        let tag = binding.tag;
        let mut actions = close_connection(binding);

        let notice = match &reason {
            Unavailability::NotFound => Notice::RoomNotFound { room_id: tag.room_id },
            Unavailability::Failed(reason) => Notice::FetchFailed { reason: reason.clone() },
        };
        tracing::info!(room_id = tag.room_id, ?reason, "room unavailable");

        self.state = SessionState::Unavailable(reason);
        actions.extend(self.notify(notice));
        actions
    }

    fn notify(&mut self, notice: Notice) -> Vec<SessionAction> {
        self.notice = Some(notice.clone());
        vec![SessionAction::Notify(notice), SessionAction::Render]
    }

    fn is_current(&self, tag: SessionTag) -> bool {
        let current = self.tag() == Some(tag);
        if !current {
            tracing::debug!(room_id = tag.room_id, generation = tag.generation, "discarding stale completion");
        }
        current
    }

    fn connection_mut(&mut self) -> Option<&mut ConnectionManager<I>> {
        self.binding.as_mut().map(|b| &mut b.connection)
    }
}

impl<I> std::fmt::Debug for RoomSession<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration> + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("state", &self.state)
            .field("binding", &self.binding)
            .field("generation", &self.generation)
            .field("notice", &self.notice)
            .finish_non_exhaustive()
    }
}

/// Close a binding's connection, including a link that is still opening.
fn close_connection<I>(binding: &mut Binding<I>) -> Vec<SessionAction>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    let tag = binding.tag;
    let was_active = binding.connection.is_active();
    let mut actions: Vec<SessionAction> =
        binding.connection.close().into_iter().filter_map(|action| link_action(tag, action)).collect();

    if was_active && !actions.contains(&SessionAction::CloseTransport { tag }) {
        actions.push(SessionAction::CloseTransport { tag });
    }
    actions
}

/// Link-level connection actions, tagged with the binding they belong to.
fn link_action(tag: SessionTag, action: ConnectionAction) -> Option<SessionAction> {
    match action {
        ConnectionAction::OpenTransport => Some(SessionAction::OpenTransport { tag }),
        ConnectionAction::SendFrame(frame) => Some(SessionAction::SendFrame { tag, frame }),
        ConnectionAction::SendHeartbeat => Some(SessionAction::SendHeartbeat { tag }),
        ConnectionAction::CloseTransport => Some(SessionAction::CloseTransport { tag }),
        ConnectionAction::Deliver { .. } | ConnectionAction::Notify(_) => None,
    }
}
