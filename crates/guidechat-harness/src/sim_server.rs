//! In-memory chat server for simulation.
//!
//! One [`SimServer`] plays both collaborators a session talks to: the REST API
//! (room metadata and history, via [`ChatApi`]) and the STOMP broker (links
//! keyed by [`SessionTag`]). Messages published through the broker land in the
//! same store the history endpoint reads, like the real backend.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use guidechat_app::{ChatApi, FetchError, SessionTag};
use guidechat_proto::{
    ChatMessage, Command, Frame, HeartBeat, MessageId, OutgoingMessage, RoomId, RoomInfo, UserId,
    destination,
};

/// Server output for the driver to route back to a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Frame for the client on this link.
    Frame(SessionTag, Frame),
    /// Server closed this link.
    Close(SessionTag),
}

#[derive(Debug)]
struct SimRoom {
    info: RoomInfo,
    messages: Vec<ChatMessage>,
    latency: Duration,
}

#[derive(Debug, Default)]
struct SimLink {
    connected: bool,
    user_id: UserId,
    /// Subscription id -> destination.
    subscriptions: BTreeMap<String, String>,
}

#[derive(Debug)]
struct ServerState {
    rooms: BTreeMap<RoomId, SimRoom>,
    links: HashMap<SessionTag, SimLink>,
    next_message_id: MessageId,
    accepting: bool,
    refusal: Option<String>,
    fail_writes: bool,
    heartbeat: HeartBeat,
    connect_latency: Duration,
    received: Vec<(SessionTag, Frame)>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            rooms: BTreeMap::new(),
            links: HashMap::new(),
            next_message_id: 1,
            accepting: true,
            refusal: None,
            fail_writes: false,
            heartbeat: HeartBeat::disabled(),
            connect_latency: Duration::ZERO,
            received: Vec::new(),
        }
    }
}

/// In-memory REST API and STOMP broker.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct SimServer {
    state: Arc<Mutex<ServerState>>,
}

impl SimServer {
    /// Create an empty server that accepts every connection.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a room between `guide_id` and `user_id`.
    pub fn add_room(&self, room_id: RoomId, guide_id: UserId, user_id: UserId) {
        let info = RoomInfo {
            id: room_id,
            title: format!("room {room_id}"),
            display_title: format!("guide {guide_id}"),
            guide_id,
            user_id,
            updated_at: None,
            last_message_id: None,
        };
        self.lock().rooms.insert(room_id, SimRoom { info, messages: Vec::new(), latency: Duration::ZERO });
    }

    /// Store a message without fanning it out. Returns its identifier.
    pub fn seed(&self, room_id: RoomId, sender_id: UserId, content: &str) -> Option<MessageId> {
        let mut state = self.lock();
        store(&mut state, room_id, sender_id, content).and_then(|m| m.id)
    }

    /// Store a message and fan it out to every link subscribed to the room.
    pub fn post(&self, room_id: RoomId, sender_id: UserId, content: &str) -> Vec<Delivery> {
        let mut state = self.lock();
        match store(&mut state, room_id, sender_id, content) {
            Some(message) => fan_out(&state, &message),
            None => vec![],
        }
    }

    /// Delay every REST response for `room_id`.
    pub fn set_latency(&self, room_id: RoomId, latency: Duration) {
        if let Some(room) = self.lock().rooms.get_mut(&room_id) {
            room.latency = latency;
        }
    }

    /// Delay before a transport open completes.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.lock().connect_latency = latency;
    }

    /// Current transport open delay.
    pub fn connect_latency(&self) -> Duration {
        self.lock().connect_latency
    }

    /// Accept or refuse new transport links.
    pub fn set_accepting(&self, accepting: bool) {
        self.lock().accepting = accepting;
    }

    /// Answer every `CONNECT` with an `ERROR` carrying `message`. `None` to
    /// accept again.
    pub fn refuse_sessions(&self, message: Option<&str>) {
        self.lock().refusal = message.map(str::to_string);
    }

    /// Make every frame write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Heart-beat the broker offers in `CONNECTED`.
    pub fn set_heartbeat(&self, heartbeat: HeartBeat) {
        self.lock().heartbeat = heartbeat;
    }

    /// Stored messages of a room.
    pub fn messages(&self, room_id: RoomId) -> Vec<ChatMessage> {
        self.lock().rooms.get(&room_id).map(|r| r.messages.clone()).unwrap_or_default()
    }

    /// Every frame received from clients, in order.
    pub fn received(&self) -> Vec<(SessionTag, Frame)> {
        self.lock().received.clone()
    }

    /// Received frames with the given command.
    pub fn received_commands(&self, command: Command) -> Vec<(SessionTag, Frame)> {
        self.lock().received.iter().filter(|(_, f)| f.command == command).cloned().collect()
    }

    /// Links currently open.
    pub fn open_links(&self) -> Vec<SessionTag> {
        let mut links: Vec<_> = self.lock().links.keys().copied().collect();
        links.sort_by_key(|t| (t.generation, t.room_id));
        links
    }

    /// Open a link. Returns `false` if refused.
    pub fn accept_link(&self, tag: SessionTag) -> bool {
        let mut state = self.lock();
        if !state.accepting {
            return false;
        }
        state.links.insert(tag, SimLink::default());
        true
    }

    /// Client closed a link. Unknown links are ignored.
    pub fn close_link(&self, tag: SessionTag) {
        self.lock().links.remove(&tag);
    }

    /// Drop every link from the server side.
    pub fn drop_links(&self) -> Vec<Delivery> {
        let mut state = self.lock();
        let mut tags: Vec<_> = state.links.drain().map(|(tag, _)| tag).collect();
        tags.sort_by_key(|t| (t.generation, t.room_id));
        tracing::debug!(links = tags.len(), "server dropped links");
        tags.into_iter().map(Delivery::Close).collect()
    }

    /// Process a client frame on `tag`'s link.
    ///
    /// # Errors
    ///
    /// Returns the reason if the link is not open or writes are failing.
    pub fn client_frame(&self, tag: SessionTag, frame: Frame) -> Result<Vec<Delivery>, String> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err("write failed".into());
        }
        if !state.links.contains_key(&tag) {
            return Err(format!("no link for room {} generation {}", tag.room_id, tag.generation));
        }
        state.received.push((tag, frame.clone()));

        let refusal = state.refusal.clone();
        let heartbeat = state.heartbeat;
        let Some(link) = state.links.get_mut(&tag) else {
            return Ok(vec![]);
        };

        match frame.command {
            Command::Connect | Command::Stomp => {
                if let Some(message) = refusal {
                    state.links.remove(&tag);
                    let error = Frame::new(Command::Error).with_header("message", message);
                    return Ok(vec![Delivery::Frame(tag, error), Delivery::Close(tag)]);
                }
                link.connected = true;
                link.user_id = frame
                    .header("Authorization")
                    .and_then(|v| v.strip_prefix("Bearer "))
                    .and_then(|t| t.parse().ok())
                    .unwrap_or_default();
                let connected = Frame::new(Command::Connected)
                    .with_header("version", "1.2")
                    .with_header("heart-beat", heartbeat.to_header());
                Ok(vec![Delivery::Frame(tag, connected)])
            },

            Command::Subscribe if link.connected => {
                if let (Some(id), Some(dest)) = (frame.header("id"), frame.header("destination")) {
                    link.subscriptions.insert(id.to_string(), dest.to_string());
                }
                Ok(vec![])
            },

            Command::Unsubscribe => {
                if let Some(id) = frame.header("id") {
                    link.subscriptions.remove(id);
                }
                Ok(vec![])
            },

            Command::Send if link.connected => {
                let sender = link.user_id;
                let room = frame
                    .header("destination")
                    .and_then(|d| d.strip_prefix(destination::PUBLISH_PREFIX))
                    .and_then(|d| d.strip_suffix("/messages"))
                    .and_then(|d| d.parse::<RoomId>().ok());
                let Some(room_id) = room else {
                    return Ok(vec![]);
                };
                let Ok(outgoing) = frame.json::<OutgoingMessage>() else {
                    return Ok(vec![]);
                };
                match store(&mut state, room_id, sender, &outgoing.content) {
                    Some(message) => Ok(fan_out(&state, &message)),
                    None => Ok(vec![]),
                }
            },

            Command::Disconnect => {
                state.links.remove(&tag);
                Ok(vec![])
            },

            _ => Ok(vec![]),
        }
    }

    /// `MESSAGE` frame for `message` as the broker would deliver it on
    /// `subscription`.
    pub fn message_frame(subscription: &str, message: &ChatMessage) -> Frame {
        Frame::new(Command::Message)
            .with_header("subscription", subscription)
            .with_header("destination", destination::room_topic(message.room_id))
            .with_header("message-id", message.id.unwrap_or_default().to_string())
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_vec(message).unwrap_or_default())
    }

    fn room_latency(&self, room_id: RoomId) -> Duration {
        self.lock().rooms.get(&room_id).map(|r| r.latency).unwrap_or_default()
    }
}

/// Append a message to a room's store. `None` if the room does not exist.
fn store(
    state: &mut ServerState,
    room_id: RoomId,
    sender_id: UserId,
    content: &str,
) -> Option<ChatMessage> {
    let id = state.next_message_id;
    let room = state.rooms.get_mut(&room_id)?;
    state.next_message_id += 1;

    let message = ChatMessage {
        id: Some(id),
        room_id,
        sender_id,
        content: content.to_string(),
        created_at: None,
    };
    room.messages.push(message.clone());
    room.info.last_message_id = Some(id);
    Some(message)
}

fn fan_out(state: &ServerState, message: &ChatMessage) -> Vec<Delivery> {
    let topic = destination::room_topic(message.room_id);
    let mut tags: Vec<_> = state.links.keys().copied().collect();
    tags.sort_by_key(|t| (t.generation, t.room_id));

    let mut deliveries = Vec::new();
    for tag in tags {
        let Some(link) = state.links.get(&tag) else { continue };
        for (id, dest) in &link.subscriptions {
            if *dest == topic {
                deliveries.push(Delivery::Frame(tag, SimServer::message_frame(id, message)));
            }
        }
    }
    deliveries
}

#[async_trait]
impl ChatApi for SimServer {
    async fn fetch_room(&self, room_id: RoomId) -> Result<Option<RoomInfo>, FetchError> {
        let room = self.lock().rooms.get(&room_id).map(|r| r.info.clone());
        let latency = self.room_latency(room_id);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(room)
    }

    async fn fetch_history(
        &self,
        room_id: RoomId,
        after: Option<MessageId>,
    ) -> Result<Vec<ChatMessage>, FetchError> {
        // Snapshot at request time, like a real query
        let snapshot = self.lock().rooms.get(&room_id).map(|r| {
            r.messages
                .iter()
                .filter(|m| after.is_none_or(|after| m.id.is_some_and(|id| id > after)))
                .cloned()
                .collect::<Vec<_>>()
        });
        let latency = self.room_latency(room_id);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        snapshot.ok_or(FetchError::NotFound)
    }
}
