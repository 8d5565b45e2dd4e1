//! Terminal driver implementing the Driver trait.
//!
//! `TerminalDriver` reads typed lines from stdin, prints to stdout, fetches
//! over REST and keeps one WebSocket link per [`SessionTag`]. Completions of
//! spawned work come back through an internal channel so the runtime sees a
//! single ordered event stream.

use std::{collections::HashMap, io, sync::Arc, time::Instant};

use guidechat_app::{ChatApi, Driver, DriverEvent, Notice, RoomSession, SessionEvent, SessionTag};
use guidechat_client::{ConnectedLink, LinkWriter, SystemEnv, transport};
use guidechat_core::env::Environment;
use guidechat_proto::{Frame, Inbound, MessageId, RoomId};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
    task::{AbortHandle, JoinSet},
    time::{Duration, Interval, MissedTickBehavior},
};

use crate::{
    RuntimeError,
    input::{self, HELP, Input},
    render::Renderer,
};

/// Interval between [`SessionEvent::Tick`]s. Well under the heart-beat
/// interval so beats go out on time.
const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Work finished off the runtime task.
enum Completion {
    Event(SessionEvent),
    Opened(SessionTag, ConnectedLink),
}

/// A link the runtime can write to.
struct OpenLink {
    writer: LinkWriter,
    pump: AbortHandle,
}

/// Production driver for the terminal client.
pub struct TerminalDriver<A> {
    env: SystemEnv,
    api: Arc<A>,
    ws_url: String,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    lines: mpsc::Receiver<String>,
    ticks: Interval,
    tasks: JoinSet<()>,
    links: HashMap<SessionTag, OpenLink>,
    renderer: Renderer<io::Stdout>,
}

impl<A> TerminalDriver<A>
where
    A: ChatApi + 'static,
{
    /// Driver fetching through `api` and connecting to the broker at `ws_url`.
    ///
    /// Must be called inside a tokio runtime: it starts the stdin reader.
    pub fn new(api: Arc<A>, ws_url: impl Into<String>) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let mut ticks = tokio::time::interval(TICK_INTERVAL);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            env: SystemEnv::new(),
            api,
            ws_url: ws_url.into(),
            completions_tx,
            completions_rx,
            lines: spawn_stdin_reader(),
            ticks,
            tasks: JoinSet::new(),
            links: HashMap::new(),
            renderer: Renderer::new(io::stdout()),
        }
    }

    /// Queue a room selection, as if typed.
    pub fn select_room(&self, room_id: RoomId) {
        let _ = self.completions_tx.send(Completion::Event(SessionEvent::SelectRoom { room_id }));
    }

    /// Keep the link and start forwarding what it receives.
    fn attach(&mut self, tag: SessionTag, link: ConnectedLink) {
        let ConnectedLink { writer, mut from_server } = link;
        let completions = self.completions_tx.clone();

        let pump = self.tasks.spawn(async move {
            while let Some(item) = from_server.recv().await {
                let event = match item {
                    Inbound::Frame(frame) => SessionEvent::FrameReceived { tag, frame },
                    Inbound::Heartbeat => SessionEvent::HeartbeatReceived { tag },
                };
                if completions.send(Completion::Event(event)).is_err() {
                    return;
                }
            }
            let _ = completions.send(Completion::Event(SessionEvent::TransportClosed { tag }));
        });

        if let Some(previous) = self.links.insert(tag, OpenLink { writer, pump }) {
            previous.pump.abort();
        }
    }

    fn writer(&self, tag: SessionTag) -> Result<LinkWriter, RuntimeError> {
        self.links
            .get(&tag)
            .map(|link| link.writer.clone())
            .ok_or(RuntimeError::NoLink { room_id: tag.room_id })
    }
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                },
            }
        }
    });
    rx
}

impl<A> Driver for TerminalDriver<A>
where
    A: ChatApi + 'static,
{
    type Error = RuntimeError;
    type Instant = Instant;

    async fn poll_event(&mut self) -> Result<Option<DriverEvent>, Self::Error> {
        while self.tasks.try_join_next().is_some() {}

        loop {
            tokio::select! {
                biased;

                Some(completion) = self.completions_rx.recv() => match completion {
                    Completion::Event(event) => return Ok(Some(DriverEvent::Session(event))),
                    Completion::Opened(tag, link) => {
                        self.attach(tag, link);
                        return Ok(Some(DriverEvent::Session(SessionEvent::TransportOpened { tag })));
                    },
                },

                line = self.lines.recv() => {
                    let Some(line) = line else {
                        // stdin closed
                        return Ok(None);
                    };
                    match input::parse(&line) {
                        Input::Help => self.renderer.line(HELP)?,
                        Input::Invalid(reason) => self.renderer.line(&format!("{reason} ({HELP})"))?,
                        parsed => {
                            if let Some(event) = parsed.into_event() {
                                return Ok(Some(event));
                            }
                        },
                    }
                },

                _ = self.ticks.tick() => return Ok(Some(DriverEvent::Session(SessionEvent::Tick))),
            }
        }
    }

    fn fetch_room(&mut self, tag: SessionTag) {
        let api = Arc::clone(&self.api);
        let completions = self.completions_tx.clone();
        self.tasks.spawn(async move {
            let result = api.fetch_room(tag.room_id).await;
            let _ = completions.send(Completion::Event(SessionEvent::RoomLoaded { tag, result }));
        });
    }

    fn fetch_history(&mut self, tag: SessionTag, after: Option<MessageId>) {
        let api = Arc::clone(&self.api);
        let completions = self.completions_tx.clone();
        self.tasks.spawn(async move {
            let result = api.fetch_history(tag.room_id, after).await;
            let _ = completions.send(Completion::Event(SessionEvent::HistoryLoaded { tag, result }));
        });
    }

    fn open_transport(&mut self, tag: SessionTag) {
        let url = self.ws_url.clone();
        let completions = self.completions_tx.clone();
        self.tasks.spawn(async move {
            let completion = match transport::connect(&url).await {
                Ok(link) => Completion::Opened(tag, link),
                Err(e) => {
                    tracing::warn!(room_id = tag.room_id, error = %e, "broker connection failed");
                    Completion::Event(SessionEvent::TransportClosed { tag })
                },
            };
            let _ = completions.send(completion);
        });
    }

    async fn send_frame(&mut self, tag: SessionTag, frame: Frame) -> Result<(), Self::Error> {
        let writer = self.writer(tag)?;
        Ok(writer.send_frame(&frame).await?)
    }

    async fn send_heartbeat(&mut self, tag: SessionTag) -> Result<(), Self::Error> {
        let writer = self.writer(tag)?;
        Ok(writer.send_heartbeat().await?)
    }

    fn close_transport(&mut self, tag: SessionTag) {
        // Dropping the writer lets queued frames (DISCONNECT) drain first
        if let Some(link) = self.links.remove(&tag) {
            link.pump.abort();
        }
    }

    fn now(&self) -> Self::Instant {
        self.env.now()
    }

    fn render(&mut self, session: &RoomSession<Self::Instant>) -> Result<(), Self::Error> {
        Ok(self.renderer.render(session)?)
    }

    fn notify(&mut self, notice: &Notice) -> Result<(), Self::Error> {
        Ok(self.renderer.notice(notice)?)
    }

    fn clear_input(&mut self) {
        // Lines are consumed as they are read
    }

    fn stop(&mut self) {
        for link in self.links.values() {
            link.writer.stop();
        }
        self.links.clear();
        self.tasks.abort_all();
    }
}
