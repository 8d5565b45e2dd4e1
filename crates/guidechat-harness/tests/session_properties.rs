//! End-to-end session behavior under simulation.
//!
//! Each test runs the production `Runtime` over `SimDriver` on tokio's paused
//! clock and scripts the user and the server through a `SimHandle`.

use std::{sync::Arc, time::Duration};

use guidechat_app::{Notice, RoomSession, Runtime, SessionState, SessionTag, StaticToken, Unavailability};
use guidechat_core::{BearerToken, ConnectionConfig, ConnectionManager, ConnectionStatus};
use guidechat_harness::{SimDriver, SimDriverError, SimHandle, SimServer};
use guidechat_proto::{ChatMessage, Command, HeartBeat};
use tokio::{task::JoinHandle, time::sleep};

const ME: u64 = 7;
const GUIDE: u64 = 2;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn server_with_rooms(rooms: &[u64]) -> SimServer {
    let server = SimServer::new();
    for room in rooms {
        server.add_room(*room, GUIDE, ME);
    }
    server
}

fn start(server: SimServer) -> (SimHandle, JoinHandle<Result<(), SimDriverError>>) {
    let driver = SimDriver::new(server);
    let handle = driver.handle();
    let tokens = Arc::new(StaticToken::new(Some(BearerToken::new(ME.to_string()))));
    let session = RoomSession::new(ConnectionConfig::default(), tokens).with_user(ME);
    let task = tokio::spawn(Runtime::new(driver, session).run());
    (handle, task)
}

async fn finish(handle: &SimHandle, task: JoinHandle<Result<(), SimDriverError>>) {
    handle.quit();
    task.await.unwrap().unwrap();
    let violations = handle.recording().violations;
    assert!(violations.is_empty(), "invariant violations: {violations:?}");
}

fn current_tag(handle: &SimHandle) -> SessionTag {
    handle.last().tag.unwrap()
}

#[tokio::test(start_paused = true)]
async fn no_cross_room_leakage() {
    let server = server_with_rooms(&[1, 2]);
    server.seed(1, GUIDE, "hello from room 1");
    server.seed(2, GUIDE, "hello from room 2");
    let (handle, task) = start(server);

    handle.select_room(1);
    sleep(ms(100)).await;
    assert_eq!(handle.last().state, SessionState::Active);
    let room_one = current_tag(&handle);

    // A frame for room 1 is in flight while the user switches away
    let late = ChatMessage { id: Some(99), room_id: 1, sender_id: GUIDE, content: "late".into(), created_at: None };
    handle.deliver_after(room_one, SimServer::message_frame("sub-0", &late), ms(50));
    handle.select_room(2);
    sleep(ms(500)).await;

    let last = handle.last();
    assert_eq!(last.room_id(), Some(2));
    assert_eq!(last.state, SessionState::Active);
    assert!(last.messages.iter().all(|(_, room)| *room == 2));
    assert!(!last.message_ids().contains(&99));
    assert!(handle.recording().closed.contains(&room_one));

    finish(&handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn history_before_live_ordering() {
    let server = server_with_rooms(&[1]);
    server.seed(1, GUIDE, "one");
    server.seed(1, GUIDE, "two");
    server.set_latency(1, ms(50));
    let (handle, task) = start(server);

    handle.select_room(1);
    sleep(ms(10)).await;
    // Posted while the history fetch is still outstanding
    handle.post(1, GUIDE, "three");
    sleep(ms(300)).await;

    assert_eq!(handle.last().message_ids(), vec![1, 2, 3]);

    // Live messages keep following
    handle.post(1, GUIDE, "four");
    sleep(ms(10)).await;
    assert_eq!(handle.last().message_ids(), vec![1, 2, 3, 4]);

    finish(&handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn idempotent_teardown() {
    // Never-opened and already-closed connections close silently
    let mut connection = ConnectionManager::new(1, ConnectionConfig::default(), tokio::time::Instant::now());
    assert!(connection.close().is_empty());
    assert!(connection.close().is_empty());
    assert_eq!(connection.status(), ConnectionStatus::Disconnected);

    let (handle, task) = start(server_with_rooms(&[1]));
    handle.select_room(1);
    sleep(ms(100)).await;
    let tag = current_tag(&handle);

    handle.unmount();
    handle.unmount();
    sleep(ms(10)).await;
    finish(&handle, task).await;

    let recording = handle.recording();
    assert_eq!(recording.closed, vec![tag]);
    assert_eq!(recording.last().state, SessionState::Closed);
    assert_eq!(handle.server().received_commands(Command::Disconnect).len(), 1);
    assert!(handle.server().open_links().is_empty());
}

#[tokio::test(start_paused = true)]
async fn reconnect_resubscribes() {
    let (handle, task) = start(server_with_rooms(&[1]));
    handle.select_room(1);
    sleep(ms(100)).await;
    assert_eq!(handle.server().received_commands(Command::Subscribe).len(), 1);

    handle.drop_links();
    sleep(ms(100)).await;
    assert_eq!(handle.last().state, SessionState::Connecting);

    // Reconnect delay is 5s
    sleep(ms(5100)).await;
    assert_eq!(handle.last().state, SessionState::Active);

    let subscribes = handle.server().received_commands(Command::Subscribe);
    assert_eq!(subscribes.len(), 2);
    assert_eq!(subscribes[0].1.header("id"), subscribes[1].1.header("id"));

    handle.post(1, GUIDE, "after reconnect");
    sleep(ms(10)).await;
    assert_eq!(handle.last().message_ids(), vec![1]);

    let notices = handle.recording().notices;
    assert_eq!(notices, vec![Notice::Reconnecting, Notice::Reconnected]);

    finish(&handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_catches_up_on_missed_messages() {
    let (handle, task) = start(server_with_rooms(&[1]));
    handle.select_room(1);
    sleep(ms(100)).await;

    handle.drop_links();
    sleep(ms(100)).await;
    // Nobody is subscribed while the link is down
    handle.post(1, GUIDE, "missed");
    sleep(ms(5100)).await;

    assert_eq!(handle.last().message_ids(), vec![1]);
    let fetches = handle.recording().history_fetches;
    assert_eq!(fetches.last().map(|(_, after)| *after), Some(None));

    finish(&handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn send_rejected_when_not_connected() {
    let server = server_with_rooms(&[1]);
    server.set_latency(1, ms(1000));
    let (handle, task) = start(server);

    // Still loading
    handle.select_room(1);
    sleep(ms(10)).await;
    handle.send_input("hello");
    sleep(ms(10)).await;

    // Broker refuses the session
    handle.server().refuse_sessions(Some("bad token"));
    sleep(ms(2000)).await;
    assert_eq!(handle.last().state, SessionState::Failed);
    handle.send_input("hello again");
    sleep(ms(10)).await;

    let recording = handle.recording();
    assert!(handle.server().received_commands(Command::Send).is_empty());
    assert_eq!(recording.cleared_inputs, 0);
    assert_eq!(recording.notices, vec![
        Notice::NotConnected,
        Notice::ConnectionError { message: "bad token".into() },
        Notice::NotConnected,
    ]);

    finish(&handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn stale_fetch_discarded() {
    let server = server_with_rooms(&[1, 2]);
    server.seed(1, GUIDE, "a1");
    server.seed(1, GUIDE, "a2");
    let b = server.seed(2, GUIDE, "b1").unwrap();
    server.set_latency(1, ms(200));
    let (handle, task) = start(server);

    handle.select_room(1);
    sleep(ms(10)).await;
    handle.select_room(2);
    sleep(ms(500)).await;

    let last = handle.last();
    assert_eq!(last.room_id(), Some(2));
    assert_eq!(last.message_ids(), vec![b]);
    // Room 1 never got as far as a link
    assert!(handle.recording().opened.iter().all(|tag| tag.room_id == 2));

    finish(&handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn own_message_round_trips_once() {
    let (handle, task) = start(server_with_rooms(&[1]));
    handle.select_room(1);
    sleep(ms(100)).await;

    handle.send_input("  hi there  ");
    sleep(ms(10)).await;

    let stored = handle.server().messages(1);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, "hi there");
    assert_eq!(stored[0].sender_id, ME);
    assert_eq!(handle.last().message_ids(), vec![1]);
    assert_eq!(handle.recording().cleared_inputs, 1);

    finish(&handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn failed_write_keeps_input() {
    let (handle, task) = start(server_with_rooms(&[1]));
    handle.select_room(1);
    sleep(ms(100)).await;

    handle.server().fail_writes(true);
    handle.send_input("lost");
    sleep(ms(10)).await;

    let recording = handle.recording();
    assert_eq!(recording.cleared_inputs, 0);
    assert_eq!(recording.notices, vec![Notice::SendFailed]);

    handle.server().fail_writes(false);
    finish(&handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn missing_room_is_unavailable() {
    let (handle, task) = start(server_with_rooms(&[1]));
    handle.select_room(42);
    sleep(ms(100)).await;

    let recording = handle.recording();
    assert_eq!(recording.last().state, SessionState::Unavailable(Unavailability::NotFound));
    assert_eq!(recording.notices, vec![Notice::RoomNotFound { room_id: 42 }]);
    assert!(recording.opened.is_empty());

    finish(&handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn silent_broker_triggers_reconnect() {
    let server = server_with_rooms(&[1]);
    // Broker promises heart-beats it never sends
    server.set_heartbeat(HeartBeat::new(ms(4000), Duration::ZERO));
    let (handle, task) = start(server);

    handle.select_room(1);
    sleep(ms(100)).await;
    assert_eq!(handle.last().state, SessionState::Active);

    // Two missed 4s beats
    sleep(ms(8200)).await;
    let recording = handle.recording();
    assert_eq!(recording.notices.first(), Some(&Notice::Reconnecting));
    assert_eq!(recording.closed.len(), 1);

    finish(&handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn room_switch_during_handshake_closes_late_link() {
    let server = server_with_rooms(&[1, 2]);
    server.set_connect_latency(ms(200));
    let (handle, task) = start(server);

    handle.select_room(1);
    sleep(ms(10)).await;
    // History is in and the room 1 link is still opening
    assert_eq!(handle.last().state, SessionState::Connecting);
    let room_one = current_tag(&handle);

    handle.select_room(2);
    sleep(ms(400)).await;
    assert_eq!(handle.last().state, SessionState::Active);
    let room_two = current_tag(&handle);

    let recording = handle.recording();
    assert!(recording.closed.contains(&room_one));
    assert!(!recording.closed.contains(&room_two));

    let server = handle.server();
    assert!(server.received().iter().all(|(tag, _)| *tag != room_one));
    let subscribed: Vec<_> =
        server.received_commands(Command::Subscribe).into_iter().map(|(tag, _)| tag).collect();
    assert_eq!(subscribed, vec![room_two]);
    assert_eq!(server.open_links(), vec![room_two]);

    finish(&handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn runtime_failure_still_tears_down() {
    let (handle, task) = start(server_with_rooms(&[1]));
    handle.select_room(1);
    sleep(ms(100)).await;
    assert_eq!(handle.last().state, SessionState::Active);
    let tag = current_tag(&handle);

    handle.fail_renders(true);
    handle.post(1, GUIDE, "renders now fail");
    let result = task.await.unwrap();
    assert!(result.is_err());

    let server = handle.server();
    let disconnects: Vec<_> =
        server.received_commands(Command::Disconnect).into_iter().map(|(t, _)| t).collect();
    assert_eq!(disconnects, vec![tag]);
    assert!(handle.recording().closed.contains(&tag));
    assert!(server.open_links().is_empty());
}
