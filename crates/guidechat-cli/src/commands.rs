//! One-shot commands and the polling watcher.

use std::{future::Future, io::Write, time::Duration};

use guidechat_app::{ChatApi, FetchError, MessageSide, RefetchSchedule};
use guidechat_client::HttpApi;
use guidechat_core::MessageReconciler;
use guidechat_proto::{RoomId, UserId};
use tokio::time::Instant;

use crate::{
    RuntimeError,
    render::{message_line, room_line},
};

/// Print one page of the room directory, and the cursor for the next one.
pub async fn rooms(api: &HttpApi, cursor: Option<&str>, out: &mut impl Write) -> Result<(), RuntimeError> {
    let page = api.list_rooms(cursor).await?;
    if page.rooms.is_empty() {
        writeln!(out, "no rooms")?;
    }
    for room in &page.rooms {
        writeln!(out, "{}", room_line(room))?;
    }
    if let Some(next) = page.next_cursor {
        writeln!(out, "more: --cursor {next}")?;
    }
    Ok(())
}

/// Create a room with `guide_id`, or reuse the existing one.
pub async fn start(
    api: &HttpApi,
    guide_id: UserId,
    user_id: UserId,
    out: &mut impl Write,
) -> Result<(), RuntimeError> {
    let room = api.start_room(guide_id, user_id).await?;
    writeln!(out, "{}", room_line(&room))?;
    Ok(())
}

/// Delete a room.
pub async fn delete(api: &HttpApi, room_id: RoomId, out: &mut impl Write) -> Result<(), RuntimeError> {
    api.delete_room(room_id).await?;
    writeln!(out, "deleted room {room_id}")?;
    Ok(())
}

/// Post one message over REST.
pub async fn post(api: &HttpApi, room_id: RoomId, content: &str, out: &mut impl Write) -> Result<(), RuntimeError> {
    let content = content.trim();
    if content.is_empty() {
        writeln!(out, "nothing to send")?;
        return Ok(());
    }
    let message = api.post_message(room_id, content).await?;
    writeln!(out, "{}", message_line(&message, MessageSide::Sent, None))?;
    Ok(())
}

/// Follow a room by refetching its messages every `interval` until `shutdown`
/// resolves.
///
/// The first fetch loads the full history; later fetches ask only for
/// messages after the newest one seen. Failed refetches are reported and
/// retried on the next interval.
pub async fn watch<A, W>(
    api: &A,
    room_id: RoomId,
    user_id: Option<UserId>,
    interval: Duration,
    out: &mut W,
    shutdown: impl Future<Output = ()>,
) -> Result<(), RuntimeError>
where
    A: ChatApi,
    W: Write,
{
    let room = api.fetch_room(room_id).await?.ok_or(FetchError::NotFound)?;
    let title = if room.display_title.is_empty() { &room.title } else { &room.display_title };
    writeln!(out, "-- {title} (room {room_id}) --")?;

    let mut schedule = RefetchSchedule::new(interval);
    let mut reconciler = MessageReconciler::new();
    tokio::pin!(shutdown);

    loop {
        if schedule.poll(Instant::now()) {
            match api.fetch_history(room_id, reconciler.last_id()).await {
                Ok(page) => {
                    let shown = reconciler.len();
                    if reconciler.is_initialized() {
                        reconciler.extend(page);
                    } else {
                        reconciler.initialize(page);
                    }
                    for message in reconciler.snapshot().get(shown..).unwrap_or_default() {
                        let side = MessageSide::of(message, user_id);
                        writeln!(out, "{}", message_line(message, side, Some(&room)))?;
                    }
                },
                Err(e) => {
                    tracing::warn!(room_id, error = %e, "refetch failed");
                    writeln!(out, "* refresh failed: {e}")?;
                },
            }
            out.flush()?;
        }

        tokio::select! {
            () = &mut shutdown => return Ok(()),
            () = tokio::time::sleep(schedule.interval()) => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use guidechat_proto::{ChatMessage, MessageId, RoomInfo};

    use super::*;

    /// Serves a fixed list, revealing one more message per history call.
    #[derive(Default)]
    struct Growing {
        calls: Mutex<Vec<Option<MessageId>>>,
        fail_on: Option<usize>,
    }

    fn msg(id: u64, sender_id: u64) -> ChatMessage {
        ChatMessage { id: Some(id), room_id: 3, sender_id, content: format!("m{id}"), created_at: None }
    }

    #[async_trait]
    impl ChatApi for Growing {
        async fn fetch_room(&self, room_id: RoomId) -> Result<Option<RoomInfo>, FetchError> {
            Ok((room_id == 3).then(|| RoomInfo {
                id: 3,
                title: "tour".into(),
                display_title: "Mina".into(),
                guide_id: 2,
                user_id: 7,
                updated_at: None,
                last_message_id: None,
            }))
        }

        async fn fetch_history(
            &self,
            _room_id: RoomId,
            after: Option<MessageId>,
        ) -> Result<Vec<ChatMessage>, FetchError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(after);
            if self.fail_on == Some(calls.len()) {
                return Err(FetchError::Failed("timeout".into()));
            }
            let newest = calls.len() as u64 + 1;
            // Overlaps what was already seen; the reconciler drops repeats
            Ok((1..=newest).map(|id| msg(id, if id % 2 == 0 { 7 } else { 2 })).collect())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn watch_prints_each_message_once() {
        let api = Arc::new(Growing { fail_on: Some(2), ..Growing::default() });
        let mut out = Vec::new();

        // Polls at 0s, 3s and 6s
        let shutdown = tokio::time::sleep(Duration::from_millis(7000));
        watch(api.as_ref(), 3, Some(7), Duration::from_millis(3000), &mut out, shutdown).await.unwrap();

        assert_eq!(*api.calls.lock().unwrap(), vec![None, Some(2), Some(2)]);
        insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r"
        -- Mina (room 3) --
        [--:--] Mina: m1
        [--:--] you: m2
        * refresh failed: timeout
        [--:--] Mina: m3
        [--:--] you: m4
        ");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_does_not_spin() {
        let api = Growing::default();
        let mut out = Vec::new();

        let shutdown = tokio::time::sleep(Duration::from_millis(1000));
        watch(&api, 3, None, Duration::ZERO, &mut out, shutdown).await.unwrap();

        // One poll per 100 ms minimum interval, the one at 1000 ms racing shutdown
        let calls = api.calls.lock().unwrap().len();
        assert!((10..=11).contains(&calls), "{calls} fetches in one second");
    }

    #[tokio::test(start_paused = true)]
    async fn watch_missing_room() {
        let api = Growing::default();
        let mut out = Vec::new();
        let result = watch(&api, 9, None, Duration::from_millis(3000), &mut out, std::future::pending()).await;
        assert!(matches!(result, Err(RuntimeError::Fetch(FetchError::NotFound))));
    }
}
