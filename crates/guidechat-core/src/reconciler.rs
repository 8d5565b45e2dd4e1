//! Message reconciliation.
//!
//! A room's visible conversation comes from two sources: a one-shot history
//! fetch and the live subscription. [`MessageReconciler`] merges them into a
//! single sequence in arrival order: history first, in server order, then live
//! messages as their frames arrive. Nothing is re-sorted by timestamp.
//!
//! The live stream is at-least-once: a reconnect can redeliver, and a catch-up
//! page can overlap the stream. Server identifiers are unique within a room, so
//! a message whose identifier has already been seen is dropped.

use std::collections::HashSet;

use guidechat_proto::{ChatMessage, MessageId};

/// Ordered, duplicate-free message buffer for one room session.
///
/// # Invariants
///
/// - Every history message precedes every live message, whatever order the
///   history fetch and the first live frames complete in.
/// - No two entries share a server-assigned identifier.
#[derive(Debug, Clone, Default)]
pub struct MessageReconciler {
    /// Displayed sequence.
    messages: Vec<ChatMessage>,
    /// Server identifiers present in `messages`.
    seen: HashSet<MessageId>,
    /// Live messages that arrived before the history was installed.
    pending: Vec<ChatMessage>,
    /// History has been installed.
    initialized: bool,
}

impl MessageReconciler {
    /// Create an empty, uninitialized reconciler.
    pub fn new() -> Self {
        Self::default()
    }

    /// History has been installed.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Replace the buffer with `history`.
    ///
    /// Live messages that arrived early are kept and placed after the history.
    pub fn initialize(&mut self, history: Vec<ChatMessage>) {
        let early = std::mem::take(&mut self.pending);
        self.messages.clear();
        self.seen.clear();
        self.initialized = true;

        let history_len = history.len();
        let dropped = history
            .into_iter()
            .chain(early)
            .map(|message| self.push(message))
            .filter(|appended| !appended)
            .count();

        tracing::debug!(history = history_len, dropped, total = self.messages.len(), "history installed");
    }

    /// Append one live message. Returns `false` if it was a duplicate.
    pub fn append(&mut self, message: ChatMessage) -> bool {
        if self.initialized {
            return self.push(message);
        }

        let duplicate =
            message.id.is_some() && self.pending.iter().any(|held| held.id == message.id);
        if duplicate {
            return false;
        }
        self.pending.push(message);
        true
    }

    /// Append a catch-up page. Returns how many messages were new.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) -> usize {
        messages.into_iter().map(|message| self.append(message)).filter(|appended| *appended).count()
    }

    /// Current displayed sequence.
    pub fn snapshot(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of displayed messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// No messages displayed.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Highest server identifier seen. Cursor for catch-up fetches.
    pub fn last_id(&self) -> Option<MessageId> {
        self.seen.iter().max().copied()
    }

    /// Clear everything, including early live messages.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.seen.clear();
        self.pending.clear();
        self.initialized = false;
    }

    fn push(&mut self, message: ChatMessage) -> bool {
        if let Some(id) = message.id
            && !self.seen.insert(id)
        {
            tracing::debug!(message_id = id, room_id = message.room_id, "duplicate message dropped");
            return false;
        }
        self.messages.push(message);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: Option<u64>, content: &str) -> ChatMessage {
        ChatMessage {
            id,
            room_id: 1,
            sender_id: 2,
            content: content.into(),
            created_at: None,
        }
    }

    fn ids(reconciler: &MessageReconciler) -> Vec<Option<u64>> {
        reconciler.snapshot().iter().map(|m| m.id).collect()
    }

    #[test]
    fn history_then_live() {
        let mut r = MessageReconciler::new();
        r.initialize(vec![msg(Some(1), "a"), msg(Some(2), "b")]);
        assert!(r.append(msg(Some(3), "c")));
        assert_eq!(ids(&r), vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn early_live_messages_follow_history() {
        let mut r = MessageReconciler::new();
        r.append(msg(Some(3), "live"));
        assert!(r.snapshot().is_empty());

        r.initialize(vec![msg(Some(1), "a"), msg(Some(2), "b")]);
        assert_eq!(ids(&r), vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn duplicates_by_id_are_dropped() {
        let mut r = MessageReconciler::new();
        r.initialize(vec![msg(Some(1), "a")]);
        assert!(!r.append(msg(Some(1), "a again")));
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn early_message_already_in_history_is_dropped() {
        let mut r = MessageReconciler::new();
        r.append(msg(Some(2), "b"));
        r.initialize(vec![msg(Some(1), "a"), msg(Some(2), "b")]);
        assert_eq!(ids(&r), vec![Some(1), Some(2)]);
    }

    #[test]
    fn messages_without_id_are_never_deduplicated() {
        let mut r = MessageReconciler::new();
        r.initialize(vec![]);
        assert!(r.append(msg(None, "x")));
        assert!(r.append(msg(None, "x")));
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn extend_counts_new_messages() {
        let mut r = MessageReconciler::new();
        r.initialize(vec![msg(Some(1), "a"), msg(Some(2), "b")]);
        let added = r.extend(vec![msg(Some(2), "b"), msg(Some(3), "c"), msg(Some(4), "d")]);
        assert_eq!(added, 2);
        assert_eq!(r.last_id(), Some(4));
    }

    #[test]
    fn arrival_order_is_kept_over_ids() {
        let mut r = MessageReconciler::new();
        r.initialize(vec![]);
        r.append(msg(Some(9), "late id first"));
        r.append(msg(Some(5), "early id second"));
        assert_eq!(ids(&r), vec![Some(9), Some(5)]);
    }

    #[test]
    fn reset_clears_pending_too() {
        let mut r = MessageReconciler::new();
        r.append(msg(Some(3), "early"));
        r.reset();
        r.initialize(vec![]);
        assert!(r.is_empty());
        assert!(!MessageReconciler::new().is_initialized());
    }
}
