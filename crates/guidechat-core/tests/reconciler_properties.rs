//! Property-based tests for message reconciliation.
//!
//! Live messages may arrive before, during or after the history fetch and may
//! be redelivered. Whatever the interleaving, the displayed sequence must put
//! history first and never show the same server identifier twice.

use std::collections::HashSet;

use guidechat_core::MessageReconciler;
use guidechat_proto::ChatMessage;
use proptest::prelude::*;

fn message(id: u64) -> ChatMessage {
    ChatMessage { id: Some(id), room_id: 1, sender_id: 1, content: format!("m{id}"), created_at: None }
}

proptest! {
    #[test]
    fn prop_history_precedes_live_and_ids_unique(
        history in prop::collection::btree_set(1u64..50, 0..10),
        live in prop::collection::vec(1u64..80, 0..20),
        early in 0usize..20,
    ) {
        let history: Vec<u64> = history.into_iter().collect();
        let early = early.min(live.len());

        let mut reconciler = MessageReconciler::new();
        for id in &live[..early] {
            reconciler.append(message(*id));
        }
        reconciler.initialize(history.iter().copied().map(message).collect());
        for id in &live[early..] {
            reconciler.append(message(*id));
        }

        let shown: Vec<u64> = reconciler.snapshot().iter().filter_map(|m| m.id).collect();

        prop_assert_eq!(&shown[..history.len()], &history[..]);

        let unique: HashSet<u64> = shown.iter().copied().collect();
        prop_assert_eq!(unique.len(), shown.len());

        let expected: HashSet<u64> = history.iter().chain(live.iter()).copied().collect();
        prop_assert_eq!(unique, expected);
    }

    #[test]
    fn prop_reset_forgets_everything(ids in prop::collection::vec(1u64..20, 0..20)) {
        let mut reconciler = MessageReconciler::new();
        reconciler.initialize(ids.iter().copied().map(message).collect());
        reconciler.reset();
        reconciler.initialize(ids.iter().copied().map(message).collect());

        let unique: HashSet<u64> = ids.iter().copied().collect();
        prop_assert_eq!(reconciler.len(), unique.len());
    }
}
