//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::HashSet;

use guidechat_app::SessionState;
use guidechat_core::ConnectionStatus;

use super::{Invariant, InvariantResult, SessionSnapshot, Violation};

/// Every shown message belongs to the selected room.
///
/// A message from any other room means a stale subscription or fetch reached
/// the current buffer.
pub struct NoForeignMessages;

impl Invariant for NoForeignMessages {
    fn name(&self) -> &'static str {
        "no_foreign_messages"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let room = state.room_id();
        match state.messages.iter().find(|(_, r)| Some(*r) != room) {
            Some((id, r)) => Err(Violation {
                invariant: self.name(),
                message: format!("message {id:?} from room {r} shown while room {room:?} is selected"),
            }),
            None => Ok(()),
        }
    }
}

/// No server identifier is shown twice.
pub struct UniqueMessageIds;

impl Invariant for UniqueMessageIds {
    fn name(&self) -> &'static str {
        "unique_message_ids"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let mut seen = HashSet::new();
        for id in state.message_ids() {
            if !seen.insert(id) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("message {id} shown more than once"),
                });
            }
        }
        Ok(())
    }
}

/// Sending is enabled only in `Active` on a connected link.
pub struct ConnectedOnlyWhenActive;

impl Invariant for ConnectedOnlyWhenActive {
    fn name(&self) -> &'static str {
        "connected_only_when_active"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let consistent = !state.connected
            || (state.state == SessionState::Active
                && state.connection_status == ConnectionStatus::Connected);
        if consistent {
            Ok(())
        } else {
            Err(Violation {
                invariant: self.name(),
                message: format!(
                    "sending enabled in {:?} with connection {:?}",
                    state.state, state.connection_status
                ),
            })
        }
    }
}

/// An unmounted session holds no room and no messages.
pub struct ClosedSessionIsEmpty;

impl Invariant for ClosedSessionIsEmpty {
    fn name(&self) -> &'static str {
        "closed_session_is_empty"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if state.state == SessionState::Closed && (state.tag.is_some() || !state.messages.is_empty()) {
            return Err(Violation {
                invariant: self.name(),
                message: format!("closed session still bound to {:?}", state.tag),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use guidechat_app::SessionTag;

    use super::*;

    fn active_on(room_id: u64, messages: Vec<(Option<u64>, u64)>) -> SessionSnapshot {
        SessionSnapshot {
            state: SessionState::Active,
            tag: Some(SessionTag { room_id, generation: 1 }),
            connection_status: ConnectionStatus::Connected,
            connected: true,
            messages,
        }
    }

    #[test]
    fn foreign_message_is_flagged() {
        let snapshot = active_on(1, vec![(Some(1), 1), (Some(2), 2)]);
        assert!(NoForeignMessages.check(&snapshot).is_err());
        assert!(NoForeignMessages.check(&active_on(1, vec![(Some(1), 1)])).is_ok());
    }

    #[test]
    fn duplicate_id_is_flagged_but_unconfirmed_are_not() {
        assert!(UniqueMessageIds.check(&active_on(1, vec![(Some(1), 1), (Some(1), 1)])).is_err());
        assert!(UniqueMessageIds.check(&active_on(1, vec![(None, 1), (None, 1)])).is_ok());
    }

    #[test]
    fn connected_while_reconnecting_is_flagged() {
        let mut snapshot = active_on(1, vec![]);
        snapshot.state = SessionState::Connecting;
        assert!(ConnectedOnlyWhenActive.check(&snapshot).is_err());
    }

    #[test]
    fn closed_with_binding_is_flagged() {
        let mut snapshot = active_on(1, vec![]);
        snapshot.state = SessionState::Closed;
        assert!(ClosedSessionIsEmpty.check(&snapshot).is_err());
    }
}
