//! Interfaces the session consumes from outside the chat core.

use async_trait::async_trait;
use guidechat_core::BearerToken;
use guidechat_proto::{ChatMessage, MessageId, RoomId, RoomInfo};

use crate::FetchError;

/// Room metadata and history retrieval.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Room metadata. `Ok(None)` if the room does not exist.
    async fn fetch_room(&self, room_id: RoomId) -> Result<Option<RoomInfo>, FetchError>;

    /// Messages in chronological order, optionally only those after `after`.
    async fn fetch_history(
        &self,
        room_id: RoomId,
        after: Option<MessageId>,
    ) -> Result<Vec<ChatMessage>, FetchError>;
}

/// Source of the bearer token used in the broker handshake.
///
/// Read synchronously each time a connection opens. Refreshing is the
/// provider's business; an expired token surfaces as a handshake failure.
pub trait TokenProvider: Send + Sync {
    /// Current token. `None` when signed out.
    fn token(&self) -> Option<BearerToken>;
}

/// Fixed token, for tools and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<BearerToken>);

impl StaticToken {
    /// Provider that always returns `token`.
    pub fn new(token: Option<BearerToken>) -> Self {
        Self(token)
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<BearerToken> {
        self.0.clone()
    }
}
