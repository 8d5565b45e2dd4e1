//! REST client.
//!
//! Every endpoint answers with an [`ApiResponse`] envelope; error responses
//! carry the reason in its `msg` field.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use guidechat_app::{ChatApi, FetchError, TokenProvider};
use guidechat_proto::{
    ChatMessage, MessageId, OutgoingMessage, RoomId, RoomInfo, RoomPage, UserId,
    payloads::{ApiResponse, StartRoomRequest},
};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::ClientConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// REST errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request could not be sent or the response body could not be read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Resource does not exist.
    #[error("not found")]
    NotFound,

    /// Server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// `msg` from the error envelope, or the raw body.
        message: String,
    },

    /// Response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<ApiError> for FetchError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NotFound => Self::NotFound,
            ApiError::Status { message, .. } if !message.is_empty() => Self::Failed(message),
            other => Self::Failed(other.to_string()),
        }
    }
}

/// Guide chat REST client.
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    history_limit: u32,
    room_page_limit: u32,
}

impl std::fmt::Debug for HttpApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApi").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

impl HttpApi {
    /// Client for `config.api_url`, authenticating with `tokens`.
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_url.clone(),
            tokens,
            history_limit: config.history_limit,
            room_page_limit: config.room_page_limit,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{path}", self.base_url));
        match self.tokens.token() {
            Some(token) => builder.bearer_auth(token.expose()),
            None => builder,
        }
    }

    /// Room metadata. `Ok(None)` if the room does not exist.
    pub async fn room(&self, room_id: RoomId) -> Result<Option<RoomInfo>, ApiError> {
        let response = self.request(Method::GET, &format!("/api/userchat/rooms/{room_id}")).send().await?;
        match unwrap_envelope(response).await {
            Ok(room) => Ok(Some(room)),
            Err(ApiError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Messages in chronological order, only those after `after` if given.
    pub async fn messages(
        &self,
        room_id: RoomId,
        after: Option<MessageId>,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let mut query = vec![("limit", self.history_limit.to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        let response = self
            .request(Method::GET, &format!("/api/userchat/rooms/{room_id}/messages"))
            .query(&query)
            .send()
            .await?;
        unwrap_envelope(response).await
    }

    /// Post a message over REST instead of the broker.
    pub async fn post_message(&self, room_id: RoomId, content: &str) -> Result<ChatMessage, ApiError> {
        let body = OutgoingMessage { content: content.to_string() };
        let response = self
            .request(Method::POST, &format!("/api/userchat/rooms/{room_id}/messages"))
            .json(&body)
            .send()
            .await?;
        unwrap_envelope(response).await
    }

    /// One page of the current user's rooms.
    pub async fn list_rooms(&self, cursor: Option<&str>) -> Result<RoomPage, ApiError> {
        let mut query = vec![("limit", self.room_page_limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let response = self.request(Method::GET, "/api/userchat/rooms").query(&query).send().await?;
        unwrap_envelope(response).await
    }

    /// Create a room between `guide_id` and `user_id`, or return the existing one.
    pub async fn start_room(&self, guide_id: UserId, user_id: UserId) -> Result<RoomInfo, ApiError> {
        let response = self
            .request(Method::POST, "/api/userchat/rooms/start")
            .json(&StartRoomRequest { guide_id, user_id })
            .send()
            .await?;
        unwrap_envelope(response).await
    }

    /// Delete a room.
    pub async fn delete_room(&self, room_id: RoomId) -> Result<(), ApiError> {
        let response = self.request(Method::DELETE, &format!("/api/userchat/rooms/{room_id}")).send().await?;
        check_status(response).await.map(drop)
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn fetch_room(&self, room_id: RoomId) -> Result<Option<RoomInfo>, FetchError> {
        Ok(self.room(room_id).await?)
    }

    async fn fetch_history(
        &self,
        room_id: RoomId,
        after: Option<MessageId>,
    ) -> Result<Vec<ChatMessage>, FetchError> {
        match self.messages(room_id, after).await {
            Ok(messages) => Ok(messages),
            Err(e) => {
                tracing::warn!(room_id, error = %e, "history fetch failed");
                Err(e.into())
            },
        }
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound);
    }
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status { status: status.as_u16(), message: error_message(&body) })
}

async fn unwrap_envelope<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let body = check_status(response).await?.bytes().await?;
    let envelope: ApiResponse<T> =
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))?;
    Ok(envelope.data)
}

/// `msg` from an error envelope, falling back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("msg").and_then(|msg| msg.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_envelope() {
        assert_eq!(error_message(r#"{"msg":"room is closed","data":null}"#), "room is closed");
        assert_eq!(error_message(" gateway timeout \n"), "gateway timeout");
    }

    #[test]
    fn fetch_error_mapping() {
        assert_eq!(FetchError::from(ApiError::NotFound), FetchError::NotFound);
        assert_eq!(
            FetchError::from(ApiError::Status { status: 403, message: "forbidden".into() }),
            FetchError::Failed("forbidden".into())
        );
        assert_eq!(
            FetchError::from(ApiError::Status { status: 500, message: String::new() }),
            FetchError::Failed("server returned 500: ".into())
        );
    }
}
