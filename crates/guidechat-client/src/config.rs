//! Client configuration.

use guidechat_core::ConnectionConfig;

/// Default REST base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Default broker endpoint (raw WebSocket under the SockJS endpoint).
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws/userchat/websocket";

/// Messages requested per history page.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Rooms requested per directory page.
pub const DEFAULT_ROOM_PAGE_LIMIT: u32 = 20;

/// Endpoints, page sizes and connection timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// REST base URL, without a trailing slash.
    pub api_url: String,
    /// Broker WebSocket URL.
    pub ws_url: String,
    /// `limit` sent with history requests.
    pub history_limit: u32,
    /// `limit` sent with room directory requests.
    pub room_page_limit: u32,
    /// Reconnect and heart-beat timing.
    pub connection: ConnectionConfig,
}

impl ClientConfig {
    /// Config for a server at `api_url` with its broker at `ws_url`.
    pub fn new(api_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        let api_url = api_url.into();
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            ws_url: ws_url.into(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            room_page_limit: DEFAULT_ROOM_PAGE_LIMIT,
            connection: ConnectionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.room_page_limit, 20);
        assert_eq!(config.connection.reconnect_delay, Duration::from_millis(5000));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let config = ClientConfig::new("https://chat.example/", "wss://chat.example/ws");
        assert_eq!(config.api_url, "https://chat.example");
        assert_eq!(config.ws_url, "wss://chat.example/ws");
    }
}
