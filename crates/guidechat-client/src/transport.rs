//! WebSocket transport for the broker link.
//!
//! Provides [`ConnectedLink`] which moves STOMP text between the socket and a
//! pair of channels. This is a thin layer that only frames and unframes:
//! connection logic remains in the Sans-IO
//! [`ConnectionManager`](guidechat_core::ConnectionManager).

use futures::{SinkExt, StreamExt};
use guidechat_proto::{Frame, Inbound, decode};
use thiserror::Error;
use tokio::{net::TcpStream, sync::mpsc, task::AbortHandle};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

const CHANNEL_CAPACITY: usize = 64;

/// Text sent for a heart-beat.
const HEARTBEAT: &str = "\n";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Link is closed or the write failed.
    #[error("stream error: {0}")]
    Stream(String),

    /// Frame could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Handle to an open broker link.
///
/// Inbound frames and heart-beats arrive on `from_server`, which yields `None`
/// once the link is closed from either side.
#[derive(Debug)]
pub struct ConnectedLink {
    /// Outbound half.
    pub writer: LinkWriter,
    /// Decoded inbound items, in arrival order.
    pub from_server: mpsc::Receiver<Inbound>,
}

/// Outbound half of a [`ConnectedLink`].
///
/// Dropping the last writer closes the link once queued writes have drained.
#[derive(Debug, Clone)]
pub struct LinkWriter {
    to_server: mpsc::Sender<String>,
    abort_handle: AbortHandle,
}

impl LinkWriter {
    /// Queue a frame.
    ///
    /// # Errors
    ///
    /// - `TransportError::Protocol` if the frame cannot be encoded
    /// - `TransportError::Stream` if the link is closed
    pub async fn send_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        let text = frame.to_text().map_err(|e| TransportError::Protocol(e.to_string()))?;
        self.send_text(text).await
    }

    /// Queue a heart-beat.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Stream` if the link is closed.
    pub async fn send_heartbeat(&self) -> Result<(), TransportError> {
        self.send_text(HEARTBEAT.to_string()).await
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.to_server.send(text).await.map_err(|_| TransportError::Stream("link closed".into()))
    }

    /// Stop the link immediately, discarding queued writes.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

/// Open a WebSocket to the broker at `url`.
///
/// Returns once the WebSocket handshake completes; the STOMP handshake is the
/// caller's business.
///
/// # Errors
///
/// Returns `TransportError::Connection` if the socket cannot be opened.
pub async fn connect(url: &str) -> Result<ConnectedLink, TransportError> {
    let (socket, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| TransportError::Connection(e.to_string()))?;

    let (to_server_tx, to_server_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
    let (from_server_tx, from_server_rx) = mpsc::channel::<Inbound>(CHANNEL_CAPACITY);

    let handle = tokio::spawn(run_link(socket, to_server_rx, from_server_tx));

    Ok(ConnectedLink {
        writer: LinkWriter { to_server: to_server_tx, abort_handle: handle.abort_handle() },
        from_server: from_server_rx,
    })
}

/// Bridge between the channels and the socket until either side goes away.
async fn run_link(socket: Socket, mut to_server: mpsc::Receiver<String>, from_server: mpsc::Sender<Inbound>) {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            biased;

            outgoing = to_server.recv() => {
                let Some(text) = outgoing else {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                };
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    tracing::debug!(error = %e, "socket write failed");
                    break;
                }
            },
            incoming = read.next() => {
                let payload = match incoming {
                    Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                    Some(Ok(Message::Binary(data))) => data.to_vec(),
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "socket read failed");
                        break;
                    },
                };
                if !forward(&payload, &from_server).await {
                    break;
                }
            },
        }
    }
}

/// Decode one socket message and pass its items on. Returns `false` when the
/// link should close.
async fn forward(payload: &[u8], from_server: &mpsc::Sender<Inbound>) -> bool {
    let items = match decode(payload) {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(error = %e, "malformed broker message, closing link");
            return false;
        },
    };

    for item in items {
        if from_server.send(item).await.is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use guidechat_proto::Command;
    use tokio::net::TcpListener;

    use super::*;

    /// Accept one WebSocket and hand it to `serve`.
    async fn broker<F, Fut>(serve: F) -> String
    where
        F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            serve(socket).await;
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn frames_and_heartbeats_cross_the_link() {
        let url = broker(|mut socket| async move {
            let connect = socket.next().await.unwrap().unwrap();
            assert!(connect.to_text().unwrap().starts_with("CONNECT\n"));

            let reply = "\nCONNECTED\nversion:1.2\nheart-beat:0,0\n\n\0";
            socket.send(Message::Text(reply.into())).await.unwrap();

            let beat = socket.next().await.unwrap().unwrap();
            assert_eq!(beat.to_text().unwrap(), "\n");
        })
        .await;

        let mut link = connect(&url).await.unwrap();
        let frame = Frame::connect(guidechat_proto::HeartBeat::disabled(), None);
        link.writer.send_frame(&frame).await.unwrap();

        assert_eq!(link.from_server.recv().await, Some(Inbound::Heartbeat));
        let Some(Inbound::Frame(connected)) = link.from_server.recv().await else {
            panic!("expected CONNECTED");
        };
        assert_eq!(connected.command, Command::Connected);

        link.writer.send_heartbeat().await.unwrap();
        // Broker task ends and closes the socket
        assert_eq!(link.from_server.recv().await, None);
    }

    #[tokio::test]
    async fn malformed_message_closes_link() {
        let url = broker(|mut socket| async move {
            socket.send(Message::Text("NONSENSE\n\n\0".into())).await.unwrap();
            let _ = socket.next().await;
        })
        .await;

        let mut link = connect(&url).await.unwrap();
        assert_eq!(link.from_server.recv().await, None);
        assert!(link.writer.send_heartbeat().await.is_err());
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = connect(&format!("ws://{addr}")).await;
        assert!(matches!(result, Err(TransportError::Connection(_))));
    }
}
