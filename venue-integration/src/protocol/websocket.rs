use crate::error::SocketError;
use futures::SinkExt;
use std::time::Duration;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
use tracing::info;

/// Type alias over the `tokio-tungstenite` socket type.
pub type WebSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
pub type WsMessage = tungstenite::Message;
pub type WsError = tungstenite::Error;

pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to the provided WebSocket `url`, returning the split sink/stream halves.
pub async fn connect(url: &str) -> Result<WebSocket, SocketError> {
    let (socket, _response) = connect_async(url).await?;
    info!(%url, "connected websocket");
    Ok(socket)
}

/// Extract the bytes of a text or binary message; returns `None` for control frames
/// (ping/pong/close), which callers should handle separately.
pub fn message_payload(message: WsMessage) -> Option<Vec<u8>> {
    match message {
        WsMessage::Text(text) => Some(text.into_bytes()),
        WsMessage::Binary(bytes) => Some(bytes.to_vec()),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_) => None,
    }
}

pub fn is_websocket_disconnected(error: &SocketError) -> bool {
    matches!(
        error,
        SocketError::WebSocket(
            WsError::ConnectionClosed | WsError::AlreadyClosed | WsError::Io(_)
        )
    )
}

/// Send a pong in response to a received ping, matching the usual
/// `process_ping`/`schedule_pings_to_exchange` keep-alive discipline.
pub async fn send_pong<S>(sink: &mut S, payload: Vec<u8>) -> Result<(), SocketError>
where
    S: futures::Sink<WsMessage, Error = WsError> + Unpin,
{
    sink.send(WsMessage::Pong(payload.into()))
        .await
        .map_err(SocketError::from)
}
