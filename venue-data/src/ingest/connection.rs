use super::envelope::{RequestIdSequence, SubscriptionEnvelope};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use venue_integration::protocol::websocket::{WebSocket, WsMessage, connect, message_payload, send_pong};
use venue_integration::rate_limit::RateLimiter;

/// Per-connection lifecycle. `Created`/`Connecting` are folded into the synchronous
/// `connect` call a shard performs before spawning [`run`]; `run` itself only ever
/// observes `Open` before exiting into `Closed`/`Failed`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConnectionState {
    Open,
    Closed,
    Failed,
}

/// A command sent from [`super::WsIngestion`] to a live connection's [`run`] task:
/// subscribe/unsubscribe one more stream name on this shard.
#[derive(Debug, Clone)]
pub enum ShardCommand {
    Subscribe(String),
    Unsubscribe(String),
}

/// Connect to `url`, following `Created -> Connecting -> {Open, Failed}`.
pub async fn connect_shard(url: &str) -> Result<WebSocket, crate::error::DataError> {
    connect(url).await.map_err(crate::error::DataError::from)
}

/// Drive one open WebSocket connection until it closes, errors, or `cancel` fires.
///
/// Splits the socket into independent sink/stream halves so `tokio::select!` can hold
/// two distinct mutable borrows rather than one contended one, since this connection
/// both sends subscription control frames and reads market data concurrently.
///
/// Returns the terminal [`ConnectionState`] so the caller (the shard table in
/// `WsIngestion`) can decide whether to retire this shard.
pub async fn run(
    socket: WebSocket,
    raw_tx: mpsc::Sender<Vec<u8>>,
    mut commands: mpsc::UnboundedReceiver<ShardCommand>,
    rate_limiter: RateLimiter,
    cancel: CancellationToken,
) -> ConnectionState {
    let (mut sink, mut stream) = socket.split();
    let request_ids = RequestIdSequence::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return ConnectionState::Closed,
            command = commands.recv() => {
                let Some(command) = command else {
                    // Command side closed; this shard no longer accepts new streams but
                    // keeps serving the ones it already has.
                    continue;
                };
                rate_limiter.acquire().await;
                if send_command(&mut sink, &request_ids, command).await.is_err() {
                    return ConnectionState::Failed;
                }
            }
            message = stream.next() => {
                match message {
                    Some(Ok(WsMessage::Ping(payload))) => {
                        if send_pong(&mut sink, payload.to_vec()).await.is_err() {
                            return ConnectionState::Failed;
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        debug!(?frame, "websocket closed by peer");
                        return ConnectionState::Closed;
                    }
                    Some(Ok(other)) => {
                        if let Some(bytes) = message_payload(other) {
                            if raw_tx.send(bytes).await.is_err() {
                                // Raw inbox consumer (the parse loop) is gone.
                                return ConnectionState::Closed;
                            }
                        }
                    }
                    Some(Err(error)) => {
                        warn!(%error, "websocket read error");
                        return ConnectionState::Failed;
                    }
                    None => return ConnectionState::Closed,
                }
            }
        }
    }
}

async fn send_command(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    request_ids: &RequestIdSequence,
    command: ShardCommand,
) -> Result<(), venue_integration::SocketError> {
    let envelope = match command {
        ShardCommand::Subscribe(stream) => {
            info!(stream, "subscribing to stream");
            SubscriptionEnvelope::subscribe(vec![stream], request_ids.next())
        }
        ShardCommand::Unsubscribe(stream) => {
            info!(stream, "unsubscribing from stream");
            SubscriptionEnvelope::unsubscribe(vec![stream], request_ids.next())
        }
    };
    sink.send(WsMessage::text(envelope.to_text())).await?;
    Ok(())
}
