//! Drains the shared raw-bytes inbox fed by every connection shard, classifies each frame
//! as a depth update or a trade, parses it, and publishes the result onto the matching
//! transport. Classification happens here at the parse loop, by wire shape, rather than
//! per subscription, since ingestion shares one inbox across every stream kind.

use crate::model::L2UpdatePooled;
use crate::parse::{self, SymbolResolver};
use crate::pool::Pool;
use crate::transport::{DepthTransport, TradeTransport};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs until the raw-bytes channel closes or `cancel` fires. Every parse failure is
/// logged and the frame dropped; a malformed frame never stops ingestion of the rest.
pub async fn run<R: SymbolResolver + Send + Sync + 'static>(
    mut raw_rx: mpsc::Receiver<Vec<u8>>,
    resolver: Arc<R>,
    pool: Arc<Pool<crate::model::L2Delta>>,
    depth_transport: DepthTransport,
    trade_transport: TradeTransport,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            frame = raw_rx.recv() => {
                let Some(bytes) = frame else { return };
                handle_frame(&bytes, resolver.as_ref(), &pool, &depth_transport, &trade_transport, &cancel).await;
            }
        }
    }
}

async fn handle_frame<R: SymbolResolver>(
    bytes: &[u8],
    resolver: &R,
    pool: &Arc<Pool<crate::model::L2Delta>>,
    depth_transport: &DepthTransport,
    trade_transport: &TradeTransport,
    cancel: &CancellationToken,
) {
    let Ok(value) = serde_json::from_slice::<Value>(bytes) else {
        warn!("discarding frame that is not valid JSON");
        return;
    };
    let unwrapped = parse::unwrap_envelope(&value);

    if is_subscription_ack(unwrapped) {
        debug!("discarding subscribe/unsubscribe acknowledgement");
        return;
    }

    match classify(unwrapped) {
        Some(StreamKind::Depth) => match parse::depth::parse_depth(resolver, pool, bytes) {
            Ok(update) => publish_depth(depth_transport, update, cancel).await,
            Err(error) => warn!(%error, "discarding unparsable depth frame"),
        },
        Some(StreamKind::Trade) => match parse::trade::parse_trade(resolver, bytes) {
            Ok(trade) => {
                let _ = trade_transport.try_publish(trade);
            }
            Err(error) => warn!(%error, "discarding unparsable trade frame"),
        },
        None => debug!("discarding frame of unrecognised stream kind"),
    }
}

/// Publishes with a non-blocking send first; on a full channel, waits for capacity rather
/// than dropping.
async fn publish_depth(transport: &DepthTransport, update: L2UpdatePooled, cancel: &CancellationToken) {
    if let Err(error) = transport.publish_try_then_async(update, cancel).await {
        warn!(%error, "failed to publish depth batch");
    }
}

enum StreamKind {
    Depth,
    Trade,
}

fn classify(value: &Value) -> Option<StreamKind> {
    match value.get("e").and_then(Value::as_str) {
        Some("depthUpdate") => Some(StreamKind::Depth),
        Some("trade") => Some(StreamKind::Trade),
        _ => None,
    }
}

fn is_subscription_ack(value: &Value) -> bool {
    value.get("result").is_some() && value.get("id").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_depth_and_trade_event_types() {
        let depth = serde_json::json!({"e": "depthUpdate"});
        let trade = serde_json::json!({"e": "trade"});
        let other = serde_json::json!({"e": "kline"});
        assert!(matches!(classify(&depth), Some(StreamKind::Depth)));
        assert!(matches!(classify(&trade), Some(StreamKind::Trade)));
        assert!(classify(&other).is_none());
    }

    #[test]
    fn recognises_subscription_acknowledgements() {
        let ack = serde_json::json!({"result": null, "id": 1});
        assert!(is_subscription_ack(&ack));
        let depth = serde_json::json!({"e": "depthUpdate"});
        assert!(!is_subscription_ack(&depth));
    }
}
