use crate::model::PublicTrade;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Inner {
    capacity: usize,
    subscribers: Mutex<Vec<mpsc::Sender<PublicTrade>>>,
}

/// Fan-out transport for [`PublicTrade`]s: one producer (the WS parse loop), many
/// independent bounded-queue consumers. Iteration over subscribers
/// snapshots the set before dispatch so a slow consumer never holds the registration
/// lock across an awaited send.
#[derive(Clone)]
pub struct TradeTransport(Arc<Inner>);

impl TradeTransport {
    pub fn new(capacity: usize) -> Self {
        Self(Arc::new(Inner {
            capacity,
            subscribers: Mutex::new(Vec::new()),
        }))
    }

    /// Register a new, independently-queued subscriber.
    pub fn subscribe(&self) -> TradeSubscription {
        let (tx, rx) = mpsc::channel(self.0.capacity);
        self.0.subscribers.lock().push(tx);
        TradeSubscription { rx }
    }

    /// Best-effort fan-out: a full subscriber queue silently drops the trade for that
    /// subscriber rather than blocking the others. Returns the number of subscribers the
    /// trade was actually delivered to.
    pub fn try_publish(&self, trade: PublicTrade) -> usize {
        let mut subscribers = self.0.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers
            .iter()
            .filter(|tx| tx.try_send(trade).is_ok())
            .count()
    }

    /// Awaited fan-out: suspends on each subscriber in turn until its queue has room,
    /// or `cancel` fires. Used when the caller has opted out of the best-effort drop
    /// policy; a future revision may want to make this a configuration toggle.
    pub async fn publish_async(
        &self,
        trade: PublicTrade,
        cancel: &CancellationToken,
    ) -> Result<usize, crate::error::DataError> {
        let snapshot: Vec<_> = {
            let mut subscribers = self.0.subscribers.lock();
            subscribers.retain(|tx| !tx.is_closed());
            subscribers.clone()
        };

        let mut delivered = 0;
        for tx in snapshot {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(crate::error::DataError::CancelledByCaller),
                result = tx.send(trade) => {
                    if result.is_ok() {
                        delivered += 1;
                    }
                }
            }
        }
        Ok(delivered)
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.subscribers.lock().len()
    }
}

/// One subscriber's independent queue of trades.
pub struct TradeSubscription {
    rx: mpsc::Receiver<PublicTrade>,
}

impl TradeSubscription {
    pub async fn recv(&mut self) -> Option<PublicTrade> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use venue_instrument::{Side, Symbol};

    fn trade() -> PublicTrade {
        PublicTrade::new(
            Symbol::parse("BTC-USDT@BinanceSpot").unwrap(),
            1,
            0,
            1.0,
            1.0,
            crate::model::TradeAttr::new(Side::Buy, false, false),
        )
    }

    #[tokio::test]
    async fn fans_out_to_every_subscriber() {
        let transport = TradeTransport::new(4);
        let mut a = transport.subscribe();
        let mut b = transport.subscribe();

        assert_eq!(transport.try_publish(trade()), 2);
        assert!(a.recv().await.is_some());
        assert!(b.recv().await.is_some());
    }

    #[tokio::test]
    async fn drops_silently_on_full_subscriber_queue() {
        let transport = TradeTransport::new(1);
        let mut sub = transport.subscribe();

        assert_eq!(transport.try_publish(trade()), 1);
        assert_eq!(transport.try_publish(trade()), 0);

        assert!(sub.recv().await.is_some());
    }

    #[tokio::test]
    async fn drops_stale_subscribers_from_the_registry() {
        let transport = TradeTransport::new(1);
        {
            let _short_lived = transport.subscribe();
            assert_eq!(transport.subscriber_count(), 1);
        }
        transport.try_publish(trade());
        assert_eq!(transport.subscriber_count(), 0);
    }
}
