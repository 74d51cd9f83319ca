use crate::error::DataError;
use crate::model::L2UpdatePooled;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

enum DepthState {
    Idle,
    Subscribed(mpsc::Sender<L2UpdatePooled>),
}

struct Inner {
    state: Mutex<DepthState>,
}

/// Single-producer single-consumer transport for pooled depth batches. Enforces an
/// "at most one depth subscriber" invariant: a second [`DepthTransport::subscribe`]
/// call is rejected while the first subscription is live.
///
/// Tracks the active/disabled sender state the way `venue-integration::channel` does,
/// generalised to an explicit drain-then-release unsubscribe step since the payload
/// here is pooled and must never be dropped silently.
#[derive(Clone)]
pub struct DepthTransport(Arc<Inner>);

impl DepthTransport {
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            state: Mutex::new(DepthState::Idle),
        }))
    }

    /// Open the single depth subscription. Fails with [`DataError::AlreadySubscribed`]
    /// if one already exists.
    pub fn subscribe(&self, capacity: usize) -> Result<DepthSubscription, DataError> {
        let mut state = self.0.state.lock();
        if matches!(*state, DepthState::Subscribed(_)) {
            return Err(DataError::AlreadySubscribed);
        }

        let (tx, rx) = mpsc::channel(capacity);
        *state = DepthState::Subscribed(tx);
        Ok(DepthSubscription {
            transport: self.clone(),
            rx,
        })
    }

    /// Non-blocking publish. Returns `Ok(false)` (and releases `batch`) if the channel
    /// is full, per a "drops on full" back-pressure policy.
    pub fn try_publish(&self, batch: L2UpdatePooled) -> Result<bool, DataError> {
        let state = self.0.state.lock();
        match &*state {
            DepthState::Subscribed(tx) => match tx.try_send(batch) {
                Ok(()) => Ok(true),
                Err(mpsc::error::TrySendError::Full(batch)) => {
                    batch.release();
                    Ok(false)
                }
                Err(mpsc::error::TrySendError::Closed(batch)) => {
                    batch.release();
                    Err(DataError::NotInitialized("depth subscriber"))
                }
            },
            DepthState::Idle => {
                batch.release();
                Err(DataError::NotInitialized("depth subscriber"))
            }
        }
    }

    /// Suspends until the channel has capacity, or `cancel` fires.
    pub async fn publish_async(
        &self,
        batch: L2UpdatePooled,
        cancel: &CancellationToken,
    ) -> Result<(), DataError> {
        let tx = {
            let state = self.0.state.lock();
            match &*state {
                DepthState::Subscribed(tx) => tx.clone(),
                DepthState::Idle => {
                    batch.release();
                    return Err(DataError::NotInitialized("depth subscriber"));
                }
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                batch.release();
                Err(DataError::CancelledByCaller)
            }
            permit = tx.reserve() => match permit {
                Ok(permit) => {
                    permit.send(batch);
                    Ok(())
                }
                Err(_) => {
                    batch.release();
                    Err(DataError::NotInitialized("depth subscriber"))
                }
            },
        }
    }

    /// Try a non-blocking send first; on a full channel, fall back to waiting for
    /// capacity instead of releasing the batch. Used by the WS parse loop's depth path,
    /// which would rather apply backpressure than silently drop a depth update.
    pub async fn publish_try_then_async(
        &self,
        batch: L2UpdatePooled,
        cancel: &CancellationToken,
    ) -> Result<(), DataError> {
        let tx = {
            let state = self.0.state.lock();
            match &*state {
                DepthState::Subscribed(tx) => tx.clone(),
                DepthState::Idle => {
                    batch.release();
                    return Err(DataError::NotInitialized("depth subscriber"));
                }
            }
        };

        match tx.try_send(batch) {
            Ok(()) => return Ok(()),
            Err(mpsc::error::TrySendError::Full(batch)) => {
                warn!("depth channel full, waiting for capacity before publishing");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        batch.release();
                        return Err(DataError::CancelledByCaller);
                    }
                    permit = tx.reserve() => match permit {
                        Ok(permit) => {
                            permit.send(batch);
                            return Ok(());
                        }
                        Err(_) => {
                            batch.release();
                            return Err(DataError::NotInitialized("depth subscriber"));
                        }
                    },
                }
            }
            Err(mpsc::error::TrySendError::Closed(batch)) => {
                batch.release();
                Err(DataError::NotInitialized("depth subscriber"))
            }
        }
    }

    fn release_to_idle(&self) {
        *self.0.state.lock() = DepthState::Idle;
    }
}

impl Default for DepthTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// The unique consumer handle for the depth channel. Dropping or explicitly
/// [`unsubscribe`](DepthSubscription::unsubscribe)-ing drains any buffered batches and
/// releases each back to its pool before the slot is freed for a future subscriber.
pub struct DepthSubscription {
    transport: DepthTransport,
    rx: mpsc::Receiver<L2UpdatePooled>,
}

impl DepthSubscription {
    pub async fn recv(&mut self) -> Option<L2UpdatePooled> {
        self.rx.recv().await
    }

    /// Drain and release every buffered batch, then free the depth slot.
    pub fn unsubscribe(mut self) {
        self.drain();
    }

    fn drain(&mut self) {
        self.rx.close();
        while let Ok(batch) = self.rx.try_recv() {
            batch.release();
        }
    }
}

impl Drop for DepthSubscription {
    fn drop(&mut self) {
        self.drain();
        self.transport.release_to_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BatchHeader;
    use crate::pool::Pool;
    use venue_instrument::Symbol;

    fn batch() -> L2UpdatePooled {
        let pool = Pool::new();
        let mut batch = L2UpdatePooled::new(pool, 1);
        batch.set_header(BatchHeader {
            symbol: Symbol::parse("BTC-USDT@BinanceSpot").unwrap(),
            event_time_ms: 0,
            is_snapshot: false,
            first_id: 1,
            last_id: 1,
            prev_last_id: 0,
        });
        batch
    }

    #[test]
    fn rejects_second_subscriber() {
        let transport = DepthTransport::new();
        let _first = transport.subscribe(4).unwrap();
        assert!(matches!(
            transport.subscribe(4),
            Err(DataError::AlreadySubscribed)
        ));
    }

    #[tokio::test]
    async fn try_publish_drops_on_full() {
        let transport = DepthTransport::new();
        let mut sub = transport.subscribe(1).unwrap();

        assert!(transport.try_publish(batch()).unwrap());
        assert!(!transport.try_publish(batch()).unwrap());

        assert!(sub.recv().await.is_some());
    }

    #[tokio::test]
    async fn publish_async_waits_for_capacity() {
        let transport = DepthTransport::new();
        let mut sub = transport.subscribe(1).unwrap();
        let cancel = CancellationToken::new();

        transport.publish_async(batch(), &cancel).await.unwrap();

        let transport2 = transport.clone();
        let cancel2 = cancel.clone();
        let publisher = tokio::spawn(async move {
            transport2.publish_async(batch(), &cancel2).await.unwrap();
        });

        assert!(sub.recv().await.is_some());
        publisher.await.unwrap();
        assert!(sub.recv().await.is_some());
    }

    #[tokio::test]
    async fn unsubscribe_releases_buffered_batches() {
        let transport = DepthTransport::new();
        let sub = transport.subscribe(4).unwrap();
        transport.try_publish(batch()).unwrap();
        transport.try_publish(batch()).unwrap();

        sub.unsubscribe();

        // Slot is free again.
        let _resubscribed = transport.subscribe(4).unwrap();
    }
}
