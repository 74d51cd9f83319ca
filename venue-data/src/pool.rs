use parking_lot::Mutex;
use std::sync::Arc;

/// A small free-list of reusable `Vec<T>` buffers, shared behind a `Mutex`.
///
/// Grounded on the `parking_lot`-guarded shared-state idiom used throughout
/// `books::map::OrderBookMapSingle`, generalised here from "one lock per book" to "one
/// lock guarding a stack of spare allocations". [`L2UpdatePooled`](crate::model::L2UpdatePooled)
/// rents its backing storage from a `Pool<L2Delta>`.
#[derive(Debug)]
pub struct Pool<T> {
    free: Mutex<Vec<Vec<T>>>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Pool<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Rent a buffer with at least `capacity` spare room, reusing a released
    /// allocation if one is available.
    pub fn rent(&self, capacity: usize) -> Vec<T> {
        let mut free = self.free.lock();
        match free.pop() {
            Some(mut buf) => {
                buf.clear();
                if buf.capacity() < capacity {
                    buf.reserve(capacity - buf.capacity());
                }
                buf
            }
            None => Vec::with_capacity(capacity),
        }
    }

    /// Return a buffer to the pool for reuse. Its length is not reset by the pool;
    /// callers clear before release if they intend the capacity only.
    pub fn release(&self, buf: Vec<T>) {
        self.free.lock().push(buf);
    }

    /// Number of spare buffers currently held, exposed for tests.
    pub fn spare_len(&self) -> usize {
        self.free.lock().len()
    }
}
