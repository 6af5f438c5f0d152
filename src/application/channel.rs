use futures_util::Stream;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Locks a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Current value plus an ordered fan-out of every change.
///
/// Each subscriber first receives the value current at subscription time and
/// then every later value, in order and without coalescing. Dropping the
/// channel ends all streams.
pub struct StateChannel<T> {
    inner: Mutex<ChannelInner<T>>,
}

struct ChannelInner<T> {
    current: T,
    subscribers: Vec<mpsc::UnboundedSender<T>>,
}

impl<T: Clone + Send + 'static> StateChannel<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Mutex::new(ChannelInner {
                current: initial,
                subscribers: Vec::new(),
            }),
        }
    }

    pub fn current(&self) -> T {
        lock(&self.inner).current.clone()
    }

    pub fn subscribe(&self) -> StateStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = lock(&self.inner);
        // Cannot fail: the receiver is alive in this scope.
        let _ = tx.send(inner.current.clone());
        inner.subscribers.push(tx);
        StateStream { rx }
    }

    /// Stores `next` and delivers it to every live subscriber.
    pub fn replace(&self, next: T) {
        let mut inner = lock(&self.inner);
        Self::publish(&mut inner, next);
    }

    /// Atomically derives the next value from the current one. Returns
    /// `false` (and emits nothing) when `f` declines the update.
    pub fn update(&self, f: impl FnOnce(&T) -> Option<T>) -> bool {
        let mut inner = lock(&self.inner);
        match f(&inner.current) {
            Some(next) => {
                Self::publish(&mut inner, next);
                true
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        let mut inner = lock(&self.inner);
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }

    fn publish(inner: &mut ChannelInner<T>, next: T) {
        inner
            .subscribers
            .retain(|tx| tx.send(next.clone()).is_ok());
        inner.current = next;
    }
}

/// Receiving end of a [`StateChannel`] subscription. Dropping it cancels the
/// subscription.
pub struct StateStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> StateStream<T> {
    /// Waits for the next value. `None` once the channel is gone.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Returns an already delivered value without waiting.
    pub fn try_next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for StateStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}
