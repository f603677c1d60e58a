// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Holds a current value and pushes every change to its subscribers. New subscribers receive the
/// current value first. Setting a value equal to the current one is a no-op.
///
/// Unlike a `watch` channel every subscriber observes every distinct transition in order.
/// Dropping a `ReplayStream` unsubscribes it.
pub struct ReplaySubject<T> {
    inner: Arc<Mutex<SubjectState<T>>>,
}

struct SubjectState<T> {
    value: T,
    subscribers: Vec<mpsc::UnboundedSender<T>>,
}

impl<T: Clone + PartialEq + Send + 'static> ReplaySubject<T> {
    pub fn new(value: T) -> Self {
        ReplaySubject {
            inner: Arc::new(Mutex::new(SubjectState {
                value,
                subscribers: vec![],
            })),
        }
    }

    pub fn value(&self) -> T {
        self.inner.lock().value.clone()
    }

    /// Publishes `value` if it differs from the current one. Returns true if it was published.
    pub fn next(&self, value: T) -> bool {
        let mut state = self.inner.lock();
        state.publish(value)
    }

    /// Applies `f` to the current value and publishes the result if it changed.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut state = self.inner.lock();
        let mut value = state.value.clone();
        f(&mut value);
        state.publish(value)
    }

    pub fn subscribe(&self) -> ReplayStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.lock();
        // The receiver is alive, so this can't fail.
        let _ = tx.send(state.value.clone());
        state.subscribers.push(tx);
        ReplayStream { rx }
    }
}

impl<T: Clone + PartialEq> SubjectState<T> {
    fn publish(&mut self, value: T) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value.clone();
        self.subscribers
            .retain(|subscriber| subscriber.send(value.clone()).is_ok());
        true
    }
}

impl<T> Clone for ReplaySubject<T> {
    fn clone(&self) -> Self {
        ReplaySubject {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + PartialEq + Send + Default + 'static> Default for ReplaySubject<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

pub struct ReplayStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> ReplayStream<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Returns all values that have been published since the last call without waiting.
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = vec![];
        while let Ok(value) = self.rx.try_recv() {
            values.push(value)
        }
        values
    }
}

impl<T> Stream for ReplayStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
