use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use flume::Selector;
use futures::stream::{self, Stream};

use crate::error::{RecvTimeoutError, TryRecvError};
use crate::relay::Shared;
use crate::signal::CloseSignal;

/// Opaque identifier of a [`Listener`] within its [`Relay`](crate::Relay).
///
/// Identifiers are unique per relay and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of a guaranteed delivery to a single listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// The listener's buffer accepted the value.
    Accepted,
    /// The listener closed before it could accept the value.
    Gone,
}

/// Outcome of a best-effort delivery to a single listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Offer {
    Accepted,
    Full,
    Gone,
}

/// The sending half of a listener, shared between the listener and its relay's registry.
///
/// Senders only ever reach a listener through its endpoint. Every delivery attempt waits on the
/// buffer and the close signal at the same time, so closing the listener releases blocked senders
/// without closing the buffer itself.
pub(crate) struct Endpoint<T> {
    id: ListenerId,
    tx: flume::Sender<T>,
    signal: CloseSignal,
}

impl<T> Endpoint<T> {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn close(&self) -> bool {
        self.signal.close()
    }

    pub fn is_closed(&self) -> bool {
        self.signal.is_closed()
    }

    /// Blocks the current thread until the value is accepted or the listener closes.
    pub fn deliver(&self, value: T) -> Delivery {
        if self.is_closed() {
            return Delivery::Gone;
        }

        Selector::new()
            .recv(self.signal.done(), |_| Delivery::Gone)
            .send(&self.tx, value, |result| match result {
                Ok(()) => Delivery::Accepted,
                Err(_) => Delivery::Gone,
            })
            .wait()
    }

    /// Like [`deliver`](Self::deliver), but gives up at `deadline`.
    ///
    /// Returns `None` if the deadline passed first. A deadline that has already passed never
    /// delivers.
    pub fn deliver_deadline(&self, value: T, deadline: Instant) -> Option<Delivery> {
        if self.is_closed() {
            return Some(Delivery::Gone);
        }

        if Instant::now() >= deadline {
            return None;
        }

        Selector::new()
            .recv(self.signal.done(), |_| Delivery::Gone)
            .send(&self.tx, value, |result| match result {
                Ok(()) => Delivery::Accepted,
                Err(_) => Delivery::Gone,
            })
            .wait_deadline(deadline)
            .ok()
    }

    /// Suspends the current task until the value is accepted or the listener closes.
    pub async fn deliver_async(&self, value: T) -> Delivery {
        if self.is_closed() {
            return Delivery::Gone;
        }

        tokio::select! {
            biased;

            _ = self.signal.closed() => Delivery::Gone,
            result = self.tx.send_async(value) => match result {
                Ok(()) => Delivery::Accepted,
                Err(_) => Delivery::Gone,
            },
        }
    }

    /// Hands the value over only if the buffer has room right now.
    pub fn offer(&self, value: T) -> Offer {
        if self.is_closed() {
            return Offer::Gone;
        }

        match self.tx.try_send(value) {
            Ok(()) => Offer::Accepted,
            Err(flume::TrySendError::Full(_)) => Offer::Full,
            Err(flume::TrySendError::Disconnected(_)) => Offer::Gone,
        }
    }
}

/// The receiving end of a [`Relay`](crate::Relay).
///
/// A listener buffers up to [`capacity`](Self::capacity) notifications in FIFO order. It is
/// created with [`Relay::listener`](crate::Relay::listener) and receives every notification sent
/// while it is registered.
///
/// Values can be read one at a time ([`recv`](Self::recv), [`try_recv`](Self::try_recv),
/// [`recv_timeout`](Self::recv_timeout), [`recv_async`](Self::recv_async)) or as a sequence with
/// [`iter`](Self::iter) and [`stream`](Self::stream). The sequence ends once the listener is closed
/// and every buffered value has been read.
///
/// Closing a listener, either explicitly with [`close`](Self::close) or by dropping it, removes it
/// from its relay. A closed listener no longer accepts values, but values that were buffered before
/// the close remain readable.
pub struct Listener<T> {
    endpoint: Arc<Endpoint<T>>,
    rx: flume::Receiver<T>,
    capacity: usize,
    relay: Weak<Shared<T>>,
}

impl<T> Listener<T> {
    /// Creates a listener together with the endpoint its relay delivers to.
    pub(crate) fn new(
        id: ListenerId,
        capacity: usize,
        relay: Weak<Shared<T>>,
    ) -> (Self, Arc<Endpoint<T>>) {
        let (tx, rx) = flume::bounded(capacity);

        let endpoint = Arc::new(Endpoint {
            id,
            tx,
            signal: CloseSignal::new(),
        });

        let listener = Self {
            endpoint: Arc::clone(&endpoint),
            rx,
            capacity,
            relay,
        };

        (listener, endpoint)
    }

    /// Returns the identifier of this listener within its relay.
    pub fn id(&self) -> ListenerId {
        self.endpoint.id()
    }

    /// Returns the buffer capacity this listener was created with.
    ///
    /// A capacity of `0` means values are handed over directly to a waiting reader.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of buffered values that have not been read yet.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if no values are buffered.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Returns `true` once this listener has been closed.
    ///
    /// Buffered values may still be readable.
    pub fn is_closed(&self) -> bool {
        self.endpoint.is_closed()
    }

    /// Closes this listener and removes it from its relay.
    ///
    /// Senders that are currently blocked on this listener give up on it. Calling `close` more
    /// than once, or concurrently with [`Relay::close`](crate::Relay::close), has no additional
    /// effect.
    pub fn close(&self) {
        if !self.endpoint.close() {
            return;
        }

        // The relay may be gone or closed already, in which case there is nothing to remove.
        if let Some(relay) = self.relay.upgrade() {
            relay.remove(self.id());
        }
    }

    /// Returns the next value without blocking.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        match self.rx.try_recv() {
            Ok(value) => Ok(value),
            Err(_) if self.is_closed() => Err(TryRecvError::Closed),
            Err(_) => Err(TryRecvError::Empty),
        }
    }

    /// Blocks the current thread until the next value arrives.
    ///
    /// Returns `None` once the listener is closed and drained.
    pub fn recv(&self) -> Option<T> {
        loop {
            match self.try_recv() {
                Ok(value) => return Some(value),
                Err(TryRecvError::Closed) => return None,
                Err(TryRecvError::Empty) => (),
            }

            let received = Selector::new()
                .recv(&self.rx, |result| result.ok())
                .recv(self.endpoint.signal.done(), |_| None)
                .wait();

            if received.is_some() {
                return received;
            }
        }
    }

    /// Blocks the current thread until the next value arrives or `timeout` elapses.
    ///
    /// A timeout too large to express as a deadline, such as [`Duration::MAX`], never elapses.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.recv().ok_or(RecvTimeoutError::Closed);
        };

        loop {
            match self.try_recv() {
                Ok(value) => return Ok(value),
                Err(TryRecvError::Closed) => return Err(RecvTimeoutError::Closed),
                Err(TryRecvError::Empty) => (),
            }

            let received = Selector::new()
                .recv(&self.rx, |result| result.ok())
                .recv(self.endpoint.signal.done(), |_| None)
                .wait_deadline(deadline);

            match received {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => (),
                Err(_) => return Err(RecvTimeoutError::Timeout),
            }
        }
    }

    /// Waits for the next value without blocking the thread.
    ///
    /// Returns `None` once the listener is closed and drained.
    pub async fn recv_async(&self) -> Option<T> {
        loop {
            match self.try_recv() {
                Ok(value) => return Some(value),
                Err(TryRecvError::Closed) => return None,
                Err(TryRecvError::Empty) => (),
            }

            tokio::select! {
                biased;

                result = self.rx.recv_async() => {
                    if let Ok(value) = result {
                        return Some(value);
                    }
                }
                _ = self.endpoint.signal.closed() => (),
            }
        }
    }

    /// Returns a blocking iterator over the received values.
    ///
    /// The iterator ends once the listener is closed and drained.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { listener: self }
    }

    /// Returns a stream of the received values.
    ///
    /// The stream ends once the listener is closed and drained.
    pub fn stream(&self) -> impl Stream<Item = T> + '_ {
        stream::unfold(self, |listener| async move {
            let value = listener.recv_async().await?;
            Some((value, listener))
        })
    }
}

impl<T> Drop for Listener<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T> fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id())
            .field("capacity", &self.capacity)
            .field("buffered", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Blocking iterator over the values of a borrowed [`Listener`].
///
/// Created by [`Listener::iter`].
#[derive(Debug)]
pub struct Iter<'a, T> {
    listener: &'a Listener<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.listener.recv()
    }
}

/// Blocking iterator that owns a [`Listener`].
///
/// Dropping the iterator closes the listener.
#[derive(Debug)]
pub struct IntoIter<T> {
    listener: Listener<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.listener.recv()
    }
}

impl<'a, T> IntoIterator for &'a Listener<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

impl<T> IntoIterator for Listener<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter { listener: self }
    }
}
