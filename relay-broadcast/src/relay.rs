use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relay_log::LogError;
use tokio_util::sync::CancellationToken;

use crate::builder::RelayBuilder;
use crate::error::{NotifyError, RelayClosed};
use crate::listener::{Delivery, Endpoint, Listener, ListenerId, Offer};

/// Registry of the listeners currently attached to a relay.
struct Registry<T> {
    listeners: HashMap<ListenerId, Arc<Endpoint<T>>>,
    next_id: u64,
    closed: bool,
}

/// State shared by all handles of a relay.
///
/// Listeners only hold a weak reference to it, which they use to remove themselves on close.
pub(crate) struct Shared<T> {
    name: Option<String>,
    registry: Mutex<Registry<T>>,
}

impl<T> Shared<T> {
    /// Returns the endpoints of all registered listeners.
    ///
    /// The registry lock is released before this returns, so senders never deliver while holding
    /// it.
    fn snapshot(&self) -> Vec<Arc<Endpoint<T>>> {
        self.registry.lock().listeners.values().cloned().collect()
    }

    /// Removes a closed listener from the registry.
    pub fn remove(&self, id: ListenerId) {
        let removed = self.registry.lock().listeners.remove(&id);

        if removed.is_some() {
            relay_log::debug!(relay = self.name(), listener = %id, "listener removed");
        }
    }

    /// Marks the relay closed and closes all listeners that were registered at that point.
    ///
    /// Returns `false` if the relay had been closed before.
    fn shutdown(&self) -> bool {
        let listeners = {
            let mut registry = self.registry.lock();
            if registry.closed {
                return false;
            }
            registry.closed = true;
            std::mem::take(&mut registry.listeners)
        };

        let count = listeners.len();
        for endpoint in listeners.into_values() {
            endpoint.close();
        }

        relay_log::debug!(relay = self.name(), listeners = count, "relay closed");
        true
    }

    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        // Ends the streams of listeners that outlive the last relay handle.
        self.shutdown();
    }
}

/// A fan-out point delivering every notification to all registered [`Listener`]s.
///
/// Listeners are created with [`listener`](Self::listener) and stay registered until they are
/// closed or dropped, or until the relay itself is closed. Each listener owns a bounded buffer whose
/// capacity is chosen at registration.
///
/// Notifications can be sent in three modes:
///
/// - **Guaranteed**: [`notify`](Self::notify) and [`notify_async`](Self::notify_async) wait until
///   every listener registered at the time of the call has accepted the value, or has closed.
/// - **Cancellable**: [`notify_ctx`](Self::notify_ctx), [`notify_until`](Self::notify_until),
///   [`notify_deadline`](Self::notify_deadline) and [`notify_timeout`](Self::notify_timeout)
///   wait like the guaranteed mode but give up on the remaining listeners once cancelled. Listeners
///   that accepted the value before keep it.
/// - **Best effort**: [`broadcast`](Self::broadcast) never waits. Listeners without room in their
///   buffer miss the value.
///
/// Each listener observes the values sent by one caller in the order of the calls. There is no
/// ordering across listeners.
///
/// `Relay` is a cheap handle that can be cloned and shared across threads. All clones refer to the
/// same set of listeners. Once the last handle is dropped, the relay closes its listeners as if
/// [`close`](Self::close) had been called. Every in-flight send borrows a handle, so this happens
/// only after all pending `notify` calls have returned, on the thread that drops the last handle.
///
/// # Example
///
/// ```
/// use relay_broadcast::Relay;
///
/// let relay = Relay::new();
/// let listener = relay.listener(4);
///
/// relay.notify("hello");
/// relay.close();
///
/// assert_eq!(listener.iter().collect::<Vec<_>>(), vec!["hello"]);
/// ```
pub struct Relay<T> {
    shared: Arc<Shared<T>>,
}

impl Relay<()> {
    /// Returns a [`RelayBuilder`] to configure a new relay.
    ///
    /// The value type is chosen by [`RelayBuilder::build`], so this needs no type annotation.
    pub fn builder() -> RelayBuilder {
        RelayBuilder::new()
    }
}

impl<T> Relay<T> {
    /// Creates a new relay without any listeners.
    pub fn new() -> Self {
        Self::from_builder(RelayBuilder::new())
    }

    pub(crate) fn from_builder(builder: RelayBuilder) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: builder.name,
                registry: Mutex::new(Registry {
                    listeners: HashMap::new(),
                    next_id: 0,
                    closed: false,
                }),
            }),
        }
    }

    /// Returns the name configured for this relay, if any.
    pub fn name(&self) -> Option<&str> {
        self.shared.name.as_deref()
    }

    /// Registers a new listener with a buffer of `capacity` values.
    ///
    /// A capacity of `0` creates a listener without buffer: guaranteed notifications wait until
    /// the listener reads them, and best-effort notifications only reach it while it waits for a
    /// value.
    ///
    /// # Panics
    ///
    /// Panics if the relay has already been closed. Registering on a closed relay is a shutdown
    /// ordering bug in the caller. Use [`try_listener`](Self::try_listener) to handle this case.
    pub fn listener(&self, capacity: usize) -> Listener<T> {
        match self.try_listener(capacity) {
            Ok(listener) => listener,
            Err(error) => {
                relay_log::error!(
                    relay = self.shared.name(),
                    capacity,
                    error = %LogError(&error),
                    "listener requested from a closed relay"
                );
                panic!("{error}");
            }
        }
    }

    /// Registers a new listener with a buffer of `capacity` values.
    ///
    /// Returns [`RelayClosed`] if the relay has already been closed.
    pub fn try_listener(&self, capacity: usize) -> Result<Listener<T>, RelayClosed> {
        let mut registry = self.shared.registry.lock();
        if registry.closed {
            return Err(RelayClosed);
        }

        let id = ListenerId(registry.next_id);
        registry.next_id += 1;

        let (listener, endpoint) = Listener::new(id, capacity, Arc::downgrade(&self.shared));
        registry.listeners.insert(id, endpoint);
        drop(registry);

        relay_log::debug!(
            relay = self.shared.name(),
            listener = %id,
            capacity,
            "listener registered"
        );

        Ok(listener)
    }

    /// Returns the number of registered listeners.
    pub fn len(&self) -> usize {
        self.shared.registry.lock().listeners.len()
    }

    /// Returns `true` if no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once the relay has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.registry.lock().closed
    }

    /// Closes the relay and all of its listeners.
    ///
    /// Listeners stop accepting values, but readers still receive everything that was buffered
    /// before their sequence ends. Senders blocked on a listener give up on it. Afterwards, no new
    /// listeners can be registered.
    ///
    /// Closing is idempotent and safe to call concurrently with all other operations.
    pub fn close(&self) {
        self.shared.shutdown();
    }
}

impl<T: Clone> Relay<T> {
    /// Delivers `value` to every registered listener, blocking the current thread until each one
    /// has accepted it.
    ///
    /// Listeners that close while this call waits for them are skipped. Do not call this from
    /// within an async runtime, use [`notify_async`](Self::notify_async) instead.
    pub fn notify(&self, value: T) {
        for endpoint in self.shared.snapshot() {
            if endpoint.deliver(value.clone()) == Delivery::Gone {
                self.skipped(&endpoint);
            }
        }
    }

    /// Delivers `value` to every registered listener, waiting for each one to accept it.
    ///
    /// This is the asynchronous counterpart of [`notify`](Self::notify).
    pub async fn notify_async(&self, value: T) {
        for endpoint in self.shared.snapshot() {
            if endpoint.deliver_async(value.clone()).await == Delivery::Gone {
                self.skipped(&endpoint);
            }
        }
    }

    /// Delivers `value` to every registered listener unless `ctx` is cancelled first.
    ///
    /// Waits for each listener in turn like [`notify_async`](Self::notify_async). If the token is
    /// cancelled before a listener accepts the value, the remaining listeners are skipped and
    /// [`NotifyError::Cancelled`] is returned. Listeners that accepted the value before keep it.
    /// A token that is already cancelled delivers to no listener at all.
    pub async fn notify_ctx(&self, ctx: &CancellationToken, value: T) -> Result<(), NotifyError> {
        self.notify_with(
            async {
                ctx.cancelled().await;
                NotifyError::Cancelled
            },
            value,
        )
        .await
    }

    /// Delivers `value` to every registered listener unless `deadline` passes first.
    ///
    /// Behaves like [`notify_ctx`](Self::notify_ctx), but returns
    /// [`NotifyError::DeadlineExceeded`] once the deadline has passed. Must be called within a
    /// Tokio runtime with the time driver enabled.
    pub async fn notify_until(
        &self,
        deadline: tokio::time::Instant,
        value: T,
    ) -> Result<(), NotifyError> {
        self.notify_with(
            async move {
                if tokio::time::Instant::now() < deadline {
                    tokio::time::sleep_until(deadline).await;
                }
                NotifyError::DeadlineExceeded
            },
            value,
        )
        .await
    }

    /// Delivers `value` to every registered listener unless `deadline` passes first, blocking the
    /// current thread.
    ///
    /// If the deadline passes before a listener accepts the value, the remaining listeners are
    /// skipped and [`NotifyError::DeadlineExceeded`] is returned. A deadline in the past delivers
    /// to no listener at all.
    pub fn notify_deadline(&self, deadline: Instant, value: T) -> Result<(), NotifyError> {
        for endpoint in self.shared.snapshot() {
            match endpoint.deliver_deadline(value.clone(), deadline) {
                Some(Delivery::Accepted) => (),
                Some(Delivery::Gone) => self.skipped(&endpoint),
                None => {
                    relay_log::debug!(
                        relay = self.shared.name(),
                        listener = %endpoint.id(),
                        "notification deadline exceeded"
                    );
                    return Err(NotifyError::DeadlineExceeded);
                }
            }
        }

        Ok(())
    }

    /// Delivers `value` to every registered listener unless `timeout` elapses first, blocking the
    /// current thread.
    ///
    /// The timeout covers the entire call. See [`notify_deadline`](Self::notify_deadline). A
    /// timeout too large to express as a deadline, such as [`Duration::MAX`], never elapses.
    pub fn notify_timeout(&self, timeout: Duration, value: T) -> Result<(), NotifyError> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.notify_deadline(deadline, value),
            None => {
                self.notify(value);
                Ok(())
            }
        }
    }

    /// Offers `value` to every registered listener without waiting.
    ///
    /// Listeners whose buffer is full at this instant miss the value. For listeners with a capacity
    /// of `0`, this means the value only arrives if the reader is currently waiting for it.
    pub fn broadcast(&self, value: T) {
        let mut dropped = 0;

        for endpoint in self.shared.snapshot() {
            match endpoint.offer(value.clone()) {
                Offer::Accepted => (),
                Offer::Full => dropped += 1,
                Offer::Gone => self.skipped(&endpoint),
            }
        }

        if dropped > 0 {
            relay_log::trace!(
                relay = self.shared.name(),
                dropped,
                "broadcast missed listeners with full buffers"
            );
        }
    }

    /// Shared implementation of the cancellable modes.
    ///
    /// `abort` resolves to the error to return. It is polled before every delivery attempt, so an
    /// abort that is ready right away prevents all deliveries.
    async fn notify_with<F>(&self, abort: F, value: T) -> Result<(), NotifyError>
    where
        F: Future<Output = NotifyError>,
    {
        let mut abort = std::pin::pin!(abort);

        for endpoint in self.shared.snapshot() {
            let delivery = tokio::select! {
                biased;

                error = &mut abort => {
                    relay_log::debug!(
                        relay = self.shared.name(),
                        listener = %endpoint.id(),
                        %error,
                        "notification aborted"
                    );
                    return Err(error);
                }
                delivery = endpoint.deliver_async(value.clone()) => delivery,
            };

            if delivery == Delivery::Gone {
                self.skipped(&endpoint);
            }
        }

        Ok(())
    }

    fn skipped(&self, endpoint: &Endpoint<T>) {
        relay_log::trace!(
            relay = self.shared.name(),
            listener = %endpoint.id(),
            "skipped closed listener"
        );
    }
}

impl<T> Clone for Relay<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for Relay<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Relay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.shared.registry.lock();
        f.debug_struct("Relay")
            .field("name", &self.shared.name)
            .field("listeners", &registry.listeners.len())
            .field("closed", &registry.closed)
            .finish()
    }
}
