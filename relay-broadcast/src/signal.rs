use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// A one-shot, idempotent close notification shared between a listener and its senders.
///
/// The signal is modelled as a channel nobody ever sends on: closing drops the only sender, which
/// disconnects the channel and wakes every thread or task waiting on [`done`](Self::done). Waiters
/// can therefore race "the value was accepted" against "the listener went away" with the same
/// channel primitives used for delivery.
pub(crate) struct CloseSignal {
    trigger: Mutex<Option<flume::Sender<()>>>,
    done: flume::Receiver<()>,
    closed: AtomicBool,
}

impl CloseSignal {
    pub fn new() -> Self {
        let (trigger, done) = flume::bounded(0);

        Self {
            trigger: Mutex::new(Some(trigger)),
            done,
            closed: AtomicBool::new(false),
        }
    }

    /// Fires the signal.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn close(&self) -> bool {
        let trigger = self.trigger.lock().take();
        self.closed.store(true, Ordering::Release);
        // Dropping the sender outside of the lock disconnects `done`.
        trigger.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The receiving side of the signal, used to wait for the close in a select.
    ///
    /// Receiving from it only ever yields a disconnect error, once the signal has fired.
    pub fn done(&self) -> &flume::Receiver<()> {
        &self.done
    }

    /// Resolves once the signal has fired.
    pub async fn closed(&self) {
        // Nothing is ever sent, so this returns with a disconnect error after `close`.
        let _ = self.done.recv_async().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_close_is_idempotent() {
        let signal = CloseSignal::new();
        assert!(!signal.is_closed());

        assert!(signal.close());
        assert!(signal.is_closed());

        assert!(!signal.close());
        assert!(signal.is_closed());
    }

    #[test]
    fn test_close_wakes_blocked_waiter() {
        let signal = Arc::new(CloseSignal::new());

        let waiter = {
            let signal = Arc::clone(&signal);
            std::thread::spawn(move || signal.done().recv().is_err())
        };

        std::thread::sleep(Duration::from_millis(20));
        signal.close();

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_concurrent_close_transitions_once() {
        let signal = Arc::new(CloseSignal::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let signal = Arc::clone(&signal);
                std::thread::spawn(move || signal.close())
            })
            .collect();

        let transitions = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|closed| *closed)
            .count();

        assert_eq!(transitions, 1);
    }

    #[tokio::test]
    async fn test_closed_resolves_after_close() {
        let signal = Arc::new(CloseSignal::new());

        let waiter = {
            let signal = Arc::clone(&signal);
            tokio::spawn(async move { signal.closed().await })
        };

        signal.close();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
