//! Errors surfaced by [`Relay`](crate::Relay) and [`Listener`](crate::Listener).
//!
//! Only lifecycle misuse and aborted guaranteed deliveries are reported to senders. Full buffers
//! in best-effort mode and listeners that close during a fan-out are regular operating conditions
//! and never show up here.

use thiserror::Error;

/// A listener was requested from a relay that has already been closed.
///
/// This indicates a shutdown ordering bug in the caller. [`Relay::listener`](crate::Relay::listener)
/// panics with this error, [`Relay::try_listener`](crate::Relay::try_listener) returns it.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("relay already closed")]
pub struct RelayClosed;

/// A cancellable notification was aborted before every listener accepted the value.
///
/// Listeners that accepted the value before the abort keep it.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    /// The cancellation token fired.
    #[error("notification cancelled")]
    Cancelled,
    /// The deadline passed.
    #[error("notification deadline exceeded")]
    DeadlineExceeded,
}

/// Error returned by [`Listener::try_recv`](crate::Listener::try_recv).
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum TryRecvError {
    /// No value is buffered right now, but the listener is still open.
    #[error("listener buffer is empty")]
    Empty,
    /// The listener is closed and all buffered values have been drained.
    #[error("listener closed")]
    Closed,
}

/// Error returned by [`Listener::recv_timeout`](crate::Listener::recv_timeout).
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum RecvTimeoutError {
    /// No value arrived before the timeout elapsed.
    #[error("timed out waiting for a notification")]
    Timeout,
    /// The listener is closed and all buffered values have been drained.
    #[error("listener closed")]
    Closed,
}
