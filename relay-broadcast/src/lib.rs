//! # Relay Broadcast
//!
//! A fan-out primitive that delivers every notification to all currently registered listeners.
//!
//! A [`Relay`] keeps a dynamic set of [`Listener`]s. Each listener owns a bounded FIFO buffer whose
//! capacity is picked at registration, and is read either blocking ([`Listener::recv`],
//! [`Listener::iter`]) or from async code ([`Listener::recv_async`], [`Listener::stream`]).
//!
//! ## Delivery Modes
//!
//! - **Guaranteed**: [`Relay::notify`] and [`Relay::notify_async`] wait until every listener has
//!   accepted the value. Listeners that close while the sender waits are skipped.
//! - **Cancellable**: [`Relay::notify_ctx`], [`Relay::notify_until`] and their blocking
//!   counterparts [`Relay::notify_deadline`] and [`Relay::notify_timeout`] stop waiting once
//!   cancelled and report a [`NotifyError`]. Listeners reached before the abort keep the value.
//! - **Best effort**: [`Relay::broadcast`] never waits. Listeners without room miss the value.
//!
//! ## Concurrency Model
//!
//! The set of listeners is guarded by a single lock that is held only to register, remove, or
//! snapshot listeners. Deliveries run on the snapshot outside of the lock, so a slow listener
//! never blocks registration, closing, or other listeners' reads.
//!
//! Closing is decoupled from the buffer: a closed listener rejects new values and wakes all senders
//! blocked on it, while values buffered before the close stay readable until drained. Closing the
//! relay closes all of its listeners and rejects further registrations. Dropping the last handle of
//! a relay closes it, and dropping a listener closes and removes it.
//!
//! ## Usage Example
//!
//! ```rust
//! use relay_broadcast::Relay;
//!
//! let relay = Relay::builder().name("updates").build();
//! let listener = relay.listener(8);
//!
//! let reader = std::thread::spawn(move || listener.into_iter().collect::<Vec<_>>());
//!
//! relay.notify(1);
//! relay.broadcast(2);
//! relay.close();
//!
//! let received = reader.join().unwrap();
//! assert_eq!(received[0], 1);
//! ```

#![warn(missing_docs)]

mod builder;
mod error;
mod listener;
mod relay;
mod signal;

pub use self::builder::*;
pub use self::error::*;
pub use self::listener::{IntoIter, Iter, Listener, ListenerId};
pub use self::relay::Relay;
