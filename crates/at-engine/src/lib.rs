//! AT Transaction Engine
//!
//! This crate drives a cellular modem over a single serial line where
//! command replies and unsolicited notifications share one byte stream.
//!
//! # Architecture
//!
//! A [`Session`] owns one background task, the bridge loop, which is the
//! only reader and writer of the transport. Callers never touch the
//! transport directly:
//!
//! - **Transactions**: [`Session::transact`] claims the single-slot
//!   [`Correlator`], asks the bridge loop to write the command and waits for
//!   the reply lines up to a terminal line. A second concurrent transaction
//!   fails with [`EngineError::Busy`] instead of queuing.
//! - **Notifications**: lines that are not part of a reply are looked up in
//!   the session's [`EventRegistry`]. A matching handler decodes them into an
//!   [`EventKind`](at_protocol::EventKind), whose bits are raised on the
//!   [`FlagBus`] and which is published as a [`SessionEvent`].
//! - **Waits**: [`Session::wait`] blocks until a combination of event bits
//!   has been raised, then consumes exactly those bits.
//!
//! Feature operations (calls, SMS, bearer, HTTP) are thin methods on
//! `Session` in the [`features`] module that format a command, run a
//! transaction and parse the reply.
//!
//! # Example
//!
//! ```rust,no_run
//! use at_engine::{Session, SessionConfig, SerialSettings};
//!
//! # async fn run() -> Result<(), at_engine::EngineError> {
//! let config = SessionConfig::default();
//! let session = Session::open(&SerialSettings::new("/dev/ttyUSB0"), config)?;
//!
//! session.bring_up(session.config().boot_timeout()).await?;
//! session.dial("+5581999999999").await?;
//!
//! let _port = session.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod correlator;
pub mod error;
pub mod events;
pub mod features;
pub mod flags;
pub mod registry;
pub mod session;

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use bridge::{BridgeCommand, BridgeState};
pub use config::{SerialSettings, SessionConfig};
pub use correlator::{Correlator, Expect, Offer, Reply, Terminal, Ticket};
pub use error::EngineError;
pub use events::SessionEvent;
pub use flags::FlagBus;
pub use registry::{EventRegistry, NotificationHandler, RegistrationId};
pub use session::Session;

// Lock helpers that recover from poisoning

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
