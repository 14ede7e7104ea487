//! Feature operations
//!
//! Thin async methods on [`Session`](crate::Session): each one formats a
//! command from `at_protocol`, runs it through the transaction engine and
//! parses the reply. Operations that complete asynchronously (SMS send,
//! HTTP requests) also wait on the event bits or event stream.

pub mod basic;
pub mod call;
pub mod net;
pub mod sms;

use std::collections::HashMap;
use std::time::Duration;

use at_protocol::urc::Decoder;
use at_protocol::EventKind;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::events::SessionEvent;
use crate::registry::RegistrationId;
use crate::{lock, Session};

/// Built-in decoder sets switched on and off as a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum EventGroup {
    Call,
    Sms,
    Http,
}

/// Registrations made for each enabled group
pub(crate) type GroupRegistrations = HashMap<EventGroup, Vec<RegistrationId>>;

impl<T> Session<T> {
    /// Register a group's decoders unless the group is already enabled
    pub(crate) fn enable_group(&self, group: EventGroup, decoders: &[(&str, Decoder)]) {
        let mut groups = lock(&self.shared.groups);
        if groups.contains_key(&group) {
            debug!("{:?} events already enabled", group);
            return;
        }
        groups.insert(group, self.register_decoders(decoders));
    }

    /// Remove exactly the registrations the group added
    pub(crate) fn disable_group(&self, group: EventGroup) -> bool {
        let Some(ids) = lock(&self.shared.groups).remove(&group) else {
            return false;
        };
        for id in ids {
            self.unregister(id);
        }
        true
    }
}

/// Wait on a subscription for the first event `pick` accepts
pub(crate) async fn next_event<T>(
    rx: &mut broadcast::Receiver<SessionEvent>,
    timeout: Duration,
    mut pick: impl FnMut(&EventKind) -> Option<T>,
) -> Result<T> {
    let deadline = Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Ok(event)) => {
                if let Some(found) = event.kind().and_then(&mut pick) {
                    return Ok(found);
                }
            }
            Ok(Err(RecvError::Lagged(n))) => warn!("Event subscriber lagged by {} events", n),
            Ok(Err(RecvError::Closed)) => return Err(EngineError::Stopped),
            Err(_) => return Err(EngineError::timed_out(timeout)),
        }
    }
}
