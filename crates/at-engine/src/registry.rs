//! Notification handler registry
//!
//! A small chained hash table keyed by notification name. Each session owns
//! its own registry, so two modems never see each other's handlers.
//!
//! # Matching
//!
//! Lookup hashes the name to a bucket and then compares full names along the
//! bucket's chain. A name only ever matches a registration with the exact
//! same name, so `+CPIN` never reaches a handler for `+CME` even when both
//! land in the same bucket.
//!
//! Several registrations may share a name. The most recent one wins until it
//! is removed, which lets a feature temporarily take over a notification
//! from a longer-lived handler.

use std::sync::Arc;

use at_protocol::{EventKind, ParseError};
use tracing::debug;

/// Default number of buckets
pub const DEFAULT_BUCKETS: usize = 16;

const HASH_SEED: u32 = 10037;

/// Turns a notification's arguments into an event
pub trait NotificationHandler: Send + Sync {
    /// Decode the arguments of one notification
    fn handle(&self, args: &[String]) -> Result<EventKind, ParseError>;
}

impl<F> NotificationHandler for F
where
    F: Fn(&[String]) -> Result<EventKind, ParseError> + Send + Sync,
{
    fn handle(&self, args: &[String]) -> Result<EventKind, ParseError> {
        self(args)
    }
}

/// Identifies one registration for later removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

struct Registration {
    id: RegistrationId,
    name: String,
    handler: Arc<dyn NotificationHandler>,
}

/// Name-keyed table of notification handlers
pub struct EventRegistry {
    buckets: Vec<Vec<Registration>>,
    next_id: u64,
    len: usize,
}

/// Polynomial rolling hash of a notification name
fn hash_name(name: &str) -> u32 {
    name.bytes()
        .fold(HASH_SEED, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(b)))
}

impl EventRegistry {
    /// Create a registry with the default bucket count
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS)
    }

    /// Create a registry with `buckets` chains (at least one)
    pub fn with_buckets(buckets: usize) -> Self {
        Self {
            buckets: (0..buckets.max(1)).map(|_| Vec::new()).collect(),
            next_id: 0,
            len: 0,
        }
    }

    fn bucket(&self, name: &str) -> usize {
        hash_name(name) as usize % self.buckets.len()
    }

    /// Register a handler for a notification name
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl NotificationHandler + 'static,
    ) -> RegistrationId {
        let name = name.into();
        let id = RegistrationId(self.next_id);
        self.next_id += 1;

        let bucket = self.bucket(&name);
        debug!("Registering handler {:?} for {:?} in bucket {}", id, name, bucket);
        // Newest first, so it shadows older registrations for the same name
        self.buckets[bucket].insert(
            0,
            Registration {
                id,
                name,
                handler: Arc::new(handler),
            },
        );
        self.len += 1;
        id
    }

    /// Remove one registration, returning whether it existed
    pub fn unregister(&mut self, id: RegistrationId) -> bool {
        for chain in &mut self.buckets {
            if let Some(pos) = chain.iter().position(|r| r.id == id) {
                let removed = chain.remove(pos);
                debug!("Unregistered handler {:?} for {:?}", id, removed.name);
                self.len -= 1;
                return true;
            }
        }
        false
    }

    /// Remove the registration that currently answers for `name`
    pub fn unregister_name(&mut self, name: &str) -> bool {
        let bucket = self.bucket(name);
        let chain = &mut self.buckets[bucket];
        match chain.iter().position(|r| r.name == name) {
            Some(pos) => {
                let removed = chain.remove(pos);
                debug!("Unregistered handler {:?} for {:?}", removed.id, name);
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    /// Whether any handler answers for `name`
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    fn lookup(&self, name: &str) -> Option<&Registration> {
        self.buckets[self.bucket(name)]
            .iter()
            .find(|r| r.name == name)
    }

    /// Run the handler for `name`
    ///
    /// Returns `None` when nothing is registered; that is not an error.
    pub fn dispatch(&self, name: &str, args: &[String]) -> Option<Result<EventKind, ParseError>> {
        self.lookup(name).map(|r| r.handler.handle(args))
    }

    /// Number of registrations
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self
            .buckets
            .iter()
            .flat_map(|chain| chain.iter().map(|r| r.name.as_str()))
            .collect();
        f.debug_struct("EventRegistry").field("names", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use at_protocol::urc;
    use at_protocol::EventBits;

    fn custom(name: &'static str, bit: u32) -> impl NotificationHandler {
        move |args: &[String]| -> Result<EventKind, ParseError> {
            Ok(EventKind::Custom {
                name: name.to_string(),
                args: args.to_vec(),
                bits: EventBits::feature(bit).unwrap_or_default(),
            })
        }
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dispatch_http_action() {
        let mut registry = EventRegistry::new();
        registry.register(urc::HTTPACTION, urc::decode_http_action);

        let event = registry
            .dispatch("+HTTPACTION", &args(&["0", "200", "1024"]))
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            EventKind::HttpAction {
                method: at_protocol::http::HttpMethod::Get,
                status: 200,
                length: 1024,
            }
        );
    }

    #[test]
    fn test_unknown_name_is_noop() {
        let registry = EventRegistry::new();
        assert!(registry.dispatch("+CUSD", &[]).is_none());
    }

    #[test]
    fn test_collisions_do_not_cross_fire() {
        // One bucket: every name collides
        let mut registry = EventRegistry::with_buckets(1);
        registry.register("+CME", custom("+CME", 0));
        registry.register("+CPIN", custom("+CPIN", 1));

        match registry.dispatch("+CPIN", &[]) {
            Some(Ok(EventKind::Custom { name, .. })) => assert_eq!(name, "+CPIN"),
            other => panic!("unexpected dispatch result: {:?}", other),
        }
        // Prefix of a registered name does not match
        assert!(registry.dispatch("+CP", &[]).is_none());
        assert!(registry.dispatch("+CPIN2", &[]).is_none());
    }

    #[test]
    fn test_newest_registration_wins() {
        let mut registry = EventRegistry::new();
        let old = registry.register("RING", custom("old", 0));
        let new = registry.register("RING", custom("new", 1));
        assert_ne!(old, new);

        let name_of = |r: &EventRegistry| match r.dispatch("RING", &[]) {
            Some(Ok(EventKind::Custom { name, .. })) => name,
            other => panic!("unexpected dispatch result: {:?}", other),
        };
        assert_eq!(name_of(&registry), "new");

        assert!(registry.unregister(new));
        assert_eq!(name_of(&registry), "old");
    }

    #[test]
    fn test_unregister_name_removes_one() {
        let mut registry = EventRegistry::with_buckets(2);
        registry.register("RING", custom("first", 0));
        registry.register("RING", custom("second", 1));
        registry.register("NO CARRIER", custom("nc", 2));
        assert_eq!(registry.len(), 3);

        assert!(registry.unregister_name("RING"));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("RING"));
        assert!(registry.contains("NO CARRIER"));

        assert!(registry.unregister_name("RING"));
        assert!(!registry.contains("RING"));
        assert!(!registry.unregister_name("RING"));
        assert!(registry.contains("NO CARRIER"));
    }

    #[test]
    fn test_unregister_unknown_id() {
        let mut registry = EventRegistry::new();
        let id = registry.register("RDY", urc::decode_ready);
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_handler_error_surfaces() {
        let mut registry = EventRegistry::new();
        registry.register(urc::CLIP, urc::decode_caller_id);
        assert!(matches!(registry.dispatch("+CLIP", &[]), Some(Err(_))));
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash_name(""), HASH_SEED);
        assert_eq!(hash_name("A"), HASH_SEED.wrapping_mul(31) + 65);
    }
}
