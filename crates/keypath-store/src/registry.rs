//! Listener registry with a reverse descendant index.
//!
//! Listeners are keyed by full path string. For every registered path, the
//! registry also records that path in a reverse index bucket for each of its
//! ancestor prefixes (namespace included), so a mutation at `P` can look up
//! "which registered paths live beneath `P`" in one map access instead of
//! scanning the whole registry.
//!
//! # Invariants
//!
//! 1. A path with zero listeners has no registry entry, and a prefix with no
//!    registered descendants has no reverse-index bucket (no leaks).
//! 2. Listeners at one path are invoked in registration order.
//! 3. Dropping a [`Subscription`] — including from inside a notification
//!    callback — removes the listener before the next notification cycle
//!    and never panics.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Subscription outlives registry | store dropped first | drop is a no-op (`Weak`) |
//! | Double unsubscribe | explicit + drop | second removal finds nothing |

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use keypath_core::path::{ancestor_prefixes, split_namespace};

/// A registered change callback. Zero-argument: subscribers re-read through
/// the store facade.
pub type Listener = Rc<dyn Fn()>;

type ListenerId = u64;

#[derive(Default)]
struct RegistryInner {
    next_id: ListenerId,
    /// Full path -> listeners in registration order.
    listeners: HashMap<String, Vec<(ListenerId, Listener)>>,
    /// Prefix -> full paths registered strictly beneath it.
    descendants: HashMap<String, HashSet<String>>,
}

impl RegistryInner {
    fn remove(&mut self, key: &str, id: ListenerId) {
        let Some(entries) = self.listeners.get_mut(key) else {
            return;
        };
        entries.retain(|(eid, _)| *eid != id);
        if !entries.is_empty() {
            return;
        }
        self.listeners.remove(key);
        for prefix in index_prefixes(key) {
            if let Some(bucket) = self.descendants.get_mut(&prefix) {
                bucket.remove(key);
                if bucket.is_empty() {
                    self.descendants.remove(&prefix);
                }
            }
        }
    }
}

/// The namespace root plus every strict ancestor prefix of `key`.
fn index_prefixes(key: &str) -> Vec<String> {
    let (ns, rest) = split_namespace(key);
    match rest {
        None => Vec::new(),
        Some(_) => {
            let mut out = vec![ns.to_owned()];
            out.extend(ancestor_prefixes(key));
            out
        }
    }
}

/// Path-keyed listener registry shared between the store and its
/// subscriptions.
#[derive(Default)]
pub struct ListenerRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` under `key`. The returned [`Subscription`] keeps
    /// the registration alive; dropping it unsubscribes.
    pub fn subscribe(&self, key: &str, listener: Listener) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .listeners
            .entry(key.to_owned())
            .or_default()
            .push((id, listener));
        for prefix in index_prefixes(key) {
            inner
                .descendants
                .entry(prefix)
                .or_default()
                .insert(key.to_owned());
        }
        Subscription {
            registry: Rc::downgrade(&self.inner),
            key: key.to_owned(),
            id,
        }
    }

    /// Snapshot of the listeners at `key`, in registration order.
    ///
    /// Invocation works off this snapshot so callbacks may freely subscribe
    /// and unsubscribe mid-pass; pair with [`Self::is_registered`] to skip
    /// listeners removed earlier in the same pass.
    #[must_use]
    pub fn snapshot(&self, key: &str) -> Vec<(u64, Listener)> {
        self.inner
            .borrow()
            .listeners
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_registered(&self, key: &str, id: u64) -> bool {
        self.inner
            .borrow()
            .listeners
            .get(key)
            .is_some_and(|entries| entries.iter().any(|(eid, _)| *eid == id))
    }

    #[must_use]
    pub fn has_listeners(&self, key: &str) -> bool {
        self.inner.borrow().listeners.contains_key(key)
    }

    /// Registered paths strictly beneath `key`, sorted for deterministic
    /// fan-out order.
    #[must_use]
    pub fn descendant_paths(&self, key: &str) -> Vec<String> {
        let inner = self.inner.borrow();
        let Some(bucket) = inner.descendants.get(key) else {
            return Vec::new();
        };
        let mut paths: Vec<String> = bucket.iter().cloned().collect();
        paths.sort_unstable();
        paths
    }

    /// Drop every registration at or under `namespace`.
    pub fn remove_namespace(&self, namespace: &str) {
        let prefix = format!("{namespace}.");
        let mut inner = self.inner.borrow_mut();
        inner
            .listeners
            .retain(|key, _| key != namespace && !key.starts_with(&prefix));
        inner.descendants.retain(|bucket_key, bucket| {
            if *bucket_key == namespace || bucket_key.starts_with(&prefix) {
                return false;
            }
            bucket.retain(|key| key != namespace && !key.starts_with(&prefix));
            !bucket.is_empty()
        });
        tracing::trace!(namespace, "listener registrations cleared");
    }

    /// Test-isolation teardown.
    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.listeners.clear();
        inner.descendants.clear();
    }

    #[must_use]
    pub fn registered_path_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    #[cfg(test)]
    fn descendant_bucket_count(&self) -> usize {
        self.inner.borrow().descendants.len()
    }
}

/// RAII handle for a registered listener. Dropping it unsubscribes.
pub struct Subscription {
    registry: Weak<RefCell<RegistryInner>>,
    key: String,
    id: ListenerId,
}

impl Subscription {
    /// Unsubscribe explicitly (equivalent to dropping the handle).
    pub fn unsubscribe(self) {}

    /// The path this subscription is registered under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().remove(&self.key, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
