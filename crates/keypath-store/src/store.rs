//! The store facade: namespaced roots, the `produce` write gate, and the
//! path-typed API consumed by binding layers.
//!
//! A [`Store`] is an explicit context object — cache, listener registry, and
//! key-order state live inside it, not in module globals — shared through a
//! cheap clonable handle. Two configurations exist:
//!
//! - **memory-only** ([`Store::in_memory`]): pure in-process behavior;
//! - **durable** ([`Store::durable`], [`Store::durable_with_transport`]):
//!   mirrors every namespace root to a [`StorageBackend`] and posts each
//!   mutation to the transport for peer processes.
//!
//! # Invariants
//!
//! 1. All mutation funnels through `produce`: a write whose value deep-equals
//!    the current value performs no write, no persistence, no notification.
//! 2. Writing through a scalar **namespace root** at a subpath is a no-op.
//! 3. Persistence is best-effort: backend failures and corrupt entries are
//!    logged and degrade to absent-value/no-op, never to a caller error.
//! 4. `reset` clears the cache, the durable entry, and every listener
//!    registration under the namespace.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use keypath_core::nested::{get_nested, merge_defaults, set_nested};
use keypath_core::ordered::{ordered_keys, rename_preserving_order, set_ordered_keys};
use keypath_core::path::{segments, split_namespace};
use keypath_core::value::Value;

use crate::engine::{NotificationEngine, NotifyOptions, keys_path};
use crate::persist::{StorageBackend, storage_key};
use crate::registry::Subscription;
use crate::sync::{NullTransport, Transport, WireMessage};

/// Options for [`Store::set_with`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SetOptions {
    /// Write (and persist/broadcast) without notifying local listeners.
    pub skip_notify: bool,
}

struct StoreInner {
    roots: RefCell<HashMap<String, Value>>,
    engine: NotificationEngine,
    backend: Option<Box<dyn StorageBackend>>,
    transport: Rc<dyn Transport>,
}

/// Clonable handle to a path-addressed reactive store.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    /// A store with no persistence and no broadcasting.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::build(None, Rc::new(NullTransport))
    }

    /// A durable store with no transport (single-process operation).
    #[must_use]
    pub fn durable(backend: impl StorageBackend + 'static) -> Self {
        Self::build(Some(Box::new(backend)), Rc::new(NullTransport))
    }

    /// A durable store that broadcasts mutations on `transport`.
    #[must_use]
    pub fn durable_with_transport(
        backend: impl StorageBackend + 'static,
        transport: Rc<dyn Transport>,
    ) -> Self {
        Self::build(Some(Box::new(backend)), transport)
    }

    fn build(backend: Option<Box<dyn StorageBackend>>, transport: Rc<dyn Transport>) -> Self {
        Store {
            inner: Rc::new(StoreInner {
                roots: RefCell::new(HashMap::new()),
                engine: NotificationEngine::new(),
                backend,
                transport,
            }),
        }
    }

    // -- reads ------------------------------------------------------------

    /// The value at `full_key`, or `None` if absent.
    #[must_use]
    pub fn get(&self, full_key: &str) -> Option<Value> {
        let (namespace, subpath) = split_namespace(full_key);
        let root = self.root_of(namespace)?;
        match subpath {
            None => Some(root),
            Some(p) => get_nested(&root, &segments(p)).cloned(),
        }
    }

    /// The stable key order of the object at `path`; empty for non-objects.
    #[must_use]
    pub fn ordered_keys(&self, path: &str) -> Vec<String> {
        self.get(path)
            .as_ref()
            .and_then(Value::as_object)
            .map(ordered_keys)
            .unwrap_or_default()
    }

    /// Revision counter of the key-set signal at `path`.
    #[must_use]
    pub fn keys_revision(&self, path: &str) -> u64 {
        self.inner.engine.keys_revision(path)
    }

    // -- writes -----------------------------------------------------------

    /// Write `value` at `full_key`. Equal values short-circuit: no write,
    /// no notification.
    pub fn set(&self, full_key: &str, value: impl Into<Value>) {
        self.produce(full_key, Some(value.into()), false);
    }

    /// Write (or delete, when `value` is `None`) with explicit options.
    pub fn set_with(&self, full_key: &str, value: Option<Value>, opts: SetOptions) {
        self.produce(full_key, value, opts.skip_notify);
    }

    /// Remove the value at `full_key`: whole namespace when `full_key` has
    /// no subpath, key removal or array splice otherwise.
    pub fn delete(&self, full_key: &str) {
        self.produce(full_key, None, false);
    }

    /// Seed `namespace` with `defaults`, merged under any persisted state
    /// (persisted wins). The single initialization entry point.
    pub fn initialize(&self, namespace: &str, defaults: Value) {
        let merged = match self.get(namespace) {
            Some(persisted) => merge_defaults(&defaults, &persisted),
            None => defaults,
        };
        self.produce(namespace, Some(merged), false);
    }

    /// Rename `old_key` to `new_key` inside the object at `path`, keeping
    /// its position in the key order. Missing old key or identical keys are
    /// silently ignored. A non-object at `path` is replaced by an object
    /// seeding the new key.
    pub fn rename_key(&self, path: &str, old_key: &str, new_key: &str) {
        let current = self.get(path);
        match current.as_ref().and_then(Value::as_object) {
            Some(map) => {
                let Some(renamed) = rename_preserving_order(map, old_key, new_key) else {
                    return;
                };
                let moved = map.get(old_key).cloned();
                // Renaming onto an existing key displaces its value; the
                // new-leaf notify diffs against it, not against absence.
                let displaced = map.get(new_key).cloned();
                let new_obj = Value::from(renamed);
                if !self.produce(path, Some(new_obj.clone()), true) {
                    return;
                }

                // Old leaf, new leaf, then the reshaped object itself, each
                // with correct before/after values.
                let old_leaf = format!("{path}.{old_key}");
                let new_leaf = format!("{path}.{new_key}");
                self.inner
                    .engine
                    .notify(&old_leaf, moved.as_ref(), None, NotifyOptions::default());
                self.inner.engine.notify(
                    &new_leaf,
                    displaced.as_ref(),
                    moved.as_ref(),
                    NotifyOptions::default(),
                );
                self.inner.engine.notify(
                    path,
                    current.as_ref(),
                    Some(&new_obj),
                    NotifyOptions::skip_children(),
                );
            }
            None => {
                // No object to rename within: seed one whose key order
                // starts at the new key. Null stands in for the absent
                // value. Notified at `path` only.
                let replacement = Value::object([(new_key, Value::Null)]);
                if !self.produce(path, Some(replacement.clone()), true) {
                    return;
                }
                self.inner.engine.notify(
                    path,
                    current.as_ref(),
                    Some(&replacement),
                    NotifyOptions::skip_children(),
                );
            }
        }
    }

    /// Reorder the keys of the object at `path` to follow `keys` (absent
    /// keys ignored, unlisted keys appended). Values are untouched, so this
    /// bypasses the deep-equality gate and bumps the key-set signal
    /// explicitly.
    pub fn set_key_order<S: AsRef<str>>(&self, path: &str, keys: &[S]) {
        let current = self.get(path);
        let Some(map) = current.as_ref().and_then(Value::as_object) else {
            return;
        };
        let reordered = set_ordered_keys(map, keys);
        if reordered.keys().eq(map.keys()) {
            return;
        }
        let new_obj = Value::from(reordered);
        if !self.write(path, Some(new_obj.clone())) {
            return;
        }
        self.inner.engine.notify(
            path,
            current.as_ref(),
            Some(&new_obj),
            NotifyOptions {
                skip_children: true,
                force: true,
                ..NotifyOptions::default()
            },
        );
        self.inner.engine.bump_keys(path);
    }

    /// Clear `namespace` from both layers, broadcast the reset, and drop
    /// every listener registration under it.
    pub fn reset(&self, namespace: &str) {
        let old = self.root_of(namespace);
        self.inner.roots.borrow_mut().remove(namespace);
        self.remove_persisted(namespace);
        self.broadcast(&WireMessage::Reset {
            key: namespace.to_owned(),
        });
        self.inner
            .engine
            .notify(namespace, old.as_ref(), None, NotifyOptions::default());
        self.inner.engine.remove_namespace(namespace);
    }

    /// Test-isolation teardown: drop all cached roots, listeners, and
    /// key-set revisions. Durable entries are untouched.
    pub fn clear_all(&self) {
        self.inner.roots.borrow_mut().clear();
        self.inner.engine.clear();
    }

    // -- subscriptions ----------------------------------------------------

    /// Subscribe to changes at `full_key` (exact, or via ancestor/descendant
    /// classification of other mutations). Dropping the returned handle
    /// unsubscribes.
    pub fn subscribe(&self, full_key: &str, listener: impl Fn() + 'static) -> Subscription {
        self.inner.engine.subscribe(full_key, Rc::new(listener))
    }

    /// Subscribe to the key-set signal at `path`: fires when key membership
    /// at or under `path`'s level changes, never on pure value changes.
    pub fn subscribe_keys(&self, path: &str, listener: impl Fn() + 'static) -> Subscription {
        self.inner
            .engine
            .subscribe(&keys_path(path), Rc::new(listener))
    }

    /// Force-notify every listener classified against `full_key`, with no
    /// data change.
    pub fn notify(&self, full_key: &str) {
        let current = self.get(full_key);
        self.inner.engine.notify(
            full_key,
            current.as_ref(),
            current.as_ref(),
            NotifyOptions {
                force: true,
                ..NotifyOptions::default()
            },
        );
    }

    // -- internals --------------------------------------------------------

    /// The single governed write path: equality short-circuit, write,
    /// notify. Returns whether the write landed; equal values and guarded
    /// no-ops report `false`.
    fn produce(&self, full_key: &str, value: Option<Value>, skip_notify: bool) -> bool {
        let old = self.get(full_key);
        if old == value {
            return false;
        }
        if !self.write(full_key, value.clone()) {
            return false;
        }
        if !skip_notify {
            self.inner
                .engine
                .notify(full_key, old.as_ref(), value.as_ref(), NotifyOptions::default());
        }
        true
    }

    /// Apply the mutation to the cache and durable layer. Returns `false`
    /// when guarded as a no-op.
    fn write(&self, full_key: &str, value: Option<Value>) -> bool {
        let (namespace, subpath) = split_namespace(full_key);
        match subpath {
            None => match value {
                Some(v) => {
                    self.inner
                        .roots
                        .borrow_mut()
                        .insert(namespace.to_owned(), v.clone());
                    self.persist(namespace, &v);
                    self.broadcast_set(namespace, &v);
                    true
                }
                None => {
                    self.inner.roots.borrow_mut().remove(namespace);
                    self.remove_persisted(namespace);
                    self.broadcast(&WireMessage::Delete {
                        key: namespace.to_owned(),
                    });
                    true
                }
            },
            Some(p) => {
                let root = self.root_of(namespace);
                // Writing through a scalar root is a no-op.
                if let Some(r) = &root {
                    if !r.is_container() {
                        tracing::trace!(full_key, "write through scalar root ignored");
                        return false;
                    }
                }
                match set_nested(root.as_ref(), &segments(p), value) {
                    Some(new_root) => {
                        self.inner
                            .roots
                            .borrow_mut()
                            .insert(namespace.to_owned(), new_root.clone());
                        self.persist(namespace, &new_root);
                        self.broadcast_set(namespace, &new_root);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Cached root for `namespace`, falling back to the durable layer (and
    /// caching the result) for durable stores.
    fn root_of(&self, namespace: &str) -> Option<Value> {
        if let Some(v) = self.inner.roots.borrow().get(namespace) {
            return Some(v.clone());
        }
        let backend = self.inner.backend.as_ref()?;
        match backend.load(&storage_key(namespace)) {
            Ok(Some(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(v) => {
                    self.inner
                        .roots
                        .borrow_mut()
                        .insert(namespace.to_owned(), v.clone());
                    Some(v)
                }
                Err(e) => {
                    tracing::warn!(namespace, error = %e, "corrupt persisted entry treated as absent");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(namespace, error = %e, "persisted entry load failed, treated as absent");
                None
            }
        }
    }

    /// Cache-only root lookup, used when diffing inbound sync frames (the
    /// durable layer may already hold the post-message value).
    fn peek_root(&self, namespace: &str) -> Option<Value> {
        self.inner.roots.borrow().get(namespace).cloned()
    }

    fn persist(&self, namespace: &str, root: &Value) {
        let Some(backend) = self.inner.backend.as_ref() else {
            return;
        };
        match serde_json::to_string(root) {
            Ok(text) => {
                if let Err(e) = backend.store(&storage_key(namespace), &text) {
                    tracing::warn!(namespace, error = %e, "persist failed, keeping in-memory value");
                }
            }
            Err(e) => {
                tracing::warn!(namespace, error = %e, "root not serializable, persist skipped");
            }
        }
    }

    fn remove_persisted(&self, namespace: &str) {
        if let Some(backend) = self.inner.backend.as_ref() {
            if let Err(e) = backend.remove(&storage_key(namespace)) {
                tracing::warn!(namespace, error = %e, "durable entry removal failed");
            }
        }
    }

    fn broadcast_set(&self, namespace: &str, root: &Value) {
        self.broadcast(&WireMessage::Set {
            key: namespace.to_owned(),
            value: serde_json::Value::from(root),
        });
    }

    fn broadcast(&self, message: &WireMessage) {
        // Memory-only stores carry a NullTransport, so this is inert there.
        if self.inner.backend.is_none() {
            return;
        }
        match serde_json::to_string(message) {
            Ok(frame) => self.inner.transport.send(&frame),
            Err(e) => tracing::warn!(error = %e, "sync frame not serializable, broadcast skipped"),
        }
    }

    pub(crate) fn transport(&self) -> Rc<dyn Transport> {
        Rc::clone(&self.inner.transport)
    }

    /// Replay an inbound frame: write the cache mirror and notify. Never
    /// persists or re-broadcasts.
    pub(crate) fn apply_remote(&self, message: WireMessage) {
        match message {
            WireMessage::Set { key, value } => {
                let old = self.peek_root(&key);
                let new = Value::from(value);
                self.inner
                    .roots
                    .borrow_mut()
                    .insert(key.clone(), new.clone());
                self.inner
                    .engine
                    .notify(&key, old.as_ref(), Some(&new), NotifyOptions::default());
            }
            WireMessage::Delete { key } | WireMessage::Reset { key } => {
                let old = self.peek_root(&key);
                self.inner.roots.borrow_mut().remove(&key);
                self.inner
                    .engine
                    .notify(&key, old.as_ref(), None, NotifyOptions::default());
            }
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("namespaces", &self.inner.roots.borrow().len())
            .field("durable", &self.inner.backend.is_some())
            .finish()
    }
}
