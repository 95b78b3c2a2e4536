//! Notification fan-out: exact, ancestor, and descendant classification
//! plus virtual key-set signals.
//!
//! On a mutation at `key` the engine fires:
//!
//! - **exact** listeners at `key`, gated on value change (unless forced);
//! - **ancestor** listeners — the namespace root and every intermediate
//!   prefix — unconditionally ("something changed under me" semantics);
//! - **descendant** listeners, looked up via the reverse index and gated on
//!   whether the value at their relative path actually changed between the
//!   old and new values.
//!
//! When the mutation is *structural* (the key appeared or disappeared, or an
//! object's key set changed), every prefix of `key` with a registered
//! key-set signal (`<prefix>.__keys__`) gets its revision bumped and an
//! exact-only forced re-notify. Value-only changes never bump key signals.
//!
//! # Invariants
//!
//! 1. A write that does not change the value fires nothing (the store's
//!    `produce` gate short-circuits before calling in, and the equality gate
//!    here backs that up for direct callers).
//! 2. Fan-out cost is O(listeners actually classified), not O(all
//!    registered listeners): descendants come from the reverse index.
//! 3. The both-skips fast path fires exact listeners only and performs no
//!    key-signal walk — this is what the key-signal recursion itself uses,
//!    so the recursion terminates after one level.
//! 4. Listeners unsubscribed earlier in the same pass are not invoked.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use keypath_core::nested::get_nested;
use keypath_core::path::{ancestor_prefixes, segments, split_namespace};
use keypath_core::value::Value;

use crate::registry::{Listener, ListenerRegistry, Subscription};

/// Reserved terminal segment naming a path's key-set signal.
///
/// `"<path>.__keys__"` is a synthetic subscription key whose "value" is a
/// revision counter, never real data in the value store.
pub const KEYS_MARKER: &str = "__keys__";

/// The key-set signal path for `path`.
#[must_use]
pub fn keys_path(path: &str) -> String {
    format!("{path}.{KEYS_MARKER}")
}

/// Propagation controls for [`NotificationEngine::notify`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NotifyOptions {
    /// Skip namespace-root and intermediate ancestor listeners.
    pub skip_root: bool,
    /// Skip descendant listeners.
    pub skip_children: bool,
    /// Fire even when old and new values compare equal.
    pub force: bool,
}

impl NotifyOptions {
    /// Exact-match-only, forced: the form used for key-signal re-notifies.
    #[must_use]
    pub fn exact_forced() -> Self {
        NotifyOptions {
            skip_root: true,
            skip_children: true,
            force: true,
        }
    }

    /// Everything except descendants: the rename "object shape" form.
    #[must_use]
    pub fn skip_children() -> Self {
        NotifyOptions {
            skip_children: true,
            ..NotifyOptions::default()
        }
    }
}

/// The listener registry plus key-set revision state.
#[derive(Default)]
pub struct NotificationEngine {
    registry: ListenerRegistry,
    revisions: RefCell<HashMap<String, u64>>,
}

impl NotificationEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, key: &str, listener: Listener) -> Subscription {
        self.registry.subscribe(key, listener)
    }

    #[must_use]
    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// Current revision of the key-set signal at `path` (0 if never bumped).
    #[must_use]
    pub fn keys_revision(&self, path: &str) -> u64 {
        self.revisions
            .borrow()
            .get(&keys_path(path))
            .copied()
            .unwrap_or(0)
    }

    /// Fan a mutation at `key` out to the affected listeners.
    ///
    /// `old`/`new` are the values at `key` before and after; `None` means
    /// absent.
    pub fn notify(&self, key: &str, old: Option<&Value>, new: Option<&Value>, opts: NotifyOptions) {
        let changed = opts.force || old != new;

        if opts.skip_root && opts.skip_children {
            if changed {
                self.fire(key);
            }
            return;
        }

        if changed {
            self.fire(key);
        }

        if !opts.skip_root {
            let (namespace, rest) = split_namespace(key);
            if rest.is_some() {
                self.fire(namespace);
            }
            for prefix in ancestor_prefixes(key) {
                self.fire(&prefix);
            }
        }

        if !opts.skip_children {
            for path in self.registry.descendant_paths(key) {
                let rel = &path[key.len() + 1..];
                let segs = segments(rel);
                let old_sub = old.and_then(|v| get_nested(v, &segs));
                let new_sub = new.and_then(|v| get_nested(v, &segs));
                if opts.force || old_sub != new_sub {
                    self.fire(&path);
                }
            }
        }

        if structural_change(old, new) {
            self.bump_key_signals(key);
        }
    }

    /// Invoke the listeners registered exactly at `key`, from a snapshot,
    /// skipping any that were unsubscribed earlier in this pass.
    fn fire(&self, key: &str) {
        let snapshot = self.registry.snapshot(key);
        if snapshot.is_empty() {
            return;
        }
        tracing::trace!(key, count = snapshot.len(), "notifying listeners");
        for (id, listener) in snapshot {
            if self.registry.is_registered(key, id) {
                listener();
            }
        }
    }

    /// Bump the key-set revision at every prefix of `key` (namespace,
    /// intermediates, the key itself) that has a registered signal, and
    /// re-notify each signal exact-only.
    fn bump_key_signals(&self, key: &str) {
        let (namespace, rest) = split_namespace(key);
        let mut prefixes: Vec<&str> = Vec::new();
        if rest.is_some() {
            prefixes.push(namespace);
        }
        let ancestors = ancestor_prefixes(key);
        prefixes.extend(ancestors.iter().map(String::as_str));
        prefixes.push(key);

        for prefix in prefixes {
            self.bump_keys(prefix);
        }
    }

    /// Bump the key-set signal at exactly `path`, if one is registered, and
    /// re-notify it exact-only.
    pub fn bump_keys(&self, path: &str) {
        let signal = keys_path(path);
        if !self.registry.has_listeners(&signal) {
            return;
        }
        {
            let mut revisions = self.revisions.borrow_mut();
            *revisions.entry(signal.clone()).or_insert(0) += 1;
        }
        self.notify(&signal, None, None, NotifyOptions::exact_forced());
    }

    /// Forget revisions belonging to `namespace` (used by reset).
    pub fn remove_namespace(&self, namespace: &str) {
        let prefix = format!("{namespace}.");
        self.revisions
            .borrow_mut()
            .retain(|key, _| key != namespace && !key.starts_with(&prefix));
        self.registry.remove_namespace(namespace);
    }

    /// Test-isolation teardown.
    pub fn clear(&self) {
        self.revisions.borrow_mut().clear();
        self.registry.clear();
    }
}

/// Whether a mutation changed key membership: the value appeared or
/// disappeared, or object key sets differ. Scalar-to-scalar value changes
/// are never structural.
fn structural_change(old: Option<&Value>, new: Option<&Value>) -> bool {
    match (old, new) {
        (None, None) => false,
        (None, Some(_)) | (Some(_), None) => true,
        (Some(o), Some(n)) => match (o.as_object(), n.as_object()) {
            (Some(om), Some(nm)) => {
                let old_keys: BTreeSet<&str> = om.keys().map(String::as_str).collect();
                let new_keys: BTreeSet<&str> = nm.keys().map(String::as_str).collect();
                old_keys != new_keys
            }
            (None, None) => false,
            _ => true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn counter() -> (Rc<Cell<u32>>, Listener) {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        (count, Rc::new(move || c.set(c.get() + 1)))
    }

    #[test]
    fn exact_listener_gated_on_change() {
        let engine = NotificationEngine::new();
        let (count, listener) = counter();
        let _sub = engine.subscribe("ns.a", listener);

        let v = Value::from(1i64);
        engine.notify("ns.a", Some(&v), Some(&v), NotifyOptions::default());
        assert_eq!(count.get(), 0);

        engine.notify("ns.a", Some(&v), Some(&Value::from(2i64)), NotifyOptions::default());
        assert_eq!(count.get(), 1);

        engine.notify("ns.a", Some(&v), Some(&v), NotifyOptions { force: true, ..Default::default() });
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn ancestors_fire_unconditionally_siblings_do_not() {
        let engine = NotificationEngine::new();
        let (root_count, root_listener) = counter();
        let (sibling_count, sibling_listener) = counter();
        let _root = engine.subscribe("ns", root_listener);
        let _sibling = engine.subscribe("ns.c", sibling_listener);

        // Mutation at ns.b: ancestor "ns" fires, sibling "ns.c" does not.
        engine.notify(
            "ns.b",
            None,
            Some(&Value::from(1i64)),
            NotifyOptions::default(),
        );
        assert_eq!(root_count.get(), 1);
        assert_eq!(sibling_count.get(), 0);
    }

    #[test]
    fn descendants_fire_only_when_their_subvalue_changed() {
        let engine = NotificationEngine::new();
        let (b_count, b_listener) = counter();
        let (c_count, c_listener) = counter();
        let _b = engine.subscribe("ns.a.b", b_listener);
        let _c = engine.subscribe("ns.a.c", c_listener);

        let old = Value::object([("b", Value::from(1i64)), ("c", Value::from(9i64))]);
        let new = Value::object([("b", Value::from(2i64)), ("c", Value::from(9i64))]);
        engine.notify("ns.a", Some(&old), Some(&new), NotifyOptions::default());
        assert_eq!(b_count.get(), 1);
        assert_eq!(c_count.get(), 0);
    }

    #[test]
    fn skip_children_suppresses_descendants() {
        let engine = NotificationEngine::new();
        let (count, listener) = counter();
        let _sub = engine.subscribe("ns.a.b", listener);

        let old = Value::object([("b", Value::from(1i64))]);
        let new = Value::object([("b", Value::from(2i64))]);
        engine.notify("ns.a", Some(&old), Some(&new), NotifyOptions::skip_children());
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn key_signal_bumps_on_membership_change_only() {
        let engine = NotificationEngine::new();
        let (count, listener) = counter();
        let _sub = engine.subscribe(&keys_path("ns.a"), listener);

        // Value-only change: no bump.
        let old = Value::object([("x", Value::from(1i64))]);
        let new = Value::object([("x", Value::from(2i64))]);
        engine.notify("ns.a", Some(&old), Some(&new), NotifyOptions::default());
        assert_eq!(count.get(), 0);
        assert_eq!(engine.keys_revision("ns.a"), 0);

        // Key added: bump.
        let grown = Value::object([("x", Value::from(2i64)), ("y", Value::from(3i64))]);
        engine.notify("ns.a", Some(&new), Some(&grown), NotifyOptions::default());
        assert_eq!(count.get(), 1);
        assert_eq!(engine.keys_revision("ns.a"), 1);
    }

    #[test]
    fn key_signal_bumps_at_ancestors_of_an_added_leaf() {
        let engine = NotificationEngine::new();
        let (count, listener) = counter();
        let _sub = engine.subscribe(&keys_path("ns.a"), listener);

        // ns.a.b appears: membership at ns.a changed.
        engine.notify(
            "ns.a.b",
            None,
            Some(&Value::from(1i64)),
            NotifyOptions::default(),
        );
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn unsubscribed_mid_pass_listener_is_skipped() {
        let engine = Rc::new(NotificationEngine::new());
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let (late_count, late_listener) = counter();

        // First listener unsubscribes the second during the pass.
        let slot_clone = Rc::clone(&slot);
        let _killer = engine.subscribe(
            "ns.a",
            Rc::new(move || {
                slot_clone.borrow_mut().take();
            }),
        );
        *slot.borrow_mut() = Some(engine.subscribe("ns.a", late_listener));

        engine.notify(
            "ns.a",
            None,
            Some(&Value::from(1i64)),
            NotifyOptions::default(),
        );
        assert_eq!(late_count.get(), 0);
    }

    #[test]
    fn structural_change_classification() {
        let scalar_a = Value::from(1i64);
        let scalar_b = Value::from(2i64);
        let obj_x = Value::object([("x", Value::from(1i64))]);
        let obj_xy = Value::object([("x", Value::from(1i64)), ("y", Value::from(2i64))]);

        assert!(!structural_change(None, None));
        assert!(structural_change(None, Some(&scalar_a)));
        assert!(structural_change(Some(&scalar_a), None));
        assert!(!structural_change(Some(&scalar_a), Some(&scalar_b)));
        assert!(!structural_change(Some(&obj_x), Some(&obj_x)));
        assert!(structural_change(Some(&obj_x), Some(&obj_xy)));
        assert!(structural_change(Some(&obj_x), Some(&scalar_a)));
    }
}
