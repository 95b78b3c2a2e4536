//! End-to-end store semantics: listener classification, unsubscribe safety,
//! key-set signals, and path addressing through the facade.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use keypath_store::{KeyPath, Store, Subscription, Value};

fn counter() -> (Rc<Cell<u32>>, impl Fn() + 'static) {
    let count = Rc::new(Cell::new(0));
    let c = Rc::clone(&count);
    (count, move || c.set(c.get() + 1))
}

#[test]
fn listener_minimality() {
    let store = Store::in_memory();
    let (root_count, root_listener) = counter();
    let (b_count, b_listener) = counter();
    let (c_count, c_listener) = counter();
    let _root = store.subscribe("a", root_listener);
    let _b = store.subscribe("a.b", b_listener);
    let _c = store.subscribe("a.c", c_listener);

    // A write to a.b notifies a (ancestor) and a.b (exact), never a.c.
    store.set("a.b", 1i64);
    assert_eq!(root_count.get(), 1);
    assert_eq!(b_count.get(), 1);
    assert_eq!(c_count.get(), 0);

    // Replacing the root notifies a.c only because its resolved value
    // actually changed; a.b's value is unchanged and stays quiet.
    store.set(
        "a",
        Value::object([("b", Value::from(1i64)), ("c", Value::from(9i64))]),
    );
    assert_eq!(b_count.get(), 1);
    assert_eq!(c_count.get(), 1);
}

#[test]
fn self_unsubscribe_inside_notification_is_safe() {
    let store = Store::in_memory();
    let fired = Rc::new(Cell::new(0u32));
    let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

    let fired_clone = Rc::clone(&fired);
    let slot_clone = Rc::clone(&slot);
    let sub = store.subscribe("ns.x", move || {
        fired_clone.set(fired_clone.get() + 1);
        // Drop our own registration mid-pass.
        slot_clone.borrow_mut().take();
    });
    *slot.borrow_mut() = Some(sub);

    store.set("ns.x", 1i64);
    assert_eq!(fired.get(), 1);

    store.set("ns.x", 2i64);
    assert_eq!(fired.get(), 1, "listener must not fire after unsubscribing");
}

#[test]
fn subscribing_from_inside_a_listener_takes_effect_next_pass() {
    let store = Store::in_memory();
    let late_count = Rc::new(Cell::new(0u32));
    let held: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));

    let store_clone = store.clone();
    let late = Rc::clone(&late_count);
    let held_clone = Rc::clone(&held);
    let _sub = store.subscribe("ns.x", move || {
        if held_clone.borrow().is_empty() {
            let late = Rc::clone(&late);
            let sub = store_clone.subscribe("ns.x", move || late.set(late.get() + 1));
            held_clone.borrow_mut().push(sub);
        }
    });

    store.set("ns.x", 1i64);
    assert_eq!(late_count.get(), 0);
    store.set("ns.x", 2i64);
    assert_eq!(late_count.get(), 1);
}

#[test]
fn empty_terminal_segment_addresses_the_empty_key() {
    let store = Store::in_memory();
    store.set("ns.a.b.", Value::object::<String>([]));
    let b = store.get("ns.a.b").unwrap();
    let map = b.as_object().expect("b must be an object, not an array");
    assert!(map.contains_key(""));
    assert_eq!(store.ordered_keys("ns.a.b"), [""]);
}

#[test]
fn keypath_builder_addresses_the_store() {
    let store = Store::in_memory();
    let title = KeyPath::root("ui").field("panels").index(0).field("title");
    store.set(title.as_str(), "Inbox");
    assert_eq!(
        store.get("ui.panels.0.title"),
        Some(Value::from("Inbox"))
    );
    assert!(store.get("ui.panels").unwrap().as_array().is_some());
}

#[test]
fn keys_signal_ignores_value_churn_under_existing_keys() {
    let store = Store::in_memory();
    store.set("ns.form.name", "a");
    store.set("ns.form.mail", "b");

    let (count, listener) = counter();
    let _sub = store.subscribe_keys("ns.form", listener);

    for i in 0..5i64 {
        store.set("ns.form.name", format!("round {i}"));
    }
    assert_eq!(count.get(), 0);

    store.rename_key("ns.form", "mail", "email");
    assert!(count.get() >= 1, "rename changes membership");
}

#[test]
fn deep_listener_survives_ancestor_rebuild_without_value_change() {
    let store = Store::in_memory();
    store.set("ns.a.b.c", 1i64);
    let (count, listener) = counter();
    let _sub = store.subscribe("ns.a.b.c", listener);

    // Sibling write rebuilds ns.a on the copy-on-write path; c's resolved
    // value is unchanged, so its listener stays quiet.
    store.set("ns.a.other", 2i64);
    assert_eq!(count.get(), 0);

    store.set("ns.a.b.c", 3i64);
    assert_eq!(count.get(), 1);
}

#[test]
fn reset_unregisters_namespace_listeners_only() {
    let store = Store::in_memory();
    store.set("ns.a", 1i64);
    store.set("other.a", 1i64);

    let (ns_count, ns_listener) = counter();
    let (other_count, other_listener) = counter();
    let _a = store.subscribe("ns.a", ns_listener);
    let _b = store.subscribe("other.a", other_listener);

    store.reset("ns");
    let after_reset = ns_count.get();
    assert!(after_reset >= 1, "reset notifies before unregistering");

    store.set("ns.a", 2i64);
    assert_eq!(ns_count.get(), after_reset);

    store.set("other.a", 2i64);
    assert_eq!(other_count.get(), 1);
}
