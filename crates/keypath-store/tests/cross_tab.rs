//! Cross-process synchronization over the loopback transport: two durable
//! stores standing in for two tabs sharing a broadcast channel.

use std::cell::Cell;
use std::rc::Rc;

use keypath_store::{MemoryBackend, Store, SyncBridge, Transport, Value};

fn tab_pair() -> (Store, Store, Rc<keypath_store::LoopbackTransport>) {
    let (t_a, t_b) = keypath_store::loopback_pair();
    let a = Store::durable_with_transport(MemoryBackend::new(), t_a.clone());
    let b = Store::durable_with_transport(MemoryBackend::new(), t_b);
    (a, b, t_a)
}

fn counter() -> (Rc<Cell<u32>>, impl Fn() + 'static) {
    let count = Rc::new(Cell::new(0));
    let c = Rc::clone(&count);
    (count, move || c.set(c.get() + 1))
}

#[test]
fn replay_set_into_empty_mirror() {
    let (a, b, _) = tab_pair();
    let bridge_b = SyncBridge::new(&b);

    let (count, listener) = counter();
    let _sub = b.subscribe("ns", listener);

    a.set("ns.user.name", "ada");
    assert_eq!(bridge_b.pump(), 1);

    assert_eq!(b.get("ns.user.name"), Some(Value::from("ada")));
    assert_eq!(count.get(), 1, "root listener fires exactly once per frame");
}

#[test]
fn replay_diffs_descendants_against_the_local_mirror() {
    let (a, b, _) = tab_pair();
    let bridge_b = SyncBridge::new(&b);

    let (name_count, name_listener) = counter();
    let _sub = b.subscribe("ns.user.name", name_listener);

    a.set("ns.user.name", "ada");
    bridge_b.pump();
    assert_eq!(name_count.get(), 1);

    // An unrelated sibling mutation replays without touching name's
    // subscriber.
    a.set("ns.user.age", 36i64);
    bridge_b.pump();
    assert_eq!(name_count.get(), 1);
}

#[test]
fn frames_apply_in_order_last_write_wins() {
    let (a, b, _) = tab_pair();
    let bridge_b = SyncBridge::new(&b);

    a.set("ns.x", 1i64);
    a.set("ns.x", 2i64);
    a.set("ns.x", 3i64);
    assert_eq!(bridge_b.pump(), 3);
    assert_eq!(b.get("ns.x"), Some(Value::from(3i64)));
}

#[test]
fn delete_and_reset_propagate() {
    let (a, b, _) = tab_pair();
    let bridge_b = SyncBridge::new(&b);

    a.set("ns.x", 1i64);
    bridge_b.pump();
    assert!(b.get("ns").is_some());

    a.delete("ns");
    bridge_b.pump();
    assert_eq!(b.get("ns"), None);

    a.set("ns.x", 1i64);
    bridge_b.pump();
    a.reset("ns");
    bridge_b.pump();
    assert_eq!(b.get("ns"), None);

    // A remote reset clears data only; local subscribers stay registered.
    let (count, listener) = counter();
    let _sub = b.subscribe("ns.x", listener);
    a.set("ns.x", 5i64);
    bridge_b.pump();
    assert_eq!(count.get(), 1);
}

#[test]
fn replay_does_not_echo_back() {
    let (a, b, _) = tab_pair();
    let bridge_a = SyncBridge::new(&a);
    let bridge_b = SyncBridge::new(&b);

    a.set("ns.x", 1i64);
    assert_eq!(bridge_b.pump(), 1);
    // Applying the frame on b must not rebroadcast it to a.
    assert_eq!(bridge_a.pump(), 0);
}

#[test]
fn unrecognized_frames_are_ignored() {
    let (a, b, t_a) = tab_pair();
    let bridge_b = SyncBridge::new(&b);

    t_a.send("not json at all");
    t_a.send(r#"{"type":"merge","key":"ns","value":1}"#);
    t_a.send(r#"{"type":"set","value":1}"#);
    a.set("ns.x", 1i64);

    assert_eq!(bridge_b.pump(), 1, "only the well-formed frame applies");
    assert_eq!(b.get("ns.x"), Some(Value::from(1i64)));
}

#[test]
fn skip_notify_writes_still_broadcast() {
    let (a, b, _) = tab_pair();
    let bridge_b = SyncBridge::new(&b);

    a.set_with(
        "ns.x",
        Some(Value::from(1i64)),
        keypath_store::SetOptions { skip_notify: true },
    );
    assert_eq!(bridge_b.pump(), 1);
    assert_eq!(b.get("ns.x"), Some(Value::from(1i64)));
}

#[test]
fn memory_only_store_never_broadcasts() {
    let (t_a, t_b) = keypath_store::loopback_pair();
    drop(t_a);
    let b = Store::durable_with_transport(MemoryBackend::new(), t_b);
    let bridge_b = SyncBridge::new(&b);

    let local = Store::in_memory();
    local.set("ns.x", 1i64);
    assert_eq!(bridge_b.pump(), 0);
}
