//! Cross-process synchronization: wire messages, the transport seam, and
//! the bridge that replays inbound mutations.
//!
//! The durable store posts a frame for every `set`/`delete`/`reset`. A
//! [`SyncBridge`] on the receiving side drains its transport and replays
//! each frame into the local memory mirror, then re-runs the notification
//! engine so local subscribers react exactly as they would to a local
//! mutation. Delivery is at-least-once and unordered beyond the channel's
//! own FIFO behavior; the last applied message wins.
//!
//! The transport is injected, so the core is testable without a real
//! broadcast medium (see [`loopback_pair`]); in a headless environment
//! [`NullTransport`] degrades everything to single-process operation
//! silently.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Malformed frame | truncation, foreign writer | logged at debug, ignored |
//! | Unknown `type` | newer peer | deserialization fails, ignored |
//! | Missing `key` | foreign writer | deserialization fails, ignored |
//! | No transport | headless environment | bridge pumps nothing |

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::store::Store;

/// A mutation broadcast between processes. JSON-serialized on the wire with
/// an internal `type` tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    /// A namespace root was replaced.
    Set {
        key: String,
        value: serde_json::Value,
    },
    /// A namespace was deleted.
    Delete { key: String },
    /// A namespace was reset (cache and durable entry cleared).
    Reset { key: String },
}

/// Fire-and-forget outbound send plus polled inbound receive.
pub trait Transport {
    /// Post a frame to peers. Delivery failure is unobservable at this
    /// layer, so the call cannot fail.
    fn send(&self, frame: &str);

    /// Next pending inbound frame, if any.
    fn try_recv(&self) -> Option<String>;
}

/// Transport for environments with no broadcast medium: sends vanish,
/// nothing is ever received.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send(&self, _frame: &str) {}

    fn try_recv(&self) -> Option<String> {
        None
    }
}

// ---------------------------------------------------------------------------
// Loopback transport
// ---------------------------------------------------------------------------

type FrameQueue = Rc<RefCell<VecDeque<String>>>;

/// In-process transport endpoint; see [`loopback_pair`].
pub struct LoopbackTransport {
    outbound: FrameQueue,
    inbound: FrameQueue,
}

impl Transport for LoopbackTransport {
    fn send(&self, frame: &str) {
        self.outbound.borrow_mut().push_back(frame.to_owned());
    }

    fn try_recv(&self) -> Option<String> {
        self.inbound.borrow_mut().pop_front()
    }
}

/// Two connected endpoints: frames sent on one are received on the other,
/// in FIFO order. Stands in for the browser broadcast channel in tests.
#[must_use]
pub fn loopback_pair() -> (Rc<LoopbackTransport>, Rc<LoopbackTransport>) {
    let a_to_b: FrameQueue = Rc::new(RefCell::new(VecDeque::new()));
    let b_to_a: FrameQueue = Rc::new(RefCell::new(VecDeque::new()));
    let a = LoopbackTransport {
        outbound: Rc::clone(&a_to_b),
        inbound: Rc::clone(&b_to_a),
    };
    let b = LoopbackTransport {
        outbound: b_to_a,
        inbound: a_to_b,
    };
    (Rc::new(a), Rc::new(b))
}

// ---------------------------------------------------------------------------
// SyncBridge
// ---------------------------------------------------------------------------

/// Replays inbound frames from a store's transport into that store.
///
/// Replay writes the cache mirror and notifies; it never re-persists or
/// re-broadcasts (the sender's durable medium is authoritative, and
/// re-broadcasting would echo forever).
pub struct SyncBridge {
    store: Store,
}

impl SyncBridge {
    #[must_use]
    pub fn new(store: &Store) -> Self {
        Self {
            store: store.clone(),
        }
    }

    /// Drain all pending inbound frames, returning how many were applied.
    /// Unrecognized frames are skipped.
    pub fn pump(&self) -> usize {
        let mut applied = 0;
        let transport = self.store.transport();
        while let Some(frame) = transport.try_recv() {
            match serde_json::from_str::<WireMessage>(&frame) {
                Ok(message) => {
                    self.store.apply_remote(message);
                    applied += 1;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "ignoring unrecognized sync frame");
                }
            }
        }
        applied
    }
}
