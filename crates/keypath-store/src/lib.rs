#![forbid(unsafe_code)]

//! Path-addressed reactive key/value store.
//!
//! Namespaced roots of JSON-like data, addressed by dot-paths, with:
//!
//! - copy-on-write mutation and structural sharing (`keypath-core`);
//! - fine-grained change notification: a mutation at a path notifies its
//!   exact subscribers, its ancestors, and exactly those descendants whose
//!   resolved value changed — O(affected listeners), not O(all listeners);
//! - virtual key-set signals for "the keys at this path" subscriptions;
//! - optional durable persistence (best-effort, JSON, one entry per
//!   namespace) and cross-process synchronization over an injected
//!   transport.
//!
//! ```
//! use keypath_store::Store;
//!
//! let store = Store::in_memory();
//! let sub = store.subscribe("app.user.name", || println!("name changed"));
//! store.set("app.user.name", "ada");
//! assert_eq!(store.get("app.user.name").unwrap().as_str(), Some("ada"));
//! drop(sub);
//! ```

pub mod engine;
pub mod persist;
pub mod registry;
pub mod store;
pub mod sync;

pub use engine::{KEYS_MARKER, NotificationEngine, NotifyOptions, keys_path};
pub use persist::{FileBackend, MemoryBackend, STORAGE_PREFIX, StorageBackend, StorageError, storage_key};
pub use registry::{Listener, ListenerRegistry, Subscription};
pub use store::{SetOptions, Store};
pub use sync::{LoopbackTransport, NullTransport, SyncBridge, Transport, WireMessage, loopback_pair};

pub use keypath_core::{KeyPath, OpaqueValue, Value, ValueMap};
