#![forbid(unsafe_code)]

//! Data layer for the KeyPath store: the [`Value`] model, dot-path algebra,
//! copy-on-write nested mutation, and stable key-order maintenance.
//!
//! This crate is pure: no interior mutability, no I/O, no registries. The
//! reactive store built on top lives in `keypath-store`.

pub mod nested;
pub mod ordered;
pub mod path;
pub mod value;

pub use nested::{get_nested, merge_defaults, set_nested};
pub use ordered::{ordered_keys, rename_preserving_order, set_ordered_keys};
pub use path::KeyPath;
pub use value::{OpaqueValue, Value, ValueMap};
