//! Stable key-order maintenance for object values.
//!
//! Object values already carry insertion order (their map is an `IndexMap`),
//! so the order record travels with every copy-on-write clone for free. This
//! module holds the operations that *adjust* an order: explicit overrides
//! and in-position renames.
//!
//! # Invariants
//!
//! 1. [`ordered_keys`] is a permutation of the map's key set, and repeated
//!    calls without mutation return an identical sequence.
//! 2. [`set_ordered_keys`] ignores listed keys that are absent and appends
//!    present keys missing from the list, in their existing relative order.
//! 3. [`rename_preserving_order`] substitutes the new key at the old key's
//!    position; duplicate occurrences collapse to the first.

use crate::value::ValueMap;

/// The keys of `map` in their stable insertion order.
#[must_use]
pub fn ordered_keys(map: &ValueMap) -> Vec<String> {
    map.keys().cloned().collect()
}

/// Rebuild `map` so its keys follow `keys`.
///
/// Listed keys that are not present are dropped from the order; present keys
/// not listed are appended after the listed ones. Duplicates in `keys` keep
/// their first occurrence.
#[must_use]
pub fn set_ordered_keys<S: AsRef<str>>(map: &ValueMap, keys: &[S]) -> ValueMap {
    let mut out = ValueMap::with_capacity(map.len());
    for key in keys {
        let key = key.as_ref();
        if let Some(v) = map.get(key) {
            out.entry(key.to_owned()).or_insert_with(|| v.clone());
        }
    }
    for (k, v) in map {
        out.entry(k.clone()).or_insert_with(|| v.clone());
    }
    out
}

/// Rebuild `map` with `old_key` renamed to `new_key` at the same position.
///
/// Returns `None` when the rename is a no-op: identical keys or `old_key`
/// absent. If `new_key` already exists elsewhere, the result keeps a single
/// entry at the first of the two positions, carrying `old_key`'s value.
#[must_use]
pub fn rename_preserving_order(map: &ValueMap, old_key: &str, new_key: &str) -> Option<ValueMap> {
    if old_key == new_key || !map.contains_key(old_key) {
        return None;
    }
    let mut out = ValueMap::with_capacity(map.len());
    for (k, v) in map {
        if k == old_key {
            // `insert` keeps the earlier position if new_key is already
            // present, while taking the renamed value.
            out.insert(new_key.to_owned(), v.clone());
        } else {
            out.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
    Some(out)
}
