//! Copy-on-write nested reads and writes.
//!
//! [`set_nested`] produces a new root in which every container on the path
//! from the root to the mutated node is shallow-copied and every sibling
//! subtree is shared by reference with the old root. [`get_nested`] walks a
//! path without allocating.
//!
//! # Invariants
//!
//! 1. Round trip: `get_nested(set_nested(r, p, Some(v)), p) == Some(v)`.
//! 2. Structural sharing: subtrees not on the mutated path keep `Rc`
//!    identity with the original root.
//! 3. Deleting (`value == None`) under a missing or scalar node is a no-op.
//! 4. Missing or wrong-typed intermediates are fabricated: an array when the
//!    segment is a strict index, an object otherwise. The empty segment is
//!    an object key.
//! 5. Assigning past the end of an array pads with `Null`; deleting an
//!    element splices it out.

use std::rc::Rc;

use crate::path::parse_index;
use crate::value::{Value, ValueMap};

/// Resolve `segments` against `root`, returning `None` the moment a segment
/// indexes into a scalar, a missing key, or an out-of-range/non-index array
/// position.
#[must_use]
pub fn get_nested<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut cur = root;
    for seg in segments {
        cur = match cur {
            Value::Object(map) => map.get(*seg)?,
            Value::Array(items) => items.get(parse_index(seg)?)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Immutable deep-set: returns the new root after writing `value` at
/// `segments`, or deleting the leaf when `value` is `None`.
///
/// `current == None` means the slot is currently absent. The return value is
/// `None` only when nothing exists at the slot afterwards (deleting under an
/// absent root).
///
/// Callers that must not write through a scalar **root** (spec'd as a no-op)
/// check that before calling; inside the tree, scalars on the path are
/// replaced by fabricated containers.
#[must_use]
pub fn set_nested(current: Option<&Value>, segments: &[&str], value: Option<Value>) -> Option<Value> {
    let Some((seg, rest)) = segments.split_first() else {
        return value;
    };
    match current {
        Some(Value::Object(map)) => {
            let mut next: ValueMap = (**map).clone();
            if rest.is_empty() {
                match value {
                    Some(v) => {
                        next.insert((*seg).to_owned(), v);
                    }
                    None => {
                        // shift_remove keeps the order of the surviving keys.
                        next.shift_remove(*seg);
                    }
                }
            } else {
                let child = next.get(*seg).cloned();
                if let Some(new_child) = set_nested(child.as_ref(), rest, value) {
                    next.insert((*seg).to_owned(), new_child);
                }
            }
            Some(Value::Object(Rc::new(next)))
        }
        Some(Value::Array(items)) => match parse_index(seg) {
            Some(i) => {
                let mut next: Vec<Value> = (**items).clone();
                if rest.is_empty() {
                    match value {
                        Some(v) => {
                            if i >= next.len() {
                                next.resize(i + 1, Value::Null);
                            }
                            next[i] = v;
                        }
                        None => {
                            if i < next.len() {
                                next.remove(i);
                            }
                        }
                    }
                } else {
                    let child = next.get(i).cloned();
                    if let Some(new_child) = set_nested(child.as_ref(), rest, value) {
                        if i >= next.len() {
                            next.resize(i + 1, Value::Null);
                        }
                        next[i] = new_child;
                    }
                }
                Some(Value::Array(Rc::new(next)))
            }
            // A non-index segment addressing an array: wrong-typed
            // intermediate, rebuilt as an object.
            None => set_nested(None, segments, value).or_else(|| current.cloned()),
        },
        // Absent slot or scalar intermediate.
        other => match rest.is_empty() {
            true => match value {
                Some(v) => Some(fabricate(seg, v)),
                None => other.cloned(),
            },
            false => match set_nested(None, rest, value) {
                Some(child) => Some(fabricate(seg, child)),
                None => other.cloned(),
            },
        },
    }
}

/// Build the smallest container that holds `value` at `seg`.
fn fabricate(seg: &str, value: Value) -> Value {
    match parse_index(seg) {
        Some(i) => {
            let mut items = vec![Value::Null; i];
            items.push(value);
            Value::Array(Rc::new(items))
        }
        None => {
            let mut map = ValueMap::new();
            map.insert(seg.to_owned(), value);
            Value::Object(Rc::new(map))
        }
    }
}

/// Merge a persisted root over a defaults root.
///
/// Objects merge recursively with the persisted side winning; default key
/// order comes first and novel persisted keys are appended. Any non-object
/// pair resolves to the persisted value.
#[must_use]
pub fn merge_defaults(defaults: &Value, persisted: &Value) -> Value {
    match (defaults, persisted) {
        (Value::Object(d), Value::Object(p)) => {
            let mut out = ValueMap::new();
            for (k, dv) in d.iter() {
                match p.get(k) {
                    Some(pv) => out.insert(k.clone(), merge_defaults(dv, pv)),
                    None => out.insert(k.clone(), dv.clone()),
                };
            }
            for (k, pv) in p.iter() {
                if !out.contains_key(k) {
                    out.insert(k.clone(), pv.clone());
                }
            }
            Value::Object(Rc::new(out))
        }
        _ => persisted.clone(),
    }
}
