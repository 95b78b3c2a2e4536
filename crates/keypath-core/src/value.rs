//! The value model: JSON-like nested data with `Rc`-shared containers.
//!
//! A [`Value`] is a scalar, an ordered sequence, or a string-keyed mapping.
//! Containers are reference-counted so that copy-on-write mutation (see
//! [`crate::nested`]) shares untouched subtrees between the old and new root
//! instead of deep-copying them.
//!
//! # Invariants
//!
//! 1. Object key order is insertion order and travels with every clone
//!    ([`ValueMap`] is an `IndexMap`).
//! 2. Equality is deep structural equality with an `Rc` pointer fast path,
//!    except [`Value::Opaque`], which compares by reference only.
//! 3. Serialization round-trips all variants except `Opaque`, which
//!    serializes as `null` (opaque values are session-local by contract).
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Opaque in durable data | caller stored a handle in a durable namespace | persisted as `null` |
//! | Non-string JSON key | impossible via this API | — |

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Number;

/// Insertion-ordered string-keyed mapping of nested values.
pub type ValueMap = IndexMap<String, Value>;

/// Marker trait for values that opt out of structural equality.
///
/// An opaque value is compared by reference identity only and never
/// participates in persistence (it serializes as `null`). This replaces
/// heuristic "looks like a class instance" detection with an explicit,
/// documented contract: if a value cannot be meaningfully compared
/// field-by-field, wrap it in [`Value::opaque`].
pub trait OpaqueValue: fmt::Debug + 'static {
    /// Downcast support for callers that know the concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// A nested, JSON-like value rooted at a namespace.
#[derive(Clone)]
pub enum Value {
    /// Explicit null. Distinct from an *absent* value, which the store
    /// surfaces as `Option::None`.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Numeric scalar (arbitrary JSON number).
    Number(Number),
    /// String scalar.
    String(String),
    /// Ordered sequence. `Rc`-shared for structural sharing.
    Array(Rc<Vec<Value>>),
    /// Insertion-ordered mapping. `Rc`-shared for structural sharing.
    Object(Rc<ValueMap>),
    /// Reference-compared, non-serializable payload. See [`OpaqueValue`].
    Opaque(Rc<dyn OpaqueValue>),
}

impl Value {
    /// Build an object from ordered key/value pairs.
    #[must_use]
    pub fn object<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(Rc::new(
            pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Build an array from a sequence of values.
    #[must_use]
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Rc::new(items.into_iter().collect()))
    }

    /// Wrap a session-local payload that compares by reference only.
    #[must_use]
    pub fn opaque(payload: Rc<dyn OpaqueValue>) -> Self {
        Value::Opaque(payload)
    }

    /// The object map, if this value is an object.
    #[must_use]
    pub fn as_object(&self) -> Option<&ValueMap> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// The element vector, if this value is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The string slice, if this value is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this value is a container (object or array).
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    /// Whether two values share the same container allocation.
    ///
    /// Always `false` for scalars; used to observe structural sharing after
    /// copy-on-write updates.
    #[must_use]
    pub fn same_ref(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Opaque(a), Value::Opaque(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b) || a == b,
            // Opaque values never compare structurally.
            (Value::Opaque(a), Value::Opaque(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Opaque(p) => write!(f, "Opaque({p:?})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Scalar conversions
// ---------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Object(Rc::new(map))
    }
}

// ---------------------------------------------------------------------------
// JSON boundary
// ---------------------------------------------------------------------------

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(Rc::new(items.into_iter().map(Value::from).collect()))
            }
            // serde_json is built with `preserve_order`, so document order
            // carries through into the IndexMap.
            serde_json::Value::Object(map) => Value::Object(Rc::new(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            )),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect(),
            ),
            Value::Opaque(_) => serde_json::Value::Null,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null | Value::Opaque(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map.iter() {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}
