//! The observable value model.
//!
//! Objects and arrays are shared handles with reference identity, the way
//! script values behave: cloning an [`Object`] clones the handle, not the
//! contents. This is what lets a wrapper and its caller look at the same
//! underlying target.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use proxserve_path::{ContainerKind, PathStep, Walk};
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Number;

use crate::wrapper::Proxy;

/// Largest array index a wrapper accepts, `2^32 - 2`.
pub const MAX_ARRAY_INDEX: usize = u32::MAX as usize - 1;

/// A value stored in, read from, or written into an observed tree.
///
/// Equality is strict (`===`): primitives compare by value, objects, arrays
/// and wrappers by identity. Use [`Value::to_json`] for structural
/// comparison.
#[derive(Clone, Default)]
pub enum Value {
    /// An absent property or an array hole.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Object(Object),
    Array(Array),
    /// A wrapper handle. Never stored inside a raw target.
    Proxy(Proxy),
}

impl Value {
    pub fn object() -> Self {
        Value::Object(Object::new())
    }

    pub fn array() -> Self {
        Value::Array(Array::new())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// `true` for raw objects and arrays, the only wrappable kinds.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, Value::Proxy(_))
    }

    pub fn as_proxy(&self) -> Option<&Proxy> {
        match self {
            Value::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Type name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "Object",
            Value::Array(_) => "Array",
            Value::Proxy(_) => "Proxy",
        }
    }

    pub fn container_kind(&self) -> ContainerKind {
        match self {
            Value::Object(_) => ContainerKind::Object,
            Value::Array(_) => ContainerKind::Array,
            Value::Proxy(proxy) => proxy.container_kind().unwrap_or(ContainerKind::Other("Proxy")),
            other => ContainerKind::Other(other.kind_name()),
        }
    }

    /// Snapshot as JSON. `Undefined` object members are skipped and
    /// `Undefined` array slots become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// The raw member `key` of a raw container, `Undefined` otherwise.
    pub(crate) fn member(&self, key: &str) -> Value {
        match self {
            Value::Object(object) => object.get(key),
            Value::Array(array) => match key.parse::<usize>() {
                Ok(index) => array.get(index),
                Err(_) => Value::Undefined,
            },
            _ => Value::Undefined,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Proxy(a), Value::Proxy(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// Integers compare exactly; a float on either side compares as `f64`.
fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
        return a == b;
    }
    if !a.is_f64() && !b.is_f64() {
        // one negative i64, one u64 above i64::MAX
        return false;
    }
    a.as_f64() == b.as_f64()
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(object) => object.fmt(f),
            Value::Array(array) => array.fmt(f),
            Value::Proxy(proxy) => proxy.fmt(f),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Undefined | Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Object(object) => object.serialize(serializer),
            Value::Array(array) => array.serialize(serializer),
            Value::Proxy(proxy) => match proxy.original_target() {
                Ok(target) => target.serialize(serializer),
                Err(err) => Err(S::Error::custom(err)),
            },
        }
    }
}

// ── Raw object ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct ObjectData {
    pub(crate) entries: IndexMap<String, Value>,
    /// Keys defined as non-enumerable.
    pub(crate) hidden: HashSet<String>,
}

/// A raw object target: insertion-ordered properties behind a shared handle.
///
/// Mutating it directly bypasses every wrapper that observes it.
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<ObjectData>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw value stored at `key`, `Undefined` if absent.
    pub fn get(&self, key: &str) -> Value {
        self.0.borrow().entries.get(key).cloned().unwrap_or_default()
    }

    /// Store `value` at `key`, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Value {
        self.0
            .borrow_mut()
            .entries
            .insert(key.into(), value.into())
            .unwrap_or_default()
    }

    pub fn remove(&self, key: &str) -> Value {
        let mut data = self.0.borrow_mut();
        data.hidden.remove(key);
        data.entries.shift_remove(key).unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().entries.contains_key(key)
    }

    /// Enumerable keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        let data = self.0.borrow();
        data.entries
            .keys()
            .filter(|key| !data.hidden.contains(*key))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn is_hidden(&self, key: &str) -> bool {
        self.0.borrow().hidden.contains(key)
    }

    pub(crate) fn data(&self) -> Ref<'_, ObjectData> {
        self.0.borrow()
    }

    pub(crate) fn data_mut(&self) -> RefMut<'_, ObjectData> {
        self.0.borrow_mut()
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        f.debug_map()
            .entries(data.entries.iter().filter(|(key, _)| !data.hidden.contains(*key)))
            .finish()
    }
}

impl Serialize for Object {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let data = self.0.borrow();
        let visible: Vec<(&String, &Value)> = data
            .entries
            .iter()
            .filter(|(key, value)| !data.hidden.contains(*key) && !value.is_undefined())
            .collect();
        let mut map = serializer.serialize_map(Some(visible.len()))?;
        for (key, value) in visible {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = Object::new();
        for (key, value) in iter {
            object.insert(key, value);
        }
        object
    }
}

// ── Raw array ──────────────────────────────────────────────────────────────

/// A raw array target. `Undefined` slots are holes.
#[derive(Clone, Default)]
pub struct Array(Rc<RefCell<Vec<Value>>>);

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    pub fn get(&self, index: usize) -> Value {
        self.0.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Raw append, no wrapper sees it.
    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(value.into());
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Shallow copy of the items.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn items(&self) -> Ref<'_, Vec<Value>> {
        self.0.borrow()
    }

    pub(crate) fn items_mut(&self) -> RefMut<'_, Vec<Value>> {
        self.0.borrow_mut()
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.borrow().iter()).finish()
    }
}

impl Serialize for Array {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let items = self.0.borrow();
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items.iter() {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

impl<V: Into<Value>> FromIterator<V> for Array {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Array::from_vec(iter.into_iter().map(Into::into).collect())
    }
}

// ── Wrappable target ───────────────────────────────────────────────────────

/// The raw container behind a wrapper.
#[derive(Clone, Debug)]
pub(crate) enum Target {
    Object(Object),
    Array(Array),
}

impl Target {
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(object) => Some(Target::Object(object.clone())),
            Value::Array(array) => Some(Target::Array(array.clone())),
            _ => None,
        }
    }

    pub(crate) fn kind(&self) -> ContainerKind {
        match self {
            Target::Object(_) => ContainerKind::Object,
            Target::Array(_) => ContainerKind::Array,
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            Target::Object(object) => Value::Object(object.clone()),
            Target::Array(array) => Value::Array(array.clone()),
        }
    }

    /// Raw read. Array keys are canonical decimal indices.
    pub(crate) fn get(&self, key: &str) -> Value {
        match self {
            Target::Object(object) => object.get(key),
            Target::Array(array) => key.parse().map_or(Value::Undefined, |i| array.get(i)),
        }
    }

    /// Raw write. Writing past the end of an array leaves holes.
    pub(crate) fn put(&self, key: &str, value: Value) {
        match self {
            Target::Object(object) => {
                object.insert(key, value);
            }
            Target::Array(array) => {
                let Some(len) = key.parse::<usize>().ok().and_then(|i| i.checked_add(1)) else {
                    return;
                };
                let mut items = array.items_mut();
                if len > items.len() {
                    items.resize(len, Value::Undefined);
                }
                items[len - 1] = value;
            }
        }
    }

    /// Raw delete. Array slots become holes; the length is kept.
    pub(crate) fn delete(&self, key: &str) -> bool {
        match self {
            Target::Object(object) => {
                let existed = object.contains_key(key);
                object.remove(key);
                existed
            }
            Target::Array(array) => {
                let Ok(index) = key.parse::<usize>() else { return false };
                let mut items = array.items_mut();
                match items.get_mut(index) {
                    Some(slot) if !slot.is_undefined() => {
                        *slot = Value::Undefined;
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        match self {
            Target::Object(object) => object.contains_key(key),
            Target::Array(_) => !self.get(key).is_undefined(),
        }
    }

    /// Enumerable keys whose values are themselves wrappable, skipping
    /// keys that opt out of wrapping.
    pub(crate) fn wrappable_children(&self) -> Vec<(String, Target)> {
        match self {
            Target::Object(object) => {
                let data = object.data();
                data.entries
                    .iter()
                    .filter(|(key, _)| !data.hidden.contains(*key) && !crate::is_unwrapped_key(key))
                    .filter_map(|(key, value)| Some((key.clone(), Target::from_value(value)?)))
                    .collect()
            }
            Target::Array(array) => array
                .items()
                .iter()
                .enumerate()
                .filter_map(|(index, value)| Some((index.to_string(), Target::from_value(value)?)))
                .collect(),
        }
    }
}

// ── Conversions ────────────────────────────────────────────────────────────

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
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

impl From<usize> for Value {
    fn from(n: usize) -> Self {
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
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Value::Array(array)
    }
}

impl From<Proxy> for Value {
    fn from(proxy: Proxy) -> Self {
        Value::Proxy(proxy)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Array::from_vec(items))
    }
}

impl Walk for Value {
    fn child(&self, step: &PathStep) -> Option<Self> {
        let value = match self {
            Value::Proxy(proxy) => proxy.get(step.clone()).ok()?,
            Value::Object(_) | Value::Array(_) => self.member(&step.as_key()),
            _ => return None,
        };
        (!value.is_undefined()).then_some(value)
    }
}
