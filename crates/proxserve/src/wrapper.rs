//! Wrapper handles and their property traps.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use proxserve_path::{is_pathable, resolve, ContainerKind, PathStep};

use crate::dispatch::{self, PropertyChange};
use crate::error::ProxserveError;
use crate::nodes::{DataId, NodeStatus, ProxyId, ProxyStatus, Tree, TREE_PROTOTYPE};
use crate::options::Options;
use crate::trace::TraceSink;
use crate::unwrap::deep_unwrap;
use crate::value::{Target, Value, MAX_ARRAY_INDEX};

/// State shared by every wrapper of one observed tree.
pub(crate) struct Engine {
    pub(crate) tree: RefCell<Tree>,
    pub(crate) options: Options,
    pub(crate) sink: Rc<dyn TraceSink>,
    busy: Cell<usize>,
}

impl Engine {
    fn new(options: Options, sink: Rc<dyn TraceSink>) -> Self {
        Self {
            tree: RefCell::new(Tree::new()),
            options,
            sink,
            busy: Cell::new(0),
        }
    }

    /// Mark the engine busy (running listeners or a bulk operation) until
    /// the guard drops.
    pub(crate) fn enter(&self) -> BusyGuard<'_> {
        self.busy.set(self.busy.get() + 1);
        BusyGuard(self)
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy.get() > 0
    }
}

pub(crate) struct BusyGuard<'a>(&'a Engine);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.busy.set(self.0.busy.get().saturating_sub(1));
    }
}

/// Descriptor for [`Proxy::define_property`].
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub value: Value,
    pub enumerable: bool,
}

impl PropertyDescriptor {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            enumerable: true,
        }
    }

    pub fn enumerable(mut self, enumerable: bool) -> Self {
        self.enumerable = enumerable;
        self
    }
}

/// A wrapper over one object or array of an observed tree.
///
/// Reads return raw primitives or wrappers of nested containers; writes
/// are stored as raw values and reported to listeners. Cloning the handle
/// does not create a new wrapper.
#[derive(Clone)]
pub struct Proxy {
    pub(crate) engine: Rc<Engine>,
    pub(crate) id: ProxyId,
}

/// Wrap `target` as the root of a new tree.
pub(crate) fn make_root(
    target: Value,
    options: Options,
    sink: Rc<dyn TraceSink>,
) -> Result<Proxy, ProxserveError> {
    let target = deep_unwrap(target)?;
    let Some(target) = Target::from_value(&target) else {
        return Err(ProxserveError::UnsupportedType(target.kind_name()));
    };
    let engine = Rc::new(Engine::new(options, sink));
    let id = {
        let mut tree = engine.tree.borrow_mut();
        let prototype = tree.proxy_prototype;
        wrap(&mut tree, TREE_PROTOTYPE, prototype, "", target)
    };
    Ok(Proxy { engine, id })
}

/// Attach `target` at `key` and eagerly wrap everything wrappable below it.
pub(crate) fn wrap(
    tree: &mut Tree,
    parent_data: DataId,
    parent_proxy: ProxyId,
    key: &str,
    target: Target,
) -> ProxyId {
    let children = target.wrappable_children();
    let (data, proxy) = tree.attach_wrapped(parent_data, key, parent_proxy, target);
    for (child_key, child) in children {
        wrap(tree, data, proxy, &child_key, child);
    }
    proxy
}

/// Whether writes to `key` are observed. Non-enumerable, opted-out and
/// unpathable object keys are passed straight through.
fn is_tracked(target: &Target, key: &str) -> bool {
    match target {
        Target::Object(object) => {
            !object.is_hidden(key) && !crate::is_unwrapped_key(key) && is_pathable(key)
        }
        Target::Array(_) => true,
    }
}

/// Canonical property name for `step`. Arrays only take indices up to
/// [`MAX_ARRAY_INDEX`].
fn slot_key(target: &Target, step: PathStep) -> Result<String, ProxserveError> {
    match target {
        Target::Object(_) => Ok(step.as_key().into_owned()),
        Target::Array(_) => step
            .as_index()
            .filter(|index| *index <= MAX_ARRAY_INDEX)
            .map(|index| index.to_string())
            .ok_or_else(|| ProxserveError::InvalidIndex(step.to_string())),
    }
}

impl Proxy {
    pub(crate) fn new(engine: Rc<Engine>, id: ProxyId) -> Self {
        Self { engine, id }
    }

    pub(crate) fn target_and_data(&self) -> Result<(Target, DataId), ProxserveError> {
        let tree = self.engine.tree.borrow();
        let node = tree.proxy(self.id).ok_or(ProxserveError::Revoked)?;
        Ok((node.target.clone(), node.data))
    }

    pub(crate) fn data_id(&self) -> Result<DataId, ProxserveError> {
        Ok(self.target_and_data()?.1)
    }

    /// Log and report `true` when the node rejects writes.
    pub(crate) fn is_blocked(&self, data: DataId, key: &str) -> bool {
        let tree = self.engine.tree.borrow();
        if tree.status(data) != NodeStatus::Blocked {
            return false;
        }
        tracing::error!(
            root = %self.engine.options.name,
            path = %tree.data(data).path,
            %key,
            "object is blocked, cannot change the value of the property"
        );
        true
    }

    /// Read a property.
    ///
    /// Nested containers come back as their wrappers, a destroyed one as its
    /// revoked handle. Non-enumerable and opted-out keys return the raw
    /// value. Non-index keys on arrays read as `Undefined`.
    pub fn get(&self, key: impl Into<PathStep>) -> Result<Value, ProxserveError> {
        let step = key.into();
        let tree = self.engine.tree.borrow();
        let node = tree.proxy(self.id).ok_or(ProxserveError::Revoked)?;
        let key = match &node.target {
            Target::Object(object) => {
                let key = step.as_key();
                if !is_tracked(&node.target, &key) {
                    return Ok(object.get(&key));
                }
                key.into_owned()
            }
            Target::Array(_) => match step.as_index() {
                Some(index) => index.to_string(),
                None => return Ok(Value::Undefined),
            },
        };
        if let Some(child) = node.children.get(&key) {
            // deleted children only remain below a deleted wrapper, which reads raw
            if tree.proxy_status(*child) != ProxyStatus::Deleted {
                return Ok(Value::Proxy(Proxy::new(Rc::clone(&self.engine), *child)));
            }
        }
        Ok(node.target.get(&key))
    }

    /// Write a property and emit `create` or `update`.
    ///
    /// Wrappers inside `value` are unwrapped before storing. A blocked node
    /// logs an error and leaves the value unchanged.
    ///
    /// # Errors
    ///
    /// [`ProxserveError::InvalidIndex`] for a non-index key on an array,
    /// [`ProxserveError::Revoked`] when this wrapper or a wrapper inside
    /// `value` was destroyed.
    pub fn set(&self, key: impl Into<PathStep>, value: impl Into<Value>) -> Result<(), ProxserveError> {
        self.engine.run_due_destroys();
        let (target, data) = self.target_and_data()?;
        let key = slot_key(&target, key.into())?;
        if self.is_blocked(data, &key) {
            return Ok(());
        }
        let value = deep_unwrap(value.into())?;
        if !is_tracked(&target, &key) {
            target.put(&key, value);
            return Ok(());
        }
        self.assign(&target, data, &key, value);
        Ok(())
    }

    /// Remove a property and emit `delete`. Array elements become holes.
    ///
    /// Returns whether a property was removed.
    pub fn delete(&self, key: impl Into<PathStep>) -> Result<bool, ProxserveError> {
        self.engine.run_due_destroys();
        let (target, data) = self.target_and_data()?;
        let Ok(key) = slot_key(&target, key.into()) else {
            return Ok(false);
        };
        if !is_tracked(&target, &key) {
            return Ok(target.delete(&key));
        }
        if self.is_blocked(data, &key) || !target.contains(&key) {
            return Ok(false);
        }

        let old_value = target.get(&key);
        let was_old_wrapped = self.engine.detach_child(self.id, &key);
        target.delete(&key);
        dispatch::emit(
            &self.engine,
            self.id,
            data,
            PropertyChange {
                key: &key,
                old_value,
                value: Value::Undefined,
                was_old_wrapped,
                is_new_wrapped: false,
            },
        );
        Ok(true)
    }

    /// Define a property. Enumerable definitions behave like [`set`];
    /// non-enumerable ones are stored raw and never observed.
    ///
    /// [`set`]: Proxy::set
    pub fn define_property(
        &self,
        key: impl Into<PathStep>,
        descriptor: PropertyDescriptor,
    ) -> Result<(), ProxserveError> {
        self.engine.run_due_destroys();
        let (target, data) = self.target_and_data()?;
        let key = slot_key(&target, key.into())?;
        if self.is_blocked(data, &key) {
            return Ok(());
        }
        let value = deep_unwrap(descriptor.value)?;

        if !descriptor.enumerable {
            self.engine.detach_child(self.id, &key);
            target.put(&key, value);
            if let Target::Object(object) = &target {
                object.data_mut().hidden.insert(key);
            }
            return Ok(());
        }

        if let Target::Object(object) = &target {
            object.data_mut().hidden.remove(&key);
        }
        if !is_tracked(&target, &key) {
            target.put(&key, value);
            return Ok(());
        }
        self.assign(&target, data, &key, value);
        Ok(())
    }

    fn assign(&self, target: &Target, data: DataId, key: &str, value: Value) {
        let old_value = target.get(key);
        let was_old_wrapped = self.engine.detach_child(self.id, key);
        target.put(key, value.clone());

        let mut is_new_wrapped = false;
        if let Some(child) = Target::from_value(&value) {
            let mut tree = self.engine.tree.borrow_mut();
            // a detached wrapper keeps its raw writes but grows no new nodes
            if tree.proxy_status(self.id) == ProxyStatus::Alive {
                wrap(&mut tree, data, self.id, key, child);
                is_new_wrapped = true;
            }
        }

        dispatch::emit(
            &self.engine,
            self.id,
            data,
            PropertyChange {
                key,
                old_value,
                value,
                was_old_wrapped,
                is_new_wrapped,
            },
        );
    }

    // ── Inspection ────────────────────────────────────────────────────────

    /// Enumerable keys. Arrays list the indices of non-hole elements.
    pub fn keys(&self) -> Result<Vec<PathStep>, ProxserveError> {
        let (target, _) = self.target_and_data()?;
        Ok(match target {
            Target::Object(object) => object.keys().into_iter().map(PathStep::Key).collect(),
            Target::Array(array) => array
                .items()
                .iter()
                .enumerate()
                .filter(|(_, value)| !value.is_undefined())
                .map(|(index, _)| PathStep::Index(index))
                .collect(),
        })
    }

    /// Object key count or array length (holes included).
    pub fn len(&self) -> Result<usize, ProxserveError> {
        let (target, _) = self.target_and_data()?;
        Ok(match target {
            Target::Object(object) => object.len(),
            Target::Array(array) => array.len(),
        })
    }

    pub fn is_empty(&self) -> Result<bool, ProxserveError> {
        Ok(self.len()? == 0)
    }

    pub fn is_array(&self) -> bool {
        self.container_kind() == Some(ContainerKind::Array)
    }

    pub fn contains_key(&self, key: impl Into<PathStep>) -> Result<bool, ProxserveError> {
        let (target, _) = self.target_and_data()?;
        Ok(match slot_key(&target, key.into()) {
            Ok(key) => target.contains(&key),
            Err(_) => false,
        })
    }

    /// `None` once revoked.
    pub fn container_kind(&self) -> Option<ContainerKind> {
        let tree = self.engine.tree.borrow();
        tree.proxy(self.id).map(|node| node.target.kind())
    }

    pub fn status(&self) -> ProxyStatus {
        self.engine.tree.borrow().proxy_status(self.id)
    }

    /// Effective (inherited) status of this wrapper's data node.
    pub fn node_status(&self) -> Result<NodeStatus, ProxserveError> {
        let data = self.data_id()?;
        Ok(self.engine.tree.borrow().status(data))
    }

    /// Path of this wrapper from the root, e.g. `.a.list[2]`.
    pub fn path(&self) -> Result<String, ProxserveError> {
        let data = self.data_id()?;
        Ok(self.engine.tree.borrow().data(data).path.clone())
    }

    /// Read through a relative path, e.g. `.a.list[2]`. A missing leaf is
    /// `Undefined`.
    ///
    /// # Errors
    ///
    /// [`ProxserveError::InvalidPath`] when an intermediate segment is
    /// missing.
    pub fn get_path(&self, path: &str) -> Result<Value, ProxserveError> {
        if self.status() == ProxyStatus::Revoked {
            return Err(ProxserveError::Revoked);
        }
        let resolved = resolve(&Value::Proxy(self.clone()), path)?;
        Ok(resolved.value.unwrap_or_default())
    }

    /// JSON snapshot of the underlying target.
    pub fn snapshot(&self) -> Result<serde_json::Value, ProxserveError> {
        Ok(self.original_target()?.to_json())
    }

    /// Identity of the wrapper, not of its contents.
    pub fn ptr_eq(&self, other: &Proxy) -> bool {
        Rc::ptr_eq(&self.engine, &other.engine) && self.id == other.id
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Proxy");
        if let Ok(tree) = self.engine.tree.try_borrow() {
            match tree.proxy(self.id) {
                Some(node) => {
                    out.field("path", &tree.data(node.data).path);
                    out.field("status", &node.status);
                }
                None => {
                    out.field("status", &ProxyStatus::Revoked);
                }
            }
        }
        out.finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{make, Options};
    use serde_json::json;

    fn observed(doc: serde_json::Value) -> Proxy {
        make(doc, Options::default()).unwrap()
    }

    #[test]
    fn test_reads_wrap_nested_containers() {
        let root = observed(json!({"a": {"b": 1}, "n": 2}));
        let a = root.get("a").unwrap();
        assert!(a.is_proxy());
        assert_eq!(root.get("n").unwrap(), Value::from(2));
        assert_eq!(a.as_proxy().unwrap().get("b").unwrap(), Value::from(1));
        assert_eq!(root.get("missing").unwrap(), Value::Undefined);
    }

    #[test]
    fn test_same_wrapper_until_replaced() {
        let root = observed(json!({"a": {}}));
        let first = root.get("a").unwrap();
        assert_eq!(first, root.get("a").unwrap());
        root.set("a", json!({})).unwrap();
        assert_ne!(first, root.get("a").unwrap());
    }

    #[test]
    fn test_set_stores_raw_values() {
        let root = observed(json!({"a": {"x": 1}}));
        let a = root.get("a").unwrap();
        root.set("copy", a).unwrap();
        let raw = root.original_target().unwrap();
        let raw = raw.as_object().unwrap();
        assert!(raw.get("copy").is_container());
        assert!(raw.get("copy") == raw.get("a"));
    }

    #[test]
    fn test_array_rejects_named_keys() {
        let root = observed(json!([1, 2]));
        assert_eq!(
            root.set("name", 1),
            Err(ProxserveError::InvalidIndex("name".to_string()))
        );
        assert_eq!(root.get("name").unwrap(), Value::Undefined);
        assert_eq!(root.get(1).unwrap(), Value::from(2));
    }

    #[test]
    fn test_array_index_bound() {
        let root = observed(json!([]));
        assert_eq!(
            root.set(usize::MAX, 1),
            Err(ProxserveError::InvalidIndex(usize::MAX.to_string()))
        );
        assert_eq!(
            root.set(MAX_ARRAY_INDEX + 1, 1),
            Err(ProxserveError::InvalidIndex((MAX_ARRAY_INDEX + 1).to_string()))
        );
        assert_eq!(root.get(usize::MAX).unwrap(), Value::Undefined);
        assert_eq!(root.delete(usize::MAX), Ok(false));
        assert_eq!(root.contains_key(usize::MAX), Ok(false));
        assert_eq!(root.len().unwrap(), 0);
    }

    #[test]
    fn test_array_write_past_end_leaves_holes() {
        let root = observed(json!([1]));
        root.set(3, 4).unwrap();
        assert_eq!(root.len().unwrap(), 4);
        assert_eq!(root.snapshot().unwrap(), json!([1, null, null, 4]));
        assert_eq!(root.keys().unwrap(), vec![PathStep::Index(0), PathStep::Index(3)]);
    }

    #[test]
    fn test_delete_array_element_keeps_length() {
        let root = observed(json!([1, 2, 3]));
        assert!(root.delete(1).unwrap());
        assert!(!root.delete(1).unwrap());
        assert_eq!(root.len().unwrap(), 3);
        assert_eq!(root.get(1).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_hidden_property_reads_raw() {
        let root = observed(json!({}));
        root.define_property("secret", PropertyDescriptor::new(json!({"k": 1})).enumerable(false))
            .unwrap();
        assert!(root.get("secret").unwrap().is_container());
        assert_eq!(root.keys().unwrap(), Vec::<PathStep>::new());
        assert_eq!(root.snapshot().unwrap(), json!({}));
    }

    #[test]
    fn test_opted_out_keys_are_not_wrapped() {
        let root = observed(json!({"#cache": {"k": 1}}));
        assert!(root.get("#cache").unwrap().is_container());
        root.set("#other", json!([])).unwrap();
        assert!(root.get("#other").unwrap().is_container());
    }

    #[test]
    fn test_get_path() {
        let root = observed(json!({"a": {"list": [10, {"b": true}]}}));
        assert_eq!(root.get_path(".a.list[0]").unwrap(), Value::from(10));
        assert_eq!(root.get_path(".a.list[1].b").unwrap(), Value::from(true));
        assert_eq!(root.get_path(".a.nope").unwrap(), Value::Undefined);
        assert!(matches!(root.get_path(".x.y"), Err(ProxserveError::InvalidPath(_))));
        let list = root.get_path(".a.list").unwrap();
        assert_eq!(list.as_proxy().unwrap().path().unwrap(), ".a.list");
    }

    #[test]
    fn test_debug_names_path() {
        let root = observed(json!({"a": {}}));
        let a = root.get("a").unwrap();
        let text = format!("{a:?}");
        assert!(text.contains(".a"));
    }
}
