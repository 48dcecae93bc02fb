//! Observe nested objects and arrays.
//!
//! [`make`] wraps a value tree. Reads and writes go through the returned
//! [`Proxy`] and every write is reported to listeners as a [`ChangeEvent`]:
//! first up the tree (bubble) to each ancestor, then down the tree
//! (capture) to listeners on properties of a replaced subtree. Array
//! `splice`, `shift` and `unshift` are reported as one composite event
//! followed by their per-element events.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use proxserve::{make, ChangeEvent, ListenOptions, Options, Value};
//! use serde_json::json;
//!
//! let root = make(json!({"user": {"name": "ann"}}), Options::default()).unwrap();
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//! root.on(
//!     ListenOptions::new("change", move |event: &ChangeEvent, _: &Value| {
//!         sink.borrow_mut().push((event.path.clone(), event.kind.as_str()));
//!     })
//!     .deep(true),
//! )
//! .unwrap();
//!
//! let user = root.get("user").unwrap();
//! user.as_proxy().unwrap().set("name", "bob").unwrap();
//!
//! assert_eq!(*seen.borrow(), vec![(".user.name".to_string(), "update")]);
//! assert_eq!(root.snapshot().unwrap(), json!({"user": {"name": "bob"}}));
//! ```

use std::rc::Rc;

pub mod array;
pub mod control;
mod dispatch;
pub mod error;
pub mod events;
pub mod lifecycle;
mod nodes;
pub mod options;
pub mod trace;
mod unwrap;
pub mod value;
pub mod wrapper;

pub use array::ArrayMethod;
pub use control::{ControlOp, DataNodeInfo, Member, ProxserveNodes, ProxyNodeInfo};
pub use error::ProxserveError;
pub use events::{
    ChangeEvent, EventNames, EventType, EventTypes, ListenOptions, Listener, ListenerHandle,
    ListenerKey, MethodArgs,
};
pub use lifecycle::destroy;
pub use nodes::{NodeStatus, ProxyStatus};
pub use options::{DebugOptions, Options, TraceLevel, DEFAULT_DESTROY_DELAY_MS};
pub use proxserve_path::{format_path, ContainerKind, PathStep, Resolved};
pub use trace::{LogSink, TraceRecord, TraceSink};
pub use value::{Array, Object, Value, MAX_ARRAY_INDEX};
pub use wrapper::{PropertyDescriptor, Proxy};

/// Keys starting with this prefix are stored raw: never wrapped, never
/// observed.
pub const NO_WRAP_PREFIX: &str = "#";

/// Returns `true` when `key` opts out of wrapping.
pub fn is_unwrapped_key(key: &str) -> bool {
    key.starts_with(NO_WRAP_PREFIX)
}

/// Wrap `target` for observation, tracing to [`LogSink`].
///
/// Wrappers inside `target` are replaced by their raw targets first, so
/// wrapping a wrapper yields an independent tree over the same data.
///
/// # Errors
///
/// [`ProxserveError::UnsupportedType`] unless `target` is an object or an
/// array.
pub fn make(target: impl Into<Value>, options: Options) -> Result<Proxy, ProxserveError> {
    make_with_sink(target, options, Rc::new(LogSink))
}

/// [`make`] with a custom trace sink.
pub fn make_with_sink(
    target: impl Into<Value>,
    options: Options,
    sink: Rc<dyn TraceSink>,
) -> Result<Proxy, ProxserveError> {
    wrapper::make_root(target.into(), options, sink)
}

/// Split a path such as `.a.b[2]` into its steps.
pub fn split_path(path: &str) -> Vec<PathStep> {
    proxserve_path::split_path(path)
}

/// Resolve `path` against `root`, which may be a wrapper or a raw value.
///
/// # Errors
///
/// [`ProxserveError::InvalidPath`] when an intermediate segment is missing.
pub fn eval_path(root: &Value, path: &str) -> Result<Resolved<Value>, ProxserveError> {
    Ok(proxserve_path::resolve(root, path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_make_rejects_primitives() {
        assert_eq!(
            make(5, Options::default()).unwrap_err(),
            ProxserveError::UnsupportedType("number")
        );
        assert_eq!(
            make(Value::Undefined, Options::default()).unwrap_err(),
            ProxserveError::UnsupportedType("undefined")
        );
    }

    #[test]
    fn test_make_over_a_wrapper_builds_an_independent_tree() {
        let first = make(json!({"a": 1}), Options::default()).unwrap();
        let second = make(first.clone(), Options::default()).unwrap();
        assert!(!first.ptr_eq(&second));
        assert_eq!(first.original_target().unwrap(), second.original_target().unwrap());
    }

    #[test]
    fn test_eval_path_on_raw_and_wrapped() {
        let raw = Value::from(json!({"a": {"list": [1, 2]}}));
        let found = eval_path(&raw, ".a.list[1]").unwrap();
        assert_eq!(found.key, PathStep::Index(1));
        assert_eq!(found.value, Some(Value::from(2)));

        let root = make(raw.clone(), Options::default()).unwrap();
        let found = eval_path(&Value::Proxy(root), ".a.list").unwrap();
        assert!(found.container.is_proxy());
        assert!(found.value.unwrap().is_proxy());

        assert!(matches!(
            eval_path(&raw, ".x.y"),
            Err(ProxserveError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_unwrapped_key_prefix() {
        assert!(is_unwrapped_key("#raw"));
        assert!(!is_unwrapped_key("raw#"));
        assert_eq!(split_path(".a[0]"), vec![PathStep::from("a"), PathStep::Index(0)]);
    }
}
