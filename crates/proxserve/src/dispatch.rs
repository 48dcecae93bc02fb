//! Event routing: bubble, capture and deferred replay.
//!
//! No tree borrow is held while a listener runs, so listeners may read,
//! write, register and remove freely.

use std::rc::Rc;

use proxserve_path::property_to_path_segment;

use crate::events::{ChangeEvent, EventType, EventTypes, MethodArgs, Pool};
use crate::nodes::{DataId, NodeStatus, ProxyId, ProxyStatus};
use crate::trace::TraceRecord;
use crate::value::Value;
use crate::wrapper::{Engine, Proxy};

/// A property-level event buffered while a bulk array operation runs.
pub(crate) struct DeferredEvent {
    pub(crate) node: DataId,
    pub(crate) change: ChangeEvent,
    /// Whether the value replaced a container that has listeners below it.
    pub(crate) capture: bool,
}

/// One property write, as seen by the trap that performed it.
pub(crate) struct PropertyChange<'a> {
    pub(crate) key: &'a str,
    pub(crate) old_value: Value,
    pub(crate) value: Value,
    pub(crate) was_old_wrapped: bool,
    pub(crate) is_new_wrapped: bool,
}

/// Report a property write made through wrapper `proxy` on data node `data`.
pub(crate) fn emit(engine: &Rc<Engine>, proxy: ProxyId, data: DataId, change: PropertyChange<'_>) {
    if change.old_value == change.value {
        return;
    }

    let (start, event, capture, deferred, trace_path) = {
        let mut tree = engine.tree.borrow_mut();
        // writes through a superseded wrapper are not reported
        if tree.data(data).proxy != Some(proxy) {
            return;
        }
        let Some(node) = tree.proxy(proxy).filter(|node| node.status == ProxyStatus::Alive) else {
            return;
        };
        let container = node.target.kind();

        let child = tree.child_data(data, change.key);
        let (start, path) = match child {
            Some(child) => (child, String::new()),
            None => (data, property_to_path_segment(container, change.key)),
        };
        let capture = child.is_some() && (change.was_old_wrapped || change.is_new_wrapped);
        let kind = EventType::classify(&change.old_value, &change.value);
        let event = ChangeEvent::new(path, change.value, change.old_value, kind);
        let trace_path = format!("{}{}", tree.data(start).path, event.path);

        let deferred = tree.status(data) == NodeStatus::Splicing;
        if deferred {
            tree.data_mut(data)
                .deferred
                .get_or_insert_with(Vec::new)
                .push(DeferredEvent {
                    node: start,
                    change: event.clone(),
                    capture,
                });
        }
        (start, event, capture, deferred, trace_path)
    };

    trace(engine, &trace_path, &event, deferred);
    if deferred {
        return;
    }
    bubble_emit(engine, start, event.clone());
    if capture {
        capture_emit(engine, start, &event);
    }
}

/// Deliver `event` at `start` and at every ancestor up to the root,
/// prefixing the path with each node's segment on the way up.
pub(crate) fn bubble_emit(engine: &Rc<Engine>, start: DataId, mut event: ChangeEvent) {
    let mut node = start;
    loop {
        if engine.tree.borrow().status(node) == NodeStatus::Stopped {
            return;
        }
        let this = this_value(engine, node);
        if event.path.is_empty() {
            fire(engine, node, Pool::Shallow, &this, &event);
        }
        fire(engine, node, Pool::Deep, &this, &event);

        let next = {
            let tree = engine.tree.borrow();
            let current = tree.data(node);
            current
                .parent
                .filter(|parent| !tree.data(*parent).is_tree_prototype)
                .map(|parent| (parent, current.property_path.clone()))
        };
        let Some((parent, segment)) = next else {
            return;
        };
        event.path.insert_str(0, &segment);
        node = parent;
    }
}

/// Deliver per-child events below `node` after a container was replaced,
/// comparing the same member of the old and new values.
pub(crate) fn capture_emit(engine: &Rc<Engine>, node: DataId, event: &ChangeEvent) {
    let children: Vec<(String, DataId)> = engine
        .tree
        .borrow()
        .data(node)
        .children
        .iter()
        .map(|(key, id)| (key.clone(), *id))
        .collect();

    for (key, child) in children {
        let value = event.value.member(&key);
        let old_value = event.old_value.member(&key);
        if value == old_value {
            continue;
        }
        let kind = EventType::classify(&old_value, &value);
        let sub_event = ChangeEvent::new(String::new(), value, old_value, kind);

        if engine.tree.borrow().status(child) != NodeStatus::Stopped {
            let this = this_value(engine, child);
            fire(engine, child, Pool::Shallow, &this, &sub_event);
        }
        capture_emit(engine, child, &sub_event);
    }
}

/// Emit the composite event of a bulk array operation on `data`, then
/// replay the property events buffered while it ran.
pub(crate) fn emit_function_event(
    engine: &Rc<Engine>,
    data: DataId,
    kind: EventType,
    args: MethodArgs,
    old_value: Value,
    value: Value,
) {
    let deferred = engine.tree.borrow_mut().data_mut(data).deferred.take();

    let mut event = ChangeEvent::new(String::new(), value, old_value, kind);
    event.args = Some(args);
    let trace_path = engine.tree.borrow().data(data).path.clone();
    trace(engine, &trace_path, &event, false);
    bubble_emit(engine, data, event);

    let Some(deferred) = deferred else {
        tracing::warn!(
            root = %engine.options.name,
            path = %trace_path,
            method = kind.as_str(),
            "no side effect events were made for this method"
        );
        return;
    };
    for item in deferred {
        let stopped = engine.tree.borrow().status(item.node) == NodeStatus::Stopped;
        if item.change.path.is_empty() && !stopped {
            let this = this_value(engine, item.node);
            fire(engine, item.node, Pool::Shallow, &this, &item.change);
            fire(engine, item.node, Pool::Deep, &this, &item.change);
        }
        if item.capture {
            capture_emit(engine, item.node, &item.change);
        }
    }
}

/// Run the matching listeners of one pool, newest first.
///
/// The pool is re-read before every call, so listeners removed or added
/// by an earlier callback are respected.
pub(crate) fn fire(engine: &Rc<Engine>, node: DataId, pool: Pool, this: &Value, event: &ChangeEvent) {
    let wanted = EventTypes::from(event.kind);
    let mut index = engine.tree.borrow().data(node).listeners.pool(pool).len();
    while index > 0 {
        index -= 1;
        let callback = {
            let mut tree = engine.tree.borrow_mut();
            let listeners = tree.data_mut(node).listeners.pool_mut(pool);
            let Some(listener) = listeners.get(index) else {
                continue;
            };
            if !listener.events.contains(wanted) {
                continue;
            }
            let callback = Rc::clone(&listener.callback);
            if listener.once {
                listeners.remove(index);
            }
            callback
        };
        let _busy = engine.enter();
        callback(event, this);
    }
}

/// The value listeners on `node` receive as their second argument: the
/// node's own live wrapper, else the parent wrapper's view of the
/// property.
fn this_value(engine: &Rc<Engine>, node: DataId) -> Value {
    let (parent, key) = {
        let tree = engine.tree.borrow();
        if let Some(proxy) = tree.alive_proxy(node) {
            return Value::Proxy(Proxy::new(Rc::clone(engine), proxy));
        }
        let data = tree.data(node);
        let Some(parent) = data.parent.and_then(|parent| tree.alive_proxy(parent)) else {
            return Value::Undefined;
        };
        (parent, data.key.clone())
    };
    Proxy::new(Rc::clone(engine), parent)
        .get(key)
        .unwrap_or_default()
}

fn trace(engine: &Engine, path: &str, event: &ChangeEvent, deferred: bool) {
    let level = engine.options.debug.trace;
    if level == crate::options::TraceLevel::None {
        return;
    }
    engine.sink.record(&TraceRecord {
        name: &engine.options.name,
        path,
        event,
        level,
        deferred,
    });
}
