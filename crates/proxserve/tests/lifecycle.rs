use std::cell::RefCell;
use std::rc::Rc;

use proxserve::{
    destroy, make, make_with_sink, ChangeEvent, ListenOptions, Options, ProxserveError,
    ProxyStatus, TraceLevel, TraceRecord, TraceSink, Value,
};
use serde_json::json;

#[test]
fn test_overwritten_wrapper_is_revoked_after_delay() {
    let root = make(json!({"sub": {"v": 1}}), Options::default().destroy_delay(0)).unwrap();
    let old = root.get("sub").unwrap().as_proxy().cloned().unwrap();

    root.set("sub", json!({"v": 2})).unwrap();
    assert_ne!(old.status(), ProxyStatus::Alive);
    // still readable until the delay elapses, and never the new value
    assert_eq!(old.get("v").unwrap(), Value::from(1));

    root.run_pending_destroys();
    assert_eq!(old.status(), ProxyStatus::Revoked);
    assert_eq!(old.original_target(), Err(ProxserveError::Revoked));
    assert_eq!(old.set("v", 3), Err(ProxserveError::Revoked));
    assert_eq!(root.get_path(".sub.v").unwrap(), Value::from(2));
}

#[test]
fn test_stale_wrapper_writes_emit_nothing() {
    let root = make(json!({"sub": {"v": 1}}), Options::default()).unwrap();
    let old = root.get("sub").unwrap().as_proxy().cloned().unwrap();
    let calls = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&calls);
    root.on(
        ListenOptions::new("change", move |_: &ChangeEvent, _: &Value| {
            *counter.borrow_mut() += 1;
        })
        .deep(true),
    )
    .unwrap();

    root.set("sub", json!({"v": 2})).unwrap();
    assert_eq!(*calls.borrow(), 1);
    old.set("v", 5).unwrap();
    assert_eq!(*calls.borrow(), 1);
    assert_eq!(root.snapshot().unwrap(), json!({"sub": {"v": 2}}));
}

#[test]
fn test_explicit_destroy_of_root() {
    let root = make(json!({"a": [{"b": 1}]}), Options::default()).unwrap();
    let item = root.get_path(".a[0]").unwrap();
    destroy(&Value::Proxy(root.clone()));

    assert_eq!(root.status(), ProxyStatus::Revoked);
    assert_eq!(item.as_proxy().unwrap().status(), ProxyStatus::Revoked);
    assert_eq!(root.get("a"), Err(ProxserveError::Revoked));
    assert_eq!(root.keys(), Err(ProxserveError::Revoked));
    // a second destroy is a no-op
    root.destroy();
}

#[test]
fn test_stale_wrapper_cannot_be_stored() {
    let root = make(json!({"a": {}}), Options::default()).unwrap();
    let a = root.get("a").unwrap();
    destroy(&a);
    assert_eq!(root.set("copy", a), Err(ProxserveError::Revoked));
    assert_eq!(root.contains_key("copy"), Ok(false));
}

fn change_log(root: &proxserve::Proxy) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    root.on(
        ListenOptions::new("change", move |event: &ChangeEvent, _: &Value| {
            sink.borrow_mut()
                .push(format!("{} {} {:?}", event.path, event.kind, event.value));
        })
        .deep(true),
    )
    .unwrap();
    log
}

#[test]
fn test_stale_grandchild_writes_are_not_reported() {
    let root = make(json!({"a": {"b": {"c": 1}}}), Options::default()).unwrap();
    let b = root.get_path(".a.b").unwrap().as_proxy().cloned().unwrap();
    let log = change_log(&root);

    root.set("a", json!({"b": {"c": 1}})).unwrap();
    log.borrow_mut().clear();
    assert_eq!(b.status(), ProxyStatus::Deleted);

    b.set("c", 99).unwrap();
    assert!(log.borrow().is_empty());
    assert_eq!(root.get_path(".a.b.c").unwrap(), Value::from(1));
}

#[test]
fn test_grandchild_of_replaced_primitive_goes_stale() {
    let root = make(json!({"a": {"b": {"c": 1}}}), Options::default()).unwrap();
    let b = root.get_path(".a.b").unwrap().as_proxy().cloned().unwrap();
    let log = change_log(&root);

    root.set("a", 5).unwrap();
    assert_eq!(*log.borrow(), vec![".a update 5".to_string()]);
    assert_eq!(b.status(), ProxyStatus::Deleted);

    b.set("c", 2).unwrap();
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn test_destroyed_child_stays_trapped_in_its_parent() {
    let root = make(json!({"a": {"n": 1}}), Options::default()).unwrap();
    let a = root.get("a").unwrap();
    destroy(&a);

    let read = root.get("a").unwrap();
    let handle = read.as_proxy().expect("destroyed child read back raw");
    assert_eq!(handle.status(), ProxyStatus::Revoked);
    assert_eq!(handle.set("n", 2), Err(ProxserveError::Revoked));
    assert_eq!(root.snapshot().unwrap(), json!({"a": {"n": 1}}));

    // assigning a fresh value wraps it again
    root.set("a", json!({"n": 3})).unwrap();
    let fresh = root.get("a").unwrap();
    assert_eq!(fresh.as_proxy().unwrap().status(), ProxyStatus::Alive);
    assert_eq!(root.get_path(".a.n").unwrap(), Value::from(3));
}

#[derive(Default)]
struct Collect(RefCell<Vec<String>>);

impl TraceSink for Collect {
    fn record(&self, record: &TraceRecord<'_>) {
        self.0.borrow_mut().push(record.describe());
    }
}

#[test]
fn test_trace_sink_receives_each_change() {
    let sink = Rc::new(Collect::default());
    let root = make_with_sink(
        json!({"list": [1]}),
        Options::default().name("store").trace(TraceLevel::Normal),
        sink.clone(),
    )
    .unwrap();

    root.set("n", 1).unwrap();
    let list = root.get("list").unwrap().as_proxy().cloned().unwrap();
    list.shift().unwrap();

    assert_eq!(
        *sink.0.borrow(),
        vec![
            "[store] .n create: undefined -> 1".to_string(),
            "[store] .list[0] delete: 1 -> undefined [deferred]".to_string(),
            "[store] .list shift: [1] -> []".to_string(),
        ]
    );
}

#[test]
fn test_trace_disabled_by_default() {
    let sink = Rc::new(Collect::default());
    let root = make_with_sink(json!({}), Options::default(), sink.clone()).unwrap();
    root.set("n", 1).unwrap();
    assert!(sink.0.borrow().is_empty());
}
