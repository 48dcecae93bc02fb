//! Detaching and destroying wrappers.
//!
//! A wrapper whose value is replaced or deleted is detached at once and,
//! in strict mode, queued for destruction after `debug.destroy_delay`. The
//! queue has no timer of its own: due entries are drained at the start of
//! the next top-level write, or on request. Data nodes left without a
//! wrapper, listener or child are freed at the same points.

use std::collections::VecDeque;
use std::time::Instant;

use crate::nodes::{ProxyId, ProxyStatus, Tree};
use crate::value::Value;
use crate::wrapper::{Engine, Proxy};

/// Detached wrappers waiting to be revoked, in due order.
#[derive(Debug, Default)]
pub(crate) struct DestroyQueue {
    pending: VecDeque<(Instant, ProxyId)>,
}

impl DestroyQueue {
    /// Entries must be scheduled with non-decreasing due times.
    pub(crate) fn schedule(&mut self, due: Instant, id: ProxyId) {
        self.pending.push_back((due, id));
    }

    pub(crate) fn take_due(&mut self, now: Instant) -> Vec<ProxyId> {
        let split = self
            .pending
            .iter()
            .position(|(due, _)| *due > now)
            .unwrap_or(self.pending.len());
        self.pending.drain(..split).map(|(_, id)| id).collect()
    }

    pub(crate) fn take_all(&mut self) -> Vec<ProxyId> {
        self.pending.drain(..).map(|(_, id)| id).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

impl Engine {
    /// Detach the child wrapper at `key` of `parent`, scheduling its
    /// destruction in strict mode. Returns whether there was one.
    pub(crate) fn detach_child(&self, parent: ProxyId, key: &str) -> bool {
        let mut tree = self.tree.borrow_mut();
        let Some(child) = tree.detach_child(parent, key) else {
            return false;
        };
        if self.options.strict {
            let due = Instant::now() + self.options.destroy_delay_duration();
            tree.destroy_queue.schedule(due, child);
        }
        true
    }

    /// Destroy every queued wrapper that is due. Skipped while listeners or
    /// a bulk operation are running.
    pub(crate) fn run_due_destroys(&self) -> usize {
        if self.is_busy() {
            return 0;
        }
        let due = self.tree.borrow_mut().destroy_queue.take_due(Instant::now());
        let destroyed = self.destroy_all(due);
        self.free_unused_nodes();
        destroyed
    }

    /// Free released data nodes, unless a dispatch is running.
    pub(crate) fn free_unused_nodes(&self) -> usize {
        if self.is_busy() {
            return 0;
        }
        self.tree.borrow_mut().free_released()
    }

    fn destroy_all(&self, ids: Vec<ProxyId>) -> usize {
        ids.into_iter().filter(|id| self.destroy_node(*id)).count()
    }

    /// Returns `false` if the node was already revoked.
    pub(crate) fn destroy_node(&self, id: ProxyId) -> bool {
        let mut tree = self.tree.borrow_mut();
        if tree.proxy(id).is_none() {
            return false;
        }
        destroy_subtree(&mut tree, id);
        true
    }
}

fn destroy_subtree(tree: &mut Tree, id: ProxyId) {
    let Some(node) = tree.proxy_mut(id) else {
        return;
    };
    if node.status == ProxyStatus::Alive {
        node.status = ProxyStatus::Deleted;
    }
    let children: Vec<(String, ProxyId)> = node
        .children
        .iter()
        .filter(|(key, _)| !crate::is_unwrapped_key(key))
        .map(|(key, child)| (key.clone(), *child))
        .collect();

    for (key, child) in children {
        if tree.proxy(child).is_none() {
            tracing::debug!(%key, "child wrapper already revoked");
            continue;
        }
        destroy_subtree(tree, child);
    }
    tree.revoke(id);
}

/// Destroy the wrapper in `value` and every wrapper below it.
///
/// Anything that is not a live wrapper is ignored.
pub fn destroy(value: &Value) {
    if let Value::Proxy(proxy) = value {
        proxy.destroy();
    }
}

impl Proxy {
    /// Revoke this wrapper and its descendants now. Later access through
    /// any of their handles fails with
    /// [`ProxserveError::Revoked`](crate::ProxserveError::Revoked).
    pub fn destroy(&self) {
        self.engine.destroy_node(self.id);
        self.engine.free_unused_nodes();
    }

    /// Destroy detached wrappers whose delay has elapsed. Returns how many
    /// were destroyed.
    pub fn run_pending_destroys(&self) -> usize {
        let due = self
            .engine
            .tree
            .borrow_mut()
            .destroy_queue
            .take_due(Instant::now());
        let destroyed = self.engine.destroy_all(due);
        self.engine.free_unused_nodes();
        destroyed
    }

    /// Destroy every detached wrapper still queued, due or not.
    pub fn finish_pending_destroys(&self) -> usize {
        let all = self.engine.tree.borrow_mut().destroy_queue.take_all();
        let destroyed = self.engine.destroy_all(all);
        self.engine.free_unused_nodes();
        destroyed
    }

    /// Number of detached wrappers waiting to be destroyed.
    pub fn pending_destroys(&self) -> usize {
        self.engine.tree.borrow().destroy_queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{make, Options, ProxserveError};
    use serde_json::json;
    use std::time::Duration;

    fn data_nodes(proxy: &Proxy) -> usize {
        proxy.engine.tree.borrow().data_len()
    }

    #[test]
    fn test_queue_takes_only_due_entries() {
        let id = Tree::new().proxy_prototype;
        let now = Instant::now();
        let mut queue = DestroyQueue::default();
        queue.schedule(now, id);
        queue.schedule(now + Duration::from_secs(60), id);
        assert_eq!(queue.take_due(now).len(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.take_all().len(), 1);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_destroy_revokes_subtree() {
        let root = make(json!({"a": {"b": {"c": 1}}}), Options::default()).unwrap();
        let a = root.get("a").unwrap().as_proxy().cloned().unwrap();
        let b = a.get("b").unwrap().as_proxy().cloned().unwrap();

        destroy(&Value::Proxy(a.clone()));
        assert_eq!(a.status(), ProxyStatus::Revoked);
        assert_eq!(b.status(), ProxyStatus::Revoked);
        assert_eq!(b.get("c"), Err(ProxserveError::Revoked));

        // idempotent, and non-wrappers are ignored
        destroy(&Value::Proxy(a));
        destroy(&Value::from(3));
        assert_eq!(root.status(), ProxyStatus::Alive);
    }

    #[test]
    fn test_replaced_wrapper_is_destroyed_after_delay() {
        let root = make(json!({"a": {}}), Options::default().destroy_delay(0)).unwrap();
        let old = root.get("a").unwrap().as_proxy().cloned().unwrap();

        root.set("a", json!({})).unwrap();
        assert_eq!(old.status(), ProxyStatus::Deleted);
        assert_eq!(root.pending_destroys(), 1);

        assert_eq!(root.run_pending_destroys(), 1);
        assert_eq!(old.status(), ProxyStatus::Revoked);
        assert_eq!(root.get("a").unwrap().as_proxy().unwrap().status(), ProxyStatus::Alive);
    }

    #[test]
    fn test_due_destroys_drain_on_next_write() {
        let root = make(json!({"a": {}}), Options::default().destroy_delay(0)).unwrap();
        let old = root.get("a").unwrap().as_proxy().cloned().unwrap();
        root.delete("a").unwrap();
        root.set("x", 1).unwrap();
        assert_eq!(old.status(), ProxyStatus::Revoked);
    }

    #[test]
    fn test_finish_ignores_due_time() {
        let root = make(json!({"a": {}}), Options::default()).unwrap();
        let old = root.get("a").unwrap().as_proxy().cloned().unwrap();
        root.delete("a").unwrap();
        assert_eq!(root.run_pending_destroys(), 0);
        assert_eq!(root.finish_pending_destroys(), 1);
        assert_eq!(old.status(), ProxyStatus::Revoked);
    }

    #[test]
    fn test_non_strict_keeps_detached_wrappers() {
        let root = make(json!({"a": {"n": 1}}), Options::default().strict(false)).unwrap();
        let old = root.get("a").unwrap().as_proxy().cloned().unwrap();
        root.delete("a").unwrap();
        assert_eq!(root.pending_destroys(), 0);
        assert_eq!(old.status(), ProxyStatus::Deleted);
        assert_eq!(old.get("n").unwrap(), Value::from(1));
    }

    #[test]
    fn test_data_nodes_of_removed_keys_are_freed() {
        let root = make(json!({"keep": {"n": 1}}), Options::default().destroy_delay(0)).unwrap();
        let baseline = data_nodes(&root);
        for round in 0..200 {
            let key = format!("k{round}");
            root.set(key.as_str(), json!({"x": {"y": 1}})).unwrap();
            root.delete(key.as_str()).unwrap();
            root.finish_pending_destroys();
        }
        assert_eq!(data_nodes(&root), baseline);
    }

    #[test]
    fn test_listened_paths_outlive_their_values() {
        let root = make(json!({"a": {"b": 1}}), Options::default().destroy_delay(0)).unwrap();
        root.on(crate::ListenOptions::new("change", |_: &crate::ChangeEvent, _: &Value| {}).path(".a.b"))
            .unwrap();
        let baseline = data_nodes(&root);

        root.delete("a").unwrap();
        root.finish_pending_destroys();
        assert_eq!(data_nodes(&root), baseline);

        root.remove_all_listeners(".a.b").unwrap();
        assert_eq!(data_nodes(&root), baseline - 2);
    }
}
