//! The two parallel node trees.
//!
//! Data nodes are stable per path and survive value replacement; they carry
//! listeners and status. Proxy nodes are tied to one target value and die
//! with it. Data nodes are freed once nothing refers to them: no wrapper,
//! no listener and no child. Proxy nodes live in a generational slab so that
//! a stale [`ProxyId`] can be told apart from a reused slot.

use std::fmt;

use indexmap::IndexMap;
use proxserve_path::{property_to_path_segment, ContainerKind};
use serde::Serialize;
use slab::Slab;

use crate::dispatch::DeferredEvent;
use crate::events::ListenerPools;
use crate::lifecycle::DestroyQueue;
use crate::value::{Object, Target};

/// Observation status of a data node. Unset statuses inherit from the
/// nearest ancestor that has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Active,
    /// Events at and above this node are suppressed.
    Stopped,
    /// Writes are rejected with a logged error.
    Blocked,
    /// A bulk array operation is running; events are buffered.
    Splicing,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeStatus::Active => "active",
            NodeStatus::Stopped => "stopped",
            NodeStatus::Blocked => "blocked",
            NodeStatus::Splicing => "splicing",
        })
    }
}

/// Lifecycle of a wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    Alive,
    /// Detached from the tree, awaiting destruction.
    Deleted,
    /// Destroyed. Every access through the handle fails.
    Revoked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct DataId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ProxyId {
    slot: usize,
    generation: u64,
}

/// Parent of every root data node.
pub(crate) const TREE_PROTOTYPE: DataId = DataId(0);

pub(crate) struct DataNode {
    pub(crate) parent: Option<DataId>,
    pub(crate) key: String,
    pub(crate) children: IndexMap<String, DataId>,
    /// Own status; `None` inherits.
    pub(crate) status: Option<NodeStatus>,
    pub(crate) proxy: Option<ProxyId>,
    pub(crate) listeners: ListenerPools,
    /// Full path from the root, e.g. `.a.b[0]`.
    pub(crate) path: String,
    /// Segment under the parent, e.g. `[0]`.
    pub(crate) property_path: String,
    pub(crate) deferred: Option<Vec<DeferredEvent>>,
    pub(crate) is_tree_prototype: bool,
    /// Proxy nodes, live or stale, whose `data` is this node.
    wrappers: usize,
}

impl DataNode {
    fn new(parent: Option<DataId>, key: String) -> Self {
        Self {
            parent,
            key,
            children: IndexMap::new(),
            status: None,
            proxy: None,
            listeners: ListenerPools::default(),
            path: String::new(),
            property_path: String::new(),
            deferred: None,
            is_tree_prototype: false,
            wrappers: 0,
        }
    }

    fn is_unused(&self) -> bool {
        !self.is_tree_prototype
            && self.wrappers == 0
            && self.children.is_empty()
            && self.listeners.is_empty()
            && self.deferred.is_none()
    }
}

pub(crate) struct ProxyNode {
    generation: u64,
    pub(crate) target: Target,
    pub(crate) data: DataId,
    pub(crate) parent: Option<ProxyId>,
    pub(crate) key: String,
    pub(crate) status: ProxyStatus,
    pub(crate) children: IndexMap<String, ProxyId>,
}

pub(crate) struct Tree {
    data: Slab<DataNode>,
    /// Data nodes that may have become unused.
    released: Vec<DataId>,
    proxies: Slab<ProxyNode>,
    next_generation: u64,
    next_listener_id: u64,
    /// Parent of every root proxy node.
    pub(crate) proxy_prototype: ProxyId,
    pub(crate) destroy_queue: DestroyQueue,
}

impl Tree {
    pub(crate) fn new() -> Self {
        let mut sentinel = DataNode::new(None, String::new());
        sentinel.status = Some(NodeStatus::Active);
        sentinel.is_tree_prototype = true;

        let mut data = Slab::new();
        let prototype = data.insert(sentinel);
        debug_assert_eq!(prototype, TREE_PROTOTYPE.0);

        let mut tree = Self {
            data,
            released: Vec::new(),
            proxies: Slab::new(),
            next_generation: 0,
            next_listener_id: 0,
            proxy_prototype: ProxyId {
                slot: 0,
                generation: 0,
            },
            destroy_queue: DestroyQueue::default(),
        };
        tree.proxy_prototype = tree.insert_proxy(ProxyNode {
            generation: 0,
            target: Target::Object(Object::new()),
            data: TREE_PROTOTYPE,
            parent: None,
            key: String::new(),
            status: ProxyStatus::Alive,
            children: IndexMap::new(),
        });
        tree
    }

    pub(crate) fn data(&self, id: DataId) -> &DataNode {
        &self.data[id.0]
    }

    pub(crate) fn data_mut(&mut self, id: DataId) -> &mut DataNode {
        &mut self.data[id.0]
    }

    /// Number of data nodes, the sentinel included.
    pub(crate) fn data_len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn proxy(&self, id: ProxyId) -> Option<&ProxyNode> {
        self.proxies
            .get(id.slot)
            .filter(|node| node.generation == id.generation)
    }

    pub(crate) fn proxy_mut(&mut self, id: ProxyId) -> Option<&mut ProxyNode> {
        self.proxies
            .get_mut(id.slot)
            .filter(|node| node.generation == id.generation)
    }

    pub(crate) fn proxy_status(&self, id: ProxyId) -> ProxyStatus {
        self.proxy(id).map_or(ProxyStatus::Revoked, |node| node.status)
    }

    /// The wrapper attached to `data`, if it is alive.
    pub(crate) fn alive_proxy(&self, data: DataId) -> Option<ProxyId> {
        self.data(data)
            .proxy
            .filter(|id| self.proxy_status(*id) == ProxyStatus::Alive)
    }

    /// Effective status: the first explicit status on the way to the root.
    pub(crate) fn status(&self, id: DataId) -> NodeStatus {
        let mut current = id;
        loop {
            let node = self.data(current);
            if let Some(status) = node.status {
                return status;
            }
            match node.parent {
                Some(parent) => current = parent,
                None => return NodeStatus::Active,
            }
        }
    }

    pub(crate) fn child_data(&self, parent: DataId, key: &str) -> Option<DataId> {
        self.data(parent).children.get(key).copied()
    }

    pub(crate) fn next_listener_id(&mut self) -> u64 {
        self.next_listener_id = self.next_listener_id.saturating_add(1);
        self.next_listener_id
    }

    /// Create or reuse the data node for `key` under `parent`, and when
    /// `wrap` names a parent proxy and a target, a fresh proxy node for it.
    pub(crate) fn attach(
        &mut self,
        parent: DataId,
        key: &str,
        wrap: Option<(ProxyId, Target)>,
    ) -> (DataId, Option<ProxyId>) {
        match wrap {
            Some((parent_proxy, target)) => {
                let (data, proxy) = self.attach_wrapped(parent, key, parent_proxy, target);
                (data, Some(proxy))
            }
            None => {
                let kind = self
                    .data(parent)
                    .proxy
                    .and_then(|id| self.proxy(id))
                    .map_or(ContainerKind::Object, |node| node.target.kind());
                (self.attach_data(parent, key, kind), None)
            }
        }
    }

    pub(crate) fn attach_wrapped(
        &mut self,
        parent: DataId,
        key: &str,
        parent_proxy: ProxyId,
        target: Target,
    ) -> (DataId, ProxyId) {
        let kind = self
            .proxy(parent_proxy)
            .map_or(ContainerKind::Object, |node| node.target.kind());
        let data = self.attach_data(parent, key, kind);
        let proxy = self.attach_proxy(data, parent_proxy, key, target);
        (data, proxy)
    }

    fn attach_data(&mut self, parent: DataId, key: &str, kind: ContainerKind) -> DataId {
        let id = match self.child_data(parent, key) {
            Some(id) => id,
            None => {
                let id = DataId(self.data.insert(DataNode::new(Some(parent), key.to_string())));
                self.data_mut(parent).children.insert(key.to_string(), id);
                id
            }
        };

        let segment = property_to_path_segment(kind, key);
        let path = if self.data(parent).is_tree_prototype {
            String::new()
        } else {
            format!("{}{}", self.data(parent).path, segment)
        };
        let node = self.data_mut(id);
        node.status = None;
        node.property_path = segment;
        node.path = path;
        id
    }

    fn attach_proxy(&mut self, data: DataId, parent: ProxyId, key: &str, target: Target) -> ProxyId {
        let id = self.insert_proxy(ProxyNode {
            generation: 0,
            target,
            data,
            parent: Some(parent),
            key: key.to_string(),
            status: ProxyStatus::Alive,
            children: IndexMap::new(),
        });
        let node = self.data_mut(data);
        node.proxy = Some(id);
        node.wrappers += 1;
        if let Some(parent) = self.proxy_mut(parent) {
            parent.children.insert(key.to_string(), id);
        }
        id
    }

    fn insert_proxy(&mut self, mut node: ProxyNode) -> ProxyId {
        self.next_generation += 1;
        node.generation = self.next_generation;
        let slot = self.proxies.insert(node);
        ProxyId {
            slot,
            generation: self.next_generation,
        }
    }

    /// Unlink the child wrapper at `key` from the parent's child map. It
    /// and every wrapper below it are marked deleted and their data nodes
    /// forget them. The nodes stay in the slab until revoked.
    pub(crate) fn detach_child(&mut self, parent: ProxyId, key: &str) -> Option<ProxyId> {
        let child = self.proxy_mut(parent)?.children.shift_remove(key)?;
        self.proxy(child)?;
        self.mark_deleted(child);
        Some(child)
    }

    fn mark_deleted(&mut self, root: ProxyId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.proxy_mut(id) else {
                continue;
            };
            if node.status == ProxyStatus::Alive {
                node.status = ProxyStatus::Deleted;
            }
            let data = node.data;
            stack.extend(node.children.values().copied());
            if self.data(data).proxy == Some(id) {
                self.data_mut(data).proxy = None;
            }
        }
    }

    /// Free the proxy node. Returns `false` if it was already gone.
    ///
    /// The parent keeps its entry for the key, so reads through the parent
    /// yield the revoked handle instead of the raw target.
    pub(crate) fn revoke(&mut self, id: ProxyId) -> bool {
        if self.proxy(id).is_none() {
            return false;
        }
        let node = self.proxies.remove(id.slot);
        let data = self.data_mut(node.data);
        if data.proxy == Some(id) {
            data.proxy = None;
        }
        data.wrappers = data.wrappers.saturating_sub(1);
        self.released.push(node.data);
        true
    }

    /// Queue `id` to be freed if it turns out unused.
    pub(crate) fn release(&mut self, id: DataId) {
        self.released.push(id);
    }

    /// Free released data nodes that are unused, and then their ancestors
    /// that became unused. Must not run while a dispatch holds data ids.
    pub(crate) fn free_released(&mut self) -> usize {
        let mut freed = 0;
        for id in std::mem::take(&mut self.released) {
            let mut current = id;
            while self.data.get(current.0).is_some_and(DataNode::is_unused) {
                let node = self.data.remove(current.0);
                freed += 1;
                let Some(parent) = node.parent else {
                    break;
                };
                let siblings = &mut self.data_mut(parent).children;
                if siblings.get(&node.key) == Some(&current) {
                    siblings.shift_remove(&node.key);
                }
                current = parent;
            }
        }
        freed
    }

    /// Walk `steps` down from `from`, creating missing data nodes.
    pub(crate) fn ensure_path<'a>(
        &mut self,
        from: DataId,
        steps: impl IntoIterator<Item = &'a str>,
    ) -> DataId {
        steps.into_iter().fold(from, |node, key| match self.child_data(node, key) {
            Some(child) => child,
            None => self.attach(node, key, None).0,
        })
    }

    /// Walk `steps` down from `from` without creating anything.
    pub(crate) fn find_path<'a>(
        &self,
        from: DataId,
        steps: impl IntoIterator<Item = &'a str>,
    ) -> Option<DataId> {
        steps
            .into_iter()
            .try_fold(from, |node, key| self.child_data(node, key))
    }
}
