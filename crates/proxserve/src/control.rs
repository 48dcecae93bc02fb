//! Listener registration, status control and node introspection.

use proxserve_path::{split_path, PathStep};
use serde::Serialize;

use crate::array::ArrayMethod;
use crate::error::ProxserveError;
use crate::events::{ListenOptions, ListenerData, ListenerHandle, ListenerKey};
use crate::nodes::{NodeStatus, ProxyStatus};
use crate::value::{Target, Value};
use crate::wrapper::Proxy;

/// Operations every wrapper exposes next to its properties.
///
/// Each has a plain name and a `$`-prefixed synonym. The plain name only
/// resolves to the operation when the target has no property of that name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOp {
    On,
    Once,
    RemoveListener,
    RemoveAllListeners,
    Stop,
    Block,
    Activate,
    GetOriginalTarget,
    GetProxserveNodes,
}

impl ControlOp {
    pub const ALL: [ControlOp; 9] = [
        ControlOp::On,
        ControlOp::Once,
        ControlOp::RemoveListener,
        ControlOp::RemoveAllListeners,
        ControlOp::Stop,
        ControlOp::Block,
        ControlOp::Activate,
        ControlOp::GetOriginalTarget,
        ControlOp::GetProxserveNodes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ControlOp::On => "on",
            ControlOp::Once => "once",
            ControlOp::RemoveListener => "removeListener",
            ControlOp::RemoveAllListeners => "removeAllListeners",
            ControlOp::Stop => "stop",
            ControlOp::Block => "block",
            ControlOp::Activate => "activate",
            ControlOp::GetOriginalTarget => "getOriginalTarget",
            ControlOp::GetProxserveNodes => "getProxserveNodes",
        }
    }

    /// Resolve a member name. Returns the op and whether the `$` synonym
    /// was used.
    pub fn from_name(name: &str) -> Option<(Self, bool)> {
        let (plain, synonym) = match name.strip_prefix('$') {
            Some(rest) => (rest, true),
            None => (name, false),
        };
        ControlOp::ALL
            .into_iter()
            .find(|op| op.name() == plain)
            .map(|op| (op, synonym))
    }
}

/// What a member name on a wrapper refers to.
#[derive(Debug, Clone)]
pub enum Member {
    Value(Value),
    Control(ControlOp),
    ArrayMethod(ArrayMethod),
}

/// Snapshot of a data node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataNodeInfo {
    pub path: String,
    pub property_path: String,
    /// Effective status.
    pub status: NodeStatus,
    /// Explicitly set status, `None` when inherited.
    pub own_status: Option<NodeStatus>,
    pub shallow_listeners: usize,
    pub deep_listeners: usize,
    pub has_proxy: bool,
}

/// Snapshot of a proxy node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyNodeInfo {
    pub status: ProxyStatus,
    pub is_array: bool,
    /// Keys of child wrappers.
    pub children: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxserveNodes {
    pub data: DataNodeInfo,
    pub proxy: ProxyNodeInfo,
}

impl Proxy {
    /// Resolve `name` the way a property access would.
    ///
    /// Array methods win on arrays (unless raw method events were
    /// requested), then control operations, then the property itself.
    pub fn member(&self, name: &str) -> Result<Member, ProxserveError> {
        let (target, _) = self.target_and_data()?;
        if let Target::Array(_) = &target {
            if !self.engine.options.emit_raw_method_events {
                if let Some(method) = ArrayMethod::from_name(name) {
                    return Ok(Member::ArrayMethod(method));
                }
            }
        }
        if let Some((op, synonym)) = ControlOp::from_name(name) {
            if synonym || !target.contains(name) {
                return Ok(Member::Control(op));
            }
        }
        self.get(name).map(Member::Value)
    }

    /// Register a listener.
    ///
    /// Data nodes along `options.path` are created if missing, so listeners
    /// can wait for properties that do not exist yet.
    ///
    /// # Errors
    ///
    /// [`ProxserveError::InvalidEvent`] for an unknown event name.
    pub fn on(&self, options: ListenOptions) -> Result<ListenerHandle, ProxserveError> {
        let events = options.events.parse()?;
        let data = self.data_id()?;
        let keys = path_keys(&options.path);

        let mut tree = self.engine.tree.borrow_mut();
        let node = tree.ensure_path(data, keys.iter().map(String::as_str));
        let handle = ListenerHandle(tree.next_listener_id());
        let listener = ListenerData {
            events,
            once: options.once,
            callback: options.listener,
            id: options.id,
            handle,
        };
        let pools = &mut tree.data_mut(node).listeners;
        if options.deep {
            pools.deep.push(listener);
        } else {
            pools.shallow.push(listener);
        }
        Ok(handle)
    }

    /// [`on`](Proxy::on), removed after the first delivery.
    pub fn once(&self, options: ListenOptions) -> Result<ListenerHandle, ProxserveError> {
        self.on(options.once(true))
    }

    /// Remove the listeners at `path` matching `key` from both pools.
    /// Returns whether any were removed.
    pub fn remove_listener(
        &self,
        path: &str,
        key: impl Into<ListenerKey>,
    ) -> Result<bool, ProxserveError> {
        let data = self.data_id()?;
        let keys = path_keys(path);
        let removed = {
            let mut tree = self.engine.tree.borrow_mut();
            let Some(node) = tree.find_path(data, keys.iter().map(String::as_str)) else {
                return Ok(false);
            };
            let removed = tree.data_mut(node).listeners.remove(&key.into());
            tree.release(node);
            removed
        };
        self.engine.free_unused_nodes();
        Ok(removed > 0)
    }

    pub fn remove_all_listeners(&self, path: &str) -> Result<(), ProxserveError> {
        let data = self.data_id()?;
        let keys = path_keys(path);
        {
            let mut tree = self.engine.tree.borrow_mut();
            if let Some(node) = tree.find_path(data, keys.iter().map(String::as_str)) {
                tree.data_mut(node).listeners.clear();
                tree.release(node);
            }
        }
        self.engine.free_unused_nodes();
        Ok(())
    }

    /// Suppress events at this node and above for changes here or below.
    /// Descendants inherit the status.
    pub fn stop(&self) -> Result<(), ProxserveError> {
        self.set_status(Some(NodeStatus::Stopped))
    }

    /// Reject writes at this node and below.
    pub fn block(&self) -> Result<(), ProxserveError> {
        self.set_status(Some(NodeStatus::Blocked))
    }

    /// Clear this node's own status so it inherits again, or with `force`
    /// pin it active regardless of ancestors.
    pub fn activate(&self, force: bool) -> Result<(), ProxserveError> {
        self.set_status(force.then_some(NodeStatus::Active))
    }

    fn set_status(&self, status: Option<NodeStatus>) -> Result<(), ProxserveError> {
        let data = self.data_id()?;
        self.engine.tree.borrow_mut().data_mut(data).status = status;
        Ok(())
    }

    /// The raw target behind this wrapper.
    pub fn original_target(&self) -> Result<Value, ProxserveError> {
        let (target, _) = self.target_and_data()?;
        Ok(target.to_value())
    }

    /// Snapshot of this wrapper's data and proxy nodes.
    pub fn proxserve_nodes(&self) -> Result<ProxserveNodes, ProxserveError> {
        let tree = self.engine.tree.borrow();
        let proxy = tree.proxy(self.id).ok_or(ProxserveError::Revoked)?;
        let data = tree.data(proxy.data);
        Ok(ProxserveNodes {
            data: DataNodeInfo {
                path: data.path.clone(),
                property_path: data.property_path.clone(),
                status: tree.status(proxy.data),
                own_status: data.status,
                shallow_listeners: data.listeners.shallow.len(),
                deep_listeners: data.listeners.deep.len(),
                has_proxy: data.proxy.is_some(),
            },
            proxy: ProxyNodeInfo {
                status: proxy.status,
                is_array: matches!(proxy.target, Target::Array(_)),
                children: proxy
                    .children
                    .iter()
                    .filter(|(_, child)| tree.proxy(**child).is_some())
                    .map(|(key, _)| key.clone())
                    .collect(),
            },
        })
    }
}

fn path_keys(path: &str) -> Vec<String> {
    split_path(path)
        .iter()
        .map(PathStep::as_key)
        .map(|key| key.into_owned())
        .collect()
}
