//! Change events and listener registrations.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use crate::error::ProxserveError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Create,
    Update,
    Delete,
    Splice,
    Shift,
    Unshift,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::Create,
        EventType::Update,
        EventType::Delete,
        EventType::Splice,
        EventType::Shift,
        EventType::Unshift,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Create => "create",
            EventType::Update => "update",
            EventType::Delete => "delete",
            EventType::Splice => "splice",
            EventType::Shift => "shift",
            EventType::Unshift => "unshift",
        }
    }

    /// Classify a single-property change.
    pub(crate) fn classify(old_value: &Value, value: &Value) -> Self {
        if value.is_undefined() {
            EventType::Delete
        } else if old_value.is_undefined() {
            EventType::Create
        } else {
            EventType::Update
        }
    }

    fn valid_names() -> String {
        EventType::ALL
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ProxserveError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == name)
            .ok_or_else(|| ProxserveError::InvalidEvent {
                event: name.to_string(),
                valid: EventType::valid_names(),
            })
    }
}

bitflags::bitflags! {
    /// The set of event types a listener subscribes to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventTypes: u8 {
        const CREATE = 1 << 0;
        const UPDATE = 1 << 1;
        const DELETE = 1 << 2;
        const SPLICE = 1 << 3;
        const SHIFT = 1 << 4;
        const UNSHIFT = 1 << 5;
    }
}

impl From<EventType> for EventTypes {
    fn from(event: EventType) -> Self {
        match event {
            EventType::Create => EventTypes::CREATE,
            EventType::Update => EventTypes::UPDATE,
            EventType::Delete => EventTypes::DELETE,
            EventType::Splice => EventTypes::SPLICE,
            EventType::Shift => EventTypes::SHIFT,
            EventType::Unshift => EventTypes::UNSHIFT,
        }
    }
}

/// Event names as given at registration: one name, where `"change"` means
/// every type, or a list of names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventNames {
    One(String),
    Many(Vec<String>),
}

impl EventNames {
    pub(crate) fn parse(&self) -> Result<EventTypes, ProxserveError> {
        match self {
            EventNames::One(name) if name == "change" => Ok(EventTypes::all()),
            EventNames::One(name) => Ok(name.parse::<EventType>()?.into()),
            EventNames::Many(names) => names.iter().try_fold(EventTypes::empty(), |acc, name| {
                Ok(acc | name.parse::<EventType>()?.into())
            }),
        }
    }
}

impl From<&str> for EventNames {
    fn from(name: &str) -> Self {
        EventNames::One(name.to_string())
    }
}

impl From<String> for EventNames {
    fn from(name: String) -> Self {
        EventNames::One(name)
    }
}

impl From<EventType> for EventNames {
    fn from(event: EventType) -> Self {
        EventNames::One(event.as_str().to_string())
    }
}

impl From<Vec<&str>> for EventNames {
    fn from(names: Vec<&str>) -> Self {
        EventNames::Many(names.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for EventNames {
    fn from(names: [&str; N]) -> Self {
        EventNames::Many(names.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<EventType>> for EventNames {
    fn from(events: Vec<EventType>) -> Self {
        EventNames::Many(events.into_iter().map(|e| e.as_str().to_string()).collect())
    }
}

/// Arguments of the array method behind a composite event.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodArgs {
    Splice {
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    },
    Shift,
    Unshift {
        items: Vec<Value>,
    },
}

/// A change as delivered to listeners.
///
/// `path` is relative to the node the listener is registered on: empty when
/// the node's own value changed, `.b[2]` for a change two levels below.
/// Values are raw targets, never wrappers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub path: String,
    pub value: Value,
    pub old_value: Value,
    pub kind: EventType,
    pub args: Option<MethodArgs>,
}

impl ChangeEvent {
    pub(crate) fn new(path: String, value: Value, old_value: Value, kind: EventType) -> Self {
        Self {
            path,
            value,
            old_value,
            kind,
            args: None,
        }
    }
}

/// Listener callback. Receives the event and the current wrapper (or value)
/// of the node it is registered on.
pub type Listener = Rc<dyn Fn(&ChangeEvent, &Value)>;

/// Token returned by `on`, usable for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub(crate) u64);

/// Identifies listeners to remove.
#[derive(Clone)]
pub enum ListenerKey {
    Handle(ListenerHandle),
    /// The caller-supplied id given at registration.
    Id(String),
    /// The original callback, matched by pointer identity.
    Callback(Listener),
}

impl From<ListenerHandle> for ListenerKey {
    fn from(handle: ListenerHandle) -> Self {
        ListenerKey::Handle(handle)
    }
}

impl From<&str> for ListenerKey {
    fn from(id: &str) -> Self {
        ListenerKey::Id(id.to_string())
    }
}

impl From<String> for ListenerKey {
    fn from(id: String) -> Self {
        ListenerKey::Id(id)
    }
}

impl From<Listener> for ListenerKey {
    fn from(callback: Listener) -> Self {
        ListenerKey::Callback(callback)
    }
}

/// Registration request for `on` / `once`.
#[derive(Clone)]
pub struct ListenOptions {
    pub(crate) events: EventNames,
    pub(crate) path: String,
    pub(crate) deep: bool,
    pub(crate) id: Option<String>,
    pub(crate) once: bool,
    pub(crate) listener: Listener,
}

impl ListenOptions {
    pub fn new<F>(events: impl Into<EventNames>, listener: F) -> Self
    where
        F: Fn(&ChangeEvent, &Value) + 'static,
    {
        Self::with_listener(events, Rc::new(listener))
    }

    /// Register an existing callback, keeping its `Rc` for later removal.
    pub fn with_listener(events: impl Into<EventNames>, listener: Listener) -> Self {
        Self {
            events: events.into(),
            path: String::new(),
            deep: false,
            id: None,
            once: false,
            listener,
        }
    }

    /// Path relative to the wrapper `on` is called on.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Also fire for changes anywhere below the path.
    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }
}

pub(crate) struct ListenerData {
    pub(crate) events: EventTypes,
    pub(crate) once: bool,
    pub(crate) callback: Listener,
    pub(crate) id: Option<String>,
    pub(crate) handle: ListenerHandle,
}

impl ListenerData {
    pub(crate) fn matches(&self, key: &ListenerKey) -> bool {
        match key {
            ListenerKey::Handle(handle) => self.handle == *handle,
            ListenerKey::Id(id) => self.id.as_deref() == Some(id.as_str()),
            ListenerKey::Callback(callback) => std::ptr::eq(
                Rc::as_ptr(&self.callback) as *const (),
                Rc::as_ptr(callback) as *const (),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pool {
    Shallow,
    Deep,
}

#[derive(Default)]
pub(crate) struct ListenerPools {
    pub(crate) shallow: Vec<ListenerData>,
    pub(crate) deep: Vec<ListenerData>,
}

impl ListenerPools {
    pub(crate) fn pool(&self, pool: Pool) -> &Vec<ListenerData> {
        match pool {
            Pool::Shallow => &self.shallow,
            Pool::Deep => &self.deep,
        }
    }

    pub(crate) fn pool_mut(&mut self, pool: Pool) -> &mut Vec<ListenerData> {
        match pool {
            Pool::Shallow => &mut self.shallow,
            Pool::Deep => &mut self.deep,
        }
    }

    /// Remove every listener matching `key`; returns how many were removed.
    pub(crate) fn remove(&mut self, key: &ListenerKey) -> usize {
        let before = self.shallow.len() + self.deep.len();
        self.shallow.retain(|l| !l.matches(key));
        self.deep.retain(|l| !l.matches(key));
        before - self.shallow.len() - self.deep.len()
    }

    pub(crate) fn clear(&mut self) {
        self.shallow.clear();
        self.deep.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.shallow.is_empty() && self.deep.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_change_means_all() {
        let types = EventNames::from("change").parse().unwrap();
        assert_eq!(types, EventTypes::all());
    }

    #[test]
    fn test_parse_list() {
        let types = EventNames::from(["create", "delete"]).parse().unwrap();
        assert_eq!(types, EventTypes::CREATE | EventTypes::DELETE);
    }

    #[test]
    fn test_parse_invalid_lists_valid_names() {
        let err = EventNames::from("remove").parse().unwrap_err();
        assert_eq!(
            err,
            ProxserveError::InvalidEvent {
                event: "remove".to_string(),
                valid: "create,update,delete,splice,shift,unshift".to_string(),
            }
        );
        // "change" is only meaningful on its own
        assert!(EventNames::from(["change"]).parse().is_err());
    }

    #[test]
    fn test_classify() {
        let one = Value::from(1);
        assert_eq!(EventType::classify(&Value::Undefined, &one), EventType::Create);
        assert_eq!(EventType::classify(&one, &Value::Undefined), EventType::Delete);
        assert_eq!(EventType::classify(&one, &Value::from(2)), EventType::Update);
        assert_eq!(EventType::classify(&Value::Null, &one), EventType::Update);
    }
}
