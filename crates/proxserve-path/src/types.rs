use std::borrow::Cow;
use std::fmt;

/// A single step of a property-access path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

impl PathStep {
    /// The property name this step addresses. Indices render as decimal
    /// strings, so `Index(0)` and `Key("0")` name the same property.
    pub fn as_key(&self) -> Cow<'_, str> {
        match self {
            PathStep::Key(key) => Cow::Borrowed(key),
            PathStep::Index(index) => Cow::Owned(index.to_string()),
        }
    }

    /// The array index this step addresses, if it is one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathStep::Index(index) => Some(*index),
            PathStep::Key(key) if crate::is_integer(key) => key.parse().ok(),
            PathStep::Key(_) => None,
        }
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Key(key) => f.write_str(key),
            PathStep::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathStep {
    fn from(key: &str) -> Self {
        PathStep::Key(key.to_string())
    }
}

impl From<String> for PathStep {
    fn from(key: String) -> Self {
        PathStep::Key(key)
    }
}

impl From<&String> for PathStep {
    fn from(key: &String) -> Self {
        PathStep::Key(key.clone())
    }
}

impl From<usize> for PathStep {
    fn from(index: usize) -> Self {
        PathStep::Index(index)
    }
}

/// Shape of the container a property lives in; decides how the property is
/// rendered as a path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Object,
    Array,
    /// Anything else, carrying a type name for diagnostics.
    Other(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_key_and_index() {
        assert_eq!(PathStep::Index(4).as_key(), "4");
        assert_eq!(PathStep::from("k").as_key(), "k");
        assert_eq!(PathStep::from("12").as_index(), Some(12));
        assert_eq!(PathStep::from("x").as_index(), None);
        assert_eq!(PathStep::Index(7).to_string(), "7");
    }
}
