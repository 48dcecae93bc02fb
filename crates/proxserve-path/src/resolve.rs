//! Resolving a path against a live value graph.

use serde_json::Value;

use crate::{split_path, PathError, PathStep};

/// A value graph that can be walked one property at a time.
pub trait Walk: Sized + Clone {
    /// The value stored under `step`, or `None` when it is absent or `self`
    /// cannot hold properties.
    fn child(&self, step: &PathStep) -> Option<Self>;
}

/// Result of [`resolve`]: the container owning the leaf, the leaf key and
/// the value currently stored there.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub container: T,
    pub key: PathStep,
    pub value: Option<T>,
}

/// Walk `root` along `path` down to the container of the last segment.
///
/// The empty path resolves to `root` itself with an empty key.
///
/// # Errors
///
/// [`PathError::InvalidPath`] when an intermediate segment does not exist.
///
/// # Example
///
/// ```
/// use proxserve_path::{resolve, PathStep};
/// use serde_json::json;
///
/// let doc = json!({"a": {"list": [10, 20]}});
/// let found = resolve(&doc, ".a.list[1]").unwrap();
/// assert_eq!(found.container, json!([10, 20]));
/// assert_eq!(found.key, PathStep::Index(1));
/// assert_eq!(found.value, Some(json!(20)));
///
/// assert!(resolve(&doc, ".missing.x").is_err());
/// ```
pub fn resolve<T: Walk>(root: &T, path: &str) -> Result<Resolved<T>, PathError> {
    if path.is_empty() {
        return Ok(Resolved {
            container: root.clone(),
            key: PathStep::Key(String::new()),
            value: Some(root.clone()),
        });
    }

    let steps = split_path(path);
    let Some((last, parents)) = steps.split_last() else {
        return Err(PathError::InvalidPath(path.to_string()));
    };

    let mut container = root.clone();
    for step in parents {
        container = container
            .child(step)
            .ok_or_else(|| PathError::InvalidPath(path.to_string()))?;
    }
    let value = container.child(last);
    Ok(Resolved {
        container,
        key: last.clone(),
        value,
    })
}

impl Walk for Value {
    fn child(&self, step: &PathStep) -> Option<Self> {
        match self {
            Value::Object(map) => map.get(step.as_key().as_ref()).cloned(),
            Value::Array(arr) => arr.get(step.as_index()?).cloned(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_empty_path() {
        let doc = json!({"a": 1});
        let found = resolve(&doc, "").unwrap();
        assert_eq!(found.container, doc);
        assert_eq!(found.key, PathStep::Key(String::new()));
        assert_eq!(found.value, Some(doc.clone()));
    }

    #[test]
    fn test_resolve_missing_leaf_is_not_an_error() {
        let doc = json!({"a": {}});
        let found = resolve(&doc, ".a.b").unwrap();
        assert_eq!(found.container, json!({}));
        assert_eq!(found.value, None);
    }

    #[test]
    fn test_resolve_through_primitive_fails() {
        let doc = json!({"a": 5});
        assert_eq!(
            resolve(&doc, ".a.b.c"),
            Err(PathError::InvalidPath(".a.b.c".to_string()))
        );
    }
}
