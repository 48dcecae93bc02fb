//! Property-access path utilities.
//!
//! Paths look like JavaScript property accessors: `.a.b[2].c`. Dotted
//! segments are object keys, bracketed segments are array indices (or keys,
//! when the bracketed text is not purely numeric).
//!
//! # Example
//!
//! ```
//! use proxserve_path::{split_path, format_path, property_to_path_segment, ContainerKind, PathStep};
//!
//! let steps = split_path(".arr[2].name");
//! assert_eq!(
//!     steps,
//!     vec![PathStep::from("arr"), PathStep::Index(2), PathStep::from("name")]
//! );
//! assert_eq!(format_path(&steps), ".arr[2].name");
//!
//! assert_eq!(property_to_path_segment(ContainerKind::Object, "a"), ".a");
//! assert_eq!(property_to_path_segment(ContainerKind::Array, "3"), "[3]");
//! ```

use thiserror::Error;

pub mod resolve;
pub mod types;

pub use resolve::{resolve, Resolved, Walk};
pub use types::{ContainerKind, PathStep};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid path was given: {0:?}")]
    InvalidPath(String),
    #[error("property {0:?} cannot be expressed as a path segment")]
    NotPathable(String),
}

/// Split a path string into its ordered sequence of steps.
///
/// A single leading `.` or `[` is treated as the opening separator. A
/// bracketed segment made only of ASCII digits becomes [`PathStep::Index`];
/// every other segment stays a [`PathStep::Key`]. The empty string is the
/// empty path.
///
/// # Example
///
/// ```
/// use proxserve_path::{split_path, PathStep};
///
/// assert!(split_path("").is_empty());
/// assert_eq!(split_path("a.b"), vec![PathStep::from("a"), PathStep::from("b")]);
/// assert_eq!(split_path("[0][x]"), vec![PathStep::Index(0), PathStep::from("x")]);
/// assert_eq!(split_path(".list.0"), vec![PathStep::from("list"), PathStep::from("0")]);
/// ```
pub fn split_path(path: &str) -> Vec<PathStep> {
    if path.is_empty() {
        return Vec::new();
    }

    let mut chars = path.chars().peekable();
    let mut bracketed = false;
    match chars.peek() {
        Some('.') => {
            chars.next();
        }
        Some('[') => {
            chars.next();
            bracketed = true;
        }
        _ => {}
    }

    let mut steps = Vec::new();
    let mut part = String::new();
    for c in chars {
        match c {
            '.' | '[' => {
                steps.push(finish_segment(std::mem::take(&mut part), bracketed));
                bracketed = c == '[';
            }
            ']' => {}
            _ => part.push(c),
        }
    }
    steps.push(finish_segment(part, bracketed));
    steps
}

fn finish_segment(part: String, bracketed: bool) -> PathStep {
    if bracketed && is_integer(&part) {
        if let Ok(index) = part.parse::<usize>() {
            return PathStep::Index(index);
        }
    }
    PathStep::Key(part)
}

/// Format steps back into a path string. Inverse of [`split_path`] for
/// pathable keys.
pub fn format_path(steps: &[PathStep]) -> String {
    let mut out = String::new();
    for step in steps {
        match step {
            PathStep::Key(key) => {
                out.push('.');
                out.push_str(key);
            }
            PathStep::Index(index) => {
                out.push('[');
                out.push_str(&index.to_string());
                out.push(']');
            }
        }
    }
    out
}

/// Check if a string consists only of ASCII digits.
pub fn is_integer(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Returns `true` when `key` can be written into a path string without
/// being confused for a separator.
pub fn is_pathable(key: &str) -> bool {
    !key.contains(|c| matches!(c, '.' | '[' | ']'))
}

/// Render the path segment addressing `key` inside a container of `kind`.
///
/// Objects yield `.key`, arrays yield `[key]`. Other container kinds are not
/// implemented; the raw key is returned and a warning is logged.
pub fn property_to_path_segment(kind: ContainerKind, key: &str) -> String {
    match kind {
        ContainerKind::Object => {
            let mut out = String::with_capacity(key.len() + 1);
            out.push('.');
            out.push_str(key);
            out
        }
        ContainerKind::Array => {
            let mut out = String::with_capacity(key.len() + 2);
            out.push('[');
            out.push_str(key);
            out.push(']');
            out
        }
        ContainerKind::Other(type_name) => {
            tracing::warn!(%type_name, %key, "path segment for this container kind is not implemented");
            key.to_string()
        }
    }
}

/// Like [`property_to_path_segment`] but refuses keys that cannot be
/// represented in a path.
///
/// # Errors
///
/// Returns [`PathError::NotPathable`] when `key` contains a separator.
pub fn path_segment(kind: ContainerKind, key: &str) -> Result<String, PathError> {
    if !is_pathable(key) {
        return Err(PathError::NotPathable(key.to_string()));
    }
    Ok(property_to_path_segment(kind, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path(""), Vec::<PathStep>::new());
        assert_eq!(split_path(".a"), vec![PathStep::from("a")]);
        assert_eq!(
            split_path(".a.b[2]"),
            vec![PathStep::from("a"), PathStep::from("b"), PathStep::Index(2)]
        );
        assert_eq!(
            split_path("[1][2]"),
            vec![PathStep::Index(1), PathStep::Index(2)]
        );
        // Non-numeric bracket content stays a key
        assert_eq!(
            split_path(".arr[first]"),
            vec![PathStep::from("arr"), PathStep::from("first")]
        );
        // Dotted digits stay a key
        assert_eq!(split_path(".5"), vec![PathStep::from("5")]);
    }

    #[test]
    fn test_split_path_empty_segments() {
        assert_eq!(split_path("."), vec![PathStep::from("")]);
        assert_eq!(
            split_path(".a..b"),
            vec![PathStep::from("a"), PathStep::from(""), PathStep::from("b")]
        );
    }

    #[test]
    fn test_format_path() {
        assert_eq!(format_path(&[]), "");
        assert_eq!(
            format_path(&[PathStep::from("a"), PathStep::Index(0), PathStep::from("b")]),
            ".a[0].b"
        );
    }

    #[test]
    fn test_property_to_path_segment() {
        assert_eq!(property_to_path_segment(ContainerKind::Object, "x"), ".x");
        assert_eq!(property_to_path_segment(ContainerKind::Array, "0"), "[0]");
        assert_eq!(property_to_path_segment(ContainerKind::Other("String"), "x"), "x");
    }

    #[test]
    fn test_path_segment_rejects_separators() {
        assert_eq!(
            path_segment(ContainerKind::Object, "a.b"),
            Err(PathError::NotPathable("a.b".to_string()))
        );
        assert_eq!(path_segment(ContainerKind::Object, "ab"), Ok(".ab".to_string()));
        assert!(is_pathable("plain"));
        assert!(!is_pathable("x[0]"));
    }

    #[test]
    fn test_is_integer() {
        assert!(is_integer("0"));
        assert!(is_integer("123"));
        assert!(!is_integer(""));
        assert!(!is_integer("-1"));
        assert!(!is_integer("1.5"));
    }
}
