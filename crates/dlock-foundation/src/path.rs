//! Hierarchical node path helpers
//!
//! Paths are absolute, `/`-separated, with no empty segments and no
//! trailing separator (the root is `/`).

use crate::error::CoordinationError;

pub const SEPARATOR: char = '/';
pub const ROOT: &str = "/";

/// Validate an absolute node path
pub fn validate(path: &str) -> Result<(), CoordinationError> {
    if path == ROOT {
        return Ok(());
    }
    if !path.starts_with(SEPARATOR) || path.ends_with(SEPARATOR) {
        return Err(CoordinationError::BadPath(path.to_string()));
    }
    if path[1..].split(SEPARATOR).any(|segment| segment.is_empty()) {
        return Err(CoordinationError::BadPath(path.to_string()));
    }
    Ok(())
}

/// Join a parent path and a child name
pub fn join(parent: &str, child: &str) -> String {
    if parent == ROOT {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Split a path into (parent, name). The root has no parent.
pub fn split(path: &str) -> Option<(&str, &str)> {
    if path == ROOT {
        return None;
    }
    let idx = path.rfind(SEPARATOR)?;
    let parent = if idx == 0 { ROOT } else { &path[..idx] };
    Some((parent, &path[idx + 1..]))
}

/// Last segment of a path
pub fn name(path: &str) -> &str {
    split(path).map(|(_, name)| name).unwrap_or(path)
}
