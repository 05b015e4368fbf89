use crate::error::{Error, Result};
use crate::types::is_allowed_name_char;
use std::borrow::Borrow;
use std::fmt;

/// Slash-delimited ancestor chain locating a node in the organizational tree
/// (`"unionId/confId/churchId"`).
///
/// The empty path denotes the system root: it is contained in nothing but
/// contains everything when used as a subtree root.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct HierarchyPath(String);

impl HierarchyPath {
    /// Creates a validated path.
    ///
    /// Segments must be non-empty and drawn from `[A-Za-z0-9_-]`. The empty
    /// string is accepted and denotes the system root.
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        for segment in trimmed.split('/') {
            if segment.is_empty() {
                return Err(Error::InvalidPath(
                    "path must not have empty segments".to_string(),
                ));
            }
            if !segment.chars().all(is_allowed_name_char) {
                return Err(Error::InvalidPath(format!(
                    "path segment {segment:?} contains invalid characters"
                )));
            }
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Creates a path from a trusted string without validation.
    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    /// Returns the system root path.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns whether this is the system root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments; the root has depth 0.
    pub fn depth(&self) -> usize {
        if self.0.is_empty() {
            0
        } else {
            self.0.split('/').count()
        }
    }

    /// Returns whether `self` is a proper ancestor of `other`.
    ///
    /// The comparison is segment-aware: `"12"` is not an ancestor of
    /// `"123/x"`. The root is a proper ancestor of every non-root path.
    pub fn is_ancestor_of(&self, other: &HierarchyPath) -> bool {
        if other.0.is_empty() {
            return false;
        }
        if self.0.is_empty() {
            return true;
        }
        other
            .0
            .strip_prefix(&self.0)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Returns whether `self` lies in the subtree rooted at `root`.
    ///
    /// A path is in its own subtree.
    pub fn is_in_subtree(&self, root: &HierarchyPath) -> bool {
        self == root || root.is_ancestor_of(self)
    }

    /// Returns the parent path, or `None` at the root.
    pub fn parent(&self) -> Option<HierarchyPath> {
        if self.0.is_empty() {
            return None;
        }
        Some(match self.0.rfind('/') {
            Some(idx) => Self(self.0[..idx].to_string()),
            None => Self::root(),
        })
    }

    /// Returns the child path obtained by appending one segment.
    pub fn join(&self, segment: impl AsRef<str>) -> Result<HierarchyPath> {
        let segment = segment.as_ref();
        if segment.is_empty() || !segment.chars().all(is_allowed_name_char) {
            return Err(Error::InvalidPath(format!(
                "segment {segment:?} contains invalid characters"
            )));
        }
        if self.0.is_empty() {
            return Ok(Self(segment.to_string()));
        }
        Ok(Self(format!("{}/{segment}", self.0)))
    }
}

impl fmt::Display for HierarchyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for HierarchyPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for HierarchyPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for HierarchyPath {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}
