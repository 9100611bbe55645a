//! Object path type with validated components.

use std::fmt;

use crate::{Error, Result};

/// A validated bus object path such as `/org/freedesktop/Test`.
///
/// Components are non-empty and made of ASCII letters, digits and
/// underscores. The root path `/` has no components. Ordering is by
/// components, so a parent always sorts before its descendants.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectPath {
    components: Vec<String>,
}

impl ObjectPath {
    /// The root path `/`.
    pub fn root() -> Self {
        ObjectPath {
            components: Vec::new(),
        }
    }

    /// Parse a path string, rejecting anything that is not well formed.
    ///
    /// Unlike store paths, object paths are not normalized: a missing
    /// leading slash, a trailing slash or `//` are errors.
    ///
    /// ```rust
    /// use busmock_core::ObjectPath;
    ///
    /// let path = ObjectPath::parse("/org/freedesktop/Test").unwrap();
    /// assert_eq!(path.len(), 3);
    /// assert!(ObjectPath::parse("/org/").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |message: &str| Error::InvalidPath {
            path: s.to_string(),
            message: message.to_string(),
        };

        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| invalid("must start with '/'"))?;
        if rest.is_empty() {
            return Ok(Self::root());
        }

        let mut components = Vec::new();
        for component in rest.split('/') {
            if component.is_empty() {
                return Err(invalid("empty path element"));
            }
            if let Some(c) = component
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
            {
                return Err(invalid(&format!("invalid character '{}'", c)));
            }
            components.push(component.to_string());
        }

        Ok(ObjectPath { components })
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Same as [`is_root`](Self::is_root).
    pub fn is_empty(&self) -> bool {
        self.is_root()
    }

    /// Iterate over components.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.components.iter()
    }

    /// Parent path, or `None` for the root.
    pub fn parent(&self) -> Option<ObjectPath> {
        if self.is_root() {
            return None;
        }
        Some(ObjectPath {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    /// Append one component.
    pub fn child(&self, name: &str) -> Result<ObjectPath> {
        let mut components = self.components.clone();
        components.push(name.to_string());
        ObjectPath::parse(&format!("/{}", components.join("/")))
    }

    /// Check if this path is `prefix` or lies below it.
    pub fn has_prefix(&self, prefix: &ObjectPath) -> bool {
        prefix.components.len() <= self.components.len()
            && prefix.components == self.components[..prefix.components.len()]
    }

    /// Check if this path lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &ObjectPath) -> bool {
        self.components.len() > ancestor.components.len() && self.has_prefix(ancestor)
    }

    /// The first component below `ancestor`, if this path is a descendant.
    pub fn child_name_under(&self, ancestor: &ObjectPath) -> Option<&str> {
        if self.is_descendant_of(ancestor) {
            Some(self.components[ancestor.components.len()].as_str())
        } else {
            None
        }
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.components.join("/"))
    }
}

impl std::str::FromStr for ObjectPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ObjectPath::parse(s)
    }
}

/// Macro for object path literals.
///
/// ```rust
/// use busmock_core::object_path;
///
/// let p = object_path!("/org/example");
/// assert_eq!(p.len(), 2);
/// ```
#[macro_export]
macro_rules! object_path {
    ($s:expr) => {
        $crate::ObjectPath::parse($s).expect("invalid object path literal")
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_paths() {
        assert_eq!(object_path!("/").len(), 0);
        assert_eq!(object_path!("/foo").len(), 1);
        assert_eq!(object_path!("/foo/bar_2/Baz").len(), 3);
    }

    #[test]
    fn malformed_paths_rejected() {
        assert!(ObjectPath::parse("").is_err());
        assert!(ObjectPath::parse("foo").is_err());
        assert!(ObjectPath::parse("/foo/").is_err());
        assert!(ObjectPath::parse("//foo").is_err());
        assert!(ObjectPath::parse("/foo//bar").is_err());
        assert!(ObjectPath::parse("/foo-bar").is_err());
        assert!(ObjectPath::parse("/foo.bar").is_err());
    }

    #[test]
    fn invalid_path_error_mentions_reason() {
        let err = ObjectPath::parse("/a b").unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
        assert!(err.to_string().contains("invalid character ' '"));
    }

    #[test]
    fn display_roundtrips() {
        for s in ["/", "/a", "/a/b/c"] {
            assert_eq!(object_path!(s).to_string(), s);
        }
    }

    #[test]
    fn parent_and_child() {
        let p = object_path!("/a/b");
        assert_eq!(p.parent(), Some(object_path!("/a")));
        assert_eq!(object_path!("/a").parent(), Some(ObjectPath::root()));
        assert_eq!(ObjectPath::root().parent(), None);
        assert_eq!(p.child("c").unwrap(), object_path!("/a/b/c"));
        assert!(p.child("c-d").is_err());
    }

    #[test]
    fn prefix_relations() {
        let p = object_path!("/a/b/c");
        assert!(p.has_prefix(&ObjectPath::root()));
        assert!(p.has_prefix(&object_path!("/a/b/c")));
        assert!(p.is_descendant_of(&object_path!("/a")));
        assert!(!p.is_descendant_of(&object_path!("/a/b/c")));
        assert!(!object_path!("/ab").is_descendant_of(&object_path!("/a")));
        assert_eq!(p.child_name_under(&object_path!("/a")), Some("b"));
        assert_eq!(p.child_name_under(&object_path!("/x")), None);
    }

    #[test]
    fn parents_sort_before_children() {
        let mut paths = vec![object_path!("/x/y"), object_path!("/x"), object_path!("/")];
        paths.sort();
        assert_eq!(
            paths,
            vec![object_path!("/"), object_path!("/x"), object_path!("/x/y")]
        );
    }
}
