//! Common types used throughout the storage facade.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// A path within a storage root, independent of the underlying provider.
///
/// Facade paths are always relative to the configured root; a leading `/`
/// is accepted and ignored. Components may not be `.` or `..`, so a path can
/// never escape its root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoragePath {
    components: Vec<String>,
}

impl StoragePath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Create a path from string components.
    ///
    /// # Errors
    /// - A component is empty, `.`, `..`, or contains a separator
    pub fn from_components(components: Vec<String>) -> crate::Result<Self> {
        for comp in &components {
            validate_component(comp)?;
        }
        Ok(Self { components })
    }

    /// Parse a path string into a StoragePath.
    ///
    /// Accepts both `/` and `\` as separators. Repeated separators collapse.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let components: Vec<String> = path
            .split(['/', '\\'])
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();
        Self::from_components(components)
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the parent path, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let mut components = self.components.clone();
            components.pop();
            Some(Self { components })
        }
    }

    /// Get the file/folder name (last component).
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Join this path with a child component.
    pub fn join(&self, child: &str) -> crate::Result<Self> {
        validate_component(child)?;
        let mut components = self.components.clone();
        components.push(child.to_string());
        Ok(Self { components })
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Convert to a root-relative string (`a/b/c`, empty for the root).
    pub fn to_relative_string(&self) -> String {
        self.components.join("/")
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.components.join("/"))
    }
}

fn validate_component(comp: &str) -> crate::Result<()> {
    if comp.is_empty() {
        return Err(crate::Error::InvalidInput(
            "Path component cannot be empty".to_string(),
        ));
    }
    if comp.contains('/') || comp.contains('\\') {
        return Err(crate::Error::InvalidInput(
            "Path component cannot contain separators".to_string(),
        ));
    }
    if comp == "." || comp == ".." {
        return Err(crate::Error::InvalidInput(format!(
            "Path component '{}' is not allowed",
            comp
        )));
    }
    Ok(())
}

/// Credential string wrapper that zeroizes on drop and never prints its value.
#[derive(Clone, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct Secret(String);

impl Secret {
    /// Wrap a credential value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the credential value.
    ///
    /// Callers must not log the returned string.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_storage_path_root() {
        let path = StoragePath::parse("/").unwrap();
        assert!(path.is_root());
        assert_eq!(path.to_string(), "/");
        assert_eq!(path.to_relative_string(), "");
    }

    #[test]
    fn test_storage_path_parse() {
        let path = StoragePath::parse("/foo//bar/baz/").unwrap();
        assert_eq!(path.components(), &["foo", "bar", "baz"]);
        assert_eq!(path.to_string(), "/foo/bar/baz");
        assert_eq!(path.to_relative_string(), "foo/bar/baz");
    }

    #[test]
    fn test_storage_path_rejects_traversal() {
        assert!(StoragePath::parse("../etc/passwd").is_err());
        assert!(StoragePath::parse("a/./b").is_err());
        assert!(StoragePath::root().join("..").is_err());
    }

    #[test]
    fn test_storage_path_parent_and_name() {
        let path = StoragePath::parse("docs\\reports\\q1.pdf").unwrap();
        assert_eq!(path.name(), Some("q1.pdf"));
        assert_eq!(path.parent().unwrap().to_string(), "/docs/reports");
        assert!(StoragePath::root().parent().is_none());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("AKIA-very-secret");
        assert_eq!(format!("{:?}", secret), "Secret([REDACTED])");
        assert_eq!(secret.expose(), "AKIA-very-secret");
    }

    proptest! {
        #[test]
        fn prop_parsed_paths_never_escape_root(raw in "[a-z./]{0,24}") {
            if let Ok(path) = StoragePath::parse(&raw) {
                prop_assert!(path.components().iter().all(|c| c != ".." && c != "."));
            }
        }

        #[test]
        fn prop_display_round_trips(parts in proptest::collection::vec("[a-z0-9_-]{1,8}", 0..5)) {
            let path = StoragePath::from_components(parts.clone()).unwrap();
            let reparsed = StoragePath::parse(&path.to_string()).unwrap();
            prop_assert_eq!(reparsed, path);
        }
    }
}
