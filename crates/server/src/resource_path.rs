//! Sandboxes resolution of on-disk resource names under a configured
//! root directory, rejecting any name that would escape it.

use std::path::{Path, PathBuf};

/// Resolves user-supplied resource names against a fixed root, lazily
/// creating the root directory the first time resolution succeeds.
pub struct ResourcePath {
    root: PathBuf,
}

impl ResourcePath {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Joins `name` onto the root and rejects the result unless its parent
    /// is exactly the root directory — this blocks `..` traversal and
    /// absolute-path overrides in one check.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let candidate = self.root.join(name);
        if candidate.parent() != Some(self.root.as_path()) {
            tracing::warn!(name, "resource path escapes the resource directory");
            return None;
        }
        if !self.root.exists() {
            if let Err(error) = std::fs::create_dir_all(&self.root) {
                tracing::warn!(%error, root = %self.root.display(), "failed to create resource directory");
                return None;
            }
        }
        Some(candidate)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn accepts_plain_file_name() {
        let dir = tempdir().unwrap();
        let resource = ResourcePath::new(dir.path());
        let resolved = resource.resolve("map.pbstream").unwrap();
        assert_eq!(resolved, dir.path().join("map.pbstream"));
    }

    #[test]
    fn rejects_parent_traversal() {
        let dir = tempdir().unwrap();
        let resource = ResourcePath::new(dir.path());
        assert!(resource.resolve("../escape.pbstream").is_none());
    }

    #[test]
    fn rejects_nested_subdirectory() {
        let dir = tempdir().unwrap();
        let resource = ResourcePath::new(dir.path());
        assert!(resource.resolve("sub/map.pbstream").is_none());
    }

    #[test]
    fn creates_root_lazily() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("resources");
        let resource = ResourcePath::new(&root);
        assert!(!root.exists());
        resource.resolve("map.pbstream").unwrap();
        assert!(root.exists());
    }
}
