//! Working-tree paths as stored in the index
//!
//! Index paths are forward-slash separated, relative to the work tree root,
//! with no leading slash and no NUL bytes. Their ordering is
//! byte-lexicographic on the underlying UTF-8, which places a path before
//! every slash-extension of it ("a" < "a/b" < "ab").

use anyhow::anyhow;
use std::path::{Component, Path, PathBuf};

/// A canonicalized working-tree path.
///
/// Equality is byte-exact; ordering is byte-lexicographic (the derived
/// order on the inner `String` compares bytes).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexPath(String);

impl IndexPath {
    /// Parse and validate a path.
    ///
    /// Rejects empty paths, embedded NUL bytes, leading slashes, and
    /// `.`/`..` components.
    pub fn try_parse(path: impl Into<String>) -> anyhow::Result<Self> {
        let path = path.into();

        if path.is_empty() {
            return Err(anyhow!("Index paths must not be empty"));
        }
        if path.contains('\0') {
            return Err(anyhow!("Index paths must not contain NUL bytes"));
        }
        if path.starts_with('/') {
            return Err(anyhow!("Index paths must be relative: {}", path));
        }
        if path.split('/').any(|c| c.is_empty() || c == "." || c == "..") {
            return Err(anyhow!("Invalid index path: {}", path));
        }

        Ok(Self(path))
    }

    pub(crate) fn from_bytes(bytes: Vec<u8>) -> anyhow::Result<Self> {
        let path = String::from_utf8(bytes).map_err(|_| anyhow!("Invalid UTF-8 in entry path"))?;
        Self::try_parse(path)
    }

    /// Normalize an OS path (relative to the work tree root) into an index
    /// path: `./` components are dropped and the rest joined with forward
    /// slashes.
    pub fn from_workdir(path: &Path) -> anyhow::Result<Self> {
        let mut components = Vec::new();
        for component in path.components() {
            match component {
                Component::CurDir => continue,
                Component::Normal(name) => components.push(
                    name.to_str()
                        .ok_or_else(|| anyhow!("Invalid file name in {:?}", path))?,
                ),
                _ => return Err(anyhow!("Path escapes the work tree: {:?}", path)),
            }
        }

        Self::try_parse(components.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `self` lives under `parent`, i.e. `self` is
    /// `<parent>/<suffix>` for a non-empty suffix.
    pub fn is_under(&self, parent: &IndexPath) -> bool {
        self.0.starts_with(parent.as_str()) && self.0.as_bytes().get(parent.len()) == Some(&b'/')
    }

    /// Resolve against a filesystem root.
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl AsRef<str> for IndexPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IndexPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
