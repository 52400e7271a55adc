//! Working-tree filesystem operations
//!
//! The workspace is the only component that touches the working tree. It
//! captures stat metadata for index entries, reads file (and symlink)
//! contents for hashing, and provides the materialization primitives the
//! checkout engine drives.

use crate::artifacts::index::index_entry::EntryMetadata;
use crate::artifacts::index::index_path::IndexPath;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use bytes::Bytes;
use fake::rand;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// Attempts to mint an unused temp file name before giving up.
const TEMP_FILE_ATTEMPTS: usize = 16;

#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>) -> Self {
        Workspace { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve an index path against the work tree root.
    pub fn full_path(&self, path: &IndexPath) -> PathBuf {
        path.to_fs_path(&self.path)
    }

    /// Resolve `<prefix><path>`; the prefix is prepended textually, the way
    /// checkout-index treats it, not joined as a directory.
    pub fn prefixed_path(&self, prefix: &str, path: &IndexPath) -> PathBuf {
        let name = format!("{prefix}{path}");
        let full = Path::new(&name);

        if full.is_absolute() {
            full.to_path_buf()
        } else {
            self.path.join(full)
        }
    }

    /// True if anything (including a dangling symlink) sits at the path.
    pub fn exists(&self, path: &IndexPath) -> bool {
        self.full_path(path).symlink_metadata().is_ok()
    }

    pub fn is_symlink(&self, path: &IndexPath) -> bool {
        self.full_path(path)
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    pub fn readlink(&self, path: &IndexPath) -> anyhow::Result<PathBuf> {
        let full_path = self.full_path(path);
        std::fs::read_link(&full_path)
            .with_context(|| format!("Unable to read link target of {}", full_path.display()))
    }

    pub fn read_file(&self, path: &IndexPath) -> anyhow::Result<Bytes> {
        let full_path = self.full_path(path);
        let content = std::fs::read(&full_path)
            .with_context(|| format!("Unable to read file {}", full_path.display()))?;

        Ok(Bytes::from(content))
    }

    /// The bytes that get hashed for this path: the link target for
    /// symbolic links, the file contents otherwise.
    pub fn file_contents(&self, path: &IndexPath) -> anyhow::Result<Bytes> {
        if self.is_symlink(path) {
            let target = self.readlink(path)?;
            Ok(Bytes::from(target.into_os_string().into_encoded_bytes()))
        } else {
            self.read_file(path)
        }
    }

    /// Capture the stat fields of a path with `lstat` semantics.
    pub fn stat_file(&self, path: &IndexPath) -> anyhow::Result<EntryMetadata> {
        let full_path = self.full_path(path);
        let metadata = full_path
            .symlink_metadata()
            .with_context(|| format!("Unable to stat {}", full_path.display()))?;

        (full_path.as_path(), metadata).try_into()
    }

    pub fn mtime(&self, path: &IndexPath) -> anyhow::Result<i64> {
        Ok(self.stat_file(path)?.mtime)
    }

    /// Cheap-ish cleanliness predicate: hash the working-tree contents and
    /// compare against the recorded id. Any filesystem error counts as
    /// "not clean" so checkout falls through to materialization.
    pub fn is_clean(&self, path: &IndexPath, oid: &ObjectId) -> bool {
        self.file_contents(path)
            .map(Blob::new)
            .and_then(|blob| blob.object_id())
            .map(|actual| actual == *oid)
            .unwrap_or(false)
    }

    /// The working-tree paths that block a checkout of `files`: a
    /// non-directory sitting where a directory must be created, or a
    /// directory occupying a path where a file must be written. Removing
    /// every returned path unblocks the checkout.
    pub fn killed_files(&self, files: &[IndexPath]) -> Vec<IndexPath> {
        let mut killed: Vec<IndexPath> = Vec::new();

        for file in files {
            let full = self.full_path(file);

            // at most one ancestor can exist as a non-directory; anything
            // below it cannot exist at all
            let mut blocker = None;
            let mut ancestor = full.parent();
            while let Some(dir) = ancestor {
                if dir == self.path.as_ref() || !dir.starts_with(self.path.as_ref()) {
                    break;
                }
                if let Ok(metadata) = dir.symlink_metadata()
                    && !metadata.is_dir()
                {
                    blocker = Some(dir.to_path_buf());
                }
                ancestor = dir.parent();
            }

            let kill = match blocker {
                Some(blocker) => blocker
                    .strip_prefix(self.path.as_ref())
                    .ok()
                    .and_then(|relative| IndexPath::from_workdir(relative).ok()),
                None if full.is_dir() => Some(file.clone()),
                None => None,
            };

            if let Some(kill) = kill
                && !killed.contains(&kill)
            {
                killed.push(kill);
            }
        }

        killed
    }

    pub fn write_file(&self, target: &Path, data: &[u8], mode: u32) -> anyhow::Result<()> {
        std::fs::write(target, data)
            .with_context(|| format!("Failed to write to file: {}", target.display()))?;
        self.chmod(target, mode)
    }

    pub fn chmod(&self, target: &Path, mode: u32) -> anyhow::Result<()> {
        std::fs::set_permissions(target, std::fs::Permissions::from_mode(mode))
            .with_context(|| format!("Failed to set permissions for file: {}", target.display()))
    }

    pub fn mkdir_all(&self, dir: &Path, mode: u32) -> anyhow::Result<()> {
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))
    }

    pub fn remove_file(&self, target: &Path) -> anyhow::Result<()> {
        std::fs::remove_file(target)
            .with_context(|| format!("Failed to remove file: {}", target.display()))
    }

    /// Remove a file or directory tree; a missing target is not an error.
    pub fn remove_all(&self, target: &Path) -> anyhow::Result<()> {
        let metadata = match target.symlink_metadata() {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e).context(format!("Failed to stat: {}", target.display()));
            }
        };

        if metadata.is_dir() {
            std::fs::remove_dir_all(target)
        } else {
            std::fs::remove_file(target)
        }
        .with_context(|| format!("Failed to remove: {}", target.display()))
    }

    /// Create a fresh exclusively-owned temp file under `dir`, named
    /// `<prefix><random>`. Returns the bare name together with the handle.
    pub fn temp_file(&self, dir: &Path, prefix: &str) -> anyhow::Result<(String, std::fs::File)> {
        for _ in 0..TEMP_FILE_ATTEMPTS {
            let name = format!("{}{}", prefix, rand::random::<u32>());

            match OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(dir.join(&name))
            {
                Ok(file) => return Ok((name, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(e).context(format!(
                        "Unable to create temp file in {}",
                        dir.display()
                    ));
                }
            }
        }

        anyhow::bail!("Unable to find a free temp file name in {}", dir.display())
    }
}
