//! Repository wiring
//!
//! Resolves the repository layout — dot-dir, work tree, index file — from
//! the conventional environment variables and hands out the collaborating
//! components. This is the main entry point for library consumers.
//!
//! ## Environment
//!
//! - `GIT_DIR`: overrides the dot-dir location (default `<root>/.git`).
//! - `GIT_WORK_TREE`: overrides the work tree root (default `<root>`).
//! - `GIT_INDEX_FILE`: overrides the index file path (default
//!   `<git_dir>/index`), when set and non-empty.

use crate::areas::checkout::{CheckoutEngine, CheckoutIndexOptions};
use crate::areas::index::{Index, UpdateIndexOptions};
use crate::areas::object_store::ObjectStore;
use crate::areas::refs::Refs;
use crate::areas::workspace::Workspace;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_path::IndexPath;
use crate::artifacts::index::stage::Stage;
use crate::artifacts::objects::object_id::ObjectId;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// Repository dot-dir name
const GIT_DIR: &str = ".git";

/// Object database directory name
const OBJECTS_DIR: &str = "objects";

/// Index file name
const INDEX_FILE: &str = "index";

pub struct Repository {
    /// Work tree root
    path: Box<Path>,
    /// Repository dot-dir
    git_dir: Box<Path>,
    index: Index,
    object_store: ObjectStore,
    workspace: Workspace,
    refs: Refs,
}

impl Repository {
    /// Open an existing repository rooted at `path`.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let path = path.canonicalize()?;
        let git_dir = Self::resolve_git_dir(&path);

        if !git_dir.exists() {
            anyhow::bail!("fatal: Not a git repository: {}", git_dir.display());
        }

        Self::assemble(path, git_dir)
    }

    /// Create the repository layout at `path` (dot-dir and objects
    /// directory) and open it.
    pub fn init(path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(path)?;
        let path = path.canonicalize()?;
        let git_dir = Self::resolve_git_dir(&path);

        std::fs::create_dir_all(git_dir.join(OBJECTS_DIR))?;
        std::fs::create_dir_all(git_dir.join("refs").join("heads"))?;

        Self::assemble(path, git_dir)
    }

    fn assemble(path: PathBuf, git_dir: PathBuf) -> anyhow::Result<Self> {
        let work_tree = match non_empty_env("GIT_WORK_TREE") {
            Some(dir) => PathBuf::from(dir).canonicalize()?,
            None => path.clone(),
        };
        let index_path = match non_empty_env("GIT_INDEX_FILE") {
            Some(file) => PathBuf::from(file),
            None => git_dir.join(INDEX_FILE),
        };

        Ok(Repository {
            index: Index::new(index_path.into_boxed_path()),
            object_store: ObjectStore::new(git_dir.join(OBJECTS_DIR).into_boxed_path()),
            workspace: Workspace::new(work_tree.into_boxed_path()),
            refs: Refs::new(git_dir.clone().into_boxed_path()),
            git_dir: git_dir.into_boxed_path(),
            path: path.into_boxed_path(),
        })
    }

    fn resolve_git_dir(root: &Path) -> PathBuf {
        match non_empty_env("GIT_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => root.join(GIT_DIR),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut Index {
        &mut self.index
    }

    pub fn object_store(&self) -> &ObjectStore {
        &self.object_store
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    /// Stage one working-tree file.
    pub fn add_file(&mut self, path: &IndexPath, opts: &UpdateIndexOptions) -> anyhow::Result<()> {
        self.index
            .add_file(&self.workspace, &self.object_store, path, opts)
    }

    /// Record a hash for `(path, stage)` directly, the update-index way.
    #[allow(clippy::too_many_arguments)]
    pub fn add_stage(
        &mut self,
        path: &IndexPath,
        mode: EntryMode,
        oid: ObjectId,
        stage: Stage,
        size: u32,
        mtime: i64,
        opts: &UpdateIndexOptions,
    ) -> anyhow::Result<()> {
        self.index
            .add_stage(&self.workspace, path, mode, oid, stage, size, mtime, opts)
    }

    /// Run checkout-index over the given paths, writing reports to `out`
    /// and per-file errors to `err`.
    pub fn checkout_index(
        &mut self,
        opts: &CheckoutIndexOptions,
        files: &[IndexPath],
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> anyhow::Result<()> {
        CheckoutEngine::new(
            &self.workspace,
            &self.object_store,
            &mut self.index,
            out,
            err,
        )
        .checkout_index(opts, files)
    }

    /// Run checkout-index over a delimiter-separated file list read from
    /// `reader`.
    pub fn checkout_index_from_reader(
        &mut self,
        opts: &CheckoutIndexOptions,
        reader: impl BufRead,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> anyhow::Result<()> {
        CheckoutEngine::new(
            &self.workspace,
            &self.object_store,
            &mut self.index,
            out,
            err,
        )
        .checkout_index_from_reader(opts, reader)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}
