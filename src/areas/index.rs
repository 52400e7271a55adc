//! The index (staging area)
//!
//! An ordered collection of entries keyed by `(path, stage)`. The key
//! ordering — byte-lexicographic path, then stage — is exactly the on-disk
//! entry order, so serialization walks the map front to back and every
//! mutation keeps the sort invariant structurally.
//!
//! ## Persistence
//!
//! Loading takes a shared lock on the index file, streams the header and
//! entries through the SHA-1 framing, and verifies the trailer (with a
//! bounded retry, so a reader racing a writer settles on a consistent
//! snapshot). Writing streams into a sibling `<path>.lock` file created
//! with `O_CREAT|O_EXCL` and atomically renames it into place.

use crate::areas::object_store::ObjectStore;
use crate::areas::workspace::Workspace;
use crate::artifacts::core::IndexError;
use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::index_path::IndexPath;
use crate::artifacts::index::stage::Stage;
use crate::artifacts::index::{HEADER_SIZE, SIGNATURE, VERSION_2, VERSION_3};
use crate::artifacts::objects::object::Packable;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// How often a verifying load retries after a trailer mismatch before
/// reporting corruption.
const READ_RETRIES: usize = 3;

/// Options accepted by the entry-mutating operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateIndexOptions {
    /// Create the entry when the `(path, stage)` pair is not present.
    pub add: bool,
    /// Silently drop entries that conflict with the new path instead of
    /// failing.
    pub replace: bool,
}

/// The up-to-three conflict entries recorded for an unmerged path.
#[derive(Debug, Default)]
pub struct UnmergedPath<'i> {
    pub stage1: Option<&'i IndexEntry>,
    pub stage2: Option<&'i IndexEntry>,
    pub stage3: Option<&'i IndexEntry>,
}

/// Collaborator contract for `reset_to_tree`: expanding a tree object into
/// the flat, fully recursive list of entries it describes is owned by the
/// tree machinery, not by the index.
pub trait TreeExpander {
    fn expand_tree_into_entries(&self, tree: &ObjectId) -> anyhow::Result<Vec<IndexEntry>>;
}

#[derive(Debug)]
pub struct Index {
    /// Path to the index file (typically `<git_dir>/index`)
    path: Box<Path>,
    /// Entries keyed and ordered by `(path, stage)`
    entries: BTreeMap<(IndexPath, Stage), IndexEntry>,
    /// Index file header metadata
    header: IndexHeader,
    /// Whether the in-memory state has diverged from disk
    changed: bool,
}

impl Index {
    pub fn new(path: Box<Path>) -> Self {
        Index {
            path,
            entries: BTreeMap::new(),
            header: IndexHeader::empty(),
            changed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        self.header.version()
    }

    pub fn entry_count(&self) -> u32 {
        self.header.entries_count()
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Entries in on-disk order: byte-lexicographic by path, stage
    /// ascending within a path.
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.header = IndexHeader::empty();
        self.changed = false;
    }

    /// Load the index from disk, verifying the trailer checksum.
    ///
    /// A missing index file yields a fresh empty index. A trailer mismatch
    /// is retried a bounded number of times to tolerate a concurrent
    /// writer, then surfaces as corruption.
    pub fn rehydrate(&mut self) -> anyhow::Result<()> {
        self.load(true)
    }

    /// Load without failing on a trailer mismatch; a mismatch is only
    /// logged. Entry-level corruption is still fatal.
    pub fn rehydrate_unverified(&mut self) -> anyhow::Result<()> {
        self.load(false)
    }

    fn load(&mut self, verify: bool) -> anyhow::Result<()> {
        if !self.path.exists() {
            self.clear();
            return Ok(());
        }

        let mut attempt = 0;
        loop {
            match self.try_load(verify) {
                Ok(()) => return Ok(()),
                Err(e) if verify && attempt + 1 < READ_RETRIES && is_checksum_mismatch(&e) => {
                    tracing::debug!(
                        attempt,
                        "index trailer mismatch, retrying in case a writer is mid-flight"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn try_load(&mut self, verify: bool) -> anyhow::Result<()> {
        let mut index_file = std::fs::OpenOptions::new().read(true).open(self.path())?;
        let mut lock = file_guard::lock(&mut index_file, file_guard::Lock::Shared, 0, 1)?;

        self.clear();

        // a zero-length file is what a freshly created index looks like
        // before its first write; treat it as empty
        if lock.metadata()?.len() == 0 {
            return Ok(());
        }

        let mut reader = Checksum::new(&mut *lock);
        let (version, entries_count) = Self::parse_header(&mut reader)?;
        tracing::debug!(version, entries_count, "loading index");
        self.header = IndexHeader::new(String::from(SIGNATURE), version, 0);

        self.parse_entries(version, entries_count, &mut reader)?;

        match reader.verify() {
            Ok(()) => Ok(()),
            Err(e) if !verify => {
                tracing::warn!(error = %e, "index trailer verification skipped");
                Ok(())
            }
            Err(e) => Err(IndexError::Invalid(e.to_string()).into()),
        }
    }

    fn parse_header<R: Read>(reader: &mut Checksum<R>) -> anyhow::Result<(u32, u32)> {
        let header_bytes = reader.read(HEADER_SIZE)?;
        let header = IndexHeader::deserialize(&header_bytes)?;

        if header.marker != SIGNATURE {
            return Err(IndexError::Invalid(String::from("Invalid index file signature")).into());
        }
        if header.version < VERSION_2 || header.version > 4 {
            return Err(IndexError::Invalid(format!(
                "Unsupported index file version: {}",
                header.version
            ))
            .into());
        }
        if header.version == 4 {
            return Err(IndexError::Invalid(String::from(
                "Index version 4 (path compression) is not supported",
            ))
            .into());
        }

        Ok((header.version, header.entries_count))
    }

    /// Parse the declared number of entries. Structural corruption
    /// (extended flags in a v2 file, bad modes) aborts the load; a
    /// truncated tail is logged and skipped.
    fn parse_entries<R: Read>(
        &mut self,
        version: u32,
        entries_count: u32,
        reader: &mut Checksum<R>,
    ) -> anyhow::Result<()> {
        for _ in 0..entries_count {
            match IndexEntry::read_from(reader, version) {
                Ok(entry) => {
                    tracing::debug!(path = %entry.path, "read entry");
                    self.store_entry(entry);
                }
                Err(e) if e.downcast_ref::<IndexError>().is_some() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable index entry");
                    break;
                }
            }
        }

        self.header.entries_count = self.entries.len() as u32;

        Ok(())
    }

    fn store_entry(&mut self, entry: IndexEntry) {
        self.entries
            .insert((entry.path.clone(), entry.stage()), entry);
    }

    /// Serialize the index deterministically into `writer`: header, sorted
    /// entries, SHA-1 trailer. The header version and entry count are
    /// recomputed so the output always satisfies the format invariants.
    pub fn write_to<W: Write>(&mut self, writer: W) -> anyhow::Result<()> {
        // the version is 3 exactly when some entry carries the extended word
        let version = if self.entries.values().any(|e| e.flags.extended()) {
            VERSION_3
        } else {
            VERSION_2
        };
        self.header = IndexHeader::new(String::from(SIGNATURE), version, self.entries.len() as u32);

        let mut writer = Checksum::new(writer);
        writer.write(&self.header.serialize()?)?;

        for entry in self.entries.values() {
            writer.write(&entry.serialize()?)?;
        }

        writer.write_checksum()
    }

    /// Persist the index atomically: stream into `<path>.lock` (created
    /// exclusively, so concurrent writers exclude each other) and rename
    /// over the index file.
    pub fn write_updates(&mut self) -> anyhow::Result<()> {
        let lock_path = self.lock_path();
        let mut lock_file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .with_context(|| format!("Unable to create lock file {}", lock_path.display()))?;

        let written = self
            .write_to(&mut lock_file)
            .and_then(|_| lock_file.sync_all().map_err(Into::into));
        drop(lock_file);

        if let Err(e) = written {
            let _ = std::fs::remove_file(&lock_path);
            return Err(e);
        }

        if let Err(e) = std::fs::rename(&lock_path, self.path()) {
            let _ = std::fs::remove_file(&lock_path);
            return Err(e).context(format!(
                "Unable to move {} into place",
                lock_path.display()
            ));
        }

        self.changed = false;

        Ok(())
    }

    fn lock_path(&self) -> PathBuf {
        let mut file_name = self.path.as_os_str().to_os_string();
        file_name.push(".lock");
        PathBuf::from(file_name)
    }

    fn stage_range(
        &self,
        path: &IndexPath,
    ) -> std::ops::RangeInclusive<(IndexPath, Stage)> {
        (path.clone(), Stage::Zero)..=(path.clone(), Stage::Three)
    }

    /// All entries recorded for a path, lowest stage first.
    pub fn all_stages(&self, path: &IndexPath) -> Vec<&IndexEntry> {
        self.entries.range(self.stage_range(path)).map(|(_, e)| e).collect()
    }

    /// The first (lowest-stage) entry for a path, typically stage 0.
    pub fn get(&self, path: &IndexPath) -> Option<&IndexEntry> {
        self.entries
            .range(self.stage_range(path))
            .map(|(_, e)| e)
            .next()
    }

    /// The hash recorded for a path, or the zero id when absent.
    pub fn get_sha1(&self, path: &IndexPath) -> ObjectId {
        self.get(path)
            .map(|entry| entry.oid.clone())
            .unwrap_or_else(ObjectId::zero)
    }

    /// Path-keyed view of the entries. When a path is unmerged the highest
    /// stage wins, matching iteration order.
    pub fn map_by_path(&self) -> HashMap<&IndexPath, &IndexEntry> {
        self.entries.values().map(|e| (&e.path, e)).collect()
    }

    /// `(path, stage)`-keyed view of the entries.
    pub fn stage_map(&self) -> HashMap<(&IndexPath, Stage), &IndexEntry> {
        self.entries
            .values()
            .map(|e| ((&e.path, e.stage()), e))
            .collect()
    }

    /// Unmerged paths and their conflict entries, grouped by path.
    pub fn unmerged(&self) -> BTreeMap<&IndexPath, UnmergedPath<'_>> {
        let mut unmerged: BTreeMap<&IndexPath, UnmergedPath<'_>> = BTreeMap::new();

        for entry in self.entries.values() {
            if entry.stage() == Stage::Zero {
                continue;
            }

            let unmerged_path = unmerged.entry(&entry.path).or_default();
            match entry.stage() {
                Stage::One => unmerged_path.stage1 = Some(entry),
                Stage::Two => unmerged_path.stage2 = Some(entry),
                Stage::Three => unmerged_path.stage3 = Some(entry),
                Stage::Zero => {}
            }
        }

        unmerged
    }

    /// Record a hash for `(path, stage)`.
    ///
    /// An existing entry is overwritten (its stat refreshed first when the
    /// working-tree file exists and the stage is 0); a missing one is
    /// created when `opts.add` allows it. A stage-0 add clears any leftover
    /// merge stages for the path, and the parent/child scan rejects — or,
    /// with `opts.replace`, drops — entries the new path would shadow.
    ///
    /// The operation is atomic: every failure path leaves the index
    /// untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn add_stage(
        &mut self,
        workspace: &Workspace,
        path: &IndexPath,
        mode: EntryMode,
        oid: ObjectId,
        stage: Stage,
        size: u32,
        mtime: i64,
        opts: &UpdateIndexOptions,
    ) -> anyhow::Result<()> {
        let target = (path.clone(), stage);
        let exists = self.entries.contains_key(&target);

        if !exists && !opts.add {
            return Err(IndexError::NotFound(path.to_string()).into());
        }

        // plan: collect the entries the new path would shadow before
        // touching anything, so a rejection leaves the index unchanged
        let mut drops: Vec<(IndexPath, Stage)> = Vec::new();
        if stage == Stage::Zero {
            for key in self.entries.keys() {
                let other = &key.0;
                if other.is_under(path) {
                    if !opts.replace {
                        return Err(IndexError::Conflict(format!(
                            "There is an existing file {} under {}, should it be replaced?",
                            other, path
                        ))
                        .into());
                    }
                    drops.push(key.clone());
                } else if path.is_under(other) {
                    if !opts.replace {
                        return Err(IndexError::Conflict(format!(
                            "There is a parent file {} above {}, should it be replaced?",
                            other, path
                        ))
                        .into());
                    }
                    drops.push(key.clone());
                }
            }
        }

        let stat = if workspace.exists(path) {
            workspace.stat_file(path).ok()
        } else {
            None
        };

        // apply
        for key in &drops {
            self.entries.remove(key);
        }

        if let Some(entry) = self.entries.get_mut(&target) {
            if stage == Stage::Zero
                && let Some(stat) = &stat
            {
                entry.refresh_stat(stat);
            }
            entry.oid = oid;
            entry.metadata.mtime = mtime;
            entry.metadata.size = size;
        } else {
            let mut entry = IndexEntry::create(path.clone(), oid, mode, stage, size, mtime);
            if let Some(stat) = &stat {
                entry.refresh_stat(stat);
            }
            self.entries.insert(target, entry);
        }

        if stage == Stage::Zero {
            self.remove_unmerged_stages(path);
        }

        self.header.entries_count = self.entries.len() as u32;
        self.changed = true;

        Ok(())
    }

    /// Drop every merge-stage entry for a path, keeping the stage-0 entry
    /// if present.
    pub fn remove_unmerged_stages(&mut self, path: &IndexPath) {
        for stage in [Stage::One, Stage::Two, Stage::Three] {
            self.entries.remove(&(path.clone(), stage));
        }

        self.header.entries_count = self.entries.len() as u32;
        self.changed = true;
    }

    /// Remove the first (lowest-stage) entry recorded for a path.
    pub fn remove(&mut self, path: &IndexPath) {
        let key = self
            .entries
            .range(self.stage_range(path))
            .map(|(key, _)| key.clone())
            .next();

        if let Some(key) = key {
            self.entries.remove(&key);
            self.header.entries_count = self.entries.len() as u32;
            self.changed = true;
        }
    }

    /// Toggle the skip-worktree bit on a path's stage-0 entry. Setting it
    /// upgrades the index to version 3.
    pub fn set_skip_worktree(&mut self, path: &IndexPath, value: bool) -> anyhow::Result<()> {
        if let Some(entry) = self.entries.get_mut(&(path.clone(), Stage::Zero)) {
            entry.set_skip_worktree(value);
            if value && self.header.version < VERSION_3 {
                self.header.version = VERSION_3;
            }
            self.changed = true;
            return Ok(());
        }

        if self.get(path).is_some() {
            return Err(IndexError::Conflict(String::from(
                "Can not set skip worktree on unmerged paths",
            ))
            .into());
        }

        Err(IndexError::NotFound(path.to_string()).into())
    }

    /// Replace the entry list wholesale with the expansion of a tree.
    pub fn reset_to_tree(
        &mut self,
        expander: &dyn TreeExpander,
        tree: &ObjectId,
    ) -> anyhow::Result<()> {
        let new_entries = expander.expand_tree_into_entries(tree)?;

        self.entries = new_entries
            .into_iter()
            .map(|entry| ((entry.path.clone(), entry.stage()), entry))
            .collect();
        self.header.entries_count = self.entries.len() as u32;
        self.changed = true;

        Ok(())
    }

    /// Stage a working-tree file: hash its contents (the link target for
    /// symlinks) into the object store and record the result at stage 0.
    pub fn add_file(
        &mut self,
        workspace: &Workspace,
        object_store: &ObjectStore,
        path: &IndexPath,
        opts: &UpdateIndexOptions,
    ) -> anyhow::Result<()> {
        let stat = workspace.stat_file(path)?;
        if stat.mode.is_tree() {
            anyhow::bail!("Must add a file, not a directory.");
        }

        let content = workspace.file_contents(path)?;
        let oid = object_store.write_blob(content)?;

        self.add_stage(
            workspace, path, stat.mode, oid, Stage::Zero, stat.size, stat.mtime, opts,
        )
    }

    /// Refresh the cached stat of an existing entry from a freshly captured
    /// stat (used by checkout after materializing a file).
    pub fn refresh_entry_stat(&mut self, path: &IndexPath, stage: Stage, stat: &EntryMetadata) {
        if let Some(entry) = self.entries.get_mut(&(path.clone(), stage)) {
            entry.refresh_stat(stat);
            self.changed = true;
        }
    }
}

fn is_checksum_mismatch(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<IndexError>(),
        Some(IndexError::Invalid(message)) if message.contains("Checksum")
    )
}
