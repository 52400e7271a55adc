//! Checkout-index engine
//!
//! Materializes index entries into the working tree (or into temp files),
//! honoring the checkout-index option set: force, no-create, prefix, temp,
//! per-stage selection, and stdin-driven file lists.
//!
//! Per-file failures are reported to the error writer and the batch keeps
//! going; the one exception is an unmerged entry encountered while stage 0
//! was required, which aborts immediately. Working-tree collisions
//! (killed files) are detected up front for the whole batch.

use crate::areas::index::Index;
use crate::areas::object_store::ObjectStore;
use crate::areas::workspace::Workspace;
use crate::artifacts::core::IndexError;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::index::index_path::IndexPath;
use crate::artifacts::index::stage::Stage;
use std::io::{BufRead, Write};
use std::path::Path;

/// Prefix for the temp files produced by `--temp` and `--stage=all`.
const TEMP_PREFIX: &str = ".merge_file_";

/// Which merge stages a checkout acts on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CheckoutStage {
    /// Stage 0 only; any unmerged entry aborts the checkout.
    #[default]
    Default,
    /// Exactly one of the merge stages 1–3.
    Single(Stage),
    /// All three merge stages, each materialized to a temp file.
    All,
}

impl CheckoutStage {
    /// Parse the command-line form: `""`, `"1"`, `"2"`, `"3"`, or `"all"`.
    pub fn try_parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "" => Ok(CheckoutStage::Default),
            "1" => Ok(CheckoutStage::Single(Stage::One)),
            "2" => Ok(CheckoutStage::Single(Stage::Two)),
            "3" => Ok(CheckoutStage::Single(Stage::Three)),
            "all" => Ok(CheckoutStage::All),
            _ => anyhow::bail!("Invalid stage: {}", value),
        }
    }
}

/// The checkout-index option set.
#[derive(Debug, Clone, Default)]
pub struct CheckoutIndexOptions {
    /// Refresh entry stats after materializing and persist the index.
    pub update_stat: bool,
    /// Suppress per-file warnings.
    pub quiet: bool,
    /// Overwrite existing files; remove offending directories.
    pub force: bool,
    /// Ignore the file list and act on every entry.
    pub all: bool,
    /// Skip the actual write; side effects (stat refresh) still apply.
    pub no_create: bool,
    /// Prepended textually to each output path; disables stat refresh.
    pub prefix: String,
    /// Which stages to act on.
    pub stage: CheckoutStage,
    /// Write to temp files and report `<tmpname>\t<path>` per entry.
    pub temp: bool,
    /// Use NUL instead of newline as the output delimiter.
    pub null_terminate: bool,
}

impl CheckoutIndexOptions {
    fn delimiter(&self) -> char {
        if self.null_terminate { '\0' } else { '\n' }
    }
}

/// Materializes entries from the object store into the working tree.
pub struct CheckoutEngine<'r> {
    workspace: &'r Workspace,
    object_store: &'r ObjectStore,
    index: &'r mut Index,
    out: &'r mut dyn Write,
    err: &'r mut dyn Write,
}

impl<'r> CheckoutEngine<'r> {
    pub fn new(
        workspace: &'r Workspace,
        object_store: &'r ObjectStore,
        index: &'r mut Index,
        out: &'r mut dyn Write,
        err: &'r mut dyn Write,
    ) -> Self {
        CheckoutEngine {
            workspace,
            object_store,
            index,
            out,
            err,
        }
    }

    /// Check out the given index paths (or every entry with `opts.all`).
    ///
    /// The index may not have been written to disk yet; read-tree uses that
    /// to update the filesystem from a freshly built index.
    pub fn checkout_index(
        &mut self,
        opts: &CheckoutIndexOptions,
        files: &[IndexPath],
    ) -> anyhow::Result<()> {
        if opts.all && !files.is_empty() {
            anyhow::bail!("Can not mix --all and named files");
        }

        let files: Vec<IndexPath> = if opts.all {
            self.index.entries().map(|e| e.path.clone()).collect()
        } else {
            files.to_vec()
        };

        self.clear_killed_files(opts, &files)?;

        for file in &files {
            if opts.stage == CheckoutStage::All {
                self.checkout_all_stages(opts, file)?;
            } else {
                self.checkout_one(opts, file)?;
            }
        }

        if opts.update_stat {
            self.index.write_updates()?;
        }

        Ok(())
    }

    /// Read a delimiter-separated file list from `reader` and check each
    /// name out, reporting per-item errors without stopping.
    pub fn checkout_index_from_reader(
        &mut self,
        opts: &CheckoutIndexOptions,
        reader: impl BufRead,
    ) -> anyhow::Result<()> {
        let delimiter = if opts.null_terminate { 0u8 } else { b'\n' };
        let mut reader = reader;

        loop {
            let mut raw = Vec::new();
            if reader.read_until(delimiter, &mut raw)? == 0 {
                break;
            }
            if raw.last() == Some(&delimiter) {
                raw.pop();
            }
            if raw.is_empty() {
                continue;
            }

            let parsed = String::from_utf8(raw)
                .map_err(|_| anyhow::anyhow!("Invalid file name on input"))
                .and_then(|name| IndexPath::from_workdir(Path::new(&name)));
            let path = match parsed {
                Ok(path) => path,
                Err(e) => {
                    if !opts.quiet {
                        writeln!(self.err, "{e}")?;
                    }
                    continue;
                }
            };

            if let Err(e) = self.checkout_index(opts, &[path]) {
                writeln!(self.err, "{e}")?;
            }
        }

        Ok(())
    }

    /// Detect working-tree collisions for the whole batch. Without `force`
    /// every collision is fatal; with it the offenders are removed.
    fn clear_killed_files(
        &mut self,
        opts: &CheckoutIndexOptions,
        files: &[IndexPath],
    ) -> anyhow::Result<()> {
        let killed = self.workspace.killed_files(files);
        if killed.is_empty() {
            return Ok(());
        }

        if !opts.force {
            let message = killed
                .iter()
                .map(|path| {
                    format!(
                        "fatal: cannot create directory at '{}': File exists",
                        self.workspace.full_path(path).display()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");

            return Err(IndexError::Conflict(message).into());
        }

        for path in &killed {
            self.workspace.remove_all(&self.workspace.full_path(path))?;
        }

        Ok(())
    }

    /// Check out every selected entry recorded for one path.
    ///
    /// Only the unmerged-under-stage-0 condition escapes as an error; other
    /// per-entry failures go to the error writer.
    fn checkout_one(&mut self, opts: &CheckoutIndexOptions, path: &IndexPath) -> anyhow::Result<()> {
        let entries: Vec<IndexEntry> = self
            .index
            .all_stages(path)
            .into_iter()
            .cloned()
            .collect();

        for entry in entries {
            // an already-clean file needs no checkout, and skipping it also
            // avoids touching objects we might not be able to read; with a
            // prefix the destination differs from the index, so never skip
            if !opts.temp
                && !opts.force
                && opts.prefix.is_empty()
                && self.workspace.is_clean(&entry.path, &entry.oid)
            {
                continue;
            }

            let selected = match opts.stage {
                CheckoutStage::Default => {
                    if entry.stage() != Stage::Zero {
                        return Err(IndexError::Unmerged.into());
                    }
                    true
                }
                CheckoutStage::Single(stage) => entry.stage() == stage,
                CheckoutStage::All => false,
            };
            if !selected {
                continue;
            }

            let result = if opts.temp {
                self.checkout_temp(&entry).and_then(|name| {
                    write!(self.out, "{}\t{}{}", name, entry.path, opts.delimiter())?;
                    Ok(())
                })
            } else {
                self.checkout_file(&entry, opts)
            };

            if let Err(e) = result {
                writeln!(self.err, "{e}")?;
            }
        }

        Ok(())
    }

    /// The `--stage=all` form: each present merge stage goes to a temp
    /// file, reported as `<n1> <n2> <n3>\t<path>` with `.` for missing
    /// stages. A path that exists at stage 0 is not in conflict and is
    /// skipped with a warning.
    fn checkout_all_stages(
        &mut self,
        opts: &CheckoutIndexOptions,
        path: &IndexPath,
    ) -> anyhow::Result<()> {
        let entries: Vec<IndexEntry> = self
            .index
            .all_stages(path)
            .into_iter()
            .cloned()
            .collect();

        if entries.iter().any(|e| e.stage() == Stage::Zero) {
            if !opts.quiet {
                writeln!(
                    self.err,
                    "checkout-index: {} does not exist at stage 0",
                    path
                )?;
            }
            return Ok(());
        }

        for stage in [Stage::One, Stage::Two] {
            match entries.iter().find(|e| e.stage() == stage) {
                Some(entry) => match self.checkout_temp(entry) {
                    Ok(name) => write!(self.out, "{} ", name)?,
                    Err(e) => {
                        writeln!(self.err, "{e}")?;
                        write!(self.out, ". ")?;
                    }
                },
                None => write!(self.out, ". ")?,
            }
        }

        match entries.iter().find(|e| e.stage() == Stage::Three) {
            Some(entry) => match self.checkout_temp(entry) {
                Ok(name) => write!(self.out, "{}\t{}{}", name, path, opts.delimiter())?,
                Err(e) => {
                    writeln!(self.err, "{e}")?;
                    write!(self.out, ".\t{}{}", path, opts.delimiter())?;
                }
            },
            None => write!(self.out, ".\t{}{}", path, opts.delimiter())?,
        }

        Ok(())
    }

    /// Materialize one entry at `<prefix><path>`.
    fn checkout_file(
        &mut self,
        entry: &IndexEntry,
        opts: &CheckoutIndexOptions,
    ) -> anyhow::Result<()> {
        let target = self.workspace.prefixed_path(&opts.prefix, &entry.path);

        if target.symlink_metadata().is_ok() && !opts.force {
            if !opts.quiet {
                return Err(IndexError::Conflict(format!(
                    "{} already exists, no checkout",
                    entry.path
                ))
                .into());
            }
            return Ok(());
        }

        let content = self.object_store.read_blob(&entry.oid)?;

        if !opts.no_create {
            if target.is_dir() {
                self.workspace.remove_all(&target)?;
            }

            if let Some(parent) = target.parent() {
                if !parent.exists() {
                    // 0o777 before the umask, like mkdir -p
                    self.workspace.mkdir_all(parent, 0o777)?;
                } else if !parent.is_dir() {
                    self.workspace.remove_file(parent)?;
                    self.workspace.mkdir_all(parent, 0o777)?;
                }
            }

            self.workspace
                .write_file(&target, &content, entry.metadata.mode.as_u32())?;
        }

        // only refresh the stat when checking out to the index's own
        // location; a prefix means the index was never touched
        if opts.prefix.is_empty() && opts.update_stat {
            let stat = self.workspace.stat_file(&entry.path)?;
            self.index.refresh_entry_stat(&entry.path, entry.stage(), &stat);
        }

        Ok(())
    }

    /// Materialize one entry into a fresh `.merge_file_*` temp file in the
    /// current directory and return its name.
    fn checkout_temp(&mut self, entry: &IndexEntry) -> anyhow::Result<String> {
        let (name, mut file) = self.workspace.temp_file(Path::new("."), TEMP_PREFIX)?;

        let content = self.object_store.read_blob(&entry.oid)?;
        file.write_all(&content)?;
        drop(file);

        self.workspace
            .chmod(Path::new(&name), entry.metadata.mode.as_u32())?;

        Ok(name)
    }
}
