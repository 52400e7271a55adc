//! Symbolic references (minimal)
//!
//! A symbolic ref is a plain file under the repository dot-dir holding the
//! 7-bit ASCII string `ref: <target>`. Branch refs (`refs/heads/<name>`)
//! hold a 40-character hex hash, optionally followed by whitespace.
//!
//! Only the subset needed by the index subsystem is implemented: reading
//! and writing symbolic refs and resolving a branch ref to an object id.

use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use derive_new::new;
use file_guard::Lock;
use std::io::Write;
use std::ops::DerefMut;
use std::path::Path;

/// Regex pattern for parsing symbolic references
const SYMREF_REGEX: &str = r"^ref: (.+)$";

/// Name of the HEAD reference
pub const HEAD_REF_NAME: &str = "HEAD";

#[derive(Debug, new)]
pub struct Refs {
    /// Path to the repository dot-dir (typically `.git`)
    path: Box<Path>,
}

impl Refs {
    /// Read a symbolic ref.
    ///
    /// Returns the trimmed target when the file starts with the `ref: `
    /// prefix, and an empty string when the file is missing or holds
    /// anything else (e.g. a detached oid).
    pub fn read_symbolic_ref(&self, name: &str) -> anyhow::Result<String> {
        let ref_path = self.path.join(name);
        if !ref_path.exists() {
            return Ok(String::new());
        }

        let content = std::fs::read_to_string(&ref_path)
            .with_context(|| format!("failed to read ref file at {:?}", ref_path))?;

        match regex::Regex::new(SYMREF_REGEX)?.captures(content.trim()) {
            Some(symref_match) => Ok(symref_match[1].trim().to_string()),
            None => Ok(String::new()),
        }
    }

    /// Point a symbolic ref at a target, refusing anything outside the
    /// `refs/` hierarchy. The value is written as `ref: <target>` with no
    /// trailing newline.
    pub fn write_symbolic_ref(&self, name: &str, target: &str) -> anyhow::Result<()> {
        if !target.starts_with("refs/") {
            anyhow::bail!("fatal: Refusing to point {} outside of refs/", name);
        }

        let ref_path = self.path.join(name);
        std::fs::create_dir_all(ref_path.parent().with_context(|| {
            format!(
                "failed to create parent directories for ref file at {:?}",
                ref_path
            )
        })?)?;

        let mut ref_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&ref_path)
            .with_context(|| format!("failed to open ref file at {:?}", ref_path))?;
        let mut lock = file_guard::lock(&mut ref_file, Lock::Exclusive, 0, 1)?;
        lock.deref_mut()
            .write_all(format!("ref: {}", target).as_bytes())?;

        Ok(())
    }

    /// Resolve a branch ref (`refs/heads/<name>`) to the object id it
    /// holds: 40 hex characters, optionally followed by whitespace.
    pub fn read_branch_ref(&self, name: &str) -> anyhow::Result<Option<ObjectId>> {
        let branch_path = self.heads_path().join(name);
        if !branch_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&branch_path)
            .with_context(|| format!("failed to read ref file at {:?}", branch_path))?;

        Ok(Some(ObjectId::try_parse(content.trim_end().to_string())?))
    }

    pub fn head_path(&self) -> Box<Path> {
        self.path.join(HEAD_REF_NAME).into_boxed_path()
    }

    pub fn refs_path(&self) -> Box<Path> {
        self.path.join("refs").into_boxed_path()
    }

    pub fn heads_path(&self) -> Box<Path> {
        self.refs_path().join("heads").into_boxed_path()
    }
}
