//! On-disk entry modes
//!
//! The mode word records the object kind together with the permission bits
//! the repository cares about. Only the five canonical values ever appear
//! in an index; anything else in a file is a corruption.

use anyhow::anyhow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryMode {
    /// Regular blob, 0o100644.
    #[default]
    Regular,
    /// Executable blob, 0o100755.
    Executable,
    /// Symbolic link, 0o120000. The entry size is the link target length.
    Symlink,
    /// Submodule reference, 0o160000.
    Gitlink,
    /// Tree, 0o040000. Indexable only transiently.
    Tree,
}

impl EntryMode {
    pub fn as_u32(self) -> u32 {
        match self {
            EntryMode::Regular => 0o100644,
            EntryMode::Executable => 0o100755,
            EntryMode::Symlink => 0o120000,
            EntryMode::Gitlink => 0o160000,
            EntryMode::Tree => 0o040000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryMode::Regular => "100644",
            EntryMode::Executable => "100755",
            EntryMode::Symlink => "120000",
            EntryMode::Gitlink => "160000",
            EntryMode::Tree => "40000",
        }
    }

    pub fn is_tree(self) -> bool {
        self == EntryMode::Tree
    }

    pub fn is_symlink(self) -> bool {
        self == EntryMode::Symlink
    }
}

impl TryFrom<u32> for EntryMode {
    type Error = anyhow::Error;

    fn try_from(mode: u32) -> anyhow::Result<Self> {
        match mode {
            0o100644 => Ok(EntryMode::Regular),
            0o100755 => Ok(EntryMode::Executable),
            0o120000 => Ok(EntryMode::Symlink),
            0o160000 => Ok(EntryMode::Gitlink),
            0o040000 => Ok(EntryMode::Tree),
            _ => Err(anyhow!("Invalid entry mode: {:o}", mode)),
        }
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
