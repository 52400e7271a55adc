//! Index entry representation
//!
//! Each entry records one staged path: its content hash, file mode, merge
//! stage, and the stat fields captured when the entry was last refreshed.
//! The stat fields let change detection trust the cached hash without
//! re-reading file contents.
//!
//! ## Entry format
//!
//! The fixed block is 62 bytes, big-endian: ctime seconds and nanoseconds,
//! an 8-byte mtime, dev, ino, mode, uid, gid, size, the 20-byte hash, and
//! the 16-bit flags word. Version-3 entries whose extended bit is set carry
//! one more 16-bit word. The NUL-terminated path follows, padded with 1–8
//! NUL bytes so the whole entry is a multiple of 8 bytes long.

use crate::artifacts::core::IndexError;
use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_path::IndexPath;
use crate::artifacts::index::stage::Stage;
use crate::artifacts::index::VERSION_3;
use crate::artifacts::objects::object::Packable;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::anyhow;
use bitflags::bitflags;
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use is_executable::IsExecutable;
use std::cmp::min;
use std::fs::Metadata;
use std::io::{Read, Write};
use std::os::unix::prelude::MetadataExt;
use std::path::Path;

/// Block size for entry alignment (8 bytes).
pub const ENTRY_BLOCK: usize = 8;

/// Size of the fixed portion of an entry, up to and including the flags
/// word.
pub const ENTRY_FIXED_SIZE: usize = 62;

/// Largest path length representable in the flags word; longer names are
/// stored saturated and recovered from their NUL terminator.
pub const MAX_NAME_LENGTH: usize = 0xFFF;

/// The primary 16-bit flags word of an entry.
///
/// High to low: 1-bit assume-valid, 1-bit extended (must be zero in
/// version-2 files), 2-bit merge stage, and the 12-bit name length
/// (saturated at 0xFFF).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryFlags(u16);

impl EntryFlags {
    const ASSUME_VALID: u16 = 1 << 15;
    const EXTENDED: u16 = 1 << 14;

    /// Pack a stage and name length into a flags word.
    pub fn new(stage: Stage, name_length: usize) -> Self {
        let length = min(name_length, MAX_NAME_LENGTH) as u16;
        EntryFlags(((stage.as_u8() as u16) << 12) | length)
    }

    pub fn from_bits(bits: u16) -> Self {
        EntryFlags(bits)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn stage(self) -> Stage {
        Stage::from_flag_bits(self.0 >> 12)
    }

    pub fn name_length(self) -> usize {
        (self.0 & 0x0FFF) as usize
    }

    pub fn assume_valid(self) -> bool {
        self.0 & Self::ASSUME_VALID != 0
    }

    pub fn extended(self) -> bool {
        self.0 & Self::EXTENDED != 0
    }

    pub fn set_extended(&mut self, value: bool) {
        if value {
            self.0 |= Self::EXTENDED;
        } else {
            self.0 &= !Self::EXTENDED;
        }
    }
}

bitflags! {
    /// The supplementary 16-bit word carried by version-3 entries whose
    /// extended bit is set. Unknown bits are preserved verbatim.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ExtendedFlags: u16 {
        const INTENT_TO_ADD = 1 << 13;
        const SKIP_WORKTREE = 1 << 14;

        const _ = !0;
    }
}

/// Cached stat fields of an entry.
///
/// `mtime` is a single logical timestamp whose on-disk form is two 32-bit
/// halves; the in-memory value is their concatenation
/// (`seconds << 32 | nanoseconds`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Status-change time (seconds since the Unix epoch).
    pub ctime: u32,
    /// Status-change time, nanosecond part.
    pub ctime_nsec: u32,
    /// Modification time, packed.
    pub mtime: i64,
    /// Device ID.
    pub dev: u32,
    /// Inode number.
    pub ino: u32,
    /// File mode.
    pub mode: EntryMode,
    /// User ID of owner.
    pub uid: u32,
    /// Group ID of owner.
    pub gid: u32,
    /// File size in bytes; for symbolic links, the link target length.
    pub size: u32,
}

/// Pack a seconds/nanoseconds pair into the logical mtime value, matching
/// the wire layout of the two 32-bit halves.
pub fn pack_timestamp(seconds: i64, nanoseconds: i64) -> i64 {
    (seconds << 32) | (nanoseconds & 0xFFFF_FFFF)
}

/// One staged path.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Path relative to the work tree root.
    pub path: IndexPath,
    /// Content hash.
    pub oid: ObjectId,
    /// Cached stat fields.
    pub metadata: EntryMetadata,
    /// Primary flags word.
    pub flags: EntryFlags,
    /// Extended flags word, present iff `flags.extended()`.
    pub extensions: Option<ExtendedFlags>,
}

impl IndexEntry {
    /// Build a fresh entry the way update-index does: flags packed from the
    /// stage and path length, stat fields zeroed until refreshed.
    pub fn create(
        path: IndexPath,
        oid: ObjectId,
        mode: EntryMode,
        stage: Stage,
        size: u32,
        mtime: i64,
    ) -> Self {
        let flags = EntryFlags::new(stage, path.len());

        IndexEntry {
            path,
            oid,
            metadata: EntryMetadata {
                mtime,
                size,
                mode,
                ..Default::default()
            },
            flags,
            extensions: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.flags.stage()
    }

    pub fn assume_valid(&self) -> bool {
        self.flags.assume_valid()
    }

    pub fn skip_worktree(&self) -> bool {
        self.flags.extended()
            && self
                .extensions
                .is_some_and(|e| e.contains(ExtendedFlags::SKIP_WORKTREE))
    }

    pub fn intent_to_add(&self) -> bool {
        self.flags.extended()
            && self
                .extensions
                .is_some_and(|e| e.contains(ExtendedFlags::INTENT_TO_ADD))
    }

    /// Set or clear the skip-worktree bit. Setting it forces the extended
    /// flag on; clearing leaves the extended flag alone in case other
    /// extension bits are in use.
    pub fn set_skip_worktree(&mut self, value: bool) {
        if value {
            self.flags.set_extended(true);
        }

        let extensions = self.extensions.get_or_insert(ExtendedFlags::empty());
        extensions.set(ExtendedFlags::SKIP_WORKTREE, value);
    }

    pub fn set_extended_flag(&mut self, value: bool) {
        self.flags.set_extended(value);
    }

    /// Overwrite the cached stat fields from a freshly captured stat.
    ///
    /// Only the fields used by change detection are copied; mode, uid and
    /// gid stay as recorded at add time.
    pub fn refresh_stat(&mut self, stat: &EntryMetadata) {
        tracing::debug!(path = %self.path, "refreshing stat info");
        self.metadata.mtime = stat.mtime;
        self.metadata.size = stat.size;
        self.metadata.ctime = stat.ctime;
        self.metadata.ctime_nsec = stat.ctime_nsec;
        self.metadata.ino = stat.ino;
    }

    /// Check the cached stat fields against a freshly captured stat.
    ///
    /// A mismatch means the cached hash can no longer be trusted without
    /// rehashing; it is a signal, not a failure.
    pub fn compare_stat(&self, stat: &EntryMetadata) -> Result<(), IndexError> {
        if self.metadata.mtime != stat.mtime {
            return Err(IndexError::StatMismatch(format!(
                "MTime does not match for {}",
                self.path
            )));
        }
        if self.metadata.size != stat.size {
            return Err(IndexError::StatMismatch(format!(
                "Size does not match for {}",
                self.path
            )));
        }
        if self.metadata.ctime != stat.ctime || self.metadata.ctime_nsec != stat.ctime_nsec {
            return Err(IndexError::StatMismatch(format!(
                "CTime does not match for {}",
                self.path
            )));
        }
        if self.metadata.ino != stat.ino {
            return Err(IndexError::StatMismatch(format!(
                "INode does not match for {}",
                self.path
            )));
        }

        Ok(())
    }

    /// Number of padding NUL bytes that follow the path on disk: enough to
    /// make the whole entry a multiple of [`ENTRY_BLOCK`], and at least one
    /// so the path stays NUL-terminated.
    fn padding_length(&self) -> usize {
        let extensions_length = if self.flags.extended() { 2 } else { 0 };
        ENTRY_BLOCK - ((ENTRY_FIXED_SIZE + extensions_length + self.path.len()) % ENTRY_BLOCK)
    }

    /// Decode one entry from the checksum reader.
    ///
    /// The reader must sit at the start of an entry; on return it sits past
    /// the entry's padding.
    pub fn read_from<R: Read>(reader: &mut Checksum<R>, version: u32) -> anyhow::Result<Self> {
        let bytes = reader.read(ENTRY_FIXED_SIZE)?;

        let ctime = byteorder::NetworkEndian::read_u32(&bytes[0..4]);
        let ctime_nsec = byteorder::NetworkEndian::read_u32(&bytes[4..8]);
        let mtime = byteorder::NetworkEndian::read_i64(&bytes[8..16]);
        let dev = byteorder::NetworkEndian::read_u32(&bytes[16..20]);
        let ino = byteorder::NetworkEndian::read_u32(&bytes[20..24]);
        let mode = EntryMode::try_from(byteorder::NetworkEndian::read_u32(&bytes[24..28]))
            .map_err(|e| IndexError::Invalid(e.to_string()))?;
        let uid = byteorder::NetworkEndian::read_u32(&bytes[28..32]);
        let gid = byteorder::NetworkEndian::read_u32(&bytes[32..36]);
        let size = byteorder::NetworkEndian::read_u32(&bytes[36..40]);
        let oid = ObjectId::read_h40_from(&mut &bytes[40..60])?;
        let flags = EntryFlags::from_bits(byteorder::NetworkEndian::read_u16(&bytes[60..62]));

        let extensions = if flags.extended() {
            if version < VERSION_3 {
                return Err(IndexError::Invalid(String::from(
                    "extended flag set in a version 2 index",
                ))
                .into());
            }
            let word = reader.read(2)?;
            Some(ExtendedFlags::from_bits_retain(
                byteorder::NetworkEndian::read_u16(&word),
            ))
        } else {
            None
        };
        let extensions_length = if flags.extended() { 2 } else { 0 };

        let name_length = flags.name_length();
        let path = if name_length < MAX_NAME_LENGTH {
            let name = reader.read(name_length)?;
            let padding =
                ENTRY_BLOCK - ((ENTRY_FIXED_SIZE + extensions_length + name_length) % ENTRY_BLOCK);
            reader.skip(padding)?;

            IndexPath::from_bytes(name.to_vec())?
        } else {
            // The length field is saturated; the real name runs to the next
            // NUL. The padding is then derived from the file offset; the +4
            // reproduces the alignment stock git writes for these entries.
            let mut name = Vec::with_capacity(MAX_NAME_LENGTH);
            loop {
                let byte = reader.read_byte()?;
                if byte == 0 {
                    break;
                }
                name.push(byte);
            }

            let offset = reader.offset();
            let padding = ENTRY_BLOCK as u64 - ((offset + 4) % ENTRY_BLOCK as u64);
            reader.skip(padding as usize)?;

            IndexPath::from_bytes(name)?
        };

        Ok(IndexEntry {
            path,
            oid,
            metadata: EntryMetadata {
                ctime,
                ctime_nsec,
                mtime,
                dev,
                ino,
                mode,
                uid,
                gid,
                size,
            },
            flags,
            extensions,
        })
    }
}

impl Packable for IndexEntry {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut entry_bytes = Vec::with_capacity(ENTRY_FIXED_SIZE + self.path.len() + ENTRY_BLOCK);

        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ctime)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ctime_nsec)?;
        entry_bytes.write_i64::<byteorder::NetworkEndian>(self.metadata.mtime)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.dev)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ino)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mode.as_u32())?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.uid)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.gid)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.size)?;
        self.oid.write_h40_to(&mut entry_bytes)?;
        entry_bytes.write_u16::<byteorder::NetworkEndian>(self.flags.bits())?;

        if self.flags.extended() {
            let extensions = self
                .extensions
                .ok_or_else(|| anyhow!("Entry {} has no extended flags word", self.path))?;
            entry_bytes.write_u16::<byteorder::NetworkEndian>(extensions.bits())?;
        }

        entry_bytes.write_all(self.path.as_bytes())?;
        entry_bytes.resize(entry_bytes.len() + self.padding_length(), 0);

        Ok(Bytes::from(entry_bytes))
    }
}

impl TryFrom<(&Path, Metadata)> for EntryMetadata {
    type Error = anyhow::Error;

    /// Capture an [`EntryMetadata`] from an `lstat` of the file at
    /// `file_path`. For symbolic links the size is the link target length,
    /// which is what `lstat` reports.
    fn try_from((file_path, metadata): (&Path, Metadata)) -> Result<Self, Self::Error> {
        let mode = if metadata.file_type().is_symlink() {
            EntryMode::Symlink
        } else if metadata.is_dir() {
            EntryMode::Tree
        } else if file_path.is_executable() {
            EntryMode::Executable
        } else {
            EntryMode::Regular
        };

        Ok(Self {
            ctime: metadata.ctime() as u32,
            ctime_nsec: metadata.ctime_nsec() as u32,
            mtime: pack_timestamp(metadata.mtime(), metadata.mtime_nsec()),
            dev: metadata.dev() as u32,
            ino: metadata.ino() as u32,
            mode,
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.size() as u32,
        })
    }
}

impl PartialEq for IndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.stage() == other.stage()
    }
}

impl Eq for IndexEntry {}

impl PartialOrd for IndexEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.path
            .cmp(&other.path)
            .then_with(|| self.stage().cmp(&other.stage()))
    }
}
