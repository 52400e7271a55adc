//! Index file format
//!
//! The index (staging area) is a sorted on-disk manifest of the files that
//! will make up the next commit, together with cached stat metadata for
//! cheap change detection.
//!
//! ## File format
//!
//! ```text
//! Header (12 bytes):
//!   - Signature: "DIRC" (4 bytes)
//!   - Version: 2 or 3 (4 bytes)
//!   - Entry count (4 bytes)
//!
//! Entries (variable length, big-endian):
//!   - 62-byte fixed block (stat fields, mode, hash, flags)
//!   - 2-byte extended flags word, present iff bit 14 of flags is set
//!     (version 3 only)
//!   - NUL-terminated path, padded to 8-byte alignment
//!
//! Checksum (20 bytes):
//!   - SHA-1 hash of all preceding bytes
//! ```

pub mod checksum;
pub mod entry_mode;
pub mod index_entry;
pub mod index_header;
pub mod index_path;
pub mod stage;

/// Size of the SHA-1 trailer in bytes.
pub const CHECKSUM_SIZE: usize = 20;

/// Size of the index header in bytes.
pub const HEADER_SIZE: usize = 12;

/// Magic signature identifying index files.
pub const SIGNATURE: &str = "DIRC";

/// Baseline format version.
pub const VERSION_2: u32 = 2;

/// Format version that allows per-entry extended flags.
pub const VERSION_3: u32 = 3;
