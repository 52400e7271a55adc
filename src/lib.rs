//! The index (staging area) subsystem of a content-addressed version
//! control system.
//!
//! The index is a sorted, on-disk manifest mapping working-tree paths to
//! their content hashes, file modes, and cached stat metadata. It is the
//! source of truth for what will go into the next commit and the baseline
//! against which working-tree changes are detected.
//!
//! ## Layout
//!
//! - [`areas`]: the stateful managers — the index itself, the object store,
//!   the workspace, symbolic refs, and the checkout-index engine.
//! - [`artifacts`]: the data types and binary codecs — index entries, the
//!   file header, the checksum framing, object ids, and blobs.

pub mod areas;
pub mod artifacts;
