//! Core object traits
//!
//! - `Packable`: serialization to the on-disk binary format
//! - `Unpackable`: deserialization from the on-disk binary format
//! - `Object`: common object operations (id computation)
//!
//! ## Object format
//!
//! Objects are stored as:
//! ```text
//! <type> <size>\0<content>
//! ```
//! then compressed with zlib in the object store.

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Result;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::io::BufRead;

/// Trait for serializing objects to their binary format.
pub trait Packable {
    /// Serialize the object to bytes (including header where applicable).
    fn serialize(&self) -> Result<Bytes>;
}

/// Trait for deserializing objects from their binary format.
pub trait Unpackable {
    /// Deserialize the object from a reader (header already consumed).
    fn deserialize(reader: impl BufRead) -> Result<Self>
    where
        Self: Sized;
}

/// A content-addressed object.
pub trait Object: Packable {
    fn object_type(&self) -> ObjectType;

    /// Compute the object id by hashing the serialized content.
    fn object_id(&self) -> Result<ObjectId> {
        let content = self.serialize()?;
        let mut hasher = Sha1::new();
        hasher.update(&content);

        let oid = hasher.finalize();
        ObjectId::try_parse(format!("{oid:x}"))
    }
}
