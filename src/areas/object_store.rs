//! Content-addressed blob storage
//!
//! Blobs are stored zlib-compressed under the objects directory, addressed
//! by the SHA-1 of their `blob <size>\0<content>` framing:
//! `objects/ab/cdef123…` with the first two hex characters as the
//! directory. Writes go through a temp file plus rename so a loose object
//! is never observable half-written, and storing an existing object is a
//! no-op.

use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use fake::rand;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct ObjectStore {
    /// Path to the objects directory (typically `<git_dir>/objects`)
    path: Box<Path>,
}

impl ObjectStore {
    pub fn new(path: Box<Path>) -> Self {
        ObjectStore { path }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    /// Store the bytes as a blob object and return its id. Idempotent: an
    /// already-present object is left untouched.
    pub fn write_blob(&self, content: Bytes) -> anyhow::Result<ObjectId> {
        let blob = Blob::new(content);
        let oid = blob.object_id()?;
        let object_path = self.path.join(oid.to_path());

        if !object_path.exists() {
            std::fs::create_dir_all(
                object_path
                    .parent()
                    .context(format!("Invalid object path {}", object_path.display()))?,
            )
            .context(format!(
                "Unable to create object directory {}",
                object_path.display()
            ))?;

            self.write_object(object_path, blob.serialize()?)?;
        }

        Ok(oid)
    }

    /// Load a blob's content bytes. Fails if the object is missing or is
    /// not a blob; pack files are not supported, so an id that only lives
    /// in a pack reads as missing.
    pub fn read_blob(&self, oid: &ObjectId) -> anyhow::Result<Bytes> {
        let object_path = self.path.join(oid.to_path());

        let object_content = std::fs::read(&object_path).context(format!(
            "Unable to read object file {}",
            object_path.display()
        ))?;
        let object_content = Self::decompress(object_content.into())?;

        let mut object_reader = Cursor::new(object_content);
        let object_type = ObjectType::parse_object_type(&mut object_reader)?;
        match object_type {
            ObjectType::Blob => Ok(Blob::deserialize(object_reader)?.into_content()),
        }
    }

    fn write_object(&self, object_path: PathBuf, object_content: Bytes) -> anyhow::Result<()> {
        let object_dir = object_path
            .parent()
            .context(format!("Invalid object path {}", object_path.display()))?;
        let temp_object_path = object_dir.join(Self::generate_temp_name());

        let object_content = Self::compress(object_content)?;

        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&temp_object_path)
            .context(format!(
                "Unable to open object file {}",
                temp_object_path.display()
            ))?;

        file.write_all(&object_content).context(format!(
            "Unable to write object file {}",
            temp_object_path.display()
        ))?;

        // rename the temp file to the object file to make it atomic
        std::fs::rename(&temp_object_path, &object_path).context(format!(
            "Unable to rename object file to {}",
            object_path.display()
        ))?;

        Ok(())
    }

    fn compress(data: Bytes) -> anyhow::Result<Bytes> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(&data)
            .context("Unable to compress object content")?;

        encoder
            .finish()
            .map(|compressed_content| compressed_content.into())
            .context("Unable to finish compressing object content")
    }

    fn decompress(data: Bytes) -> anyhow::Result<Bytes> {
        let mut decoder = flate2::read::ZlibDecoder::new(&*data);
        let mut decompressed_content = Vec::new();
        decoder
            .read_to_end(&mut decompressed_content)
            .context("Unable to decompress object content")?;

        Ok(decompressed_content.into())
    }

    fn generate_temp_name() -> String {
        format!("tmp-obj-{}", rand::random::<u32>())
    }
}
