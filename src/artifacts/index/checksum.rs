//! SHA-1 framing for the index file
//!
//! Every byte of the index file except the trailing 20-byte digest is fed
//! through a running SHA-1 as it is read or written, so that the trailer
//! can be verified (reads) or appended (writes) without a second pass.
//! The wrapper also tracks the consumed-byte offset, which the entry codec
//! needs for its padding arithmetic.

use crate::artifacts::index::CHECKSUM_SIZE;
use anyhow::anyhow;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::io::{Read, Write};

#[derive(Debug)]
pub struct Checksum<T> {
    inner: T,
    digest: Sha1,
    offset: u64,
}

impl<T> Checksum<T> {
    pub fn new(inner: T) -> Self {
        Checksum {
            inner,
            digest: Sha1::new(),
            offset: 0,
        }
    }

    /// Bytes consumed or emitted so far, i.e. the current file offset when
    /// the wrapper was constructed at the start of the file.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl<T: Read> Checksum<T> {
    pub fn read(&mut self, size: usize) -> anyhow::Result<Bytes> {
        let mut buffer = vec![0; size];
        self.inner
            .read_exact(&mut buffer)
            .map_err(|_| anyhow!("Unexpected end-of-file while reading index"))?;

        self.digest.update(&buffer);
        self.offset += size as u64;
        Ok(Bytes::from(buffer))
    }

    pub fn read_byte(&mut self) -> anyhow::Result<u8> {
        let mut buffer = [0u8; 1];
        self.inner
            .read_exact(&mut buffer)
            .map_err(|_| anyhow!("Unexpected end-of-file while reading index"))?;

        self.digest.update(buffer);
        self.offset += 1;
        Ok(buffer[0])
    }

    /// Consume `size` padding bytes. They still count towards the digest,
    /// since the trailer covers every preceding byte of the file.
    pub fn skip(&mut self, size: usize) -> anyhow::Result<()> {
        self.read(size).map(|_| ())
    }

    /// Read the 20-byte trailer and compare it against the running digest.
    pub fn verify(&mut self) -> anyhow::Result<()> {
        let mut expected_checksum = [0u8; CHECKSUM_SIZE];
        self.inner.read_exact(&mut expected_checksum)?;

        let actual_checksum = self.digest.clone().finalize();

        if expected_checksum != actual_checksum.as_slice() {
            return Err(anyhow!("Checksum does not match value stored on disk"));
        }

        Ok(())
    }
}

impl<T: Write> Checksum<T> {
    pub fn write(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.inner.write_all(data)?;
        self.digest.update(data);
        self.offset += data.len() as u64;
        Ok(())
    }

    /// Finalize the digest and append it as the file trailer.
    pub fn write_checksum(&mut self) -> anyhow::Result<()> {
        let checksum = self.digest.clone().finalize();
        self.inner
            .write_all(checksum.as_slice())
            .map_err(|_| anyhow!("Failed to write checksum to index file"))?;

        Ok(())
    }
}
