//! Content digest identifying an object
//!
//! Object ids are 40-character hexadecimal strings representing the SHA-1
//! of the object's serialized form. On disk inside the index they occupy
//! 20 raw bytes. The all-zero id is the sentinel for "absent".

use crate::artifacts::objects::OBJECT_ID_LENGTH;
use std::io;
use std::path::PathBuf;

/// A 40-hex-character content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse and validate an object id from its hex form.
    pub fn try_parse(id: String) -> anyhow::Result<Self> {
        if id.len() != OBJECT_ID_LENGTH {
            return Err(anyhow::anyhow!("Invalid object ID length: {}", id.len()));
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow::anyhow!("Invalid object ID characters: {}", id));
        }
        Ok(Self(id))
    }

    /// The all-zero id, used where "no object" must be representable.
    pub fn zero() -> Self {
        Self("0".repeat(OBJECT_ID_LENGTH))
    }

    pub fn is_zero(&self) -> bool {
        self.0.bytes().all(|b| b == b'0')
    }

    /// Write the id in binary form (20 bytes).
    pub fn write_h40_to<W: io::Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        for i in (0..OBJECT_ID_LENGTH).step_by(2) {
            let byte = u8::from_str_radix(&self.0[i..i + 2], 16)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Invalid hex digit"))?;
            writer.write_all(&[byte])?;
        }

        Ok(())
    }

    /// Read an id from binary form (20 bytes).
    pub fn read_h40_from<R: io::Read + ?Sized>(reader: &mut R) -> anyhow::Result<Self> {
        let mut hex40 = String::with_capacity(OBJECT_ID_LENGTH);
        let mut buffer = [0; 1];

        for _ in 0..(OBJECT_ID_LENGTH / 2) {
            reader.read_exact(&mut buffer)?;
            hex40.push_str(&format!("{:02x}", buffer[0]));
        }

        Self::try_parse(hex40)
    }

    /// Convert to the loose-object storage path, `XX/YYYY…` with the first
    /// two hex characters as the directory.
    pub fn to_path(&self) -> PathBuf {
        let (dir, file) = self.0.split_at(2);
        PathBuf::from(dir).join(file)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::zero()
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_binary_round_trip() {
        let oid = ObjectId::try_parse("ce013625030ba8dba906f756967f9e9ca394464a".into()).unwrap();

        let mut buffer = Vec::new();
        oid.write_h40_to(&mut buffer).unwrap();
        assert_eq!(buffer.len(), 20);

        let decoded = ObjectId::read_h40_from(&mut buffer.as_slice()).unwrap();
        assert_eq!(decoded, oid);
    }

    #[test]
    fn test_zero_sentinel() {
        assert!(ObjectId::zero().is_zero());
        assert_eq!(ObjectId::zero().as_ref().len(), 40);
        assert!(
            !ObjectId::try_parse("ce013625030ba8dba906f756967f9e9ca394464a".into())
                .unwrap()
                .is_zero()
        );
    }

    #[test]
    fn test_invalid_ids_are_rejected() {
        assert!(ObjectId::try_parse("abc".into()).is_err());
        assert!(ObjectId::try_parse("g".repeat(40)).is_err());
    }
}
