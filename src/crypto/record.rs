//! Self-describing wire form for AEAD records.

use crate::core::WireError;
use crate::wire::{WireReader, WireWriter};

/// An AEAD record: initialization vector, authentication tag, ciphertext.
///
/// Wire format, all blocks u32-length-prefixed:
/// ```text
/// | ivLen (u32) | iv | tagLen (u32) | tag | ctLen (u32) | ciphertext |
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedRecord {
    /// Random per-record nonce.
    pub iv: Vec<u8>,
    /// Poly1305 authentication tag.
    pub tag: Vec<u8>,
    /// The sealed bytes, tag excluded.
    pub ciphertext: Vec<u8>,
}

impl EncryptedRecord {
    /// Append the record's byte form to a writer.
    pub fn write_to(&self, writer: &mut WireWriter) {
        writer.write_block(&self.iv);
        writer.write_block(&self.tag);
        writer.write_block(&self.ciphertext);
    }

    /// The record as a single contiguous byte string.
    pub fn serialize(&self) -> Vec<u8> {
        let mut writer =
            WireWriter::with_capacity(12 + self.iv.len() + self.tag.len() + self.ciphertext.len());
        self.write_to(&mut writer);
        writer.finish()
    }

    /// Read one record from the reader's current position.
    pub fn read_from(reader: &mut WireReader<'_>) -> Result<Self, WireError> {
        let iv = reader.read_block()?.to_vec();
        let tag = reader.read_block()?.to_vec();
        let ciphertext = reader.read_block()?.to_vec();
        Ok(Self {
            iv,
            tag,
            ciphertext,
        })
    }

    /// Parse a record from a standalone byte string.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, WireError> {
        Self::read_from(&mut WireReader::new(bytes))
    }
}
