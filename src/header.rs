//! The fixed 24-byte GGUF header: magic, version and the two counts.

use std::io::{Read, Write};

use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{GgufError, Result};

/// The four bytes every GGUF file starts with
pub const GGUF_MAGIC: [u8; 4] = *b"GGUF";

/// Version written for documents created from scratch
pub const GGUF_VERSION: u32 = 3;

/// Oldest version with the 64-bit count layout this crate reads
pub const GGUF_VERSION_MIN: u32 = 2;

/// Size of the fixed header in bytes
pub const GGUF_HEADER_LEN: u64 = 24;

/// Essential header information found at the beginning of a GGUF file.
///
/// GGUF files store these values in little-endian byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GgufHeader {
    /// The magic bytes identifying the file format (`GGUF`)
    pub magic: [u8; 4],
    /// The version of the GGUF file format
    pub version: u32,
    /// The total number of tensors contained in the file
    pub tensor_count: u64,
    /// The total number of key-value metadata entries in the file
    pub metadata_kv_count: u64,
}

impl GgufHeader {
    /// Header for a file with the given counts at the current version
    pub fn new(version: u32, tensor_count: u64, metadata_kv_count: u64) -> Self {
        Self {
            magic: GGUF_MAGIC,
            version,
            tensor_count,
            metadata_kv_count,
        }
    }

    /// Parse a GGUF header from the beginning of a reader.
    ///
    /// This function expects the cursor to be positioned at the very
    /// beginning of the file. The magic and version are validated before the
    /// counts are read.
    ///
    /// # Errors
    ///
    /// Returns `GgufError::BadMagic` if the signature doesn't match,
    /// `GgufError::UnsupportedVersion` for versions outside 2..=3, and
    /// `GgufError::TruncatedInput` if the source is shorter than a header.
    pub fn parse<R: Read>(reader: &mut ByteReader<R>) -> Result<Self> {
        let bytes = reader.read_bytes(4)?;
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes);
        if magic != GGUF_MAGIC {
            return Err(GgufError::BadMagic(magic));
        }

        let version = reader.read_u32()?;
        if !is_version_supported(version) {
            return Err(GgufError::UnsupportedVersion(version));
        }

        let tensor_count = reader.read_u64()?;
        let metadata_kv_count = reader.read_u64()?;

        Ok(GgufHeader {
            magic,
            version,
            tensor_count,
            metadata_kv_count,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut ByteWriter<W>) -> Result<()> {
        writer.write_bytes(&self.magic)?;
        writer.write_u32(self.version)?;
        writer.write_u64(self.tensor_count)?;
        writer.write_u64(self.metadata_kv_count)
    }

    /// Check if this GGUF version is supported by this library
    pub fn is_version_supported(&self) -> bool {
        is_version_supported(self.version)
    }
}

pub fn is_version_supported(version: u32) -> bool {
    (GGUF_VERSION_MIN..=GGUF_VERSION).contains(&version)
}
