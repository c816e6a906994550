//! Error taxonomy shared by the reader, the writer and the directory layer.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result type for GGUF operations
pub type Result<T> = std::result::Result<T, GgufError>;

/// Which type table an unknown tag was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// Metadata value type (including array element types)
    Value,
    /// Tensor element type
    TensorElement,
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagKind::Value => f.write_str("value type"),
            TagKind::TensorElement => f.write_str("tensor element type"),
        }
    }
}

/// Errors that can occur when reading, validating or writing GGUF files.
///
/// Every parse error is fatal for the document being read: the reader never
/// hands out a partially populated document.
#[derive(Debug, Error)]
pub enum GgufError {
    /// The first four bytes are not `GGUF`
    #[error("bad magic: expected \"GGUF\", got {0:02x?}")]
    BadMagic([u8; 4]),
    /// The version field names a layout this crate does not speak
    #[error("unsupported GGUF version: {0}")]
    UnsupportedVersion(u32),
    /// A read ran past the available bytes, or a length prefix promised more
    /// data than the source holds
    #[error("truncated input: need {needed} bytes at offset {offset}")]
    TruncatedInput { offset: u64, needed: u64 },
    /// A type tag outside the known table
    #[error("unknown {kind} tag {tag}")]
    UnknownTypeTag { kind: TagKind, tag: u32 },
    /// String bytes are not valid UTF-8
    #[error("invalid UTF-8 in string at offset {offset}: {source}")]
    Utf8Decode {
        offset: u64,
        #[source]
        source: std::string::FromUtf8Error,
    },
    /// Tensor offsets overlap, decrease, are misaligned or leave the data region
    #[error("inconsistent tensor descriptors: {0}")]
    InconsistentDescriptors(String),
    /// Arrays nested deeper than the reader allows
    #[error("metadata arrays nested deeper than {0} levels")]
    NestingTooDeep(usize),
    /// A value that cannot be encoded (e.g. an array with mixed element types)
    #[error("invalid metadata value: {0}")]
    InvalidValue(String),
    /// The re-parsed output disagreed with the document that produced it
    #[error("post-write self-check failed: {0}")]
    SelfCheckFailed(String),
    /// Malformed JSON in an exported directory or policy file
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// An exported directory is missing files or holds values of the wrong shape
    #[error("invalid export directory: {0}")]
    InvalidExport(String),
    /// Underlying read or write failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl GgufError {
    pub(crate) fn unknown_value_tag(tag: u32) -> Self {
        GgufError::UnknownTypeTag {
            kind: TagKind::Value,
            tag,
        }
    }

    pub(crate) fn unknown_tensor_type(tag: u32) -> Self {
        GgufError::UnknownTypeTag {
            kind: TagKind::TensorElement,
            tag,
        }
    }

    /// True for the failure kinds caused by a short source.
    pub fn is_truncation(&self) -> bool {
        matches!(self, GgufError::TruncatedInput { .. })
    }
}
