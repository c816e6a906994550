//! Format invariant checks shared by the reader and the writer.

use std::io::Cursor;

use tracing::warn;

use crate::cursor::{ByteReader, align_to};
use crate::document::{GgufDocument, ReaderOptions, parse_layout};
use crate::error::{GgufError, Result};
use crate::metadata::{MetadataMap, MetadataValue};
use crate::tensors::TensorDescriptor;

/// Alignment of the tensor-data region when the file does not override it
pub const DEFAULT_ALIGNMENT: u64 = 32;

/// Metadata key that overrides the data alignment
pub const ALIGNMENT_KEY: &str = "general.alignment";

/// Effective data alignment for a metadata map.
///
/// `general.alignment` wins when it is a non-zero power-of-two u32; any
/// other value is ignored with a warning.
pub fn alignment_of(metadata: &MetadataMap) -> u64 {
    match metadata.get(ALIGNMENT_KEY) {
        None => DEFAULT_ALIGNMENT,
        Some(MetadataValue::Uint32(a)) if a.is_power_of_two() => u64::from(*a),
        Some(other) => {
            warn!(value = ?other, "ignoring invalid {}; using {}", ALIGNMENT_KEY, DEFAULT_ALIGNMENT);
            DEFAULT_ALIGNMENT
        }
    }
}

/// Check offset monotonicity, alignment and non-overlap of a descriptor table.
///
/// Returns the number of bytes the data region must hold for every span to
/// fit, i.e. the end of the last tensor.
pub fn check_descriptor_layout(tensors: &[TensorDescriptor], alignment: u64) -> Result<u64> {
    let mut prev_end = 0u64;
    let mut prev_name: Option<&str> = None;

    for tensor in tensors {
        if tensor.offset % alignment != 0 {
            return Err(GgufError::InconsistentDescriptors(format!(
                "tensor '{}' offset {} is not a multiple of the {}-byte alignment",
                tensor.name, tensor.offset, alignment
            )));
        }
        if tensor.offset < prev_end {
            return Err(GgufError::InconsistentDescriptors(format!(
                "tensor '{}' at offset {} overlaps '{}', which ends at {}",
                tensor.name,
                tensor.offset,
                prev_name.unwrap_or_default(),
                prev_end
            )));
        }
        prev_end = tensor.end_offset()?;
        prev_name = Some(&tensor.name);
    }

    Ok(prev_end)
}

/// Writer-side containment check: every span must fit in the region that was
/// captured when the document was read.
pub fn check_region_capacity(required: u64, region_len: u64) -> Result<()> {
    if required > region_len {
        return Err(GgufError::InconsistentDescriptors(format!(
            "tensor spans need {} bytes but the data region holds {}",
            required, region_len
        )));
    }
    Ok(())
}

/// Re-parse an encoded header+metadata+descriptor block and compare it
/// field-for-field with the document it was produced from.
pub fn verify_encoded_head(expected: &GgufDocument, head: &[u8]) -> Result<()> {
    let mut reader = ByteReader::new(Cursor::new(head), head.len() as u64);
    let options = ReaderOptions::default();
    let (header, metadata, tensors) = parse_layout(&mut reader, &options)?;

    if header.version != expected.header().version {
        return Err(mismatch("version", expected.header().version, header.version));
    }
    if header.metadata_kv_count != expected.metadata().len() as u64 {
        return Err(mismatch(
            "metadata_kv_count",
            expected.metadata().len(),
            header.metadata_kv_count,
        ));
    }
    if header.tensor_count != expected.tensors().len() as u64 {
        return Err(mismatch(
            "tensor_count",
            expected.tensors().len(),
            header.tensor_count,
        ));
    }

    let pairs = expected.metadata().iter().zip(metadata.iter());
    for (i, ((want_key, want_value), (got_key, got_value))) in pairs.enumerate() {
        if want_key != got_key || want_value != got_value {
            return Err(GgufError::SelfCheckFailed(format!(
                "metadata entry {} differs: expected '{}', re-read '{}'",
                i, want_key, got_key
            )));
        }
    }

    if tensors != expected.tensors() {
        return Err(GgufError::SelfCheckFailed(
            "tensor descriptors differ after re-read".to_string(),
        ));
    }

    let data_start = align_to(reader.position(), alignment_of(&metadata));
    if data_start != head.len() as u64 {
        return Err(mismatch("data region start", head.len(), data_start));
    }

    Ok(())
}

fn mismatch(field: &str, expected: impl std::fmt::Display, got: impl std::fmt::Display) -> GgufError {
    GgufError::SelfCheckFailed(format!("{}: expected {}, re-read {}", field, expected, got))
}
