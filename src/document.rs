//! In-memory GGUF document: header, ordered metadata, tensor descriptors and
//! a by-reference handle on the tensor-data region.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

use tracing::debug;

use crate::cursor::{ByteReader, align_to};
use crate::error::{GgufError, Result};
use crate::header::{GGUF_VERSION, GgufHeader};
use crate::metadata::{MAX_ARRAY_DEPTH, MetadataMap, MetadataValue};
use crate::tensors::{TensorDescriptor, TensorType, read_descriptors, read_tensor_data};
use crate::validation::{alignment_of, check_descriptor_layout};
use crate::writer::GgufWriter;

/// Location of the tensor-data region inside the byte source the document
/// was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorDataRegion {
    /// Absolute offset of the first byte of the aligned region
    pub start: u64,
    /// Bytes from `start` to the end of the source
    pub len: u64,
}

/// Reader knobs
#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    /// Deepest array nesting accepted; capped at [`MAX_ARRAY_DEPTH`]
    pub max_array_depth: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            max_array_depth: MAX_ARRAY_DEPTH,
        }
    }
}

/// A parsed GGUF file minus its tensor payload.
///
/// The payload stays in the source; [`GgufDocument::read_tensor_bytes`]
/// fetches a single tensor on demand and [`GgufWriter`] streams the whole
/// region when rewriting. Metadata is the only mutable part.
#[derive(Debug, Clone, PartialEq)]
pub struct GgufDocument {
    header: GgufHeader,
    metadata: MetadataMap,
    tensors: Vec<TensorDescriptor>,
    data: TensorDataRegion,
}

impl GgufDocument {
    /// Parse a document from a seekable byte source.
    ///
    /// The source is read from absolute offset 0 regardless of its current
    /// position. Only the header, metadata and descriptor table are decoded.
    ///
    /// # Errors
    ///
    /// Any format violation fails the whole read; no partial document is
    /// returned. A data region or tensor span that runs past the end of the
    /// source is reported as `GgufError::TruncatedInput`.
    pub fn read<R: Read + Seek>(source: &mut R) -> Result<Self> {
        Self::read_with(source, ReaderOptions::default())
    }

    pub fn read_with<R: Read + Seek>(source: &mut R, options: ReaderOptions) -> Result<Self> {
        let len = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;

        let mut reader = ByteReader::new(BufReader::new(&mut *source), len);
        let (header, metadata, tensors) = parse_layout(&mut reader, &options)?;

        let alignment = alignment_of(&metadata);
        let descriptors_end = reader.position();
        let start = align_to(descriptors_end, alignment);
        // the padding must be present even when no tensor data follows
        reader.skip_to(start)?;

        let required = check_descriptor_layout(&tensors, alignment)?;
        let region_len = len - start;
        if required > region_len {
            return Err(GgufError::TruncatedInput {
                offset: len,
                needed: required - region_len,
            });
        }

        debug!(
            version = header.version,
            metadata = metadata.len(),
            tensors = tensors.len(),
            data_start = start,
            data_len = region_len,
            "parsed GGUF document"
        );

        Ok(Self {
            header,
            metadata,
            tensors,
            data: TensorDataRegion {
                start,
                len: region_len,
            },
        })
    }

    /// Open and parse a file; the handle is closed before returning.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;
        Self::read(&mut file)
    }

    /// Parse a complete file held in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read(&mut Cursor::new(bytes))
    }

    /// Start building a document from scratch
    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::new()
    }

    /// Header as read from the source.
    ///
    /// The counts reflect the source, not later edits; the writer recomputes
    /// them.
    pub fn header(&self) -> &GgufHeader {
        &self.header
    }

    pub fn version(&self) -> u32 {
        self.header.version
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut MetadataMap {
        &mut self.metadata
    }

    /// Replace the whole metadata map, returning the old one
    pub fn replace_metadata(&mut self, metadata: MetadataMap) -> MetadataMap {
        std::mem::replace(&mut self.metadata, metadata)
    }

    pub fn tensors(&self) -> &[TensorDescriptor] {
        &self.tensors
    }

    pub fn tensor(&self, name: &str) -> Option<&TensorDescriptor> {
        self.tensors.iter().find(|t| t.name == name)
    }

    pub fn data_region(&self) -> TensorDataRegion {
        self.data
    }

    /// Data alignment implied by the current metadata
    pub fn alignment(&self) -> u64 {
        alignment_of(&self.metadata)
    }

    /// Absolute byte range of a tensor's data inside the source
    pub fn tensor_span(&self, tensor: &TensorDescriptor) -> Result<Range<u64>> {
        let start = self.data.start + tensor.offset;
        Ok(start..start + tensor.byte_size()?)
    }

    /// Fetch the raw bytes of the named tensor from the source it was read from
    pub fn read_tensor_bytes<R: Read + Seek>(&self, source: &mut R, name: &str) -> Result<Vec<u8>> {
        let tensor = self.tensor(name).ok_or_else(|| {
            GgufError::InconsistentDescriptors(format!("no tensor named '{}'", name))
        })?;
        read_tensor_data(source, tensor, self.data.start)
    }

    /// Sum of element counts over all tensors
    pub fn parameter_count(&self) -> u64 {
        self.tensors
            .iter()
            .map(|t| t.element_count().unwrap_or(0))
            .fold(0u64, u64::saturating_add)
    }
}

/// Read header, metadata and descriptors, leaving the cursor right after the
/// descriptor table.
pub(crate) fn parse_layout<R: Read>(
    reader: &mut ByteReader<R>,
    options: &ReaderOptions,
) -> Result<(GgufHeader, MetadataMap, Vec<TensorDescriptor>)> {
    let header = GgufHeader::parse(reader)?;
    let max_depth = options.max_array_depth.min(MAX_ARRAY_DEPTH);
    let metadata = MetadataMap::read_from(reader, header.metadata_kv_count, max_depth)?;
    let tensors = read_descriptors(reader, header.tensor_count)?;
    Ok((header, metadata, tensors))
}

struct PendingTensor {
    name: String,
    dims: Vec<u64>,
    tensor_type: TensorType,
    data: Vec<u8>,
}

/// Builder for new documents.
///
/// Tensors are laid out in insertion order, each at the next aligned
/// offset. [`DocumentBuilder::build`] returns the document together with
/// the packed data region it refers to.
#[derive(Default)]
pub struct DocumentBuilder {
    version: Option<u32>,
    metadata: MetadataMap,
    tensors: Vec<PendingTensor>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key, value.into());
        self
    }

    pub fn tensor(
        mut self,
        name: impl Into<String>,
        dims: &[u64],
        tensor_type: TensorType,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        self.tensors.push(PendingTensor {
            name: name.into(),
            dims: dims.to_vec(),
            tensor_type,
            data: data.into(),
        });
        self
    }

    /// Lay out the tensors and produce the document plus its data region.
    ///
    /// The region carries zero padding between tensors but none after the
    /// last one.
    pub fn build(self) -> Result<(GgufDocument, Vec<u8>)> {
        let alignment = alignment_of(&self.metadata);
        let mut payload = Vec::new();
        let mut tensors = Vec::with_capacity(self.tensors.len());

        for pending in self.tensors {
            let offset = align_to(payload.len() as u64, alignment);
            let descriptor =
                TensorDescriptor::new(pending.name, pending.dims, pending.tensor_type, offset);
            let expected = descriptor.byte_size()?;
            if expected != pending.data.len() as u64 {
                return Err(GgufError::InconsistentDescriptors(format!(
                    "tensor '{}' expects {} bytes, got {}",
                    descriptor.name,
                    expected,
                    pending.data.len()
                )));
            }
            payload.resize(offset as usize, 0);
            payload.extend_from_slice(&pending.data);
            tensors.push(descriptor);
        }

        let header = GgufHeader::new(
            self.version.unwrap_or(GGUF_VERSION),
            tensors.len() as u64,
            self.metadata.len() as u64,
        );
        let document = GgufDocument {
            header,
            metadata: self.metadata,
            tensors,
            data: TensorDataRegion {
                start: 0,
                len: payload.len() as u64,
            },
        };
        Ok((document, payload))
    }

    /// Build and serialize a complete file in memory
    pub fn to_bytes(self) -> Result<Vec<u8>> {
        let (document, payload) = self.build()?;
        GgufWriter::default().write_to_vec(&document, &mut Cursor::new(payload))
    }
}
