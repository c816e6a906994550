//! Serialize a (possibly edited) document back into a GGUF file.
//!
//! Only the header, metadata and descriptor table are re-encoded. Tensor
//! offsets are relative to the data region, so a metadata edit only moves
//! the region start; the region itself is streamed through unchanged.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::cursor::ByteWriter;
use crate::document::GgufDocument;
use crate::error::{GgufError, Result};
use crate::header::GgufHeader;
use crate::tensors::write_descriptors;
use crate::validation::{check_descriptor_layout, check_region_capacity, verify_encoded_head};

/// Default size of the buffer reused while copying tensor data
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 20;

/// Writer knobs
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    /// Buffer size for the tensor-data copy; peak memory is metadata + this
    pub chunk_size: usize,
    /// Re-parse the encoded head and compare it with the document before
    /// anything reaches the sink
    pub verify: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            verify: true,
        }
    }
}

/// What a successful write produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    /// Header as written, with recomputed counts
    pub header: GgufHeader,
    /// Absolute offset of the data region in the output
    pub data_start: u64,
    /// Bytes of tensor data streamed from the source
    pub tensor_bytes: u64,
    /// Total size of the output
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Default)]
pub struct GgufWriter {
    options: WriterOptions,
}

impl GgufWriter {
    pub fn new(options: WriterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Encode header, metadata, descriptors and the alignment padding.
    ///
    /// The counts come from the document's current contents, not from the
    /// header it was read with.
    pub fn encode_head(&self, document: &GgufDocument) -> Result<(GgufHeader, Vec<u8>)> {
        let header = GgufHeader::new(
            document.version(),
            document.tensors().len() as u64,
            document.metadata().len() as u64,
        );

        let mut writer = ByteWriter::new(Vec::new());
        header.write(&mut writer)?;
        document.metadata().write_to(&mut writer)?;
        write_descriptors(&mut writer, document.tensors())?;
        writer.pad_to(document.alignment())?;

        Ok((header, writer.into_inner()))
    }

    /// Write `document` to `sink`, streaming tensor data from `source`.
    ///
    /// `source` must be the byte source the document was read from (or the
    /// payload returned by [`DocumentBuilder::build`](crate::DocumentBuilder::build)).
    ///
    /// # Errors
    ///
    /// Descriptor problems are reported as `GgufError::InconsistentDescriptors`
    /// before a single byte reaches the sink. A failure while streaming
    /// leaves the sink holding a partial file; use [`GgufWriter::write_file`]
    /// when the output must never be observed half-written.
    pub fn write<R, W>(&self, document: &GgufDocument, source: &mut R, sink: &mut W) -> Result<WriteSummary>
    where
        R: Read + Seek,
        W: Write,
    {
        let region = document.data_region();
        let required = check_descriptor_layout(document.tensors(), document.alignment())?;
        check_region_capacity(required, region.len)?;

        let (header, head) = self.encode_head(document)?;
        if self.options.verify {
            verify_encoded_head(document, &head)?;
        }

        sink.write_all(&head)?;
        source.seek(SeekFrom::Start(region.start))?;
        let tensor_bytes = copy_region(source, sink, region.start, region.len, self.options.chunk_size)?;
        sink.flush()?;

        let summary = WriteSummary {
            header,
            data_start: head.len() as u64,
            tensor_bytes,
            total_bytes: head.len() as u64 + tensor_bytes,
        };
        debug!(
            metadata = header.metadata_kv_count,
            tensors = header.tensor_count,
            data_start = summary.data_start,
            total = summary.total_bytes,
            "wrote GGUF document"
        );
        Ok(summary)
    }

    /// Write to a fresh in-memory buffer
    pub fn write_to_vec<R: Read + Seek>(&self, document: &GgufDocument, source: &mut R) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write(document, source, &mut out)?;
        Ok(out)
    }

    /// Write to `dest`, reading tensor data from the file at `source_path`.
    ///
    /// Output goes to a temporary file next to `dest` that is renamed into
    /// place only after the write (and flush) succeeded, so a failed write
    /// never leaves a truncated file behind. `dest` may equal `source_path`.
    pub fn write_file(
        &self,
        document: &GgufDocument,
        source_path: impl AsRef<Path>,
        dest: impl AsRef<Path>,
    ) -> Result<WriteSummary> {
        let dest = dest.as_ref();
        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut source = File::open(source_path.as_ref())?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        let summary = {
            let mut sink = BufWriter::new(tmp.as_file_mut());
            let summary = self.write(document, &mut source, &mut sink)?;
            sink.flush()?;
            summary
        };
        tmp.as_file().sync_all()?;
        tmp.persist(dest).map_err(|e| GgufError::Io(e.error))?;

        info!(
            path = %dest.display(),
            bytes = summary.total_bytes,
            "saved GGUF file"
        );
        Ok(summary)
    }
}

/// Copy exactly `len` bytes using one reusable buffer of `chunk_size` bytes.
fn copy_region<R: Read, W: Write>(
    source: &mut R,
    sink: &mut W,
    start: u64,
    len: u64,
    chunk_size: usize,
) -> Result<u64> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut copied = 0u64;

    while copied < len {
        let n = (len - copied).min(buf.len() as u64) as usize;
        source.read_exact(&mut buf[..n]).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                GgufError::TruncatedInput {
                    offset: start + copied,
                    needed: len - copied,
                }
            } else {
                GgufError::Io(e)
            }
        })?;
        sink.write_all(&buf[..n])?;
        copied += n as u64;
    }

    Ok(copied)
}
