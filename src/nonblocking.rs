//! Tokio entry points.
//!
//! The codec is synchronous. These wrappers peek at headers with async file
//! I/O and push whole read/rewrite jobs onto tokio's blocking pool, so an
//! async service can work on many files at once. Documents share no state,
//! so concurrent jobs on different files need no coordination.

use std::path::{Path, PathBuf};

use tokio::io::AsyncReadExt;

use crate::cursor::ByteReader;
use crate::document::GgufDocument;
use crate::error::{GgufError, Result};
use crate::header::{GGUF_HEADER_LEN, GgufHeader};
use crate::writer::{GgufWriter, WriteSummary};

/// Read and validate just the fixed header of a file
pub async fn read_header(path: impl AsRef<Path>) -> Result<GgufHeader> {
    let mut file = tokio::fs::File::open(path.as_ref()).await?;
    let mut buf = Vec::with_capacity(GGUF_HEADER_LEN as usize);
    (&mut file).take(GGUF_HEADER_LEN).read_to_end(&mut buf).await?;

    let len = buf.len() as u64;
    GgufHeader::parse(&mut ByteReader::new(buf.as_slice(), len))
}

/// Parse a document on the blocking pool
pub async fn read_document(path: impl Into<PathBuf>) -> Result<GgufDocument> {
    let path = path.into();
    spawn(move || GgufDocument::open(&path)).await
}

/// Read `source`, apply `edit` to the document, and write the result to
/// `dest` atomically, all on the blocking pool.
pub async fn rewrite_file<F>(
    source: impl Into<PathBuf>,
    dest: impl Into<PathBuf>,
    writer: GgufWriter,
    edit: F,
) -> Result<WriteSummary>
where
    F: FnOnce(&mut GgufDocument) + Send + 'static,
{
    let source = source.into();
    let dest = dest.into();
    spawn(move || {
        let mut document = GgufDocument::open(&source)?;
        edit(&mut document);
        writer.write_file(&document, &source, &dest)
    })
    .await
}

async fn spawn<T, F>(job: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| GgufError::Io(std::io::Error::other(e)))?
}
