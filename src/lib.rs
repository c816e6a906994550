//! GGUF Repack Library - read, edit and rewrite GGUF model files
//!
//! A [`GgufDocument`] holds the header, the ordered metadata map and the
//! tensor descriptor table of a file, while the tensor payload stays in the
//! source. Edits go through [`edit`]; [`GgufWriter`] re-encodes everything
//! before the data region and streams the payload through unchanged.

pub mod config;
pub mod cursor;
pub mod document;
pub mod edit;
pub mod error;
pub mod export;
pub mod header;
pub mod metadata;
pub mod nonblocking;
pub mod policy;
pub mod tensors;
pub mod validation;
pub mod writer;

// Re-export the main types for easier access
pub use config::{ModelConfig, ModelSummary, extract_model_config, summarize};
pub use document::{DocumentBuilder, GgufDocument, ReaderOptions, TensorDataRegion};
pub use edit::{ContentFlags, TransplantReport, classify, merge_subset, remove_key, set_value};
pub use error::{GgufError, Result, TagKind};
pub use export::{ExportManifest, export_to_dir, import_from_dir};
pub use header::{GGUF_MAGIC, GGUF_VERSION, GgufHeader};
pub use metadata::{MetadataMap, MetadataValue, ValueType};
pub use policy::KeyPolicy;
pub use tensors::{TensorDescriptor, TensorType};
pub use validation::DEFAULT_ALIGNMENT;
pub use writer::{GgufWriter, WriteSummary, WriterOptions};
