//! Stateless directory export and import.
//!
//! `export_to_dir` lays a document out as editable JSON files;
//! `import_from_dir` folds an edited `metadata/metadata.json` back into a
//! document. There is no mount table: the directory is the only state, and
//! the caller decides when to write the result with [`GgufWriter`].
//!
//! [`GgufWriter`]: crate::GgufWriter

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json, json};
use tracing::info;

use crate::config::{ModelSummary, summarize};
use crate::document::GgufDocument;
use crate::error::{GgufError, Result};
use crate::metadata::{MAX_ARRAY_DEPTH, MetadataMap, MetadataValue, ValueType};
use crate::policy::KeyPolicy;

pub const METADATA_FILE: &str = "metadata/metadata.json";
pub const TENSORS_FILE: &str = "tensors/tensors.json";
pub const CONFIG_FILE: &str = "config/model_config.json";
pub const TOKENIZER_FILE: &str = "tokenizer/tokenizer.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// On-disk shape of `metadata/metadata.json`
#[derive(Debug, Serialize, Deserialize)]
struct MetadataFile {
    entries: Vec<JsonEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonEntry {
    key: String,
    #[serde(rename = "type")]
    value_type: ValueType,
    value: Json,
}

#[derive(Debug, Serialize)]
struct JsonTensor<'a> {
    name: &'a str,
    dims: &'a [u64],
    #[serde(rename = "type")]
    tensor_type: &'static str,
    type_id: u32,
    offset: u64,
    byte_size: u64,
}

/// Files written by an export, relative to the export root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportComponents {
    pub metadata: String,
    pub tensors: String,
    pub config: String,
    pub tokenizer: Option<String>,
}

/// Contents of `manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub gguf_version: u32,
    pub model_architecture: Option<String>,
    pub model_name: Option<String>,
    pub tensor_count: u64,
    pub metadata_count: u64,
    pub has_tokenizer: bool,
    pub has_telemetry: bool,
    pub components: ExportComponents,
}

/// Write a document's metadata, descriptors, config summary and tokenizer
/// view under `dir`.
///
/// Tensor payload is not exported; re-import needs the original document
/// (and its source) to write a file.
pub fn export_to_dir(
    document: &GgufDocument,
    dir: impl AsRef<Path>,
    policy: &KeyPolicy,
) -> Result<ExportManifest> {
    let dir = dir.as_ref();
    let summary = summarize(document, policy);

    write_metadata_json(document.metadata(), dir.join(METADATA_FILE))?;

    let tensors = document
        .tensors()
        .iter()
        .map(|t| {
            Ok(JsonTensor {
                name: &t.name,
                dims: &t.dims,
                tensor_type: t.tensor_type.name(),
                type_id: t.tensor_type as u32,
                offset: t.offset,
                byte_size: t.byte_size()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    write_json(dir.join(TENSORS_FILE), &tensors)?;
    write_json(dir.join(CONFIG_FILE), &summary)?;

    let tokenizer = if summary.content.has_tokenizer {
        write_json(dir.join(TOKENIZER_FILE), &tokenizer_view(document.metadata(), policy))?;
        Some(TOKENIZER_FILE.to_string())
    } else {
        None
    };

    let manifest = manifest_for(&summary, tokenizer);
    write_json(dir.join(MANIFEST_FILE), &manifest)?;

    info!(dir = %dir.display(), entries = document.metadata().len(), "exported GGUF document");
    Ok(manifest)
}

/// Replace `document`'s metadata with the contents of an exported
/// directory's `metadata/metadata.json`.
pub fn import_from_dir(dir: impl AsRef<Path>, mut document: GgufDocument) -> Result<GgufDocument> {
    let dir = dir.as_ref();
    let metadata = read_metadata_json(dir.join(METADATA_FILE))?;
    info!(dir = %dir.display(), entries = metadata.len(), "imported metadata");
    document.replace_metadata(metadata);
    Ok(document)
}

/// Write a metadata map as typed, ordered JSON entries.
pub fn write_metadata_json(metadata: &MetadataMap, path: impl AsRef<Path>) -> Result<()> {
    let file = MetadataFile {
        entries: metadata
            .iter()
            .map(|(key, value)| JsonEntry {
                key: key.to_string(),
                value_type: value.value_type(),
                value: value_to_json(value),
            })
            .collect(),
    };
    write_json(path, &file)
}

/// Read a metadata map written by [`write_metadata_json`].
pub fn read_metadata_json(path: impl AsRef<Path>) -> Result<MetadataMap> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        GgufError::InvalidExport(format!("cannot open {}: {}", path.display(), e))
    })?;
    let parsed: MetadataFile = serde_json::from_reader(BufReader::new(file))?;

    let mut map = MetadataMap::with_capacity(parsed.entries.len());
    for entry in parsed.entries {
        let value = value_from_json(entry.value_type, &entry.value, &entry.key, 0)?;
        if map.insert(entry.key.clone(), value).is_some() {
            return Err(GgufError::InvalidExport(format!(
                "duplicate key '{}' in {}",
                entry.key,
                path.display()
            )));
        }
    }
    Ok(map)
}

fn write_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path: PathBuf = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut out, value)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

fn manifest_for(summary: &ModelSummary, tokenizer: Option<String>) -> ExportManifest {
    ExportManifest {
        gguf_version: summary.gguf_version,
        model_architecture: summary.config.architecture.clone(),
        model_name: summary.name.clone(),
        tensor_count: summary.tensor_count,
        metadata_count: summary.metadata_count,
        has_tokenizer: summary.content.has_tokenizer,
        has_telemetry: summary.content.has_telemetry,
        components: ExportComponents {
            metadata: METADATA_FILE.to_string(),
            tensors: TENSORS_FILE.to_string(),
            config: CONFIG_FILE.to_string(),
            tokenizer,
        },
    }
}

/// Plain (untyped) view of the tokenizer keys, keyed by their last path
/// segment: `tokenizer.ggml.tokens` becomes `tokens`.
fn tokenizer_view(metadata: &MetadataMap, policy: &KeyPolicy) -> Json {
    let mut view = Map::new();
    for key in policy.transplant_keys.iter().chain(&policy.tokenizer_keys) {
        let short = key.rsplit('.').next().unwrap_or(key).to_string();
        if view.contains_key(&short) {
            continue;
        }
        if let Some(value) = metadata.get(key) {
            let plain = match value {
                MetadataValue::Array(_, items) => Json::Array(items.iter().map(value_to_json).collect()),
                other => value_to_json(other),
            };
            view.insert(short, plain);
        }
    }
    Json::Object(view)
}

/// Prefix of a NaN written with its exact bit pattern, e.g. `nan:0xffc00000`
const NAN_BITS_PREFIX: &str = "nan:0x";

fn infinity_to_json(negative: bool) -> Json {
    if negative {
        json!("-inf")
    } else {
        json!("inf")
    }
}

/// Non-finite values become strings. A NaN other than the canonical one
/// keeps its sign and payload as hex bits.
fn f32_to_json(f: f32) -> Json {
    if f.is_nan() {
        if f.to_bits() == f32::NAN.to_bits() {
            json!("nan")
        } else {
            json!(format!("{}{:08x}", NAN_BITS_PREFIX, f.to_bits()))
        }
    } else if f.is_infinite() {
        infinity_to_json(f.is_sign_negative())
    } else {
        json!(f64::from(f))
    }
}

fn f64_to_json(f: f64) -> Json {
    if f.is_nan() {
        if f.to_bits() == f64::NAN.to_bits() {
            json!("nan")
        } else {
            json!(format!("{}{:016x}", NAN_BITS_PREFIX, f.to_bits()))
        }
    } else if f.is_infinite() {
        infinity_to_json(f.is_sign_negative())
    } else {
        json!(f)
    }
}

fn nan_bits(s: &str) -> Option<u64> {
    let hex = s.strip_prefix(NAN_BITS_PREFIX)?;
    u64::from_str_radix(hex, 16).ok()
}

/// `None` for anything that is not a float32, including finite numbers
/// that overflow the f32 range.
fn f32_from_json(value: &Json) -> Option<f32> {
    match value {
        Json::Number(n) => {
            let narrow = n.as_f64()? as f32;
            narrow.is_finite().then_some(narrow)
        }
        Json::String(s) => match s.as_str() {
            "nan" => Some(f32::NAN),
            "inf" => Some(f32::INFINITY),
            "-inf" => Some(f32::NEG_INFINITY),
            other => nan_bits(other)
                .and_then(|bits| u32::try_from(bits).ok())
                .map(f32::from_bits)
                .filter(|f| f.is_nan()),
        },
        _ => None,
    }
}

fn f64_from_json(value: &Json) -> Option<f64> {
    match value {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => match s.as_str() {
            "nan" => Some(f64::NAN),
            "inf" => Some(f64::INFINITY),
            "-inf" => Some(f64::NEG_INFINITY),
            other => nan_bits(other).map(f64::from_bits).filter(|f| f.is_nan()),
        },
        _ => None,
    }
}

/// JSON form of a value without its type; arrays carry their element type.
fn value_to_json(value: &MetadataValue) -> Json {
    match value {
        MetadataValue::Uint8(n) => json!(n),
        MetadataValue::Int8(n) => json!(n),
        MetadataValue::Uint16(n) => json!(n),
        MetadataValue::Int16(n) => json!(n),
        MetadataValue::Uint32(n) => json!(n),
        MetadataValue::Int32(n) => json!(n),
        MetadataValue::Uint64(n) => json!(n),
        MetadataValue::Int64(n) => json!(n),
        MetadataValue::Float32(f) => f32_to_json(*f),
        MetadataValue::Float64(f) => f64_to_json(*f),
        MetadataValue::Bool(b) => json!(b),
        MetadataValue::String(s) => json!(s),
        MetadataValue::Array(element_type, items) => json!({
            "element_type": element_type,
            "values": items.iter().map(value_to_json).collect::<Vec<_>>(),
        }),
    }
}

fn value_from_json(ty: ValueType, value: &Json, key: &str, depth: usize) -> Result<MetadataValue> {
    let wrong = || {
        GgufError::InvalidExport(format!(
            "key '{}': {} is not a valid {:?} value",
            key, value, ty
        ))
    };
    let unsigned = || value.as_u64().ok_or_else(wrong);
    let signed = || value.as_i64().ok_or_else(wrong);

    Ok(match ty {
        ValueType::Uint8 => MetadataValue::Uint8(u8::try_from(unsigned()?).map_err(|_| wrong())?),
        ValueType::Int8 => MetadataValue::Int8(i8::try_from(signed()?).map_err(|_| wrong())?),
        ValueType::Uint16 => MetadataValue::Uint16(u16::try_from(unsigned()?).map_err(|_| wrong())?),
        ValueType::Int16 => MetadataValue::Int16(i16::try_from(signed()?).map_err(|_| wrong())?),
        ValueType::Uint32 => MetadataValue::Uint32(u32::try_from(unsigned()?).map_err(|_| wrong())?),
        ValueType::Int32 => MetadataValue::Int32(i32::try_from(signed()?).map_err(|_| wrong())?),
        ValueType::Uint64 => MetadataValue::Uint64(unsigned()?),
        ValueType::Int64 => MetadataValue::Int64(signed()?),
        ValueType::Float32 => MetadataValue::Float32(f32_from_json(value).ok_or_else(wrong)?),
        ValueType::Float64 => MetadataValue::Float64(f64_from_json(value).ok_or_else(wrong)?),
        ValueType::Bool => MetadataValue::Bool(value.as_bool().ok_or_else(wrong)?),
        ValueType::String => MetadataValue::String(value.as_str().ok_or_else(wrong)?.to_string()),
        ValueType::Array => {
            if depth >= MAX_ARRAY_DEPTH {
                return Err(GgufError::NestingTooDeep(MAX_ARRAY_DEPTH));
            }
            let object = value.as_object().ok_or_else(wrong)?;
            let element_type: ValueType =
                serde_json::from_value(object.get("element_type").cloned().ok_or_else(wrong)?)?;
            let values = object
                .get("values")
                .and_then(Json::as_array)
                .ok_or_else(wrong)?;
            let items = values
                .iter()
                .map(|item| value_from_json(element_type, item, key, depth + 1))
                .collect::<Result<Vec<_>>>()?;
            MetadataValue::Array(element_type, items)
        }
    })
}
