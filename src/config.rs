//! Model summary extraction from GGUF metadata
//!
//! Pulls the architecture hyper-parameters and a few general fields out of
//! the metadata map. Nothing here is required: files written by other tools
//! often lack some of these keys, so every field is optional.

use serde::Serialize;

use crate::document::GgufDocument;
use crate::edit::{ContentFlags, classify};
use crate::metadata::MetadataMap;
use crate::policy::KeyPolicy;

/// Architecture hyper-parameters read from `<arch>.*` keys
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelConfig {
    /// Model architecture (e.g., "llama")
    pub architecture: Option<String>,
    /// Number of transformer blocks
    pub block_count: Option<u64>,
    /// Context length (max sequence length)
    pub context_length: Option<u64>,
    /// Embedding dimension
    pub embedding_length: Option<u64>,
    /// Feed-forward hidden dimension
    pub feed_forward_length: Option<u64>,
    /// Number of attention heads
    pub attention_head_count: Option<u64>,
    /// Number of key-value heads (for GQA)
    pub attention_head_count_kv: Option<u64>,
    /// Layer norm epsilon
    pub layer_norm_epsilon: Option<f64>,
    /// RoPE frequency base
    pub rope_freq_base: Option<f64>,
}

/// Extract model configuration from GGUF metadata
pub fn extract_model_config(metadata: &MetadataMap) -> ModelConfig {
    let architecture = get_string_field(metadata, "general.architecture");
    let Some(arch_prefix) = architecture.clone() else {
        return ModelConfig::default();
    };

    let field = |name: &str| get_u64_field(metadata, &format!("{}.{}", arch_prefix, name));
    let float = |name: &str| get_f64_field(metadata, &format!("{}.{}", arch_prefix, name));

    ModelConfig {
        architecture,
        block_count: field("block_count"),
        context_length: field("context_length"),
        embedding_length: field("embedding_length"),
        feed_forward_length: field("feed_forward_length"),
        attention_head_count: field("attention.head_count"),
        attention_head_count_kv: field("attention.head_count_kv"),
        layer_norm_epsilon: float("attention.layer_norm_rms_epsilon"),
        rope_freq_base: float("rope.freq_base"),
    }
}

/// One-stop description of a document, as shown by an "analyze" view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub name: Option<String>,
    pub gguf_version: u32,
    pub tensor_count: u64,
    pub metadata_count: u64,
    /// Sum of tensor element counts
    pub parameter_count: u64,
    /// Size of the tensor-data region in bytes
    pub tensor_data_bytes: u64,
    pub alignment: u64,
    #[serde(flatten)]
    pub content: ContentFlags,
    pub config: ModelConfig,
}

/// Summarize a document against a key policy
pub fn summarize(document: &GgufDocument, policy: &KeyPolicy) -> ModelSummary {
    let metadata = document.metadata();
    ModelSummary {
        name: get_string_field(metadata, "general.name"),
        gguf_version: document.version(),
        tensor_count: document.tensors().len() as u64,
        metadata_count: metadata.len() as u64,
        parameter_count: document.parameter_count(),
        tensor_data_bytes: document.data_region().len,
        alignment: document.alignment(),
        content: classify(metadata, policy),
        config: extract_model_config(metadata),
    }
}

fn get_string_field(metadata: &MetadataMap, key: &str) -> Option<String> {
    metadata.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn get_u64_field(metadata: &MetadataMap, key: &str) -> Option<u64> {
    let value = metadata.get(key)?;
    value
        .as_u64()
        .or_else(|| value.as_i64().and_then(|n| u64::try_from(n).ok()))
}

fn get_f64_field(metadata: &MetadataMap, key: &str) -> Option<f64> {
    metadata.get(key).and_then(|v| v.as_f64())
}
