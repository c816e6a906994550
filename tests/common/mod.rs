//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use gguf_repack::{DocumentBuilder, MetadataValue, TensorType, ValueType};

/// Deterministic, non-repeating-looking payload of `n` bytes
pub fn pattern(n: usize, seed: u8) -> Vec<u8> {
    (0..n)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// 3x4 F32 tensor holding 0.0..12.0
pub fn tok_embd_bytes() -> Vec<u8> {
    (0..12u32).flat_map(|i| (i as f32).to_le_bytes()).collect()
}

/// The two-key, one-tensor file used throughout the docs
pub fn scenario() -> DocumentBuilder {
    DocumentBuilder::new()
        .metadata("general.architecture", "llama")
        .metadata(
            "tokenizer.ggml.tokens",
            MetadataValue::string_array(["a", "b", "c"]),
        )
        .tensor("tok_embd", &[3, 4], TensorType::F32, tok_embd_bytes())
}

pub fn scenario_bytes() -> Vec<u8> {
    scenario().to_bytes().expect("scenario fixture should serialize")
}

/// A file exercising every value type, nested arrays and several tensor
/// types, including quantized ones.
pub fn rich() -> DocumentBuilder {
    DocumentBuilder::new()
        .metadata("general.architecture", "llama")
        .metadata("general.name", "tiny-test")
        .metadata("general.file_type", MetadataValue::Uint32(1))
        .metadata("general.parameter_count", MetadataValue::Uint64(1_234_567))
        .metadata("llama.block_count", MetadataValue::Uint32(2))
        .metadata("llama.context_length", MetadataValue::Uint32(4096))
        .metadata("llama.vocab_size", MetadataValue::Uint32(5))
        .metadata("llama.rope.freq_base", MetadataValue::Float32(10000.0))
        .metadata("test.u8", MetadataValue::Uint8(200))
        .metadata("test.i8", MetadataValue::Int8(-100))
        .metadata("test.u16", MetadataValue::Uint16(60000))
        .metadata("test.i16", MetadataValue::Int16(-30000))
        .metadata("test.i32", MetadataValue::Int32(-7))
        .metadata("test.i64", MetadataValue::Int64(i64::MIN))
        .metadata("test.f64", MetadataValue::Float64(std::f64::consts::PI))
        .metadata("test.bool", MetadataValue::Bool(true))
        .metadata("test.unicode", "héllo → 世界")
        .metadata(
            "test.nested",
            MetadataValue::Array(
                ValueType::Array,
                vec![
                    MetadataValue::Array(
                        ValueType::Uint8,
                        vec![MetadataValue::Uint8(1), MetadataValue::Uint8(2)],
                    ),
                    MetadataValue::string_array(["x"]),
                ],
            ),
        )
        .metadata(
            "tokenizer.ggml.tokens",
            MetadataValue::string_array(["<s>", "</s>", "a", "b", "c"]),
        )
        .metadata(
            "tokenizer.ggml.scores",
            MetadataValue::Array(
                ValueType::Float32,
                (1..=5).map(|i| MetadataValue::Float32(i as f32 * -0.5)).collect(),
            ),
        )
        .metadata("general.source.url", "https://example.invalid/model")
        .tensor("token_embd.weight", &[4, 5], TensorType::F16, pattern(40, 1))
        .tensor("blk.0.attn_q.weight", &[32, 2], TensorType::Q8_0, pattern(68, 2))
        .tensor("blk.0.ffn_up.weight", &[256], TensorType::Q4K, pattern(144, 3))
        .tensor("output_norm.weight", &[4], TensorType::F32, pattern(16, 4))
}

pub fn rich_bytes() -> Vec<u8> {
    rich().to_bytes().expect("rich fixture should serialize")
}

/// Find the first occurrence of `needle` in `haystack`
pub fn find(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("needle should be present")
}

/// Minimal hand-assembled file pieces, independent of the crate's encoder
pub fn raw_header(version: u32, tensor_count: u64, kv_count: u64) -> Vec<u8> {
    let mut d = Vec::with_capacity(24);
    d.extend_from_slice(b"GGUF");
    d.extend_from_slice(&version.to_le_bytes());
    d.extend_from_slice(&tensor_count.to_le_bytes());
    d.extend_from_slice(&kv_count.to_le_bytes());
    d
}

pub fn push_u32(d: &mut Vec<u8>, v: u32) {
    d.extend_from_slice(&v.to_le_bytes());
}

pub fn push_u64(d: &mut Vec<u8>, v: u64) {
    d.extend_from_slice(&v.to_le_bytes());
}

pub fn push_str(d: &mut Vec<u8>, s: &[u8]) {
    push_u64(d, s.len() as u64);
    d.extend_from_slice(s);
}
