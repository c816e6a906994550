//! Key policy: the caller-supplied key sets behind classification,
//! telemetry stripping and tokenizer transplant.
//!
//! The codec itself treats keys as opaque; everything namespace-aware is
//! driven by a [`KeyPolicy`] so the lists can change without touching the
//! format code.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Placeholder in [`KeyPolicy::vocab_size_keys`] replaced by the value of
/// `general.architecture`.
pub const ARCH_PLACEHOLDER: &str = "{arch}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyPolicy {
    /// Presence of any of these marks a document as carrying a tokenizer
    pub tokenizer_keys: Vec<String>,
    /// Presence of any of these marks a document as carrying telemetry
    pub telemetry_keys: Vec<String>,
    /// Removed by `strip_telemetry`
    pub strip_keys: Vec<String>,
    /// Copied from the donor during a tokenizer transplant
    pub transplant_keys: Vec<String>,
    /// Token-list key whose length is the new vocabulary size
    pub token_list_key: String,
    /// Rewritten with the donor's vocabulary size after a transplant
    pub vocab_size_keys: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            tokenizer_keys: strings(&[
                "tokenizer.ggml.model",
                "tokenizer.ggml.tokens",
                "tokenizer.ggml.scores",
                "tokenizer.ggml.token_type",
            ]),
            telemetry_keys: strings(&[
                "general.source.url",
                "general.source.huggingface.repository",
                "training.dataset",
                "training.data_url",
            ]),
            strip_keys: strings(&[
                "general.source.url",
                "general.source.huggingface.repository",
                "training.dataset",
                "training.data_url",
                "general.license",
                "general.base_model.source",
            ]),
            transplant_keys: strings(&[
                "tokenizer.ggml.model",
                "tokenizer.ggml.tokens",
                "tokenizer.ggml.scores",
                "tokenizer.ggml.token_type",
                "tokenizer.ggml.merges",
                "tokenizer.ggml.added_tokens",
            ]),
            token_list_key: "tokenizer.ggml.tokens".to_string(),
            vocab_size_keys: strings(&["general.vocab_size", "{arch}.vocab_size"]),
        }
    }
}

impl KeyPolicy {
    /// Load a policy from JSON. Missing fields fall back to the defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Vocabulary-size keys with the architecture placeholder expanded.
    ///
    /// Entries that need an architecture are dropped when none is known.
    pub fn resolved_vocab_size_keys(&self, architecture: Option<&str>) -> Vec<String> {
        self.vocab_size_keys
            .iter()
            .filter_map(|key| {
                if key.contains(ARCH_PLACEHOLDER) {
                    architecture.map(|arch| key.replace(ARCH_PLACEHOLDER, arch))
                } else {
                    Some(key.clone())
                }
            })
            .collect()
    }
}
