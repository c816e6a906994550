//! Metadata-level edits.
//!
//! Every function here is total: absent keys are no-ops, never errors.
//! Nothing in this module touches tensor descriptors or payload.

use serde::Serialize;
use tracing::{debug, info};

use crate::metadata::{MetadataMap, MetadataValue};
use crate::policy::KeyPolicy;

/// Remove `key`; returns whether it was present.
pub fn remove_key(map: &mut MetadataMap, key: &str) -> bool {
    let removed = map.remove(key).is_some();
    if removed {
        debug!(key, "removed metadata key");
    }
    removed
}

/// Insert or replace `key`, returning the previous value.
pub fn set_value(
    map: &mut MetadataMap,
    key: impl Into<String>,
    value: MetadataValue,
) -> Option<MetadataValue> {
    let key = key.into();
    debug!(key = %key, value_type = ?value.value_type(), "set metadata key");
    map.insert(key, value)
}

/// Copy the named keys from `source` into `target`, overwriting on conflict.
///
/// Keys missing from `source` are skipped. Returns how many were copied.
pub fn merge_subset<S: AsRef<str>>(target: &mut MetadataMap, source: &MetadataMap, keys: &[S]) -> usize {
    let mut applied = 0;
    for key in keys {
        let key = key.as_ref();
        if let Some(value) = source.get(key) {
            target.insert(key, value.clone());
            applied += 1;
        }
    }
    applied
}

/// Remove every listed key; returns how many were present.
pub fn strip_keys<S: AsRef<str>>(map: &mut MetadataMap, keys: &[S]) -> usize {
    let mut removed = 0;
    for key in keys {
        if remove_key(map, key.as_ref()) {
            removed += 1;
        }
    }
    removed
}

/// Remove the policy's telemetry/provenance keys.
pub fn strip_telemetry(map: &mut MetadataMap, policy: &KeyPolicy) -> usize {
    let removed = strip_keys(map, &policy.strip_keys);
    info!(removed, "stripped telemetry keys");
    removed
}

/// What a document carries, judged by key membership alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ContentFlags {
    pub has_tokenizer: bool,
    pub has_telemetry: bool,
}

pub fn contains_any<S: AsRef<str>>(map: &MetadataMap, keys: &[S]) -> bool {
    keys.iter().any(|key| map.contains_key(key.as_ref()))
}

/// Classify a map against the policy's tokenizer and telemetry key sets.
pub fn classify(map: &MetadataMap, policy: &KeyPolicy) -> ContentFlags {
    ContentFlags {
        has_tokenizer: contains_any(map, &policy.tokenizer_keys),
        has_telemetry: contains_any(map, &policy.telemetry_keys),
    }
}

/// Outcome of [`transplant_tokenizer`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransplantReport {
    /// Tokenizer keys copied from the donor
    pub transplanted: Vec<String>,
    /// Length of the donor's token list, if it had one
    pub vocab_size: Option<u64>,
    /// Vocabulary-size keys rewritten in the target
    pub resized: Vec<String>,
}

/// Replace the target's tokenizer with the donor's.
///
/// Copies the policy's transplant keys present in `donor`. When the donor
/// carries a token list, every policy vocabulary-size key that already
/// exists in `target` is rewritten to the new size, keeping its integer
/// width where the size fits. Keys absent from `target` are never created.
pub fn transplant_tokenizer(
    target: &mut MetadataMap,
    donor: &MetadataMap,
    policy: &KeyPolicy,
) -> TransplantReport {
    let mut report = TransplantReport::default();

    for key in &policy.transplant_keys {
        if let Some(value) = donor.get(key) {
            target.insert(key.as_str(), value.clone());
            report.transplanted.push(key.clone());
        }
    }

    report.vocab_size = donor
        .get(&policy.token_list_key)
        .and_then(|v| v.as_array())
        .map(|(_, items)| items.len() as u64);

    if let Some(vocab_size) = report.vocab_size {
        let architecture = target
            .get("general.architecture")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        for key in policy.resolved_vocab_size_keys(architecture.as_deref()) {
            if let Some(slot) = target.get_mut(&key) {
                *slot = resized(slot, vocab_size);
                report.resized.push(key);
            }
        }
    }

    info!(
        transplanted = report.transplanted.len(),
        vocab_size = ?report.vocab_size,
        resized = report.resized.len(),
        "transplanted tokenizer"
    );
    report
}

fn resized(existing: &MetadataValue, n: u64) -> MetadataValue {
    match existing {
        MetadataValue::Uint64(_) => MetadataValue::Uint64(n),
        MetadataValue::Int64(_) => MetadataValue::Int64(n as i64),
        MetadataValue::Int32(_) if n <= i32::MAX as u64 => MetadataValue::Int32(n as i32),
        _ => match u32::try_from(n) {
            Ok(n) => MetadataValue::Uint32(n),
            Err(_) => MetadataValue::Uint64(n),
        },
    }
}
