//! Metadata edit operations and key-policy driven helpers.

mod common;

use gguf_repack::edit::{strip_keys, strip_telemetry, transplant_tokenizer};
use gguf_repack::{
    ContentFlags, GgufDocument, KeyPolicy, MetadataMap, MetadataValue, classify, merge_subset,
    remove_key, set_value,
};

use common::{rich_bytes, scenario_bytes};

fn map(entries: &[(&str, MetadataValue)]) -> MetadataMap {
    entries.iter().map(|(k, v)| (*k, v.clone())).collect()
}

#[test]
fn remove_key_is_idempotent() {
    let mut once = GgufDocument::from_bytes(&rich_bytes()).unwrap().metadata().clone();
    let mut twice = once.clone();

    assert!(remove_key(&mut once, "general.name"));
    assert!(remove_key(&mut twice, "general.name"));
    assert!(!remove_key(&mut twice, "general.name"));
    assert_eq!(once, twice);
}

#[test]
fn removing_absent_key_is_a_noop() {
    let mut metadata = map(&[("a", MetadataValue::Uint8(1))]);
    let before = metadata.clone();
    assert!(!remove_key(&mut metadata, "missing"));
    assert_eq!(metadata, before);
}

#[test]
fn set_value_twice_is_observably_a_noop() {
    let mut metadata = map(&[("a", MetadataValue::Uint8(1))]);

    assert_eq!(set_value(&mut metadata, "b", MetadataValue::from("x")), None);
    let after_first = metadata.clone();
    assert_eq!(
        set_value(&mut metadata, "b", MetadataValue::from("x")),
        Some(MetadataValue::from("x"))
    );
    assert_eq!(metadata, after_first);
}

#[test]
fn set_value_replaces_in_place() {
    let mut metadata = map(&[
        ("a", MetadataValue::Uint8(1)),
        ("b", MetadataValue::Uint8(2)),
        ("c", MetadataValue::Uint8(3)),
    ]);
    let previous = set_value(&mut metadata, "b", MetadataValue::Bool(false));
    assert_eq!(previous, Some(MetadataValue::Uint8(2)));

    let keys: Vec<&str> = metadata.keys().collect();
    assert_eq!(keys, ["a", "b", "c"]);
    assert_eq!(metadata.get("b"), Some(&MetadataValue::Bool(false)));
}

#[test]
fn merge_subset_copies_only_named_present_keys() {
    let mut target = map(&[
        ("keep", MetadataValue::Uint32(1)),
        ("shared", MetadataValue::Uint32(2)),
    ]);
    let source = map(&[
        ("shared", MetadataValue::Uint32(20)),
        ("extra", MetadataValue::Uint32(30)),
        ("ignored", MetadataValue::Uint32(40)),
    ]);

    let applied = merge_subset(&mut target, &source, &["shared", "extra", "absent"]);
    assert_eq!(applied, 2);
    assert_eq!(target.get("keep"), Some(&MetadataValue::Uint32(1)));
    assert_eq!(target.get("shared"), Some(&MetadataValue::Uint32(20)));
    assert_eq!(target.get("extra"), Some(&MetadataValue::Uint32(30)));
    assert!(!target.contains_key("ignored"));
}

#[test]
fn classification_does_not_mutate() {
    let policy = KeyPolicy::default();
    let rich = GgufDocument::from_bytes(&rich_bytes()).unwrap();
    let before = rich.metadata().clone();

    assert_eq!(
        classify(rich.metadata(), &policy),
        ContentFlags {
            has_tokenizer: true,
            has_telemetry: true
        }
    );
    assert_eq!(rich.metadata(), &before);

    let empty = MetadataMap::new();
    assert_eq!(classify(&empty, &policy), ContentFlags::default());
}

#[test]
fn classification_follows_the_supplied_policy() {
    let metadata = map(&[("custom.tracking_id", MetadataValue::from("abc"))]);
    assert!(!classify(&metadata, &KeyPolicy::default()).has_telemetry);

    let policy = KeyPolicy {
        telemetry_keys: vec!["custom.tracking_id".to_string()],
        ..KeyPolicy::default()
    };
    assert!(classify(&metadata, &policy).has_telemetry);
}

#[test]
fn strip_telemetry_removes_policy_keys() {
    let mut metadata = map(&[
        ("general.architecture", MetadataValue::from("llama")),
        ("general.license", MetadataValue::from("mit")),
        ("general.source.url", MetadataValue::from("https://example.invalid")),
        ("training.dataset", MetadataValue::from("secret")),
    ]);
    let policy = KeyPolicy::default();

    assert_eq!(strip_telemetry(&mut metadata, &policy), 3);
    assert_eq!(metadata.len(), 1);
    assert!(!classify(&metadata, &policy).has_telemetry);
    assert_eq!(strip_telemetry(&mut metadata, &policy), 0);
}

#[test]
fn strip_keys_counts_only_present_keys() {
    let mut metadata = map(&[("a", MetadataValue::Uint8(1)), ("b", MetadataValue::Uint8(2))]);
    assert_eq!(strip_keys(&mut metadata, &["a", "zzz"]), 1);
    assert_eq!(metadata.keys().collect::<Vec<_>>(), ["b"]);
}

#[test]
fn transplant_swaps_tokenizer_and_resizes_existing_vocab_keys() {
    let mut target = GgufDocument::from_bytes(&rich_bytes())
        .unwrap()
        .metadata()
        .clone();
    let donor = GgufDocument::from_bytes(&scenario_bytes())
        .unwrap()
        .metadata()
        .clone();

    let report = transplant_tokenizer(&mut target, &donor, &KeyPolicy::default());

    assert_eq!(report.transplanted, ["tokenizer.ggml.tokens"]);
    assert_eq!(report.vocab_size, Some(3));
    // general.vocab_size is absent from the target and must not be invented
    assert_eq!(report.resized, ["llama.vocab_size"]);
    assert_eq!(target.get("llama.vocab_size"), Some(&MetadataValue::Uint32(3)));
    assert!(!target.contains_key("general.vocab_size"));
    assert_eq!(
        target.get("tokenizer.ggml.tokens"),
        donor.get("tokenizer.ggml.tokens")
    );
    // keys the donor lacks are left alone
    assert!(target.contains_key("tokenizer.ggml.scores"));
}

#[test]
fn transplant_keeps_integer_width() {
    let mut target = map(&[
        ("general.architecture", MetadataValue::from("qwen2")),
        ("qwen2.vocab_size", MetadataValue::Uint64(10)),
    ]);
    let donor = map(&[(
        "tokenizer.ggml.tokens",
        MetadataValue::string_array(["a", "b"]),
    )]);

    let report = transplant_tokenizer(&mut target, &donor, &KeyPolicy::default());
    assert_eq!(report.resized, ["qwen2.vocab_size"]);
    assert_eq!(target.get("qwen2.vocab_size"), Some(&MetadataValue::Uint64(2)));
}

#[test]
fn transplant_without_token_list_resizes_nothing() {
    let mut target = map(&[("llama.vocab_size", MetadataValue::Uint32(7))]);
    let donor = map(&[("tokenizer.ggml.model", MetadataValue::from("gpt2"))]);

    let report = transplant_tokenizer(&mut target, &donor, &KeyPolicy::default());
    assert_eq!(report.transplanted, ["tokenizer.ggml.model"]);
    assert_eq!(report.vocab_size, None);
    assert!(report.resized.is_empty());
    assert_eq!(target.get("llama.vocab_size"), Some(&MetadataValue::Uint32(7)));
}

#[test]
fn policy_loads_partial_json() {
    let policy = KeyPolicy::from_json_str(r#"{ "telemetry_keys": ["x.y"] }"#).unwrap();
    assert_eq!(policy.telemetry_keys, ["x.y"]);
    assert_eq!(policy.tokenizer_keys, KeyPolicy::default().tokenizer_keys);

    assert_eq!(
        policy.resolved_vocab_size_keys(Some("llama")),
        ["general.vocab_size", "llama.vocab_size"]
    );
    assert_eq!(policy.resolved_vocab_size_keys(None), ["general.vocab_size"]);
}
