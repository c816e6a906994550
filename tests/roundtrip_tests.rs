//! Read → (edit) → write → read round trips.

mod common;

use std::fs;
use std::io::Cursor;

use gguf_repack::edit::{remove_key, set_value};
use gguf_repack::{
    DocumentBuilder, GgufDocument, GgufError, GgufWriter, MetadataValue, TensorType, WriterOptions,
};

use common::{pattern, rich_bytes, scenario_bytes, tok_embd_bytes};

fn rewrite(document: &GgufDocument, source: &[u8]) -> Vec<u8> {
    GgufWriter::default()
        .write_to_vec(document, &mut Cursor::new(source))
        .expect("rewrite should succeed")
}

#[test]
fn unedited_rewrite_is_byte_identical() -> Result<(), Box<dyn std::error::Error>> {
    for original in [scenario_bytes(), rich_bytes()] {
        let document = GgufDocument::from_bytes(&original)?;
        let rewritten = rewrite(&document, &original);
        assert_eq!(rewritten, original);

        let reparsed = GgufDocument::from_bytes(&rewritten)?;
        assert_eq!(reparsed, document);
    }
    Ok(())
}

#[test]
fn scenario_remove_tokens_keeps_tensor_intact() -> Result<(), Box<dyn std::error::Error>> {
    let original = scenario_bytes();
    let mut document = GgufDocument::from_bytes(&original)?;

    assert_eq!(document.header().version, 3);
    assert_eq!(document.header().tensor_count, 1);
    assert_eq!(document.header().metadata_kv_count, 2);

    assert!(remove_key(document.metadata_mut(), "tokenizer.ggml.tokens"));
    let written = rewrite(&document, &original);
    let reparsed = GgufDocument::from_bytes(&written)?;

    assert_eq!(reparsed.header().metadata_kv_count, 1);
    assert_eq!(reparsed.header().tensor_count, 1);
    assert_eq!(
        reparsed.metadata().get("general.architecture"),
        Some(&MetadataValue::from("llama"))
    );
    assert!(reparsed.metadata().get("tokenizer.ggml.tokens").is_none());

    let before = &document.tensors()[0];
    let after = &reparsed.tensors()[0];
    assert_eq!(after, before);
    assert_eq!(after.dims, vec![3, 4]);
    assert_eq!(after.tensor_type, TensorType::F32);
    assert_eq!(after.offset, 0);

    let old_span = document.tensor_span(before)?;
    let new_span = reparsed.tensor_span(after)?;
    assert_eq!(new_span.end - new_span.start, 48);
    assert_eq!(
        &written[new_span.start as usize..new_span.end as usize],
        &original[old_span.start as usize..old_span.end as usize]
    );
    assert_eq!(
        reparsed.read_tensor_bytes(&mut Cursor::new(&written), "tok_embd")?,
        tok_embd_bytes()
    );
    Ok(())
}

#[test]
fn metadata_growth_shifts_region_but_preserves_payload() -> Result<(), Box<dyn std::error::Error>> {
    let original = rich_bytes();
    let source = GgufDocument::from_bytes(&original)?;
    let mut document = source.clone();

    set_value(
        document.metadata_mut(),
        "general.description",
        MetadataValue::String("x".repeat(1000)),
    );
    remove_key(document.metadata_mut(), "general.source.url");
    set_value(document.metadata_mut(), "llama.block_count", MetadataValue::Uint32(3));

    let written = rewrite(&document, &original);
    let reparsed = GgufDocument::from_bytes(&written)?;

    assert_eq!(reparsed.metadata(), document.metadata());
    assert_eq!(reparsed.tensors(), source.tensors());
    assert_ne!(reparsed.data_region().start, source.data_region().start);
    assert_eq!(reparsed.data_region().start % 32, 0);
    assert_eq!(reparsed.data_region().len, source.data_region().len);

    for tensor in source.tensors() {
        let old = source.read_tensor_bytes(&mut Cursor::new(&original), &tensor.name)?;
        let new = reparsed.read_tensor_bytes(&mut Cursor::new(&written), &tensor.name)?;
        assert_eq!(old, new, "payload of {} changed", tensor.name);
    }
    Ok(())
}

#[test]
fn replacing_a_value_keeps_key_order() -> Result<(), Box<dyn std::error::Error>> {
    let original = rich_bytes();
    let mut document = GgufDocument::from_bytes(&original)?;
    let keys_before: Vec<String> = document.metadata().keys().map(str::to_string).collect();

    set_value(document.metadata_mut(), "general.name", MetadataValue::from("renamed"));
    let reparsed = GgufDocument::from_bytes(&rewrite(&document, &original))?;

    let keys_after: Vec<String> = reparsed.metadata().keys().map(str::to_string).collect();
    assert_eq!(keys_after, keys_before);
    assert_eq!(
        reparsed.metadata().get("general.name").and_then(|v| v.as_str()),
        Some("renamed")
    );
    Ok(())
}

#[test]
fn small_chunks_copy_the_same_bytes() -> Result<(), Box<dyn std::error::Error>> {
    let original = rich_bytes();
    let document = GgufDocument::from_bytes(&original)?;
    let writer = GgufWriter::new(WriterOptions {
        chunk_size: 7,
        verify: true,
    });
    let out = writer.write_to_vec(&document, &mut Cursor::new(&original))?;
    assert_eq!(out, original);
    Ok(())
}

#[test]
fn summary_reports_recomputed_counts() -> Result<(), Box<dyn std::error::Error>> {
    let original = scenario_bytes();
    let mut document = GgufDocument::from_bytes(&original)?;
    set_value(document.metadata_mut(), "general.name", MetadataValue::from("x"));

    let mut out = Vec::new();
    let summary = GgufWriter::default().write(&document, &mut Cursor::new(&original), &mut out)?;

    assert_eq!(summary.header.metadata_kv_count, 3);
    assert_eq!(summary.header.tensor_count, 1);
    assert_eq!(summary.tensor_bytes, 48);
    assert_eq!(summary.total_bytes, out.len() as u64);
    assert_eq!(summary.data_start % 32, 0);
    // the document keeps the header it was read with
    assert_eq!(document.header().metadata_kv_count, 2);
    Ok(())
}

#[test]
fn alignment_override_is_honoured() -> Result<(), Box<dyn std::error::Error>> {
    let bytes = DocumentBuilder::new()
        .metadata("general.alignment", MetadataValue::Uint32(64))
        .tensor("a", &[3], TensorType::F32, pattern(12, 9))
        .tensor("b", &[2], TensorType::F32, pattern(8, 5))
        .to_bytes()?;

    let document = GgufDocument::from_bytes(&bytes)?;
    assert_eq!(document.alignment(), 64);
    assert_eq!(document.data_region().start % 64, 0);
    assert_eq!(document.tensor("b").map(|t| t.offset), Some(64));
    assert_eq!(document.read_tensor_bytes(&mut Cursor::new(&bytes), "b")?, pattern(8, 5));
    Ok(())
}

#[test]
fn misaligning_edit_fails_before_writing() -> Result<(), Box<dyn std::error::Error>> {
    let bytes = DocumentBuilder::new()
        .tensor("a", &[3], TensorType::F32, pattern(12, 1))
        .tensor("b", &[3], TensorType::F32, pattern(12, 2))
        .to_bytes()?;
    let mut document = GgufDocument::from_bytes(&bytes)?;
    assert_eq!(document.tensor("b").map(|t| t.offset), Some(32));

    set_value(document.metadata_mut(), "general.alignment", MetadataValue::Uint32(256));

    let mut sink = Vec::new();
    let err = GgufWriter::default()
        .write(&document, &mut Cursor::new(&bytes), &mut sink)
        .unwrap_err();
    assert!(matches!(err, GgufError::InconsistentDescriptors(_)), "{err}");
    assert!(sink.is_empty(), "sink must not be touched");
    Ok(())
}

#[test]
fn version_two_is_preserved() -> Result<(), Box<dyn std::error::Error>> {
    let bytes = DocumentBuilder::new()
        .version(2)
        .metadata("general.architecture", "llama")
        .to_bytes()?;
    let document = GgufDocument::from_bytes(&bytes)?;
    assert_eq!(document.version(), 2);
    let rewritten = rewrite(&document, &bytes);
    assert_eq!(GgufDocument::from_bytes(&rewritten)?.version(), 2);
    Ok(())
}

#[test]
fn empty_document_round_trips() -> Result<(), Box<dyn std::error::Error>> {
    let bytes = DocumentBuilder::new().to_bytes()?;
    assert_eq!(bytes.len(), 32);

    let document = GgufDocument::from_bytes(&bytes)?;
    assert!(document.metadata().is_empty());
    assert!(document.tensors().is_empty());
    assert_eq!(document.data_region().len, 0);
    assert_eq!(rewrite(&document, &bytes), bytes);
    Ok(())
}

#[test]
fn builder_rejects_wrong_payload_size() {
    let err = DocumentBuilder::new()
        .tensor("bad", &[4], TensorType::F32, vec![0u8; 15])
        .to_bytes()
        .unwrap_err();
    assert!(matches!(err, GgufError::InconsistentDescriptors(_)));
}

#[test]
fn heterogeneous_array_is_refused_by_writer() {
    let err = DocumentBuilder::new()
        .metadata(
            "mixed",
            MetadataValue::Array(
                gguf_repack::ValueType::Uint8,
                vec![MetadataValue::Uint8(1), MetadataValue::Bool(true)],
            ),
        )
        .to_bytes()
        .unwrap_err();
    assert!(matches!(err, GgufError::InvalidValue(_)));
}

#[test]
fn write_file_rewrites_in_place() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("model.gguf");
    fs::write(&path, rich_bytes())?;

    let mut document = GgufDocument::open(&path)?;
    remove_key(document.metadata_mut(), "tokenizer.ggml.scores");
    let summary = GgufWriter::default().write_file(&document, &path, &path)?;

    let reopened = GgufDocument::open(&path)?;
    assert_eq!(summary.total_bytes, fs::metadata(&path)?.len());
    assert_eq!(reopened.metadata(), document.metadata());
    assert_eq!(reopened.tensors(), document.tensors());

    let leftovers = fs::read_dir(dir.path())?.count();
    assert_eq!(leftovers, 1, "temporary file should have been renamed away");
    Ok(())
}

#[test]
fn failed_write_file_leaves_no_output() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let full = rich_bytes();
    let document = GgufDocument::from_bytes(&full)?;

    // A source that lost its tensor data after the document was read
    let short = dir.path().join("short.gguf");
    fs::write(&short, &full[..document.data_region().start as usize + 10])?;
    let dest = dir.path().join("out.gguf");

    let err = GgufWriter::default()
        .write_file(&document, &short, &dest)
        .unwrap_err();
    assert!(err.is_truncation(), "{err}");
    assert!(!dest.exists());
    assert_eq!(fs::read_dir(dir.path())?.count(), 1);
    Ok(())
}
