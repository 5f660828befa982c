//! End-to-end tests for the tag → pseudonymize → validate workflow.
//!
//! The external tagger and pseudonym generator are replaced with deterministic
//! stand-ins so the tests exercise the same library code paths the CLI uses
//! without network access.

use anyhow::Result;
use pseudollm::audit::{FileAuditLog, MemoryAuditLog, AUDIT_LOG_NAME};
use pseudollm::llm::{EntityTagger, PseudonymGenerator, StaticPseudonyms, TagStyle};
use pseudollm::mapping::PseudonymResponse;
use pseudollm::pipeline::{
    anonymize_file, output_path, pseudonymize_file, run_batch, tag_file, validate_pair,
    ANONYMIZED_SUFFIX, PSEUDONYM_SUFFIX, TAGGED_SUFFIX,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Tags every occurrence of a fixed list of (value, category) pairs.
struct KnownEntityTagger {
    entities: Vec<(&'static str, &'static str)>,
}

impl EntityTagger for KnownEntityTagger {
    fn tag(&self, text: &str, _example: &str, style: TagStyle) -> Result<String> {
        let mut tagged = text.to_string();
        for (value, category) in &self.entities {
            let replacement = match style {
                TagStyle::Plain => format!("<to_pseudonym>{}</to_pseudonym>", value),
                TagStyle::Categorized => {
                    format!("<to_pseudonym type=\"{}\">{}</to_pseudonym>", category, value)
                }
            };
            tagged = tagged.replace(value, &replacement);
        }
        Ok(tagged)
    }
}

/// Generator returning a response with one pseudonym missing.
struct TruncatingGenerator;

impl PseudonymGenerator for TruncatingGenerator {
    fn generate(&self, entities: &[String]) -> Result<PseudonymResponse> {
        Ok(PseudonymResponse {
            pii: entities.to_vec(),
            pseudonym: entities
                .iter()
                .skip(1)
                .map(|e| format!("{}-alias", e))
                .collect(),
        })
    }
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn tagger() -> KnownEntityTagger {
    KnownEntityTagger {
        entities: vec![("John Smith", "PER"), ("ACME", "ORG"), ("Paris", "LOC")],
    }
}

fn generator() -> StaticPseudonyms {
    StaticPseudonyms::new([
        ("John Smith", "Michael Carter"),
        ("ACME", "TechNova"),
        ("Paris", "Lyon"),
    ])
}

const ORIGINAL: &str = "John Smith met ACME in Paris.\nLater John Smith left Paris.\n";

#[test]
fn test_full_workflow_is_balanced() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    fs::create_dir(&out).unwrap();
    let original = write(dir.path(), "letter.txt", ORIGINAL);

    let tagged = tag_file(&tagger(), &original, &out, "", TagStyle::Categorized).unwrap();
    assert_eq!(tagged, out.join("letter_tagged.txt"));

    let audit = MemoryAuditLog::new();
    let outcome = pseudonymize_file(&generator(), &tagged, &out, &audit).unwrap();
    assert_eq!(outcome.output, out.join("letter_tagged_pseudonym.txt"));
    assert_eq!(outcome.entities, 3);
    assert_eq!(outcome.replacements, 3);
    assert!(outcome.is_consistent());
    assert!(audit.warnings().is_empty());

    let pseudonymized = fs::read_to_string(&outcome.output).unwrap();
    assert_eq!(
        pseudonymized,
        "Michael Carter met TechNova in Lyon.\nLater Michael Carter left Lyon.\n"
    );

    let report = validate_pair(&original, &outcome.output).unwrap();
    assert!(report.is_balanced());
    assert_eq!(report.insertions, 7);
    assert_eq!(report.deletions, 7);
    assert_eq!(report.deleted_tokens[3], "Paris.");
    assert_eq!(report.inserted_tokens[3], "Lyon.");
}

#[test]
fn test_category_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let original = write(dir.path(), "memo.txt", ORIGINAL);

    let tagged = tag_file(&tagger(), &original, dir.path(), "", TagStyle::Categorized).unwrap();
    let audit = MemoryAuditLog::new();
    let anonymized = anonymize_file(&tagged, dir.path(), &audit).unwrap();
    assert_eq!(anonymized, output_path(&tagged, dir.path(), ANONYMIZED_SUFFIX));

    let content = fs::read_to_string(&anonymized).unwrap();
    assert_eq!(content, "[PER] met [ORG] in [LOC].\nLater [PER] left [LOC].\n");

    // "John Smith" collapses into a single placeholder token, so this mode is
    // expected to come out unbalanced.
    let report = validate_pair(&original, &anonymized).unwrap();
    assert_eq!(report.deletions, 7);
    assert_eq!(report.insertions, 5);
    assert!(!report.is_balanced());
}

#[test]
fn test_malformed_mapping_aborts_document_only() {
    let dir = tempfile::tempdir().unwrap();
    let original = write(dir.path(), "a.txt", ORIGINAL);
    let tagged = tag_file(&tagger(), &original, dir.path(), "", TagStyle::Plain).unwrap();

    let audit = MemoryAuditLog::new();
    let err = pseudonymize_file(&TruncatingGenerator, &tagged, dir.path(), &audit).unwrap_err();
    assert!(format!("{:#}", err).contains("3 entities but 2 pseudonyms"));
    assert!(!output_path(&tagged, dir.path(), PSEUDONYM_SUFFIX).exists());
}

#[test]
fn test_partial_mapping_warns_but_writes() {
    let dir = tempfile::tempdir().unwrap();
    let tagged = write(
        dir.path(),
        "b_tagged.txt",
        "<to_pseudonym>John Smith</to_pseudonym> and <to_pseudonym>Jane Doe</to_pseudonym>",
    );

    let audit = MemoryAuditLog::new();
    let outcome = pseudonymize_file(&generator(), &tagged, dir.path(), &audit).unwrap();
    assert_eq!(outcome.entities, 2);
    assert_eq!(outcome.replacements, 1);
    assert!(!outcome.is_consistent());

    let warnings = audit.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("expected 2 replacements, made 1"));
    assert!(warnings[0].contains("Jane Doe"));

    let content = fs::read_to_string(&outcome.output).unwrap();
    assert_eq!(content, "Michael Carter and <to_pseudonym>Jane Doe</to_pseudonym>");
}

#[test]
fn test_untagged_document_is_copied() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "plain.txt", "Nothing to hide here.");
    let audit = MemoryAuditLog::new();
    let outcome = pseudonymize_file(&TruncatingGenerator, &input, dir.path(), &audit).unwrap();
    assert_eq!(outcome.entities, 0);
    assert_eq!(
        fs::read_to_string(&outcome.output).unwrap(),
        "Nothing to hide here."
    );
}

#[test]
fn test_batch_with_missing_file_and_audit_log() {
    let dir = tempfile::tempdir().unwrap();
    let good = write(
        dir.path(),
        "good.txt",
        "<to_pseudonym type=\"ORG\">ACME</to_pseudonym> ships",
    );
    let missing = dir.path().join("missing.txt");
    let inputs = vec![good.clone(), missing.clone()];

    let audit = FileAuditLog::in_dir(dir.path()).unwrap();
    let table = generator();
    let summary = run_batch(&inputs, "Pseudonymizing", |input| {
        let outcome = pseudonymize_file(&table, input, dir.path(), &audit)?;
        Ok(outcome.output.display().to_string())
    });

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, missing);
    assert!(summary.failed[0].1.contains("Failed to read input file"));

    let written = output_path(&good, dir.path(), PSEUDONYM_SUFFIX);
    assert_eq!(fs::read_to_string(written).unwrap(), "TechNova ships");

    let log = fs::read_to_string(dir.path().join(AUDIT_LOG_NAME)).unwrap();
    assert!(log.contains("[good.txt] Replaced 'ACME' (ORG) -> 'TechNova'"));
    assert!(log.contains("[good.txt] Processing file"));
}

#[test]
fn test_concurrent_documents_share_attributable_audit_log() {
    let dir = tempfile::tempdir().unwrap();
    let first = write(
        dir.path(),
        "first.txt",
        "<to_pseudonym type=\"ORG\">ACME</to_pseudonym> hired <to_pseudonym>John Smith</to_pseudonym>",
    );
    let second = write(
        dir.path(),
        "second.txt",
        "<to_pseudonym type=\"LOC\">Paris</to_pseudonym> in spring",
    );
    let inputs = vec![first, second];

    let audit = FileAuditLog::in_dir(dir.path()).unwrap();
    let table = generator();
    let summary = run_batch(&inputs, "Pseudonymizing", |input| {
        let outcome = pseudonymize_file(&table, input, dir.path(), &audit)?;
        Ok(outcome.output.display().to_string())
    });
    assert!(summary.is_success());

    let log = fs::read_to_string(dir.path().join(AUDIT_LOG_NAME)).unwrap();
    let replaced: Vec<&str> = log.lines().filter(|l| l.contains("Replaced")).collect();
    assert_eq!(replaced.len(), 3);
    for line in &replaced {
        let expected_doc = if line.contains("'Paris'") {
            "[second.txt]"
        } else {
            "[first.txt]"
        };
        assert!(line.contains(expected_doc), "unattributed line: {}", line);
    }
    for line in log.lines() {
        assert!(
            line.contains("[first.txt]") || line.contains("[second.txt]"),
            "line without document: {}",
            line
        );
    }
}

#[test]
fn test_tagged_output_name() {
    assert_eq!(
        output_path(Path::new("dir/story.md"), Path::new("out"), TAGGED_SUFFIX),
        PathBuf::from("out/story_tagged.md")
    );
}
