//! Per-document workflows used by the CLI: tag, pseudonymize, anonymize and
//! validate, plus a batch runner that processes many files in parallel.
//!
//! Every workflow reads one input file and writes one output file next to the
//! others in an output directory. A failure in one document never stops the
//! batch; it is reported and counted instead.

use crate::audit::{AuditSink, DocumentAudit};
use crate::diff::{compare, DiffReport};
use crate::llm::{EntityTagger, PseudonymGenerator, TagStyle};
use crate::mapping::EntityPseudonymMapping;
use crate::substitute::{anonymize_categories, pseudonymize, unmapped_entities};
use crate::tags::{count_occurrences, unique_entities};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const TAGGED_SUFFIX: &str = "_tagged";
pub const PSEUDONYM_SUFFIX: &str = "_pseudonym";
pub const ANONYMIZED_SUFFIX: &str = "_anonymized";

/// Output file for `input`: `<output_dir>/<stem><suffix>.<ext>`.
pub fn output_path(input: &Path, output_dir: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    output_dir.join(name)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))
}

fn write_document(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write output file: {}", path.display()))
}

/// Create the output directory if it does not exist yet.
pub fn ensure_output_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))
}

// ============================================================================
// Tag
// ============================================================================

/// Ask `tagger` to mark the PII in `input` and write the tagged document.
pub fn tag_file(
    tagger: &dyn EntityTagger,
    input: &Path,
    output_dir: &Path,
    example: &str,
    style: TagStyle,
) -> Result<PathBuf> {
    let text = read_document(input)?;
    let tagged = tagger
        .tag(&text, example, style)
        .with_context(|| format!("Tagging failed for {}", display_name(input)))?;
    let output = output_path(input, output_dir, TAGGED_SUFFIX);
    write_document(&output, &tagged)?;
    log::info!(
        "{}: {} tagged spans",
        display_name(input),
        count_occurrences(&tagged)
    );
    Ok(output)
}

// ============================================================================
// Pseudonymize
// ============================================================================

/// Summary of one pseudonymized document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudonymizeOutcome {
    pub output: PathBuf,
    /// Unique tagged entities found in the input.
    pub entities: usize,
    /// Mapping entries applied.
    pub replacements: usize,
}

impl PseudonymizeOutcome {
    pub fn is_consistent(&self) -> bool {
        self.entities == self.replacements
    }
}

/// Replace every tagged entity of `input` with a generated pseudonym.
///
/// A malformed mapping from `generator` aborts this document. A mismatch
/// between unique entities and applied mapping entries is only a warning: the
/// output is still written.
pub fn pseudonymize_file(
    generator: &dyn PseudonymGenerator,
    input: &Path,
    output_dir: &Path,
    audit: &dyn AuditSink,
) -> Result<PseudonymizeOutcome> {
    let name = display_name(input);
    let audit = DocumentAudit::new(&name, audit);
    audit.info("Processing file");

    let text = read_document(input)?;
    let entities = unique_entities(&text);
    audit.info(&format!("Found {} entities to pseudonymize", entities.len()));

    let output = output_path(input, output_dir, PSEUDONYM_SUFFIX);

    if entities.is_empty() {
        audit.warn("No tagged entities, writing text unchanged");
        write_document(&output, &text)?;
        return Ok(PseudonymizeOutcome {
            output,
            entities: 0,
            replacements: 0,
        });
    }

    let response = generator
        .generate(&entities)
        .with_context(|| format!("Pseudonym generation failed for {}", name))?;
    let mapping = EntityPseudonymMapping::try_from(response)
        .with_context(|| format!("Rejected pseudonym mapping for {}", name))?;

    let collisions = mapping.colliding_entities();
    if !collisions.is_empty() {
        audit.warn(&format!(
            "Entities sharing a pseudonym: {}",
            collisions.join(", ")
        ));
    }

    let result = pseudonymize(&text, &mapping, &audit);
    audit.info(&format!("Total replacements: {}", result.replacements_made));

    if entities.len() != result.replacements_made {
        let missing = unmapped_entities(&text, &mapping);
        let message = format!(
            "Mismatch: expected {} replacements, made {} (unreplaced: {})",
            entities.len(),
            result.replacements_made,
            missing.join(", ")
        );
        audit.warn(&message);
        log::warn!("{}: {}", name, message);
    }

    write_document(&output, &result.text)?;
    Ok(PseudonymizeOutcome {
        output,
        entities: entities.len(),
        replacements: result.replacements_made,
    })
}

// ============================================================================
// Anonymize (category placeholders)
// ============================================================================

/// Replace every tagged span of `input` with its category placeholder.
pub fn anonymize_file(input: &Path, output_dir: &Path, audit: &dyn AuditSink) -> Result<PathBuf> {
    let name = display_name(input);
    let audit = DocumentAudit::new(&name, audit);
    let text = read_document(input)?;
    let occurrences = count_occurrences(&text);
    let anonymized = anonymize_categories(&text);
    let output = output_path(input, output_dir, ANONYMIZED_SUFFIX);
    write_document(&output, &anonymized)?;
    audit.info(&format!(
        "Anonymized: {} tagged spans replaced by category placeholders",
        occurrences
    ));
    Ok(output)
}

// ============================================================================
// Validate
// ============================================================================

/// Compare an original document with its processed counterpart.
pub fn validate_pair(original: &Path, processed: &Path) -> Result<DiffReport> {
    let before = read_document(original)?;
    let after = read_document(processed)?;
    Ok(compare(&before, &after))
}

// ============================================================================
// Batch execution
// ============================================================================

/// Result of running a workflow over several files.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: usize,
    /// Failed inputs with their error chains.
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run `process` for each input in parallel, isolating per-file failures.
///
/// `process` returns a line describing what it did, printed as progress.
pub fn run_batch<F>(inputs: &[PathBuf], label: &str, process: F) -> BatchSummary
where
    F: Fn(&Path) -> Result<String> + Sync,
{
    let total = inputs.len();
    let done = AtomicUsize::new(0);
    let failed: Mutex<Vec<(PathBuf, String)>> = Mutex::new(Vec::new());

    inputs.par_iter().for_each(|input| {
        let outcome = process(input);
        let count = done.fetch_add(1, Ordering::Relaxed) + 1;
        match outcome {
            Ok(message) => println!("[{}/{}] {}", count, total, message),
            Err(e) => {
                let chain = format!("{:#}", e);
                eprintln!("[{}/{}] {} failed for {}: {}", count, total, label, input.display(), chain);
                log::warn!("{} failed for {}: {}", label, input.display(), chain);
                let mut failed = match failed.lock() {
                    Ok(f) => f,
                    Err(poisoned) => poisoned.into_inner(),
                };
                failed.push((input.clone(), chain));
            }
        }
    });

    let failed = match failed.into_inner() {
        Ok(f) => f,
        Err(poisoned) => poisoned.into_inner(),
    };
    BatchSummary {
        succeeded: total - failed.len(),
        failed,
    }
}

/// Configure rayon's global pool. Only the first call has an effect.
pub fn configure_threads(threads: Option<usize>) {
    if let Some(n) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .ok(); // Ignore error if already initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path() {
        let dir = Path::new("/tmp/out");
        assert_eq!(
            output_path(Path::new("/data/report.txt"), dir, PSEUDONYM_SUFFIX),
            PathBuf::from("/tmp/out/report_pseudonym.txt")
        );
        assert_eq!(
            output_path(Path::new("notes"), dir, TAGGED_SUFFIX),
            PathBuf::from("/tmp/out/notes_tagged")
        );
        assert_eq!(
            output_path(Path::new("a.b.md"), dir, ANONYMIZED_SUFFIX),
            PathBuf::from("/tmp/out/a.b_anonymized.md")
        );
    }

    #[test]
    fn test_run_batch_isolates_failures() {
        let inputs = vec![
            PathBuf::from("ok1.txt"),
            PathBuf::from("bad.txt"),
            PathBuf::from("ok2.txt"),
        ];
        let summary = run_batch(&inputs, "test", |p| {
            if p.to_string_lossy().contains("bad") {
                anyhow::bail!("boom")
            }
            Ok(format!("done {}", p.display()))
        });
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, PathBuf::from("bad.txt"));
        assert_eq!(summary.failed[0].1, "boom");
        assert!(!summary.is_success());
    }
}
