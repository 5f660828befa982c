//! Token-level comparison of an original document against its processed
//! counterpart.
//!
//! Both documents are split on whitespace and compared with a Myers diff, which
//! yields a longest common subsequence of tokens. A correct pseudonymization
//! only swaps PII tokens, so the number of removed tokens should equal the
//! number of added ones; anything
//! else points at a pseudonym that changed word count or at text the
//! substitution should not have touched.

use anyhow::Result;
use similar::{capture_diff_slices, Algorithm, ChangeTag, TextDiff};
use std::io::Write;

/// One step of a token diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenChange<'a> {
    Equal(&'a str),
    Delete(&'a str),
    Insert(&'a str),
}

/// Outcome of comparing two documents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffReport {
    pub insertions: usize,
    pub deletions: usize,
    /// Added tokens, in discovery order.
    pub inserted_tokens: Vec<String>,
    /// Removed tokens, in discovery order.
    pub deleted_tokens: Vec<String>,
}

impl DiffReport {
    pub fn is_balanced(&self) -> bool {
        self.insertions == self.deletions
    }

    /// Inserted and deleted tokens side by side, the shorter list padded with
    /// empty strings.
    pub fn paired_tokens(&self) -> Vec<(&str, &str)> {
        let len = self.inserted_tokens.len().max(self.deleted_tokens.len());
        (0..len)
            .map(|i| {
                (
                    self.inserted_tokens.get(i).map_or("", String::as_str),
                    self.deleted_tokens.get(i).map_or("", String::as_str),
                )
            })
            .collect()
    }

    /// One-line verdict for operators.
    pub fn verdict(&self) -> String {
        if self.is_balanced() {
            format!("Balanced: {} insertions and deletions", self.insertions)
        } else {
            format!(
                "Unbalanced: {} insertions vs {} deletions",
                self.insertions, self.deletions
            )
        }
    }

    /// Write the paired token listing as tab-separated rows.
    pub fn write_mismatches<W: Write>(&self, out: W) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(csv::QuoteStyle::Never)
            .from_writer(out);
        writer.write_record(["inserted", "deleted"])?;
        for (inserted, deleted) in self.paired_tokens() {
            writer.write_record([inserted, deleted])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Split a document into whitespace-separated tokens.
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

/// Myers diff of two token sequences.
///
/// Within a changed region deletions come before insertions, as in a unified
/// diff.
pub fn diff_tokens<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<TokenChange<'a>> {
    capture_diff_slices(Algorithm::Myers, old, new)
        .iter()
        .flat_map(|op| op.iter_changes(old, new))
        .map(|change| match change.tag() {
            ChangeTag::Equal => TokenChange::Equal(change.value()),
            ChangeTag::Delete => TokenChange::Delete(change.value()),
            ChangeTag::Insert => TokenChange::Insert(change.value()),
        })
        .collect()
}

/// Compare two documents at token granularity.
pub fn compare(original: &str, processed: &str) -> DiffReport {
    let old = tokenize(original);
    let new = tokenize(processed);
    let mut report = DiffReport::default();
    for change in diff_tokens(&old, &new) {
        match change {
            TokenChange::Insert(t) => {
                report.insertions += 1;
                report.inserted_tokens.push(t.to_string());
            }
            TokenChange::Delete(t) => {
                report.deletions += 1;
                report.deleted_tokens.push(t.to_string());
            }
            TokenChange::Equal(_) => {}
        }
    }
    report
}

/// Render the token diff as unified-diff hunks, one token per line.
///
/// Returns an empty string when the documents tokenize identically.
pub fn unified_diff(
    original: &str,
    processed: &str,
    original_label: &str,
    processed_label: &str,
    context: usize,
) -> String {
    let old = tokenize(original);
    let new = tokenize(processed);
    TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_slices(old.as_slice(), new.as_slice())
        .unified_diff()
        .context_radius(context)
        .header(original_label, processed_label)
        .to_string()
}
