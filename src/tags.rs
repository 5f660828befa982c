//! Extraction of `<to_pseudonym>` spans from tagged documents.
//!
//! Two tag shapes are recognised:
//!
//! - `<to_pseudonym>value</to_pseudonym>` (simple mode)
//! - `<to_pseudonym type="PER">value</to_pseudonym>` (category-aware mode)
//!
//! Matching is a single non-greedy scan from an opening delimiter to the
//! nearest closing one, and never crosses a line break. Anything that does not
//! fit that shape (unterminated tags, nested tags, a `type` outside the
//! category vocabulary) is simply not matched and is left in the text as-is.
//! Callers should treat "not reported by the parser" as "not a tag".

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

pub const OPEN_TAG: &str = "to_pseudonym";

lazy_static! {
    /// Group 1: optional category attribute, group 2: tagged value.
    static ref TAG_PATTERN: Regex = Regex::new(
        r#"<to_pseudonym(?:\s+type="([A-Za-z]+)")?\s*>(.*?)</to_pseudonym>"#
    )
    .expect("invalid tag regex");
}

/// Closed PII category vocabulary carried by the `type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Person,
    Location,
    Organization,
    Miscellaneous,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Person,
        Category::Location,
        Category::Organization,
        Category::Miscellaneous,
    ];

    /// Short code used in the `type` attribute and in placeholders.
    pub fn code(self) -> &'static str {
        match self {
            Category::Person => "PER",
            Category::Location => "LOC",
            Category::Organization => "ORG",
            Category::Miscellaneous => "MISC",
        }
    }

    /// Bracketed placeholder used by category substitution, e.g. `[PER]`.
    pub fn placeholder(self) -> String {
        format!("[{}]", self.code())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Category {
    type Err = String;

    /// Accepts the short code or the long English name, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PER" | "PERSON" => Ok(Category::Person),
            "LOC" | "LOCATION" => Ok(Category::Location),
            "ORG" | "ORGANIZATION" | "ORGANISATION" => Ok(Category::Organization),
            "MISC" | "MISCELLANEOUS" => Ok(Category::Miscellaneous),
            other => Err(format!("unknown PII category '{}'", other)),
        }
    }
}

/// A tagged substring of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaggedSpan {
    /// `None` for plain `<to_pseudonym>` tags.
    pub category: Option<Category>,
    pub value: String,
}

impl TaggedSpan {
    /// Render the span back into its tagged form.
    pub fn to_tagged(&self) -> String {
        match self.category {
            Some(cat) => format!(
                "<{tag} type=\"{}\">{}</{tag}>",
                cat.code(),
                self.value,
                tag = OPEN_TAG
            ),
            None => format!("<{tag}>{}</{tag}>", self.value, tag = OPEN_TAG),
        }
    }
}

/// A single well-formed tag occurrence, with its byte range in the source.
#[derive(Debug, Clone)]
pub(crate) struct TagMatch<'t> {
    pub start: usize,
    pub end: usize,
    pub category: Option<Category>,
    pub value: &'t str,
}

/// Iterate over every well-formed tag in document order.
///
/// A `type` attribute naming something outside the vocabulary makes the whole
/// tag malformed, so it is skipped rather than treated as untyped.
pub(crate) fn tag_matches(text: &str) -> impl Iterator<Item = TagMatch<'_>> {
    TAG_PATTERN.captures_iter(text).filter_map(|caps| {
        let whole = caps.get(0)?;
        let category = match caps.get(1) {
            Some(attr) => Some(attr.as_str().parse::<Category>().ok()?),
            None => None,
        };
        Some(TagMatch {
            start: whole.start(),
            end: whole.end(),
            category,
            value: caps.get(2)?.as_str(),
        })
    })
}

/// Collect the unique tagged values of a document.
///
/// The same literal tagged in several places (or under several categories) is
/// returned once. Ordering carries no meaning.
pub fn extract_tags(text: &str) -> HashSet<String> {
    tag_matches(text).map(|m| m.value.to_string()).collect()
}

/// Collect the unique `(category, value)` spans in order of first appearance.
pub fn extract_spans(text: &str) -> Vec<TaggedSpan> {
    let mut seen = HashSet::new();
    let mut spans = Vec::new();
    for m in tag_matches(text) {
        let span = TaggedSpan {
            category: m.category,
            value: m.value.to_string(),
        };
        if seen.insert(span.clone()) {
            spans.push(span);
        }
    }
    spans
}

/// Number of raw well-formed tag occurrences, duplicates included.
pub fn count_occurrences(text: &str) -> usize {
    tag_matches(text).count()
}

/// De-duplicated entity list in first-appearance order, ready to send to a
/// pseudonym generator.
pub fn unique_entities(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tag_matches(text)
        .filter(|m| seen.insert(m.value))
        .map(|m| m.value.to_string())
        .collect()
}
