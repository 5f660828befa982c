//! Substitution of tagged spans with pseudonyms or category placeholders.

use crate::audit::AuditSink;
use crate::mapping::EntityPseudonymMapping;
use crate::tags::tag_matches;
use std::collections::{HashMap, HashSet};

/// Placeholder for plain tags that carry no category.
pub const UNTYPED_PLACEHOLDER: &str = "[PII]";

/// Result of applying a mapping to a tagged document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionResult {
    pub text: String,
    /// Mapping entries for which at least one tagged occurrence was replaced.
    /// An entity tagged three times still counts once.
    pub replacements_made: usize,
}

/// Replace every tagged occurrence of each mapped entity with its pseudonym.
///
/// The document is scanned once; each well-formed tag whose content is exactly
/// a mapped entity is replaced, delimiters included, so all occurrences of an
/// entity change together and the order of the mapping does not matter.
/// Untagged text is never touched, even where it spells a mapped entity.
/// Every applied entry is recorded in `audit`, in order of first appearance.
pub fn pseudonymize(
    text: &str,
    mapping: &EntityPseudonymMapping,
    audit: &dyn AuditSink,
) -> SubstitutionResult {
    let lookup: HashMap<&str, &str> = mapping.pairs().collect();

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    // Applied entities with the categories they were tagged under.
    let mut applied: Vec<(&str, &str, Vec<&str>)> = Vec::new();
    let mut position: HashMap<&str, usize> = HashMap::new();

    for m in tag_matches(text) {
        let Some(&pseudonym) = lookup.get(m.value) else {
            continue;
        };
        out.push_str(&text[last..m.start]);
        out.push_str(pseudonym);
        last = m.end;

        let category = m.category.map_or("untyped", |c| c.code());
        match position.get(m.value) {
            Some(&idx) => {
                let categories = &mut applied[idx].2;
                if !categories.contains(&category) {
                    categories.push(category);
                }
            }
            None => {
                position.insert(m.value, applied.len());
                applied.push((m.value, pseudonym, vec![category]));
            }
        }
    }
    out.push_str(&text[last..]);

    for (entity, pseudonym, categories) in &applied {
        audit.info(&format!(
            "Replaced '{}' ({}) -> '{}'",
            entity,
            categories.join(", "),
            pseudonym
        ));
    }

    SubstitutionResult {
        text: out,
        replacements_made: applied.len(),
    }
}

/// Replace every tagged span with a placeholder derived from its category.
///
/// Typed tags become `[PER]`, `[LOC]`, `[ORG]` or `[MISC]`; plain tags become
/// [`UNTYPED_PLACEHOLDER`]. The output contains no well-formed tags, so
/// applying this twice is the same as applying it once.
pub fn anonymize_categories(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in tag_matches(text) {
        out.push_str(&text[last..m.start]);
        match m.category {
            Some(cat) => out.push_str(&cat.placeholder()),
            None => out.push_str(UNTYPED_PLACEHOLDER),
        }
        last = m.end;
    }
    out.push_str(&text[last..]);
    out
}

/// Tagged values a mapping did not cover, for diagnosing count mismatches.
pub fn unmapped_entities(text: &str, mapping: &EntityPseudonymMapping) -> Vec<String> {
    let mapped: HashSet<&str> = mapping.entities().iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    tag_matches(text)
        .map(|m| m.value)
        .filter(|v| !mapped.contains(v) && seen.insert(*v))
        .map(str::to_string)
        .collect()
}
