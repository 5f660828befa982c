//! pseudollm
//!
//! Pseudonymization of Personally Identifiable Information in free text.
//!
//! This library provides:
//! - `tags`: extraction of `<to_pseudonym>` spans from tagged documents
//! - `mapping`: validated entity → pseudonym mappings
//! - `substitute`: pseudonym and category-placeholder substitution
//! - `diff`: token-level check that only PII changed
//! - `llm`: tagger / pseudonym generator traits and an OpenAI-compatible client
//! - `pipeline`: per-file workflows and the parallel batch runner
//!
//! Binaries:
//! - `pseudollm`: `tag`, `pseudonymize`, `ner_pseudonymize` and `validate`

pub mod audit;
pub mod diff;
pub mod error;
pub mod llm;
pub mod mapping;
pub mod pipeline;
pub mod substitute;
pub mod tags;

pub use audit::{AuditSink, DocumentAudit, FileAuditLog, MemoryAuditLog};
pub use diff::{compare, DiffReport};
pub use error::MappingError;
pub use mapping::{EntityPseudonymMapping, PseudonymResponse};
pub use substitute::{anonymize_categories, pseudonymize, SubstitutionResult};
pub use tags::{extract_tags, Category, TaggedSpan};
