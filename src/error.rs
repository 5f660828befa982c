//! Error types for the core pseudonymization components.

use thiserror::Error;

/// Structural problems with an entity → pseudonym mapping.
///
/// Mappings come from an external generator, so any of these abort the
/// current document before substitution starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("pseudonym mapping has no entities")]
    EmptyEntities,

    #[error("pseudonym mapping has no pseudonyms")]
    EmptyPseudonyms,

    #[error("pseudonym mapping length mismatch: {entities} entities but {pseudonyms} pseudonyms")]
    LengthMismatch { entities: usize, pseudonyms: usize },

    #[error("entity '{0}' appears more than once in the pseudonym mapping")]
    DuplicateEntity(String),

    #[error("malformed pseudonym response: {0}")]
    MalformedResponse(String),
}
