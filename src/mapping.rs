//! Entity → pseudonym mappings and their validation.

use crate::error::MappingError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Raw response of a pseudonym generator: `{"PII": [...], "pseudonym": [...]}`.
///
/// Nothing about this value is trusted until it has gone through
/// [`EntityPseudonymMapping::try_from`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PseudonymResponse {
    #[serde(rename = "PII")]
    pub pii: Vec<String>,
    pub pseudonym: Vec<String>,
}

impl PseudonymResponse {
    /// Parse a generator's JSON body.
    pub fn from_json(body: &str) -> Result<Self, MappingError> {
        serde_json::from_str(body).map_err(|e| MappingError::MalformedResponse(e.to_string()))
    }
}

/// Validated, positionally paired entities and pseudonyms.
///
/// Both lists are non-empty, of equal length, and entities are unique. Two
/// entities may share a pseudonym.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityPseudonymMapping {
    entities: Vec<String>,
    pseudonyms: Vec<String>,
}

impl EntityPseudonymMapping {
    /// Validate and build a mapping, failing fast on the first structural
    /// problem.
    pub fn new(entities: Vec<String>, pseudonyms: Vec<String>) -> Result<Self, MappingError> {
        if entities.is_empty() {
            return Err(MappingError::EmptyEntities);
        }
        if pseudonyms.is_empty() {
            return Err(MappingError::EmptyPseudonyms);
        }
        if entities.len() != pseudonyms.len() {
            return Err(MappingError::LengthMismatch {
                entities: entities.len(),
                pseudonyms: pseudonyms.len(),
            });
        }
        let mut seen = HashSet::with_capacity(entities.len());
        for entity in &entities {
            if !seen.insert(entity.as_str()) {
                return Err(MappingError::DuplicateEntity(entity.clone()));
            }
        }
        Ok(Self {
            entities,
            pseudonyms,
        })
    }

    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    pub fn pseudonyms(&self) -> &[String] {
        &self.pseudonyms
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Always false for a validated mapping.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// `(entity, pseudonym)` pairs in mapping order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entities
            .iter()
            .map(String::as_str)
            .zip(self.pseudonyms.iter().map(String::as_str))
    }

    /// Pseudonym assigned to `entity`, if any.
    pub fn get(&self, entity: &str) -> Option<&str> {
        self.pairs().find(|(e, _)| *e == entity).map(|(_, p)| p)
    }

    /// Entities that share their pseudonym with another entity.
    ///
    /// Not an error, but worth surfacing: it merges two identities.
    pub fn colliding_entities(&self) -> Vec<&str> {
        let mut counts = std::collections::HashMap::new();
        for p in &self.pseudonyms {
            *counts.entry(p.as_str()).or_insert(0usize) += 1;
        }
        self.pairs()
            .filter(|(_, p)| counts.get(p).copied().unwrap_or(0) > 1)
            .map(|(e, _)| e)
            .collect()
    }
}

impl TryFrom<PseudonymResponse> for EntityPseudonymMapping {
    type Error = MappingError;

    fn try_from(resp: PseudonymResponse) -> Result<Self, Self::Error> {
        Self::new(resp.pii, resp.pseudonym)
    }
}
