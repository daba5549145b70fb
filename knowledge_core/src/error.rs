//! Error types for knowledge_core.

use memory_rules::PolicyError;
use thiserror::Error;

use crate::knowledge_base::{AssociationKey, ConceptId};

/// Result type alias using knowledge_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while operating on the knowledge graph.
#[derive(Error, Debug)]
pub enum Error {
    /// A concept id that is not (or no longer) in the store.
    #[error("Concept not found: {0}")]
    NotFound(ConceptId),

    /// An association key that is not in the store.
    #[error("Association not found: {0}")]
    AssociationNotFound(AssociationKey),

    /// An association from a concept to itself.
    #[error("Association endpoints must differ: {0}")]
    SelfAssociation(ConceptId),

    /// Concept content must contain at least one non-whitespace character.
    #[error("Concept content is empty")]
    EmptyContent,

    /// Engine configuration rejected at construction.
    #[error(transparent)]
    InvalidConfiguration(#[from] PolicyError),

    /// Configuration file could not be parsed.
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A configuration file could not be read or a thread could not start.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot content violates the graph's invariants.
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// A maintenance sub-pass found state it cannot process.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// A text unit an agent cannot ingest.
    #[error("Malformed text unit: {0}")]
    MalformedUnit(String),
}

impl Error {
    /// Create a corrupt snapshot error.
    pub fn corrupt_snapshot(message: impl Into<String>) -> Self {
        Self::CorruptSnapshot(message.into())
    }

    /// Create an invariant violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    /// Create a malformed unit error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedUnit(message.into())
    }

    /// Whether this error only affects the unit being ingested.
    pub fn is_unit_local(&self) -> bool {
        matches!(
            self,
            Self::MalformedUnit(_) | Self::NotFound(_) | Self::SelfAssociation(_) | Self::EmptyContent
        )
    }
}
