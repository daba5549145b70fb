//! Molecular agent - token-level ingestion.

use std::collections::HashSet;

use tracing::{debug, instrument};

use super::{text, AgentConfig, AgentId, IngestionAgent, TextUnit, UnitOutcome};
use crate::error::{Error, Result};
use crate::knowledge_base::{ConceptKind, KnowledgeGraph};

/// Upserts one concept per distinct token of each unit.
#[derive(Debug)]
pub struct MolecularAgent {
    id: AgentId,
    config: AgentConfig,
}

impl MolecularAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            id: AgentId::new(),
            config,
        }
    }

    fn initial_strength(&self, kind: ConceptKind) -> f64 {
        match kind {
            ConceptKind::Entity => self.config.entity_strength,
            _ => self.config.token_strength,
        }
    }
}

impl IngestionAgent for MolecularAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &'static str {
        "molecular"
    }

    #[instrument(skip_all, fields(agent = %self.id, unit = unit.sequence))]
    fn process(&mut self, graph: &KnowledgeGraph, unit: &TextUnit) -> Result<UnitOutcome> {
        let tokens = text::tokenize(unit.text()?);
        if tokens.is_empty() {
            return Err(Error::malformed("no tokens"));
        }

        let mut outcome = UnitOutcome::default();
        let mut seen = HashSet::new();
        for token in tokens {
            if !seen.insert(token.text.clone()) {
                continue;
            }
            let upsert = graph.upsert(
                &token.text,
                token.kind,
                self.initial_strength(token.kind),
                None,
            )?;
            outcome.record_upsert(&upsert);
        }

        debug!(
            created = outcome.concepts_created,
            reinforced = outcome.concepts_reinforced,
            "tokens ingested"
        );
        Ok(outcome)
    }
}
