//! Semantic agent - sentence-level ingestion and linking.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::{text, AgentConfig, AgentId, IngestionAgent, TextUnit, UnitOutcome};
use crate::error::{Error, Result};
use crate::knowledge_base::{AssociationType, ConceptId, ConceptKind, KnowledgeGraph};

/// Upserts one concept per sentence and links it.
///
/// - Hierarchical: sentence -> each of its token concepts. Token concepts
///   belong to the molecular agent; this agent waits for them to appear.
/// - Semantic: between sentences of the same unit.
/// - Temporal: previous unit's sentences -> this unit's sentences.
#[derive(Debug)]
pub struct SemanticAgent {
    id: AgentId,
    config: AgentConfig,
    /// Sentences of the last unit this instance processed.
    previous_sentences: Vec<ConceptId>,
}

impl SemanticAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            id: AgentId::new(),
            config,
            previous_sentences: Vec::new(),
        }
    }

    fn token_wait(&self) -> Duration {
        Duration::from_millis(self.config.token_wait_ms)
    }

    fn link_tokens(
        &self,
        graph: &KnowledgeGraph,
        sentence_id: ConceptId,
        sentence: &str,
        outcome: &mut UnitOutcome,
    ) -> Result<()> {
        let mut seen = HashSet::new();
        for token in text::tokenize(sentence) {
            let token_id = ConceptId::from_content(&token.text);
            // A one-word sentence can share its content with its token.
            if token_id == sentence_id || !seen.insert(token_id) {
                continue;
            }
            if !graph.await_concept(token_id, self.token_wait()) {
                warn!(token = %token.text, "token concept never appeared, skipping link");
                continue;
            }
            match graph.link(
                sentence_id,
                token_id,
                AssociationType::Hierarchical,
                self.config.hierarchical_weight,
            ) {
                Ok(linked) => outcome.record_link(&linked),
                // Pruned between the wait and the link.
                Err(Error::NotFound(missing)) => {
                    warn!(concept = %missing.short(), "token concept vanished, skipping link")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn link_all(
        &self,
        graph: &KnowledgeGraph,
        pairs: impl IntoIterator<Item = (ConceptId, ConceptId)>,
        kind: AssociationType,
        weight: f64,
        outcome: &mut UnitOutcome,
    ) -> Result<()> {
        for (source, target) in pairs {
            if source == target {
                continue;
            }
            match graph.link(source, target, kind, weight) {
                Ok(linked) => outcome.record_link(&linked),
                // A previous sentence may have been pruned since.
                Err(Error::NotFound(missing)) => {
                    debug!(concept = %missing.short(), %kind, "endpoint gone, skipping link")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl IngestionAgent for SemanticAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &'static str {
        "semantic"
    }

    #[instrument(skip_all, fields(agent = %self.id, unit = unit.sequence))]
    fn process(&mut self, graph: &KnowledgeGraph, unit: &TextUnit) -> Result<UnitOutcome> {
        let sentences = text::sentences(unit.text()?);
        if sentences.is_empty() {
            return Err(Error::malformed("no sentences"));
        }

        let mut outcome = UnitOutcome::default();
        let mut current: Vec<ConceptId> = Vec::with_capacity(sentences.len());

        for sentence in sentences {
            let emotional_weight =
                text::is_exclamatory(sentence).then_some(self.config.exclamation_weight);
            let upsert = graph.upsert(
                sentence,
                ConceptKind::Sentence,
                self.config.sentence_strength,
                emotional_weight,
            )?;
            outcome.record_upsert(&upsert);
            self.link_tokens(graph, upsert.id, sentence, &mut outcome)?;
            if !current.contains(&upsert.id) {
                current.push(upsert.id);
            }
        }

        let within = current
            .iter()
            .enumerate()
            .flat_map(|(i, a)| current[i + 1..].iter().map(move |b| (*a, *b)));
        self.link_all(
            graph,
            within,
            AssociationType::Semantic,
            self.config.semantic_weight,
            &mut outcome,
        )?;

        let across = self
            .previous_sentences
            .iter()
            .flat_map(|p| current.iter().map(move |c| (*p, *c)));
        self.link_all(
            graph,
            across,
            AssociationType::Temporal,
            self.config.temporal_weight,
            &mut outcome,
        )?;

        debug!(
            sentences = current.len(),
            links = outcome.associations_created + outcome.associations_reinforced,
            "sentences ingested"
        );
        self.previous_sentences = current;
        Ok(outcome)
    }
}
