//! Retrieval Engine - answers queries using one-hop spreading activation.
//!
//! The algorithm works as follows:
//! 1. **Seeding**: Every concept sharing words with the query is a seed,
//!    scored `overlap * memory_boost(tier)`; seeds are found through the
//!    concept store's word index
//! 2. **Spreading**: Each seed passes
//!    `seed_score * (strength / cap) * hop_decay * memory_boost(neighbor tier)`
//!    to each of its neighbors, exactly one hop
//! 3. **Accumulation**: Contributions combine additively (default) or by max
//! 4. **Ranking**: Score descending, then tier descending, then id ascending
//! 5. **Reinforcement**: Every returned concept is reinforced once

mod activation;

pub use activation::*;

use std::collections::{HashMap, HashSet};

use memory_rules::{PolicyError, Tier};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::agents::text;
use crate::error::{Error, Result};
use crate::events::TierTransition;
use crate::knowledge_base::{ConceptId, KnowledgeGraph};

/// Configuration for retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Attenuation applied to the single hop, in (0, 1].
    pub hop_decay: f64,

    /// Maximum number of ranked results.
    pub max_results: usize,

    pub accumulation: Accumulation,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            hop_decay: 0.5,
            max_results: 20,
            accumulation: Accumulation::Additive,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.hop_decay > 0.0 && self.hop_decay <= 1.0) {
            return Err(PolicyError::invalid(
                "retrieval.hop_decay",
                format!("must be in (0, 1], got {}", self.hop_decay),
            )
            .into());
        }
        if self.max_results == 0 {
            return Err(PolicyError::invalid(
                "retrieval.max_results",
                "must be greater than zero".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub concept_id: ConceptId,
    pub content: String,
    pub score: f64,
    /// Tier at scoring time, before the query's own reinforcement.
    pub tier: Tier,
}

/// Ranked hits plus the tier changes their reinforcement caused.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieval {
    pub hits: Vec<QueryHit>,
    pub transitions: Vec<TierTransition>,
}

/// Scores the graph against query text.
#[derive(Debug, Clone, Default)]
pub struct RetrievalEngine {
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Rank concepts for `query` and reinforce the ones returned.
    #[instrument(skip(self, graph))]
    pub fn query(&self, graph: &KnowledgeGraph, query: &str) -> Result<Retrieval> {
        let query_words: HashSet<String> = text::words(query).into_iter().collect();
        if query_words.is_empty() {
            return Ok(Retrieval::default());
        }

        let seeds = self.seed(graph, &query_words);
        let activation = self.spread(graph, &seeds);

        let mut hits = Vec::with_capacity(activation.active_count());
        for (id, score) in activation.iter_energies() {
            match graph.get(*id) {
                Ok(concept) => hits.push(QueryHit {
                    concept_id: *id,
                    tier: concept.tier(),
                    score: *score,
                    content: concept.content,
                }),
                // Pruned since it was scored.
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        rank(&mut hits);
        hits.truncate(self.config.max_results);

        let mut transitions = Vec::new();
        for hit in &hits {
            match graph.reinforce(hit.concept_id, 1.0) {
                Ok(reinforcement) => transitions.extend(reinforcement.transition()),
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        debug!(
            seeds = seeds.len(),
            activated = activation.active_count(),
            returned = hits.len(),
            "query answered"
        );
        Ok(Retrieval { hits, transitions })
    }

    /// Base score of every concept sharing a word with the query. Candidates
    /// come from the word index, so the cost follows the matches, not the graph.
    fn seed(&self, graph: &KnowledgeGraph, query_words: &HashSet<String>) -> HashMap<ConceptId, f64> {
        let candidates = graph.concepts_with_words(query_words.iter().map(String::as_str));
        let mut seeds = HashMap::with_capacity(candidates.len());
        for id in candidates {
            let Ok(concept) = graph.get(id) else {
                continue;
            };
            let overlap = overlap_ratio(query_words, &concept.content);
            if overlap > 0.0 {
                seeds.insert(id, overlap * concept.tier().memory_boost());
            }
        }
        seeds
    }

    fn spread(&self, graph: &KnowledgeGraph, seeds: &HashMap<ConceptId, f64>) -> ActivationState {
        let accumulation = self.config.accumulation;
        let cap = graph.policy().associations().cap;
        let mut state = ActivationState::new();

        for (id, base) in seeds {
            state.add_energy(*id, *base, accumulation);
        }

        for (id, base) in seeds {
            for neighbor in graph.neighbors(*id) {
                let Some(tier) = graph.tier_of(neighbor.concept_id) else {
                    continue;
                };
                let contribution = base
                    * (neighbor.strength / cap)
                    * self.config.hop_decay
                    * tier.memory_boost();
                state.add_energy(neighbor.concept_id, contribution, accumulation);
            }
        }
        state
    }
}

/// Share of the query's distinct words that appear in `content`.
pub fn overlap_ratio(query_words: &HashSet<String>, content: &str) -> f64 {
    if query_words.is_empty() {
        return 0.0;
    }
    let content_words: HashSet<String> = text::words(content).into_iter().collect();
    let shared = query_words.intersection(&content_words).count();
    shared as f64 / query_words.len() as f64
}

/// Score descending, then tier descending, then id ascending.
fn rank(hits: &mut [QueryHit]) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.tier.cmp(&a.tier))
            .then_with(|| a.concept_id.cmp(&b.concept_id))
    });
}
