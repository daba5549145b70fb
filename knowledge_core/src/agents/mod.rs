//! Ingestion Agents - independent workers that turn text units into concepts
//! and associations.
//!
//! Every agent sees every unit of the stream, in order. Agents share nothing
//! but the graph: they coordinate only through its atomic upsert and link
//! operations, and through waiting for concepts another agent creates.
//!
//! - **Molecular**: one concept per distinct token
//! - **Semantic**: one concept per sentence, linked to its tokens, to the
//!   other sentences of its unit and to the previous unit's sentences

mod molecular;
mod semantic;
pub mod text;

pub use molecular::*;
pub use semantic::*;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::events::TierTransition;
use crate::knowledge_base::{KnowledgeGraph, Linked, Upsert};

/// Unique identifier of an agent instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Create a new random agent ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strengths and weights the built-in agents write with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Initial strength of an ordinary token concept.
    pub token_strength: f64,
    /// Initial strength of an entity-like token concept.
    pub entity_strength: f64,
    /// Initial strength of a sentence concept.
    pub sentence_strength: f64,
    /// Emotional weight given to exclamatory sentences.
    pub exclamation_weight: f64,
    pub hierarchical_weight: f64,
    pub semantic_weight: f64,
    pub temporal_weight: f64,
    /// How long the semantic agent waits for a token concept to appear.
    pub token_wait_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            token_strength: 0.2,
            entity_strength: 0.35,
            sentence_strength: 0.25,
            exclamation_weight: 0.5,
            hierarchical_weight: 0.5,
            semantic_weight: 0.3,
            temporal_weight: 0.2,
            token_wait_ms: 2_000,
        }
    }
}

/// One unit of the ingest stream, as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    /// Position in the stream.
    pub sequence: u64,
    pub raw: Vec<u8>,
}

impl TextUnit {
    pub fn new(sequence: u64, raw: impl Into<Vec<u8>>) -> Self {
        Self {
            sequence,
            raw: raw.into(),
        }
    }

    /// The unit as text, or [`crate::Error::MalformedUnit`].
    pub fn text(&self) -> Result<&str> {
        text::validate(&self.raw)
    }
}

/// What processing one unit did to the graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitOutcome {
    pub concepts_created: usize,
    pub concepts_reinforced: usize,
    pub associations_created: usize,
    pub associations_reinforced: usize,
    pub transitions: Vec<TierTransition>,
}

impl UnitOutcome {
    pub fn record_upsert(&mut self, upsert: &Upsert) {
        if upsert.created {
            self.concepts_created += 1;
        } else {
            self.concepts_reinforced += 1;
        }
        if let Some(transition) = upsert.reinforcement.and_then(|r| r.transition()) {
            self.transitions.push(transition);
        }
    }

    pub fn record_link(&mut self, linked: &Linked) {
        if linked.created {
            self.associations_created += 1;
        } else {
            self.associations_reinforced += 1;
        }
    }
}

/// A worker that writes one view of each text unit into the graph.
///
/// An agent owns whatever context it carries between units; nothing outside
/// the agent reads or writes it.
pub trait IngestionAgent: Send {
    fn id(&self) -> AgentId;

    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    /// Process one unit. An error skips the unit, never the stream.
    fn process(&mut self, graph: &KnowledgeGraph, unit: &TextUnit) -> Result<UnitOutcome>;
}

/// Per-agent totals for one ingest call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReport {
    pub agent: AgentId,
    pub name: String,
    pub units_processed: usize,
    pub units_skipped: usize,
    pub concepts_created: usize,
    pub concepts_reinforced: usize,
    pub associations_created: usize,
    pub associations_reinforced: usize,
}

impl AgentReport {
    fn new(agent: &dyn IngestionAgent) -> Self {
        Self {
            agent: agent.id(),
            name: agent.name().to_string(),
            units_processed: 0,
            units_skipped: 0,
            concepts_created: 0,
            concepts_reinforced: 0,
            associations_created: 0,
            associations_reinforced: 0,
        }
    }

    fn absorb(&mut self, outcome: &UnitOutcome) {
        self.units_processed += 1;
        self.concepts_created += outcome.concepts_created;
        self.concepts_reinforced += outcome.concepts_reinforced;
        self.associations_created += outcome.associations_created;
        self.associations_reinforced += outcome.associations_reinforced;
    }
}

/// Feed `units` to one agent in order. Failed units are logged and skipped.
pub fn run_agent(
    agent: &mut dyn IngestionAgent,
    graph: &KnowledgeGraph,
    units: &[TextUnit],
) -> (AgentReport, Vec<TierTransition>) {
    let mut report = AgentReport::new(agent);
    let mut transitions = Vec::new();

    for unit in units {
        match agent.process(graph, unit) {
            Ok(mut outcome) => {
                report.absorb(&outcome);
                transitions.append(&mut outcome.transitions);
            }
            Err(e) => {
                report.units_skipped += 1;
                warn!(
                    agent = %report.agent,
                    name = %report.name,
                    unit = unit.sequence,
                    error = %e,
                    unit_local = e.is_unit_local(),
                    "skipping text unit"
                );
            }
        }
    }
    (report, transitions)
}
