//! Tier transition events.
//!
//! Stores only record the new tier of a concept. Operations that change
//! strength hand back [`TierTransition`]s, and the engine forwards them to an
//! optional [`TransitionObserver`] supplied by a collaborator.

use memory_rules::Tier;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::knowledge_base::ConceptId;

/// What moved a concept between tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionCause {
    /// Ingestion or retrieval touched the concept.
    Reinforcement,
    /// Maintenance recomputed the tier after decay.
    Consolidation,
    /// Capacity enforcement pushed the concept down a tier.
    Demotion,
}

/// A concept changed tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTransition {
    pub concept_id: ConceptId,
    pub from: Tier,
    pub to: Tier,
    pub cause: TransitionCause,
}

impl TierTransition {
    pub fn is_promotion(&self) -> bool {
        self.to > self.from
    }
}

/// Receives tier transitions. Called from ingestion, retrieval and
/// maintenance threads, so implementations must be cheap and thread-safe.
pub trait TransitionObserver: Send + Sync {
    fn on_transition(&self, transition: &TierTransition);
}

/// Observer that keeps every transition in memory.
#[derive(Debug, Default)]
pub struct TransitionLog {
    entries: Mutex<Vec<TierTransition>>,
}

impl TransitionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all recorded transitions, leaving the log empty.
    pub fn drain(&self) -> Vec<TierTransition> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl TransitionObserver for TransitionLog {
    fn on_transition(&self, transition: &TierTransition) {
        self.entries.lock().push(transition.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_direction() {
        let up = TierTransition {
            concept_id: ConceptId::from_content("cat"),
            from: Tier::Ephemeral,
            to: Tier::ShortTerm,
            cause: TransitionCause::Reinforcement,
        };
        assert!(up.is_promotion());

        let down = TierTransition {
            from: Tier::LongTerm,
            to: Tier::MediumTerm,
            cause: TransitionCause::Demotion,
            ..up.clone()
        };
        assert!(!down.is_promotion());
    }

    #[test]
    fn test_transition_log_drain() {
        let log = TransitionLog::new();
        assert!(log.is_empty());

        log.on_transition(&TierTransition {
            concept_id: ConceptId::from_content("dog"),
            from: Tier::ShortTerm,
            to: Tier::Ephemeral,
            cause: TransitionCause::Consolidation,
        });
        assert_eq!(log.len(), 1);

        let drained = log.drain();
        assert_eq!(drained.len(), 1);
        assert!(log.is_empty());
    }
}
