//! Activation state for one-hop spreading activation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::knowledge_base::ConceptId;

/// How spread contributions reaching the same concept combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Accumulation {
    /// Base score plus every contribution. Rewards multi-path confirmation.
    #[default]
    Additive,
    /// The largest of the base score and the contributions.
    Max,
}

/// Tracks activation energy per concept during spreading.
#[derive(Debug, Clone, Default)]
pub struct ActivationState {
    energies: HashMap<ConceptId, f64>,
}

impl ActivationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give a concept energy under `accumulation`.
    pub fn add_energy(&mut self, id: ConceptId, energy: f64, accumulation: Accumulation) {
        let current = self.energies.entry(id).or_insert(0.0);
        match accumulation {
            Accumulation::Additive => *current += energy,
            Accumulation::Max => *current = current.max(energy),
        }
    }

    pub fn get_energy(&self, id: &ConceptId) -> f64 {
        self.energies.get(id).copied().unwrap_or(0.0)
    }

    pub fn is_active(&self, id: &ConceptId) -> bool {
        self.energies.contains_key(id)
    }

    pub fn active_count(&self) -> usize {
        self.energies.len()
    }

    pub fn iter_energies(&self) -> impl Iterator<Item = (&ConceptId, &f64)> {
        self.energies.iter()
    }
}
