//! Engine configuration, loaded from TOML.
//!
//! Every section and every field is optional; anything left out takes its
//! default.
//!
//! ```toml
//! [policy]
//! decay_rate = 0.5
//! decay_half_life_secs = 86400.0
//!
//! [policy.thresholds]
//! short_term = 0.3
//! core = 2.5
//!
//! [capacity]
//! ephemeral = 50000
//! overflow = "demote_first"
//!
//! [retrieval]
//! accumulation = "max"
//! ```

use std::path::Path;

use memory_rules::{AssociationRules, CapacityConfig, MemoryPolicy, PolicyConfig, PolicyError};
use serde::{Deserialize, Serialize};

use crate::agents::AgentConfig;
use crate::error::Result;
use crate::maintenance::MaintenanceConfig;
use crate::retrieval::RetrievalConfig;

/// Everything the engine can be configured with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub policy: PolicyConfig,
    pub capacity: CapacityConfig,
    pub associations: AssociationRules,
    pub agents: AgentConfig,
    pub retrieval: RetrievalConfig,
    pub maintenance: MaintenanceConfig,
}

impl EngineConfig {
    /// Parse a TOML document. Values are not validated until
    /// [`EngineConfig::validate`] or engine construction.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// The validated memory policy these settings describe.
    pub fn build_policy(&self) -> Result<MemoryPolicy> {
        Ok(MemoryPolicy::new(
            self.policy.clone(),
            self.capacity.clone(),
            self.associations.clone(),
        )?)
    }

    pub fn validate(&self) -> Result<()> {
        self.build_policy()?;
        self.retrieval.validate()?;
        validate_agents(&self.agents)?;
        if self.maintenance.interval_secs == 0 {
            return Err(PolicyError::invalid(
                "maintenance.interval_secs",
                "must be greater than zero",
            )
            .into());
        }
        Ok(())
    }
}

fn validate_agents(agents: &AgentConfig) -> Result<()> {
    let values = [
        ("agents.token_strength", agents.token_strength),
        ("agents.entity_strength", agents.entity_strength),
        ("agents.sentence_strength", agents.sentence_strength),
        ("agents.hierarchical_weight", agents.hierarchical_weight),
        ("agents.semantic_weight", agents.semantic_weight),
        ("agents.temporal_weight", agents.temporal_weight),
    ];
    for (field, value) in values {
        if !(value.is_finite() && value > 0.0) {
            return Err(PolicyError::invalid(
                field,
                format!("must be a positive number, got {}", value),
            )
            .into());
        }
    }
    if !(0.0..=1.0).contains(&agents.exclamation_weight) {
        return Err(PolicyError::invalid(
            "agents.exclamation_weight",
            format!("must be in [0, 1], got {}", agents.exclamation_weight),
        )
        .into());
    }
    Ok(())
}
