//! Memory tier policy: how strength maps to tiers, how reinforcement and
//! decay change strength, and how many members each tier may hold.

use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};
use crate::tier::Tier;

/// Lower strength bounds of every tier above Ephemeral.
///
/// `Ephemeral < short_term <= ShortTerm < medium_term <= MediumTerm < long_term
/// <= LongTerm < core <= Core`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub short_term: f64,
    pub medium_term: f64,
    pub long_term: f64,
    pub core: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            short_term: 0.3,
            medium_term: 0.6,
            long_term: 1.2,
            core: 2.5,
        }
    }
}

impl TierThresholds {
    fn as_array(&self) -> [f64; 4] {
        [self.short_term, self.medium_term, self.long_term, self.core]
    }

    /// Check that thresholds are finite, positive and strictly ascending.
    pub fn validate(&self) -> PolicyResult<()> {
        let values = self.as_array();
        if values.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(PolicyError::invalid(
                "thresholds",
                format!("thresholds must be finite and positive, got {:?}", values),
            ));
        }
        if values.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PolicyError::invalid(
                "thresholds",
                format!("thresholds must be strictly ascending, got {:?}", values),
            ));
        }
        Ok(())
    }

    /// Tier for a given strength.
    pub fn tier_for(&self, strength: f64) -> Tier {
        if strength >= self.core {
            Tier::Core
        } else if strength >= self.long_term {
            Tier::LongTerm
        } else if strength >= self.medium_term {
            Tier::MediumTerm
        } else if strength >= self.short_term {
            Tier::ShortTerm
        } else {
            Tier::Ephemeral
        }
    }

    /// Strength range `[lower, upper)` of a tier. Core has no upper bound.
    pub fn band(&self, tier: Tier) -> (f64, Option<f64>) {
        match tier {
            Tier::Ephemeral => (0.0, Some(self.short_term)),
            Tier::ShortTerm => (self.short_term, Some(self.medium_term)),
            Tier::MediumTerm => (self.medium_term, Some(self.long_term)),
            Tier::LongTerm => (self.long_term, Some(self.core)),
            Tier::Core => (self.core, None),
        }
    }
}

/// Strength arithmetic for concepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub thresholds: TierThresholds,
    /// Multiplier applied on every reinforcement (> 1.0).
    pub access_boost: f64,
    /// Extra multiplier for concepts still below `difficulty_threshold` (> 1.0).
    pub adaptive_boost: f64,
    pub difficulty_threshold: f64,
    /// Fraction of strength kept per half-life of idleness, in (0, 1].
    pub decay_rate: f64,
    pub decay_half_life_secs: f64,
    /// Hard upper bound for concept strength.
    pub strength_ceiling: f64,
    /// Non-Core concepts weaker than this are pruned during maintenance.
    pub concept_floor: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            thresholds: TierThresholds::default(),
            access_boost: 1.1,
            adaptive_boost: 1.2,
            difficulty_threshold: 0.5,
            decay_rate: 0.5,
            decay_half_life_secs: 86_400.0,
            strength_ceiling: 10.0,
            concept_floor: 0.05,
        }
    }
}

/// Strength rules for associations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationRules {
    /// Asymptotic ceiling approached by repeated reinforcement.
    pub cap: f64,
    /// Associations weaker than this are pruned during maintenance.
    pub prune_floor: f64,
    /// Whether associations decay alongside concepts.
    pub decay: bool,
}

impl Default for AssociationRules {
    fn default() -> Self {
        Self {
            cap: 1.0,
            prune_floor: 0.05,
            decay: true,
        }
    }
}

/// What happens to the weakest members of a tier over capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Remove excess members outright.
    #[default]
    Prune,
    /// Move excess members one tier down. Ephemeral overflow is still pruned.
    DemoteFirst,
}

/// Population limits per tier. Core is unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub ephemeral: usize,
    pub short_term: usize,
    pub medium_term: usize,
    pub long_term: usize,
    pub overflow: OverflowPolicy,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            ephemeral: 50_000,
            short_term: 20_000,
            medium_term: 10_000,
            long_term: 5_000,
            overflow: OverflowPolicy::Prune,
        }
    }
}

impl CapacityConfig {
    /// Population limit of a tier, `None` for Core.
    pub fn limit(&self, tier: Tier) -> Option<usize> {
        match tier {
            Tier::Ephemeral => Some(self.ephemeral),
            Tier::ShortTerm => Some(self.short_term),
            Tier::MediumTerm => Some(self.medium_term),
            Tier::LongTerm => Some(self.long_term),
            Tier::Core => None,
        }
    }

    pub fn validate(&self) -> PolicyResult<()> {
        for tier in Tier::ALL {
            if self.limit(tier) == Some(0) {
                return Err(PolicyError::invalid(
                    "capacity",
                    format!("capacity of tier {} must be greater than zero", tier),
                ));
            }
        }
        Ok(())
    }
}

/// The validated memory policy.
///
/// Construction fails with [`PolicyError::InvalidConfiguration`] when any
/// value is out of range; a constructed policy is always internally
/// consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryPolicy {
    config: PolicyConfig,
    capacity: CapacityConfig,
    associations: AssociationRules,
}

impl MemoryPolicy {
    pub fn new(
        config: PolicyConfig,
        capacity: CapacityConfig,
        associations: AssociationRules,
    ) -> PolicyResult<Self> {
        validate_config(&config)?;
        capacity.validate()?;
        validate_associations(&associations)?;
        validate_demotion(&config, &capacity)?;
        Ok(Self {
            config,
            capacity,
            associations,
        })
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn capacity(&self) -> &CapacityConfig {
        &self.capacity
    }

    pub fn associations(&self) -> &AssociationRules {
        &self.associations
    }

    pub fn thresholds(&self) -> &TierThresholds {
        &self.config.thresholds
    }

    /// Tier for a given strength.
    pub fn tier_for(&self, strength: f64) -> Tier {
        self.config.thresholds.tier_for(strength)
    }

    /// Clamp a fresh concept's strength into `[0, ceiling]`.
    pub fn initial_strength(&self, strength: f64) -> f64 {
        if strength.is_finite() {
            strength.clamp(0.0, self.config.strength_ceiling)
        } else {
            0.0
        }
    }

    /// Apply one reinforcement.
    ///
    /// `strength * access_boost * (adaptive_boost if weak else 1)` for a unit
    /// stimulus and no emotional weight. The growth part of the multiplier is
    /// scaled by `stimulus` and by `1 + emotional_weight` (weight clamped to
    /// `[0, 1]`).
    pub fn reinforce(&self, strength: f64, stimulus: f64, emotional_weight: Option<f64>) -> f64 {
        let adaptive = if strength < self.config.difficulty_threshold {
            self.config.adaptive_boost
        } else {
            1.0
        };
        let gain = self.config.access_boost * adaptive - 1.0;
        let stimulus = if stimulus.is_finite() {
            stimulus.max(0.0)
        } else {
            0.0
        };
        let emotion = 1.0
            + emotional_weight
                .filter(|w| w.is_finite())
                .map_or(0.0, |w| w.clamp(0.0, 1.0));
        let next = strength * (1.0 + gain * stimulus * emotion);
        next.min(self.config.strength_ceiling).max(strength)
    }

    /// Multiplicative decay factor for `elapsed_secs` of idleness.
    pub fn decay_factor(&self, elapsed_secs: f64) -> f64 {
        if elapsed_secs <= 0.0 {
            return 1.0;
        }
        self.config
            .decay_rate
            .powf(elapsed_secs / self.config.decay_half_life_secs)
    }

    /// Decay a concept's strength. Core concepts are exempt.
    pub fn decay_concept(&self, strength: f64, tier: Tier, elapsed_secs: f64) -> f64 {
        if tier.is_core() {
            strength
        } else {
            strength * self.decay_factor(elapsed_secs)
        }
    }

    /// Decay an association's strength, if association decay is enabled.
    pub fn decay_association(&self, strength: f64, elapsed_secs: f64) -> f64 {
        if self.associations.decay {
            strength * self.decay_factor(elapsed_secs)
        } else {
            strength
        }
    }

    /// Strength of a newly created association.
    pub fn initial_association_strength(&self, weight: f64) -> f64 {
        if weight.is_finite() {
            weight.clamp(0.0, self.associations.cap)
        } else {
            0.0
        }
    }

    /// Add `weight` to an association through the soft cap.
    ///
    /// The increment is `weight * (1 - strength / cap)`, so the result
    /// approaches `cap` without exceeding it.
    pub fn soft_cap_add(&self, strength: f64, weight: f64) -> f64 {
        let cap = self.associations.cap;
        let weight = self.initial_association_strength(weight);
        let gap = (cap - strength).max(0.0);
        (cap - gap * (1.0 - weight / cap)).min(cap).max(strength.min(cap))
    }

    /// Whether a concept should be removed by the pruning pass.
    pub fn should_prune_concept(&self, strength: f64, tier: Tier) -> bool {
        !tier.is_core() && strength < self.config.concept_floor
    }

    /// Whether an association should be removed by the pruning pass.
    pub fn should_prune_association(&self, strength: f64) -> bool {
        strength < self.associations.prune_floor
    }

    /// Population limit of a tier, `None` for Core.
    pub fn capacity_for(&self, tier: Tier) -> Option<usize> {
        self.capacity.limit(tier)
    }

    pub fn overflow(&self) -> OverflowPolicy {
        self.capacity.overflow
    }

    /// Strength an over-capacity member is demoted to: the midpoint of the
    /// next lower tier's band. `None` for Ephemeral and Core.
    pub fn demotion_strength(&self, tier: Tier) -> Option<f64> {
        if tier.is_core() {
            return None;
        }
        let lower = tier.lower()?;
        let (low, high) = self.config.thresholds.band(lower);
        high.map(|high| (low + high) / 2.0)
    }
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            config: PolicyConfig::default(),
            capacity: CapacityConfig::default(),
            associations: AssociationRules::default(),
        }
    }
}

fn validate_config(config: &PolicyConfig) -> PolicyResult<()> {
    config.thresholds.validate()?;

    if !(config.access_boost.is_finite() && config.access_boost > 1.0) {
        return Err(PolicyError::invalid(
            "access_boost",
            format!("must be greater than 1.0, got {}", config.access_boost),
        ));
    }
    if !(config.adaptive_boost.is_finite() && config.adaptive_boost > 1.0) {
        return Err(PolicyError::invalid(
            "adaptive_boost",
            format!("must be greater than 1.0, got {}", config.adaptive_boost),
        ));
    }
    if !(config.difficulty_threshold.is_finite() && config.difficulty_threshold >= 0.0) {
        return Err(PolicyError::invalid(
            "difficulty_threshold",
            format!("must be non-negative, got {}", config.difficulty_threshold),
        ));
    }
    if !(config.decay_rate > 0.0 && config.decay_rate <= 1.0) {
        return Err(PolicyError::invalid(
            "decay_rate",
            format!("must lie in (0, 1], got {}", config.decay_rate),
        ));
    }
    if !(config.decay_half_life_secs.is_finite() && config.decay_half_life_secs > 0.0) {
        return Err(PolicyError::invalid(
            "decay_half_life_secs",
            format!("must be positive, got {}", config.decay_half_life_secs),
        ));
    }
    if !(config.strength_ceiling.is_finite() && config.strength_ceiling > config.thresholds.core)
    {
        return Err(PolicyError::invalid(
            "strength_ceiling",
            format!(
                "must exceed the core threshold {}, got {}",
                config.thresholds.core, config.strength_ceiling
            ),
        ));
    }
    if !(config.concept_floor.is_finite()
        && config.concept_floor >= 0.0
        && config.concept_floor < config.thresholds.core)
    {
        return Err(PolicyError::invalid(
            "concept_floor",
            format!(
                "must lie in [0, {}), got {}",
                config.thresholds.core, config.concept_floor
            ),
        ));
    }
    Ok(())
}

/// Demoted members must survive the next pruning pass, or a second
/// maintenance cycle would remove what the first one only demoted.
fn validate_demotion(config: &PolicyConfig, capacity: &CapacityConfig) -> PolicyResult<()> {
    if capacity.overflow != OverflowPolicy::DemoteFirst {
        return Ok(());
    }
    let (low, high) = config.thresholds.band(Tier::Ephemeral);
    let lowest_target = high.map_or(low, |high| (low + high) / 2.0);
    if config.concept_floor >= lowest_target {
        return Err(PolicyError::invalid(
            "concept_floor",
            format!(
                "must stay below the lowest demotion target {} when overflow is demote_first, got {}",
                lowest_target, config.concept_floor
            ),
        ));
    }
    Ok(())
}

fn validate_associations(rules: &AssociationRules) -> PolicyResult<()> {
    if !(rules.cap.is_finite() && rules.cap > 0.0) {
        return Err(PolicyError::invalid(
            "associations.cap",
            format!("must be positive, got {}", rules.cap),
        ));
    }
    if !(rules.prune_floor.is_finite() && rules.prune_floor >= 0.0 && rules.prune_floor < rules.cap)
    {
        return Err(PolicyError::invalid(
            "associations.prune_floor",
            format!("must lie in [0, {}), got {}", rules.cap, rules.prune_floor),
        ));
    }
    Ok(())
}
