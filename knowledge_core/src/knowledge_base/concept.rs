//! Concept definitions - content-addressed nodes in the knowledge graph.

use chrono::{DateTime, Utc};
use memory_rules::{MemoryPolicy, Tier};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::events::{TierTransition, TransitionCause};

/// Content-derived concept identifier.
///
/// The id is the SHA-256 digest of the concept's UTF-8 content and is written
/// as 64 lowercase hex characters in snapshots. Identical content always
/// yields the same id, so the id doubles as the content index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConceptId([u8; 32]);

impl ConceptId {
    /// Hash content into its concept id.
    pub fn from_content(content: &str) -> Self {
        let digest = Sha256::digest(content.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full hex form.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Parse the 64-character hex form.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }

    /// First 12 hex characters, for logs.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl std::fmt::Display for ConceptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for ConceptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConceptId({})", self.short())
    }
}

impl From<ConceptId> for String {
    fn from(id: ConceptId) -> Self {
        id.to_hex()
    }
}

impl TryFrom<String> for ConceptId {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        ConceptId::from_hex(&value).ok_or_else(|| format!("invalid concept id `{}`", value))
    }
}

/// What kind of text unit a concept was created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConceptKind {
    /// A normalized word.
    Token,
    /// A word that looks like a name or acronym.
    Entity,
    /// A purely numeric token.
    Number,
    /// A whole sentence.
    Sentence,
}

/// A concept is a unit of content with memory metadata.
///
/// Strength and tier are only changed through the memory policy, so the tier
/// is always the one the policy derived from the most recent strength
/// (or is flagged for the next consolidation pass).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: ConceptId,

    /// Token or sentence text this concept stands for.
    pub content: String,

    /// Kind assigned by the agent that created the concept.
    pub kind: ConceptKind,

    strength: f64,
    access_frequency: u64,
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    /// Instant up to which idle time has already been decayed.
    decay_anchor: DateTime<Utc>,
    tier: Tier,
    emotional_weight: Option<f64>,
    /// Strength changed during maintenance and the tier still has to follow.
    pending_consolidation: bool,
}

/// Outcome of reinforcing a concept once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reinforcement {
    pub id: ConceptId,
    pub previous_strength: f64,
    pub strength: f64,
    pub previous_tier: Tier,
    pub tier: Tier,
}

impl Reinforcement {
    /// The tier change this reinforcement caused, if any.
    pub fn transition(&self) -> Option<TierTransition> {
        (self.previous_tier != self.tier).then(|| TierTransition {
            concept_id: self.id,
            from: self.previous_tier,
            to: self.tier,
            cause: TransitionCause::Reinforcement,
        })
    }
}

impl Concept {
    /// Create a concept. The id is derived from `content`.
    pub(crate) fn new(
        content: impl Into<String>,
        kind: ConceptKind,
        initial_strength: f64,
        emotional_weight: Option<f64>,
        policy: &MemoryPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        let content = content.into();
        let strength = policy.initial_strength(initial_strength);
        Self {
            id: ConceptId::from_content(&content),
            content,
            kind,
            strength,
            access_frequency: 0,
            created_at: now,
            last_accessed: now,
            decay_anchor: now,
            tier: policy.tier_for(strength),
            emotional_weight: clamp_emotional_weight(emotional_weight),
            pending_consolidation: false,
        }
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn access_frequency(&self) -> u64 {
        self.access_frequency
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    pub fn emotional_weight(&self) -> Option<f64> {
        self.emotional_weight
    }

    pub fn is_core(&self) -> bool {
        self.tier.is_core()
    }

    pub fn needs_consolidation(&self) -> bool {
        self.pending_consolidation
    }

    /// Reinforce once and recompute the tier.
    pub(crate) fn reinforce(
        &mut self,
        stimulus: f64,
        policy: &MemoryPolicy,
        now: DateTime<Utc>,
    ) -> Reinforcement {
        let previous_strength = self.strength;
        let previous_tier = self.tier;

        self.strength = policy.reinforce(self.strength, stimulus, self.emotional_weight);
        self.access_frequency += 1;
        self.last_accessed = now;
        self.decay_anchor = now;
        self.tier = policy.tier_for(self.strength);
        self.pending_consolidation = false;

        Reinforcement {
            id: self.id,
            previous_strength,
            strength: self.strength,
            previous_tier,
            tier: self.tier,
        }
    }

    /// Keep the stronger of the existing and the offered emotional weight.
    pub(crate) fn offer_emotional_weight(&mut self, weight: Option<f64>) {
        if let Some(weight) = clamp_emotional_weight(weight) {
            if self.emotional_weight.map_or(true, |current| weight > current) {
                self.emotional_weight = Some(weight);
            }
        }
    }

    /// Decay for the idle time since the decay anchor. Returns whether
    /// strength changed. The tier is left for the consolidation pass.
    pub(crate) fn decay(&mut self, policy: &MemoryPolicy, now: DateTime<Utc>) -> bool {
        if self.tier.is_core() {
            return false;
        }
        let elapsed = memory_rules::elapsed_secs(self.decay_anchor, now);
        if elapsed <= 0.0 {
            return false;
        }
        let decayed = policy.decay_concept(self.strength, self.tier, elapsed);
        self.decay_anchor = now;
        if decayed < self.strength {
            self.strength = decayed;
            self.pending_consolidation = true;
            true
        } else {
            false
        }
    }

    /// Bring the tier in line with strength after maintenance changed it.
    pub(crate) fn consolidate(&mut self, policy: &MemoryPolicy) -> Option<TierTransition> {
        self.pending_consolidation = false;
        let tier = policy.tier_for(self.strength);
        let from = std::mem::replace(&mut self.tier, tier);
        (from != tier).then(|| TierTransition {
            concept_id: self.id,
            from,
            to: tier,
            cause: TransitionCause::Consolidation,
        })
    }

    /// Lower strength to `strength` and take the tier it implies.
    pub(crate) fn demote(&mut self, strength: f64, policy: &MemoryPolicy) -> Option<TierTransition> {
        if strength >= self.strength {
            return None;
        }
        self.strength = strength;
        self.pending_consolidation = false;
        let tier = policy.tier_for(strength);
        let from = std::mem::replace(&mut self.tier, tier);
        (from != tier).then(|| TierTransition {
            concept_id: self.id,
            from,
            to: tier,
            cause: TransitionCause::Demotion,
        })
    }
}

/// Clamp to `[0, 1]`; a non-finite weight counts as no weight.
fn clamp_emotional_weight(weight: Option<f64>) -> Option<f64> {
    weight.filter(|w| w.is_finite()).map(|w| w.clamp(0.0, 1.0))
}
