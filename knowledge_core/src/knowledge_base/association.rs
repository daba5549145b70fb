//! Association definitions - typed, weighted edges between concepts.

use chrono::{DateTime, Utc};
use memory_rules::MemoryPolicy;
use serde::{Deserialize, Serialize};

use super::ConceptId;

/// Types of associations between concepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AssociationType {
    /// Concepts that occur together in the same unit of text.
    Semantic,
    /// A whole (sentence) and one of its parts (token).
    Hierarchical,
    /// Sentences from consecutive units of text, earlier to later.
    Temporal,
}

impl AssociationType {
    /// Symmetric types are stored once per unordered pair.
    pub fn is_symmetric(&self) -> bool {
        matches!(self, AssociationType::Semantic)
    }
}

impl std::fmt::Display for AssociationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AssociationType::Semantic => "semantic",
            AssociationType::Hierarchical => "hierarchical",
            AssociationType::Temporal => "temporal",
        };
        f.write_str(name)
    }
}

/// Identity of an association: `(source, target, type)`.
///
/// Symmetric types are canonicalized so the smaller id is the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssociationKey {
    pub source: ConceptId,
    pub target: ConceptId,
    pub kind: AssociationType,
}

impl AssociationKey {
    pub fn new(source: ConceptId, target: ConceptId, kind: AssociationType) -> Self {
        let (source, target) = if kind.is_symmetric() && target < source {
            (target, source)
        } else {
            (source, target)
        };
        Self {
            source,
            target,
            kind,
        }
    }

    /// The endpoint opposite to `id`, if `id` is an endpoint.
    pub fn other(&self, id: ConceptId) -> Option<ConceptId> {
        if self.source == id {
            Some(self.target)
        } else if self.target == id {
            Some(self.source)
        } else {
            None
        }
    }

    pub fn touches(&self, id: ConceptId) -> bool {
        self.source == id || self.target == id
    }
}

impl std::fmt::Display for AssociationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -[{}]-> {}",
            self.source.short(),
            self.kind,
            self.target.short()
        )
    }
}

/// An association record. One record per key; it is readable from both
/// endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Association {
    pub key: AssociationKey,
    strength: f64,
    reinforcement_count: u64,
    created_at: DateTime<Utc>,
    last_reinforced: DateTime<Utc>,
    decay_anchor: DateTime<Utc>,
    /// Store-wide sequence number of the latest reinforcement.
    sequence: u64,
}

impl Association {
    pub(crate) fn new(
        key: AssociationKey,
        weight: f64,
        policy: &MemoryPolicy,
        now: DateTime<Utc>,
        sequence: u64,
    ) -> Self {
        Self {
            key,
            strength: policy.initial_association_strength(weight),
            reinforcement_count: 0,
            created_at: now,
            last_reinforced: now,
            decay_anchor: now,
            sequence,
        }
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn reinforcement_count(&self) -> u64 {
        self.reinforcement_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_reinforced(&self) -> DateTime<Utc> {
        self.last_reinforced
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Add `weight` through the soft cap.
    pub(crate) fn reinforce(
        &mut self,
        weight: f64,
        policy: &MemoryPolicy,
        now: DateTime<Utc>,
        sequence: u64,
    ) -> f64 {
        self.strength = policy.soft_cap_add(self.strength, weight);
        self.reinforcement_count += 1;
        self.last_reinforced = now;
        self.decay_anchor = now;
        self.sequence = sequence;
        self.strength
    }

    /// Decay for idle time since the decay anchor. Returns whether strength changed.
    pub(crate) fn decay(&mut self, policy: &MemoryPolicy, now: DateTime<Utc>) -> bool {
        let elapsed = memory_rules::elapsed_secs(self.decay_anchor, now);
        if elapsed <= 0.0 {
            return false;
        }
        let decayed = policy.decay_association(self.strength, elapsed);
        self.decay_anchor = now;
        if decayed < self.strength {
            self.strength = decayed;
            true
        } else {
            false
        }
    }
}

/// Which way an association points relative to the concept it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Undirected,
}

/// One edge as seen from one of its endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// The endpoint at the other end.
    pub concept_id: ConceptId,
    pub kind: AssociationType,
    pub strength: f64,
    pub direction: Direction,
    pub(crate) sequence: u64,
}

impl Neighbor {
    pub(crate) fn from_association(association: &Association, from: ConceptId) -> Option<Self> {
        let key = association.key;
        let other = key.other(from)?;
        let direction = if key.kind.is_symmetric() {
            Direction::Undirected
        } else if key.source == from {
            Direction::Outgoing
        } else {
            Direction::Incoming
        };
        Some(Self {
            concept_id: other,
            kind: key.kind,
            strength: association.strength,
            direction,
            sequence: association.sequence,
        })
    }
}
