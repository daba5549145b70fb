//! Memory tiers: the five durability classes a concept moves through.

use serde::{Deserialize, Serialize};

/// Memory tier of a concept, ordered from least to most durable.
///
/// A tier is never set directly. It is always derived from strength by
/// [`crate::MemoryPolicy::tier_for`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum Tier {
    /// Freshly seen, likely to be forgotten.
    #[default]
    Ephemeral,
    ShortTerm,
    MediumTerm,
    LongTerm,
    /// Retained indefinitely: exempt from decay, pruning and capacity limits.
    Core,
}

impl Tier {
    /// All tiers in ascending order.
    pub const ALL: [Tier; 5] = [
        Tier::Ephemeral,
        Tier::ShortTerm,
        Tier::MediumTerm,
        Tier::LongTerm,
        Tier::Core,
    ];

    /// Retrieval score multiplier. Monotonically increasing with the tier.
    pub fn memory_boost(&self) -> f64 {
        match self {
            Tier::Ephemeral => 1.0,
            Tier::ShortTerm => 1.15,
            Tier::MediumTerm => 1.35,
            Tier::LongTerm => 1.6,
            Tier::Core => 2.0,
        }
    }

    /// Position of this tier in [`Tier::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// The next less durable tier, if any.
    pub fn lower(&self) -> Option<Tier> {
        match self {
            Tier::Ephemeral => None,
            Tier::ShortTerm => Some(Tier::Ephemeral),
            Tier::MediumTerm => Some(Tier::ShortTerm),
            Tier::LongTerm => Some(Tier::MediumTerm),
            Tier::Core => Some(Tier::LongTerm),
        }
    }

    /// The next more durable tier, if any.
    pub fn higher(&self) -> Option<Tier> {
        match self {
            Tier::Ephemeral => Some(Tier::ShortTerm),
            Tier::ShortTerm => Some(Tier::MediumTerm),
            Tier::MediumTerm => Some(Tier::LongTerm),
            Tier::LongTerm => Some(Tier::Core),
            Tier::Core => None,
        }
    }

    pub fn is_core(&self) -> bool {
        matches!(self, Tier::Core)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Tier::Ephemeral => "ephemeral",
            Tier::ShortTerm => "short_term",
            Tier::MediumTerm => "medium_term",
            Tier::LongTerm => "long_term",
            Tier::Core => "core",
        };
        f.write_str(name)
    }
}
