//! Property-based tests for the memory policy arithmetic.
//!
//! These check the invariants the graph relies on:
//!
//! - Soft-capped association strength never exceeds the cap
//! - Decay never increases strength, and strictly decreases it for idle time
//! - Core strength is untouched by decay
//! - Reinforcement never decreases strength
//! - Tier assignment is monotonic in strength

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::policy::{AssociationRules, CapacityConfig, MemoryPolicy, PolicyConfig};
    use crate::tier::Tier;

    fn policy() -> MemoryPolicy {
        MemoryPolicy::new(
            PolicyConfig::default(),
            CapacityConfig::default(),
            AssociationRules::default(),
        )
        .unwrap()
    }

    fn non_core_tier() -> impl Strategy<Value = Tier> {
        prop_oneof![
            Just(Tier::Ephemeral),
            Just(Tier::ShortTerm),
            Just(Tier::MediumTerm),
            Just(Tier::LongTerm),
        ]
    }

    proptest! {
        /// Repeated soft-cap reinforcement converges on the cap without passing it.
        #[test]
        fn soft_cap_never_exceeded(
            initial in 0.0f64..1.0,
            weight in 0.0f64..1.0,
            rounds in 1usize..10_000,
        ) {
            let policy = policy();
            let cap = policy.associations().cap;
            let mut strength = policy.initial_association_strength(initial);
            for _ in 0..rounds {
                let next = policy.soft_cap_add(strength, weight);
                prop_assert!(next >= strength, "soft cap decreased {} -> {}", strength, next);
                prop_assert!(next <= cap, "soft cap exceeded: {}", next);
                strength = next;
            }
        }

        /// Decay is monotonic, and strict for positive idle time.
        #[test]
        fn decay_is_monotonic(
            strength in 0.01f64..10.0,
            elapsed in 1.0f64..1.0e7,
            tier in non_core_tier(),
        ) {
            let policy = policy();
            let decayed = policy.decay_concept(strength, tier, elapsed);
            prop_assert!(decayed < strength, "{} should decay below {}", decayed, strength);
            prop_assert!(decayed >= 0.0);
        }

        /// Core concepts keep their strength for any idle duration.
        #[test]
        fn core_is_exempt(strength in 2.5f64..10.0, elapsed in 0.0f64..1.0e12) {
            let policy = policy();
            prop_assert_eq!(policy.decay_concept(strength, Tier::Core, elapsed), strength);
        }

        /// Reinforcement never lowers strength.
        #[test]
        fn reinforcement_is_non_decreasing(
            strength in 0.0f64..10.0,
            stimulus in 0.0f64..4.0,
            emotion in proptest::option::of(0.0f64..1.0),
        ) {
            let policy = policy();
            prop_assert!(policy.reinforce(strength, stimulus, emotion) >= strength);
        }

        /// A stronger concept never lands in a lower tier.
        #[test]
        fn tier_is_monotonic(a in 0.0f64..10.0, b in 0.0f64..10.0) {
            let policy = policy();
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(policy.tier_for(low) <= policy.tier_for(high));
        }
    }
}
