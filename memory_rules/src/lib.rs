//! # Memory Rules
//!
//! The "rule book" crate for the Cortex knowledge graph - memory tiers, the
//! reinforcement and decay arithmetic, soft caps and per-tier capacities.
//! This crate holds no graph state and performs no synchronization; every
//! decision here is a pure function of its inputs.

pub mod clock;
pub mod error;
pub mod policy;
pub mod tier;

#[cfg(test)]
mod properties;

pub use clock::*;
pub use error::*;
pub use policy::*;
pub use tier::*;
