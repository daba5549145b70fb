//! Knowledge Base module - the concept/association graph.
//!
//! The knowledge graph consists of:
//! - **Concepts**: Content-addressed nodes (tokens, entities, numbers, sentences)
//!   with a strength and a memory tier
//! - **Associations**: Typed, weighted edges between concepts, capped in strength
//! - **Snapshots**: Serialized point-in-time copies of both

mod association;
mod association_store;
mod concept;
mod concept_store;
mod graph;

pub use association::*;
pub use association_store::*;
pub use concept::*;
pub use concept_store::*;
pub use graph::*;
