//! # Knowledge Core (The Cortex)
//!
//! A knowledge graph that grows from streamed text without training.
//! Concepts and their associations are created and reinforced as text
//! arrives, and the memory rules in `memory_rules` decide what strengthens,
//! what consolidates into longer-lived tiers and what is forgotten.
//!
//! ## Core Components
//!
//! - **knowledge_base**: Concept and association stores behind a maintenance barrier
//! - **agents**: Concurrent molecular (token) and semantic (sentence) ingestion
//! - **retrieval**: One-hop spreading activation over the graph
//! - **maintenance**: Decay, consolidation, pruning and capacity enforcement
//! - **engine**: The facade a service layer drives
//!
//! ## Design Philosophy
//!
//! - **Content-Addressed**: A concept's id is the SHA-256 of its content, so identical content is one concept
//! - **Store-Owned**: Only the stores hold records; everything else holds ids
//! - **Derived Tiers**: A tier always follows from strength and is never set on its own

pub mod agents;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod knowledge_base;
pub mod maintenance;
pub mod retrieval;

pub use agents::{
    AgentConfig, AgentId, AgentReport, IngestionAgent, MolecularAgent, SemanticAgent, TextUnit,
    UnitOutcome,
};
pub use config::*;
pub use engine::*;
pub use error::{Error, Result};
pub use events::*;
pub use knowledge_base::*;
pub use maintenance::*;
pub use retrieval::*;
