//! Maintenance - forgetting, consolidation and capacity pruning.
//!
//! One cycle runs five sub-passes in a fixed order:
//! 1. **Decay**: idle non-Core concepts (and associations) lose strength
//! 2. **Consolidation**: tiers follow the strengths decay changed
//! 3. **Association pruning**: edges below the prune floor go
//! 4. **Concept pruning**: non-Core concepts below the floor go, with their edges
//! 5. **Capacity enforcement**: over-full tiers shed their weakest members
//!
//! Each sub-pass leaves the graph consistent, so a cycle may stop between
//! any two of them. Running a cycle twice with nothing in between changes
//! nothing the second time.

mod scheduler;

pub use scheduler::*;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use memory_rules::{OverflowPolicy, Tier};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::error::{Error, Result};
use crate::events::TierTransition;
use crate::knowledge_base::{ConceptId, KnowledgeGraph};

/// Configuration for the background scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Seconds between background cycles.
    pub interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

/// The sub-passes of a maintenance cycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenancePass {
    Decay,
    Consolidation,
    AssociationPruning,
    ConceptPruning,
    CapacityEnforcement,
}

impl MaintenancePass {
    pub const ALL: [MaintenancePass; 5] = [
        MaintenancePass::Decay,
        MaintenancePass::Consolidation,
        MaintenancePass::AssociationPruning,
        MaintenancePass::ConceptPruning,
        MaintenancePass::CapacityEnforcement,
    ];
}

/// Counts from one maintenance cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub concepts_decayed: usize,
    pub associations_decayed: usize,
    /// Concepts whose tier was recomputed after decay.
    pub concepts_consolidated: usize,
    pub associations_pruned: usize,
    pub concepts_pruned: usize,
    /// Associations removed with a pruned endpoint.
    pub cascaded_associations: usize,
    pub capacity_pruned: usize,
    pub capacity_demoted: usize,
    pub transitions: Vec<TierTransition>,
    pub completed_passes: Vec<MaintenancePass>,
    /// Stopped before every sub-pass ran.
    pub interrupted: bool,
}

impl MaintenanceReport {
    /// Whether the cycle changed anything.
    pub fn is_noop(&self) -> bool {
        self.concepts_decayed == 0
            && self.associations_decayed == 0
            && self.concepts_consolidated == 0
            && self.associations_pruned == 0
            && self.concepts_pruned == 0
            && self.cascaded_associations == 0
            && self.capacity_pruned == 0
            && self.capacity_demoted == 0
    }
}

/// Run one maintenance cycle. `stop` is checked before each sub-pass.
///
/// A failing sub-pass aborts the rest of the cycle.
pub fn run_cycle(graph: &KnowledgeGraph, stop: Option<&AtomicBool>) -> Result<MaintenanceReport> {
    let mut report = MaintenanceReport::default();

    for pass in MaintenancePass::ALL {
        if stop.is_some_and(|flag| flag.load(Ordering::Acquire)) {
            report.interrupted = true;
            info!(completed = ?report.completed_passes, "maintenance cycle interrupted");
            return Ok(report);
        }
        if let Err(e) = run_pass(graph, pass, &mut report) {
            error!(
                failed = ?pass,
                completed = ?report.completed_passes,
                decayed = report.concepts_decayed,
                consolidated = report.concepts_consolidated,
                pruned = report.concepts_pruned + report.associations_pruned,
                error = %e,
                "maintenance cycle aborted"
            );
            return Err(e);
        }
        report.completed_passes.push(pass);
    }

    info!(
        decayed = report.concepts_decayed,
        consolidated = report.concepts_consolidated,
        associations_pruned = report.associations_pruned,
        concepts_pruned = report.concepts_pruned,
        capacity_pruned = report.capacity_pruned,
        capacity_demoted = report.capacity_demoted,
        "maintenance cycle complete"
    );
    Ok(report)
}

#[instrument(skip(graph, report))]
fn run_pass(graph: &KnowledgeGraph, pass: MaintenancePass, report: &mut MaintenanceReport) -> Result<()> {
    match pass {
        MaintenancePass::Decay => decay(graph, report),
        MaintenancePass::Consolidation => consolidate(graph, report),
        MaintenancePass::AssociationPruning => {
            let policy = graph.policy();
            report.associations_pruned +=
                graph.prune_associations_if(|a| policy.should_prune_association(a.strength()));
            Ok(())
        }
        MaintenancePass::ConceptPruning => {
            let policy = graph.policy();
            let count =
                graph.prune_concepts_if(|c| policy.should_prune_concept(c.strength(), c.tier()));
            report.concepts_pruned += count.concepts;
            report.cascaded_associations += count.associations;
            Ok(())
        }
        MaintenancePass::CapacityEnforcement => enforce_capacity(graph, report),
    }
}

fn decay(graph: &KnowledgeGraph, report: &mut MaintenanceReport) -> Result<()> {
    let _shared = graph.shared();
    let policy = graph.policy();
    let now = graph.clock().now();

    graph.concepts().for_each_mut(|concept| {
        if concept.decay(policy, now) {
            report.concepts_decayed += 1;
        }
        if !concept.strength().is_finite() {
            return Err(Error::invariant(format!(
                "concept {} has non-finite strength",
                concept.id
            )));
        }
        Ok(())
    })?;

    graph.associations().for_each_mut(|association| {
        if association.decay(policy, now) {
            report.associations_decayed += 1;
        }
        if !association.strength().is_finite() {
            return Err(Error::invariant(format!(
                "association {} has non-finite strength",
                association.key
            )));
        }
        Ok(())
    })
}

fn consolidate(graph: &KnowledgeGraph, report: &mut MaintenanceReport) -> Result<()> {
    let _shared = graph.shared();
    let policy = graph.policy();

    graph.concepts().for_each_mut(|concept| {
        if concept.needs_consolidation() {
            report.concepts_consolidated += 1;
            report.transitions.extend(concept.consolidate(policy));
        }
        Ok(())
    })
}

/// Shed the weakest members of every over-full tier, highest bounded tier
/// first, so demoted members are counted against the tier they land in.
fn enforce_capacity(graph: &KnowledgeGraph, report: &mut MaintenanceReport) -> Result<()> {
    let _exclusive = graph.exclusive();
    let policy = graph.policy();

    for tier in [Tier::LongTerm, Tier::MediumTerm, Tier::ShortTerm, Tier::Ephemeral] {
        let Some(limit) = policy.capacity_for(tier) else {
            continue;
        };

        let mut members = Vec::new();
        graph.scan(|c| {
            if c.tier() == tier {
                members.push((c.strength(), c.last_accessed(), c.id));
            }
        });
        if members.len() <= limit {
            continue;
        }

        members.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });
        let excess: Vec<ConceptId> = members[..members.len() - limit]
            .iter()
            .map(|(_, _, id)| *id)
            .collect();

        match (policy.overflow(), policy.demotion_strength(tier)) {
            (OverflowPolicy::DemoteFirst, Some(strength)) => {
                for id in excess {
                    let transition = graph
                        .concepts()
                        .update(id, |c| c.demote(strength, policy))?;
                    report.transitions.extend(transition);
                    report.capacity_demoted += 1;
                }
            }
            _ => {
                let excess: HashSet<ConceptId> = excess.into_iter().collect();
                let count = graph.prune_concepts_locked(|c| excess.contains(&c.id));
                report.capacity_pruned += count.concepts;
                report.cascaded_associations += count.associations;
            }
        }
    }
    Ok(())
}
