//! Knowledge Graph - concept and association stores behind one maintenance barrier.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use memory_rules::{Clock, MemoryPolicy, Tier};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    Association, AssociationKey, AssociationStore, AssociationType, Concept, ConceptId,
    ConceptKind, ConceptStore, Linked, Neighbor, Reinforcement, Upsert,
};
use crate::error::{Error, Result};

/// Snapshot format understood by [`KnowledgeGraph::restore`].
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Hash function behind [`ConceptId`]; part of the snapshot contract.
pub const SNAPSHOT_ID_HASH: &str = "sha256";

/// The main knowledge graph structure.
///
/// Store mutations (upsert, reinforce, link) take the shared side of the
/// maintenance barrier and may run concurrently; per-record atomicity comes
/// from the stores. Pruning, capacity enforcement, snapshot and restore take
/// the exclusive side, so nothing is removed while it is being upserted.
pub struct KnowledgeGraph {
    concepts: ConceptStore,
    associations: AssociationStore,
    barrier: RwLock<()>,
    policy: Arc<MemoryPolicy>,
    clock: Arc<dyn Clock>,
}

/// Counts removed by a cascading concept prune.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneCount {
    pub concepts: usize,
    /// Associations removed because an endpoint went away.
    pub associations: usize,
}

/// Population overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub concepts: usize,
    pub associations: usize,
    pub concepts_by_tier: BTreeMap<Tier, usize>,
    pub associations_by_type: BTreeMap<AssociationType, usize>,
}

/// Serialized form of the whole graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub format_version: u32,
    pub id_hash: String,
    pub taken_at: DateTime<Utc>,
    pub concepts: Vec<Concept>,
    pub associations: Vec<Association>,
}

impl GraphSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check identities and references before anything is replaced.
    fn validate(&self) -> Result<()> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(Error::corrupt_snapshot(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        if self.id_hash != SNAPSHOT_ID_HASH {
            return Err(Error::corrupt_snapshot(format!(
                "unsupported id hash `{}`",
                self.id_hash
            )));
        }

        let mut ids = HashSet::with_capacity(self.concepts.len());
        for concept in &self.concepts {
            if ConceptId::from_content(&concept.content) != concept.id {
                return Err(Error::corrupt_snapshot(format!(
                    "concept {} does not match its content",
                    concept.id
                )));
            }
            if !(concept.strength().is_finite() && concept.strength() >= 0.0) {
                return Err(Error::corrupt_snapshot(format!(
                    "concept {} has invalid strength {}",
                    concept.id,
                    concept.strength()
                )));
            }
            if !ids.insert(concept.id) {
                return Err(Error::corrupt_snapshot(format!(
                    "duplicate concept {}",
                    concept.id
                )));
            }
        }

        let mut keys = HashSet::with_capacity(self.associations.len());
        for association in &self.associations {
            let key = association.key;
            if AssociationKey::new(key.source, key.target, key.kind) != key
                || key.source == key.target
            {
                return Err(Error::corrupt_snapshot(format!(
                    "association {} is not canonical",
                    key
                )));
            }
            if !ids.contains(&key.source) || !ids.contains(&key.target) {
                return Err(Error::corrupt_snapshot(format!(
                    "association {} references a missing concept",
                    key
                )));
            }
            if !(association.strength().is_finite() && association.strength() >= 0.0) {
                return Err(Error::corrupt_snapshot(format!(
                    "association {} has invalid strength",
                    key
                )));
            }
            if !keys.insert(key) {
                return Err(Error::corrupt_snapshot(format!(
                    "duplicate association {}",
                    key
                )));
            }
        }
        Ok(())
    }
}

impl KnowledgeGraph {
    /// Create a new empty knowledge graph.
    pub fn new(policy: MemoryPolicy, clock: Arc<dyn Clock>) -> Self {
        let policy = Arc::new(policy);
        Self {
            concepts: ConceptStore::new(policy.clone(), clock.clone()),
            associations: AssociationStore::new(policy.clone(), clock.clone()),
            barrier: RwLock::new(()),
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &MemoryPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn concepts(&self) -> &ConceptStore {
        &self.concepts
    }

    pub fn associations(&self) -> &AssociationStore {
        &self.associations
    }

    /// Admit in-place record updates alongside store mutations.
    pub(crate) fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.barrier.read()
    }

    /// Hold off all store mutations until the guard is dropped.
    pub(crate) fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.barrier.write()
    }

    /// Insert or reinforce a concept by content.
    pub fn upsert(
        &self,
        content: &str,
        kind: ConceptKind,
        initial_strength: f64,
        emotional_weight: Option<f64>,
    ) -> Result<Upsert> {
        let _shared = self.barrier.read();
        self.concepts
            .upsert(content, kind, initial_strength, emotional_weight)
    }

    /// Reinforce an existing concept.
    pub fn reinforce(&self, id: ConceptId, stimulus: f64) -> Result<Reinforcement> {
        let _shared = self.barrier.read();
        self.concepts.reinforce(id, stimulus)
    }

    pub fn get(&self, id: ConceptId) -> Result<Concept> {
        self.concepts.get(id)
    }

    pub fn contains(&self, id: ConceptId) -> bool {
        self.concepts.contains(id)
    }

    pub fn tier_of(&self, id: ConceptId) -> Option<Tier> {
        self.concepts.tier_of(id)
    }

    /// Wait for another writer to create `id`.
    pub fn await_concept(&self, id: ConceptId, timeout: Duration) -> bool {
        self.concepts.await_concept(id, timeout)
    }

    /// Create or reinforce an association.
    pub fn link(
        &self,
        source: ConceptId,
        target: ConceptId,
        kind: AssociationType,
        weight: f64,
    ) -> Result<Linked> {
        let _shared = self.barrier.read();
        self.associations
            .link(&self.concepts, source, target, kind, weight)
    }

    /// Edges touching `id`, strongest first.
    pub fn neighbors(&self, id: ConceptId) -> Vec<Neighbor> {
        self.associations.neighbors(id)
    }

    /// Visit every concept.
    pub fn scan<F>(&self, f: F)
    where
        F: FnMut(&Concept),
    {
        self.concepts.scan(f)
    }

    /// Concepts whose content contains any of `words` (already normalized).
    pub fn concepts_with_words<'a, I>(&self, words: I) -> HashSet<ConceptId>
    where
        I: IntoIterator<Item = &'a str>,
    {
        words
            .into_iter()
            .flat_map(|word| self.concepts.ids_with_word(word))
            .collect()
    }

    /// Remove non-Core concepts matching `predicate` and their associations.
    pub fn prune_concepts_if<F>(&self, predicate: F) -> PruneCount
    where
        F: Fn(&Concept) -> bool,
    {
        let _exclusive = self.exclusive();
        self.prune_concepts_locked(predicate)
    }

    /// Caller must hold [`KnowledgeGraph::exclusive`].
    pub(crate) fn prune_concepts_locked<F>(&self, predicate: F) -> PruneCount
    where
        F: Fn(&Concept) -> bool,
    {
        let removed = self.concepts.prune_if(predicate);
        let associations = removed
            .iter()
            .map(|id| self.associations.remove_incident(*id))
            .sum();
        PruneCount {
            concepts: removed.len(),
            associations,
        }
    }

    /// Remove associations matching `predicate`.
    pub fn prune_associations_if<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Association) -> bool,
    {
        let _exclusive = self.exclusive();
        self.associations.prune_if(predicate)
    }

    pub fn stats(&self) -> GraphStats {
        let tier_counts = self.concepts.tier_counts();
        let concepts_by_tier = Tier::ALL
            .iter()
            .map(|tier| (*tier, tier_counts[tier.index()]))
            .collect();
        let associations_by_type = [
            AssociationType::Semantic,
            AssociationType::Hierarchical,
            AssociationType::Temporal,
        ]
        .into_iter()
        .map(|kind| (kind, self.associations.count_by_type(kind)))
        .collect();

        GraphStats {
            concepts: self.concepts.len(),
            associations: self.associations.len(),
            concepts_by_tier,
            associations_by_type,
        }
    }

    /// Point-in-time copy of every record.
    pub fn snapshot(&self) -> GraphSnapshot {
        let _exclusive = self.exclusive();
        GraphSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            id_hash: SNAPSHOT_ID_HASH.to_string(),
            taken_at: self.clock.now(),
            concepts: self.concepts.export(),
            associations: self.associations.export(),
        }
    }

    /// Replace the graph with a snapshot. Identities, strengths and tiers
    /// come back exactly as they were captured. Nothing changes if the
    /// snapshot is rejected.
    pub fn restore(&self, snapshot: GraphSnapshot) -> Result<()> {
        snapshot.validate()?;
        let _exclusive = self.exclusive();
        let (concepts, associations) = (snapshot.concepts.len(), snapshot.associations.len());
        self.concepts.replace_all(snapshot.concepts);
        self.associations.replace_all(snapshot.associations);
        info!(concepts, associations, taken_at = %snapshot.taken_at, "graph restored");
        Ok(())
    }
}

impl std::fmt::Debug for KnowledgeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeGraph")
            .field("concepts", &self.concepts)
            .field("associations", &self.associations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_rules::ManualClock;

    fn graph() -> KnowledgeGraph {
        KnowledgeGraph::new(MemoryPolicy::default(), Arc::new(ManualClock::at_epoch()))
    }

    fn populated() -> (KnowledgeGraph, ConceptId, ConceptId, ConceptId) {
        let graph = graph();
        let sentence = graph
            .upsert("The cat sat.", ConceptKind::Sentence, 0.25, None)
            .unwrap()
            .id;
        let cat = graph.upsert("cat", ConceptKind::Token, 0.2, None).unwrap().id;
        let core = graph.upsert("core", ConceptKind::Token, 5.0, None).unwrap().id;
        graph
            .link(sentence, cat, AssociationType::Hierarchical, 0.5)
            .unwrap();
        graph
            .link(sentence, core, AssociationType::Semantic, 0.3)
            .unwrap();
        (graph, sentence, cat, core)
    }

    #[test]
    fn test_prune_cascades_to_associations() {
        let (graph, sentence, cat, core) = populated();

        let count = graph.prune_concepts_if(|c| c.id == sentence || c.id == core);

        assert_eq!(count.concepts, 1);
        assert_eq!(count.associations, 2);
        assert!(graph.contains(core));
        assert!(graph.contains(cat));
        assert!(graph.neighbors(cat).is_empty());
    }

    #[test]
    fn test_stats() {
        let (graph, ..) = populated();
        let stats = graph.stats();

        assert_eq!(stats.concepts, 3);
        assert_eq!(stats.associations, 2);
        assert_eq!(stats.concepts_by_tier[&Tier::Core], 1);
        assert_eq!(stats.associations_by_type[&AssociationType::Hierarchical], 1);
        assert_eq!(stats.associations_by_type[&AssociationType::Temporal], 0);
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let (graph, sentence, cat, _) = populated();
        graph.reinforce(cat, 1.0).unwrap();

        let snapshot = graph.snapshot();
        let json = snapshot.to_json().unwrap();

        let restored = super::tests::graph();
        restored.restore(GraphSnapshot::from_json(&json).unwrap()).unwrap();

        let again = restored.snapshot();
        assert_eq!(again.concepts, snapshot.concepts);
        assert_eq!(again.associations, snapshot.associations);
        assert_eq!(restored.neighbors(sentence), graph.neighbors(sentence));
    }

    #[test]
    fn test_restore_rejects_tampered_content() {
        let (graph, ..) = populated();
        let mut snapshot = graph.snapshot();
        snapshot.concepts[0].content.push('!');

        let target = super::tests::graph();
        let err = target.restore(snapshot).unwrap_err();
        assert!(matches!(err, Error::CorruptSnapshot(_)));
        assert_eq!(target.stats().concepts, 0);
    }

    #[test]
    fn test_restore_rejects_dangling_association() {
        let (graph, _, cat, _) = populated();
        let mut snapshot = graph.snapshot();
        snapshot.concepts.retain(|c| c.id != cat);

        let err = super::tests::graph().restore(snapshot).unwrap_err();
        assert!(err.to_string().contains("missing concept"));
    }

    #[test]
    fn test_restore_rejects_unknown_version() {
        let (graph, ..) = populated();
        let mut snapshot = graph.snapshot();
        snapshot.format_version = 99;

        assert!(super::tests::graph().restore(snapshot).is_err());
    }
}
