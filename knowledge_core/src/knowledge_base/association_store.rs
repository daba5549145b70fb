//! Association store - deduplicated, bidirectionally readable edges.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use memory_rules::{Clock, MemoryPolicy};
use tracing::debug;

use super::{Association, AssociationKey, AssociationType, ConceptId, ConceptStore, Neighbor};
use crate::error::{Error, Result};

/// Result of a link request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Linked {
    pub key: AssociationKey,
    /// `true` if this call created the association.
    pub created: bool,
    pub strength: f64,
}

/// Holds every association, plus an adjacency index so edges can be read
/// from either endpoint. Each edge is stored exactly once.
pub struct AssociationStore {
    edges: DashMap<AssociationKey, Association>,
    /// Concept id -> keys of the edges touching it.
    adjacency: DashMap<ConceptId, HashSet<AssociationKey>>,
    /// Orders reinforcements for tie-breaking.
    sequence: AtomicU64,
    policy: Arc<MemoryPolicy>,
    clock: Arc<dyn Clock>,
}

impl AssociationStore {
    pub fn new(policy: Arc<MemoryPolicy>, clock: Arc<dyn Clock>) -> Self {
        Self {
            edges: DashMap::new(),
            adjacency: DashMap::new(),
            sequence: AtomicU64::new(1),
            policy,
            clock,
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Create the association `(source, target, kind)` at `weight`, or add
    /// `weight` to the existing one through the soft cap.
    ///
    /// Fails with [`Error::NotFound`] if either endpoint is missing from
    /// `concepts`.
    pub fn link(
        &self,
        concepts: &ConceptStore,
        source: ConceptId,
        target: ConceptId,
        kind: AssociationType,
        weight: f64,
    ) -> Result<Linked> {
        if source == target {
            return Err(Error::SelfAssociation(source));
        }
        for endpoint in [source, target] {
            if !concepts.contains(endpoint) {
                return Err(Error::NotFound(endpoint));
            }
        }

        let key = AssociationKey::new(source, target, kind);
        let now = self.clock.now();
        let sequence = self.next_sequence();

        let linked = match self.edges.entry(key) {
            Entry::Occupied(mut entry) => {
                let strength = entry.get_mut().reinforce(weight, &self.policy, now, sequence);
                Linked {
                    key,
                    created: false,
                    strength,
                }
            }
            Entry::Vacant(entry) => {
                let association = Association::new(key, weight, &self.policy, now, sequence);
                let strength = association.strength();
                entry.insert(association);
                Linked {
                    key,
                    created: true,
                    strength,
                }
            }
        };

        if linked.created {
            self.index(key);
            debug!(association = %key, strength = linked.strength, "association created");
        }
        Ok(linked)
    }

    fn index(&self, key: AssociationKey) {
        self.adjacency.entry(key.source).or_default().insert(key);
        self.adjacency.entry(key.target).or_default().insert(key);
    }

    fn unindex(&self, key: &AssociationKey) {
        for endpoint in [key.source, key.target] {
            if let Some(mut keys) = self.adjacency.get_mut(&endpoint) {
                keys.remove(key);
            }
            self.adjacency.remove_if(&endpoint, |_, keys| keys.is_empty());
        }
    }

    /// Edges touching `id` from either direction, strongest first; ties go
    /// to the most recently reinforced.
    pub fn neighbors(&self, id: ConceptId) -> Vec<Neighbor> {
        let keys: Vec<AssociationKey> = match self.adjacency.get(&id) {
            Some(keys) => keys.iter().copied().collect(),
            None => return Vec::new(),
        };

        let mut neighbors: Vec<Neighbor> = keys
            .iter()
            .filter_map(|key| self.edges.get(key))
            .filter_map(|edge| Neighbor::from_association(&edge, id))
            .collect();

        neighbors.sort_by(|a, b| {
            b.strength
                .total_cmp(&a.strength)
                .then_with(|| b.sequence.cmp(&a.sequence))
                .then_with(|| a.concept_id.cmp(&b.concept_id))
        });
        neighbors
    }

    /// Copy of one association.
    pub fn get(&self, key: &AssociationKey) -> Result<Association> {
        self.edges
            .get(key)
            .map(|edge| edge.clone())
            .ok_or(Error::AssociationNotFound(*key))
    }

    /// Look up `(source, target, kind)`, canonicalizing symmetric types.
    pub fn find(
        &self,
        source: ConceptId,
        target: ConceptId,
        kind: AssociationType,
    ) -> Option<Association> {
        self.get(&AssociationKey::new(source, target, kind)).ok()
    }

    /// Remove every association matching `predicate`. Returns the count removed.
    pub fn prune_if<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Association) -> bool,
    {
        let doomed: Vec<AssociationKey> = self
            .edges
            .iter()
            .filter(|edge| predicate(edge.value()))
            .map(|edge| edge.key)
            .collect();

        let mut removed = 0;
        for key in doomed {
            if self.edges.remove_if(&key, |_, edge| predicate(edge)).is_some() {
                self.unindex(&key);
                removed += 1;
            }
        }
        removed
    }

    /// Remove every association touching `id`. Returns the count removed.
    pub fn remove_incident(&self, id: ConceptId) -> usize {
        let keys: Vec<AssociationKey> = match self.adjacency.remove(&id) {
            Some((_, keys)) => keys.into_iter().collect(),
            None => return 0,
        };
        let mut removed = 0;
        for key in keys {
            if self.edges.remove(&key).is_some() {
                removed += 1;
            }
            self.unindex(&key);
        }
        removed
    }

    /// Apply `f` to every association, one shard at a time.
    pub(crate) fn for_each_mut<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut Association) -> Result<()>,
    {
        for mut entry in self.edges.iter_mut() {
            f(entry.value_mut())?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Association count per type.
    pub fn count_by_type(&self, kind: AssociationType) -> usize {
        self.edges.iter().filter(|e| e.key.kind == kind).count()
    }

    /// All associations sorted by key.
    pub(crate) fn export(&self) -> Vec<Association> {
        let mut edges: Vec<Association> = self.edges.iter().map(|e| e.clone()).collect();
        edges.sort_by_key(|e| e.key);
        edges
    }

    /// Replace the whole store with `associations`.
    pub(crate) fn replace_all(&self, associations: Vec<Association>) {
        self.edges.clear();
        self.adjacency.clear();
        let mut next = 1;
        for association in associations {
            next = next.max(association.sequence() + 1);
            let key = association.key;
            self.edges.insert(key, association);
            self.index(key);
        }
        self.sequence.store(next, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for AssociationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssociationStore")
            .field("edges", &self.edges.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge_base::ConceptKind;
    use memory_rules::ManualClock;

    fn stores() -> (ConceptStore, AssociationStore) {
        let policy = Arc::new(MemoryPolicy::default());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_epoch());
        (
            ConceptStore::new(policy.clone(), clock.clone()),
            AssociationStore::new(policy, clock),
        )
    }

    fn concept(store: &ConceptStore, content: &str) -> ConceptId {
        store.upsert(content, ConceptKind::Token, 0.2, None).unwrap().id
    }

    #[test]
    fn test_link_creates_then_reinforces() {
        let (concepts, edges) = stores();
        let a = concept(&concepts, "a");
        let b = concept(&concepts, "b");

        let first = edges.link(&concepts, a, b, AssociationType::Semantic, 0.3).unwrap();
        assert!(first.created);
        assert!((first.strength - 0.3).abs() < 1e-12);

        let second = edges.link(&concepts, b, a, AssociationType::Semantic, 0.3).unwrap();
        assert!(!second.created);
        assert!(second.strength > first.strength);
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn test_link_requires_endpoints() {
        let (concepts, edges) = stores();
        let a = concept(&concepts, "a");
        let ghost = ConceptId::from_content("ghost");

        let err = edges
            .link(&concepts, a, ghost, AssociationType::Semantic, 0.3)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(id) if id == ghost));

        let err = edges
            .link(&concepts, a, a, AssociationType::Semantic, 0.3)
            .unwrap_err();
        assert!(matches!(err, Error::SelfAssociation(_)));
    }

    #[test]
    fn test_types_are_distinct_edges() {
        let (concepts, edges) = stores();
        let a = concept(&concepts, "a");
        let b = concept(&concepts, "b");

        edges.link(&concepts, a, b, AssociationType::Semantic, 0.3).unwrap();
        edges.link(&concepts, a, b, AssociationType::Temporal, 0.3).unwrap();

        assert_eq!(edges.len(), 2);
        assert_eq!(edges.count_by_type(AssociationType::Temporal), 1);
    }

    #[test]
    fn test_neighbors_from_both_endpoints() {
        let (concepts, edges) = stores();
        let sentence = concept(&concepts, "The cat sat.");
        let cat = concept(&concepts, "cat");
        let sat = concept(&concepts, "sat");

        edges
            .link(&concepts, sentence, cat, AssociationType::Hierarchical, 0.5)
            .unwrap();
        edges
            .link(&concepts, sentence, sat, AssociationType::Hierarchical, 0.4)
            .unwrap();

        let from_sentence = edges.neighbors(sentence);
        assert_eq!(from_sentence.len(), 2);
        assert_eq!(from_sentence[0].concept_id, cat);

        let from_cat = edges.neighbors(cat);
        assert_eq!(from_cat.len(), 1);
        assert_eq!(from_cat[0].concept_id, sentence);
    }

    #[test]
    fn test_neighbor_ties_prefer_recent() {
        let (concepts, edges) = stores();
        let hub = concept(&concepts, "hub");
        let older = concept(&concepts, "older");
        let newer = concept(&concepts, "newer");

        edges.link(&concepts, hub, older, AssociationType::Semantic, 0.4).unwrap();
        edges.link(&concepts, hub, newer, AssociationType::Semantic, 0.4).unwrap();

        let neighbors = edges.neighbors(hub);
        assert_eq!(neighbors[0].concept_id, newer);
        assert_eq!(neighbors[1].concept_id, older);
    }

    #[test]
    fn test_prune_and_remove_incident() {
        let (concepts, edges) = stores();
        let a = concept(&concepts, "a");
        let b = concept(&concepts, "b");
        let c = concept(&concepts, "c");

        edges.link(&concepts, a, b, AssociationType::Semantic, 0.01).unwrap();
        edges.link(&concepts, a, c, AssociationType::Semantic, 0.5).unwrap();
        edges.link(&concepts, b, c, AssociationType::Temporal, 0.5).unwrap();

        assert_eq!(edges.prune_if(|e| e.strength() < 0.05), 1);
        assert_eq!(edges.neighbors(b).len(), 1);

        assert_eq!(edges.remove_incident(c), 2);
        assert!(edges.is_empty());
        assert!(edges.neighbors(a).is_empty());
    }

    #[test]
    fn test_concurrent_links_create_one_edge() {
        let (concepts, edges) = stores();
        let a = concept(&concepts, "a");
        let b = concept(&concepts, "b");

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        edges
                            .link(&concepts, a, b, AssociationType::Semantic, 0.1)
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(edges.len(), 1);
        let edge = edges.find(a, b, AssociationType::Semantic).unwrap();
        assert_eq!(edge.reinforcement_count(), 399);
        assert!(edge.strength() <= 1.0);
    }
}
