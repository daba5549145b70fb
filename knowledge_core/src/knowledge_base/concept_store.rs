//! Concept store - the content-indexed arena of concepts.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use memory_rules::{Clock, MemoryPolicy, Tier};
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use super::{Concept, ConceptId, ConceptKind, Reinforcement};
use crate::agents::text;
use crate::error::{Error, Result};

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Upsert {
    pub id: ConceptId,
    /// `true` if this call created the concept.
    pub created: bool,
    /// Present when an existing concept was reinforced instead.
    pub reinforcement: Option<Reinforcement>,
}

/// Holds every concept, keyed by its content hash.
///
/// Because the key is derived from content, the map itself is the content
/// index: `upsert` resolves through the shard-locked entry API, so concurrent
/// callers offering identical content create at most one record, and
/// per-record updates are serialized by the shard lock.
///
/// A second index maps each normalized word to the concepts whose content
/// contains it, so retrieval never has to scan the whole store.
pub struct ConceptStore {
    concepts: DashMap<ConceptId, Concept>,
    /// Normalized word -> concepts containing it.
    words: DashMap<String, HashSet<ConceptId>>,
    policy: Arc<MemoryPolicy>,
    clock: Arc<dyn Clock>,
    /// Bumped on every creation so waiters can re-check.
    created: Mutex<u64>,
    created_signal: Condvar,
}

impl ConceptStore {
    pub fn new(policy: Arc<MemoryPolicy>, clock: Arc<dyn Clock>) -> Self {
        Self {
            concepts: DashMap::new(),
            words: DashMap::new(),
            policy,
            clock,
            created: Mutex::new(0),
            created_signal: Condvar::new(),
        }
    }

    /// Insert new content, or reinforce the concept that already holds it.
    pub fn upsert(
        &self,
        content: &str,
        kind: ConceptKind,
        initial_strength: f64,
        emotional_weight: Option<f64>,
    ) -> Result<Upsert> {
        if content.trim().is_empty() {
            return Err(Error::EmptyContent);
        }
        let id = ConceptId::from_content(content);
        let now = self.clock.now();

        let upsert = match self.concepts.entry(id) {
            Entry::Occupied(mut entry) => {
                let concept = entry.get_mut();
                if concept.content != content {
                    return Err(Error::invariant(format!(
                        "content hash collision on {}",
                        id
                    )));
                }
                concept.offer_emotional_weight(emotional_weight);
                let reinforcement = concept.reinforce(1.0, &self.policy, now);
                Upsert {
                    id,
                    created: false,
                    reinforcement: Some(reinforcement),
                }
            }
            Entry::Vacant(entry) => {
                let concept = Concept::new(
                    content,
                    kind,
                    initial_strength,
                    emotional_weight,
                    &self.policy,
                    now,
                );
                debug!(concept = %id.short(), ?kind, tier = %concept.tier(), "concept created");
                entry.insert(concept);
                Upsert {
                    id,
                    created: true,
                    reinforcement: None,
                }
            }
        };

        if upsert.created {
            self.index_words(id, content);
            *self.created.lock() += 1;
            self.created_signal.notify_all();
        }
        Ok(upsert)
    }

    fn index_words(&self, id: ConceptId, content: &str) {
        for word in text::words(content) {
            self.words.entry(word).or_default().insert(id);
        }
    }

    fn unindex_words(&self, id: ConceptId, content: &str) {
        for word in text::words(content) {
            if let Some(mut ids) = self.words.get_mut(&word) {
                ids.remove(&id);
            }
            self.words.remove_if(&word, |_, ids| ids.is_empty());
        }
    }

    /// Concepts whose content contains the normalized `word`.
    pub fn ids_with_word(&self, word: &str) -> Vec<ConceptId> {
        self.words
            .get(word)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Reinforce an existing concept.
    pub fn reinforce(&self, id: ConceptId, stimulus: f64) -> Result<Reinforcement> {
        let now = self.clock.now();
        let mut concept = self.concepts.get_mut(&id).ok_or(Error::NotFound(id))?;
        Ok(concept.reinforce(stimulus, &self.policy, now))
    }

    /// Copy of a concept.
    pub fn get(&self, id: ConceptId) -> Result<Concept> {
        self.concepts
            .get(&id)
            .map(|c| c.clone())
            .ok_or(Error::NotFound(id))
    }

    pub fn contains(&self, id: ConceptId) -> bool {
        self.concepts.contains_key(&id)
    }

    pub fn tier_of(&self, id: ConceptId) -> Option<Tier> {
        self.concepts.get(&id).map(|c| c.tier())
    }

    /// Block until `id` exists or `timeout` elapses. Returns whether it exists.
    pub fn await_concept(&self, id: ConceptId, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut generation = self.created.lock();
        loop {
            if self.concepts.contains_key(&id) {
                return true;
            }
            if self
                .created_signal
                .wait_until(&mut generation, deadline)
                .timed_out()
            {
                return self.concepts.contains_key(&id);
            }
        }
    }

    /// Remove every concept matching `predicate`, except Core concepts.
    /// Returns the ids removed.
    pub fn prune_if<F>(&self, predicate: F) -> Vec<ConceptId>
    where
        F: Fn(&Concept) -> bool,
    {
        let doomed: Vec<ConceptId> = self
            .concepts
            .iter()
            .filter(|c| !c.is_core() && predicate(c.value()))
            .map(|c| c.id)
            .collect();

        doomed
            .into_iter()
            .filter(|id| {
                match self
                    .concepts
                    .remove_if(id, |_, c| !c.is_core() && predicate(c))
                {
                    Some((_, concept)) => {
                        self.unindex_words(concept.id, &concept.content);
                        true
                    }
                    None => false,
                }
            })
            .collect()
    }

    /// Apply `f` to every concept, one shard at a time.
    pub(crate) fn for_each_mut<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut Concept) -> Result<()>,
    {
        for mut entry in self.concepts.iter_mut() {
            f(entry.value_mut())?;
        }
        Ok(())
    }

    /// Visit every concept.
    pub fn scan<F>(&self, mut f: F)
    where
        F: FnMut(&Concept),
    {
        for entry in self.concepts.iter() {
            f(entry.value());
        }
    }

    /// Mutate one concept in place.
    pub(crate) fn update<F, T>(&self, id: ConceptId, f: F) -> Result<T>
    where
        F: FnOnce(&mut Concept) -> T,
    {
        let mut concept = self.concepts.get_mut(&id).ok_or(Error::NotFound(id))?;
        Ok(f(&mut concept))
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Concept count per tier, indexed by [`Tier::index`].
    pub fn tier_counts(&self) -> [usize; 5] {
        let mut counts = [0usize; 5];
        for entry in self.concepts.iter() {
            counts[entry.tier().index()] += 1;
        }
        counts
    }

    /// All concepts sorted by id.
    pub(crate) fn export(&self) -> Vec<Concept> {
        let mut concepts: Vec<Concept> = self.concepts.iter().map(|c| c.clone()).collect();
        concepts.sort_by_key(|c| c.id);
        concepts
    }

    /// Replace the whole store with `concepts`.
    pub(crate) fn replace_all(&self, concepts: Vec<Concept>) {
        self.concepts.clear();
        self.words.clear();
        for concept in concepts {
            self.index_words(concept.id, &concept.content);
            self.concepts.insert(concept.id, concept);
        }
        *self.created.lock() += 1;
        self.created_signal.notify_all();
    }
}

impl std::fmt::Debug for ConceptStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConceptStore")
            .field("concepts", &self.concepts.len())
            .finish()
    }
}
