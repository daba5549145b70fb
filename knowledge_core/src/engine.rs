//! Engine - the surface a service layer talks to.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use memory_rules::{Clock, SystemClock};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::agents::{run_agent, AgentReport, IngestionAgent, MolecularAgent, SemanticAgent, TextUnit};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::{TierTransition, TransitionObserver};
use crate::knowledge_base::{GraphSnapshot, GraphStats, KnowledgeGraph};
use crate::maintenance::{self, MaintenanceReport, MaintenanceScheduler, SchedulerHandle};
use crate::retrieval::{QueryHit, RetrievalEngine};

/// Totals for one ingest call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub units: usize,
    pub agents: Vec<AgentReport>,
    pub tier_transitions: usize,
}

impl IngestReport {
    pub fn concepts_created(&self) -> usize {
        self.agents.iter().map(|a| a.concepts_created).sum()
    }

    pub fn associations_created(&self) -> usize {
        self.agents.iter().map(|a| a.associations_created).sum()
    }

    /// Units at least one agent had to skip.
    pub fn units_skipped(&self) -> usize {
        self.agents.iter().map(|a| a.units_skipped).max().unwrap_or(0)
    }
}

/// Knowledge graph, agents, retrieval and maintenance behind one handle.
pub struct Engine {
    graph: Arc<KnowledgeGraph>,
    /// Held for a whole ingest call; agents see units in stream order.
    agents: Mutex<Vec<Box<dyn IngestionAgent>>>,
    retrieval: RetrievalEngine,
    observer: RwLock<Option<Arc<dyn TransitionObserver>>>,
    next_sequence: AtomicU64,
    config: EngineConfig,
}

impl Engine {
    /// Build an engine with the molecular and semantic agents.
    ///
    /// Fails with [`crate::Error::InvalidConfiguration`] if any setting is
    /// out of range.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let policy = config.build_policy()?;
        let agents: Vec<Box<dyn IngestionAgent>> = vec![
            Box::new(MolecularAgent::new(config.agents.clone())),
            Box::new(SemanticAgent::new(config.agents.clone())),
        ];

        info!(
            thresholds = ?policy.thresholds(),
            overflow = ?policy.overflow(),
            accumulation = ?config.retrieval.accumulation,
            "engine configured"
        );

        Ok(Self {
            graph: Arc::new(KnowledgeGraph::new(policy, clock)),
            agents: Mutex::new(agents),
            retrieval: RetrievalEngine::new(config.retrieval.clone()),
            observer: RwLock::new(None),
            next_sequence: AtomicU64::new(0),
            config,
        })
    }

    pub fn graph(&self) -> &Arc<KnowledgeGraph> {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register one more agent. It sees units from the next ingest call on.
    pub fn add_agent(&self, agent: Box<dyn IngestionAgent>) {
        self.agents.lock().push(agent);
    }

    /// Receive every tier transition from now on.
    pub fn set_observer(&self, observer: Arc<dyn TransitionObserver>) {
        *self.observer.write() = Some(observer);
    }

    /// Hand every unit to every agent. Agents run concurrently, each over
    /// the whole sequence in order. Units an agent cannot ingest are skipped.
    pub fn ingest<I, T>(&self, units: I) -> IngestReport
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let units: Vec<TextUnit> = units
            .into_iter()
            .map(|raw| {
                let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
                TextUnit::new(sequence, raw.as_ref())
            })
            .collect();

        let mut agents = self.agents.lock();
        let graph = self.graph.as_ref();
        let units = units.as_slice();

        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = agents
                .iter_mut()
                .map(|agent| s.spawn(move || run_agent(&mut **agent, graph, units)))
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        let mut report = IngestReport {
            units: units.len(),
            ..IngestReport::default()
        };
        for result in results {
            match result {
                Ok((agent_report, transitions)) => {
                    report.tier_transitions += transitions.len();
                    self.notify(&transitions);
                    report.agents.push(agent_report);
                }
                Err(_) => error!("ingestion agent panicked"),
            }
        }

        info!(
            units = report.units,
            concepts_created = report.concepts_created(),
            associations_created = report.associations_created(),
            skipped = report.units_skipped(),
            "ingest complete"
        );
        report
    }

    pub fn ingest_text(&self, text: &str) -> IngestReport {
        self.ingest([text])
    }

    /// Ranked concepts for `text`. Every returned concept is reinforced.
    pub fn query(&self, text: &str) -> Result<Vec<QueryHit>> {
        let retrieval = self.retrieval.query(&self.graph, text)?;
        self.notify(&retrieval.transitions);
        Ok(retrieval.hits)
    }

    /// Run one maintenance cycle now.
    pub fn run_maintenance(&self) -> Result<MaintenanceReport> {
        self.maintain(None)
    }

    fn maintain(&self, stop: Option<&AtomicBool>) -> Result<MaintenanceReport> {
        let report = maintenance::run_cycle(&self.graph, stop)?;
        self.notify(&report.transitions);
        Ok(report)
    }

    /// Run maintenance every `maintenance.interval_secs` until the handle
    /// is stopped. The scheduler does not keep the engine alive.
    pub fn start_maintenance(self: &Arc<Self>) -> Result<SchedulerHandle> {
        let engine: Weak<Self> = Arc::downgrade(self);
        let interval = Duration::from_secs(self.config.maintenance.interval_secs);
        MaintenanceScheduler::start(interval, move |stop| match engine.upgrade() {
            Some(engine) => engine.maintain(Some(stop)),
            None => Ok(MaintenanceReport {
                interrupted: true,
                ..MaintenanceReport::default()
            }),
        })
    }

    /// Serialize the whole graph.
    pub fn snapshot(&self) -> Result<String> {
        self.graph.snapshot().to_json()
    }

    /// Replace the graph with a serialized snapshot.
    pub fn restore(&self, serialized: &str) -> Result<()> {
        self.graph.restore(GraphSnapshot::from_json(serialized)?)
    }

    pub fn stats(&self) -> GraphStats {
        self.graph.stats()
    }

    fn notify(&self, transitions: &[TierTransition]) {
        if transitions.is_empty() {
            return;
        }
        let observer = self.observer.read().clone();
        for transition in transitions {
            debug!(
                concept = %transition.concept_id.short(),
                from = %transition.from,
                to = %transition.to,
                cause = ?transition.cause,
                "tier transition"
            );
            if let Some(observer) = &observer {
                observer.on_transition(transition);
            }
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("graph", &self.graph)
            .field("agents", &self.agents.lock().len())
            .finish()
    }
}
