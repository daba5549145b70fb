//! End-to-end behaviour of the engine through its public API.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::Duration;
use knowledge_core::{
    AgentConfig, AssociationKey, AssociationType, ConceptId, ConceptKind, Engine, EngineConfig,
    Error, MolecularAgent,
};
use memory_rules::{CapacityConfig, ManualClock, PolicyConfig, Tier, TierThresholds};
use pretty_assertions::assert_eq;

fn engine_with(config: EngineConfig) -> (Engine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_epoch());
    let engine = Engine::with_clock(config, clock.clone()).unwrap();
    (engine, clock)
}

fn engine() -> (Engine, Arc<ManualClock>) {
    engine_with(EngineConfig::default())
}

fn strengths(engine: &Engine) -> HashMap<ConceptId, f64> {
    let mut strengths = HashMap::new();
    engine.graph().scan(|c| {
        strengths.insert(c.id, c.strength());
    });
    strengths
}

#[test]
fn test_two_sentence_scenario() {
    let (engine, _) = engine();
    engine.ingest(["The cat sat.", "The cat slept."]);

    let mut sentences = 0;
    let mut tokens = HashSet::new();
    engine.graph().scan(|c| match c.kind {
        ConceptKind::Sentence => sentences += 1,
        _ => {
            tokens.insert(c.content.clone());
        }
    });
    assert_eq!(sentences, 2);
    assert!(tokens.len() >= 4);
    for token in ["the", "cat", "sat", "slept"] {
        assert!(tokens.contains(token), "missing token {}", token);
    }

    let first = ConceptId::from_content("The cat sat.");
    let second = ConceptId::from_content("The cat slept.");
    let stats = engine.stats();
    assert_eq!(stats.associations_by_type[&AssociationType::Temporal], 1);
    assert!(engine
        .graph()
        .associations()
        .get(&AssociationKey::new(first, second, AssociationType::Temporal))
        .is_ok());

    let hits = engine.query("cat").unwrap();
    let contents: Vec<&str> = hits.iter().map(|h| h.content.as_str()).collect();

    assert_eq!(contents[0], "cat");
    let top_sentences: HashSet<&str> = contents[1..3].iter().copied().collect();
    assert_eq!(
        top_sentences,
        HashSet::from(["The cat sat.", "The cat slept."])
    );
    assert_eq!(contents[3], "the");
    let tail: HashSet<&str> = contents[4..].iter().copied().collect();
    assert_eq!(tail, HashSet::from(["sat", "slept"]));

    // Seed 1.0 plus two sentence paths of 0.25 each.
    assert!((hits[0].score - 1.5).abs() < 1e-9);
    // Seed 1.0, 0.25 from the token and 0.1 over the temporal edge.
    assert!((hits[1].score - 1.35).abs() < 1e-9);
    assert!((hits[2].score - 1.35).abs() < 1e-9);
}

fn ranked(engine: &Engine, query: &str) -> Vec<ConceptId> {
    engine.query(query).unwrap().iter().map(|h| h.concept_id).collect()
}

#[test]
fn test_cat_ranking_survives_repeat_query() {
    let (engine, _) = engine();
    engine.ingest(["The cat sat.", "The cat slept."]);

    assert_eq!(ranked(&engine, "cat"), ranked(&engine, "cat"));
}

#[test]
fn test_ranking_is_stable_without_tier_crossings() {
    // Thresholds out of reach: no query can move a concept between tiers.
    let config = EngineConfig {
        policy: PolicyConfig {
            thresholds: TierThresholds {
                short_term: 5.0,
                medium_term: 6.0,
                long_term: 7.0,
                core: 8.0,
            },
            ..PolicyConfig::default()
        },
        ..EngineConfig::default()
    };
    let (engine, _) = engine_with(config);
    engine.ingest(["apple berry.", "apple."]);

    let first = engine.query("apple berry").unwrap();
    let second = engine.query("apple berry").unwrap();

    let first_order: Vec<ConceptId> = first.iter().map(|h| h.concept_id).collect();
    let second_order: Vec<ConceptId> = second.iter().map(|h| h.concept_id).collect();
    assert_eq!(first_order, second_order);
    assert!(first.iter().chain(&second).all(|h| h.tier == Tier::Ephemeral));
    for (a, b) in first.iter().zip(&second) {
        assert!((a.score - b.score).abs() < 1e-9);
    }
}

#[test]
fn test_tier_crossing_reorders_repeat_query() {
    let (engine, _) = engine();
    engine.ingest(["apple berry.", "apple."]);

    let both = ConceptId::from_content("apple berry.");
    let apple = ConceptId::from_content("apple");
    let berry = ConceptId::from_content("berry");
    let short = ConceptId::from_content("apple.");

    // short: 0.5 seed + 0.1 temporal + 0.125 from apple = 0.725 < berry 0.75.
    assert_eq!(ranked(&engine, "apple berry"), vec![both, apple, berry, short]);

    // The first query lifted "apple." into ShortTerm while "berry" stayed
    // Ephemeral, and the larger memory boost puts it ahead.
    let second = engine.query("apple berry").unwrap();
    let order: Vec<ConceptId> = second.iter().map(|h| h.concept_id).collect();
    assert_eq!(order, vec![both, apple, short, berry]);
    assert_eq!(second[2].tier, Tier::ShortTerm);
    assert_eq!(second[3].tier, Tier::Ephemeral);
}

#[test]
fn test_ephemeral_to_core_then_no_decay() {
    let (engine, clock) = engine();
    let graph = engine.graph();
    let id = graph.upsert("remember", ConceptKind::Token, 0.1, None).unwrap().id;
    assert_eq!(graph.tier_of(id), Some(Tier::Ephemeral));

    let mut reinforcements = 0;
    while graph.tier_of(id) != Some(Tier::Core) {
        graph.reinforce(id, 1.0).unwrap();
        reinforcements += 1;
        assert!(reinforcements < 100, "never reached Core");
    }
    let strength = graph.get(id).unwrap().strength();

    clock.advance(Duration::days(365));
    engine.run_maintenance().unwrap();

    let concept = graph.get(id).unwrap();
    assert_eq!(concept.tier(), Tier::Core);
    assert_eq!(concept.strength(), strength);
}

#[test]
fn test_decay_is_monotonic() {
    let (engine, clock) = engine();
    engine.ingest(["The cat sat.", "The cat slept."]);
    let before = strengths(&engine);

    clock.advance(Duration::hours(1));
    let report = engine.run_maintenance().unwrap();
    let after = strengths(&engine);

    assert_eq!(report.concepts_decayed, before.len());
    for (id, strength) in &after {
        assert!(strength < &before[id], "{} did not decay", id);
    }
}

#[test]
fn test_capacity_enforced_after_maintenance() {
    let config = EngineConfig {
        capacity: CapacityConfig {
            ephemeral: 3,
            ..CapacityConfig::default()
        },
        ..EngineConfig::default()
    };
    let (engine, _) = engine_with(config.clone());
    engine.ingest(["alpha beta gamma delta epsilon zeta eta theta"]);

    engine.run_maintenance().unwrap();

    let stats = engine.stats();
    for tier in Tier::ALL {
        if let Some(limit) = config.capacity.limit(tier) {
            assert!(stats.concepts_by_tier[&tier] <= limit, "{} over capacity", tier);
        }
    }
    assert_eq!(stats.concepts_by_tier[&Tier::Ephemeral], 3);
}

#[test]
fn test_second_maintenance_cycle_is_noop() {
    let (engine, clock) = engine();
    engine.ingest(["The cat sat.", "The cat slept.", "A dog barked!"]);
    engine.query("cat").unwrap();
    clock.advance(Duration::days(2));

    engine.run_maintenance().unwrap();
    let graph_after_first = engine.graph().snapshot();

    let second = engine.run_maintenance().unwrap();
    let graph_after_second = engine.graph().snapshot();

    assert!(second.is_noop(), "second cycle changed the graph: {:?}", second);
    assert_eq!(graph_after_first.concepts, graph_after_second.concepts);
    assert_eq!(graph_after_first.associations, graph_after_second.associations);
}

#[test]
fn test_snapshot_restore_fidelity() {
    let (original, _) = engine();
    original.ingest(["The cat sat.", "The cat slept.", "Alice met NASA engineers!"]);
    original.query("cat").unwrap();
    let serialized = original.snapshot().unwrap();

    let (restored, _) = engine();
    restored.restore(&serialized).unwrap();

    let before = original.graph().snapshot();
    let after = restored.graph().snapshot();
    assert_eq!(after.concepts, before.concepts);
    assert_eq!(after.associations, before.associations);
    assert_eq!(restored.stats(), original.stats());

    assert_eq!(ranked(&restored, "cat"), ranked(&original, "cat"));
}

#[test]
fn test_restore_rejects_garbage() {
    let (engine, _) = engine();
    engine.ingest(["The cat sat."]);

    assert!(matches!(engine.restore("{not json"), Err(Error::Serialization(_))));
    // The graph is untouched.
    assert_eq!(engine.stats().concepts, 4);
}

#[test]
fn test_concurrent_identical_ingestion() {
    let (engine, _) = engine();
    engine.add_agent(Box::new(MolecularAgent::new(AgentConfig::default())));

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| engine.ingest(["Shared words here."]));
        }
    });

    // shared, words, here and the sentence.
    assert_eq!(engine.stats().concepts, 4);
    let sentence = engine
        .graph()
        .get(ConceptId::from_content("Shared words here."))
        .unwrap();
    assert_eq!(sentence.access_frequency(), 3);
    let token = engine.graph().get(ConceptId::from_content("words")).unwrap();
    // Two molecular agents, four units: one creation, seven reinforcements.
    assert_eq!(token.access_frequency(), 7);
}

#[test]
fn test_maintenance_races_ingestion() {
    let config = EngineConfig {
        capacity: CapacityConfig {
            ephemeral: 2,
            ..CapacityConfig::default()
        },
        agents: AgentConfig {
            token_wait_ms: 5,
            ..AgentConfig::default()
        },
        ..EngineConfig::default()
    };
    let (engine, _) = engine_with(config);
    let done = AtomicBool::new(false);

    let (reports, cycles) = thread::scope(|s| {
        let maintainer = s.spawn(|| {
            let mut cycles = 0;
            loop {
                engine.run_maintenance().unwrap();
                cycles += 1;
                if done.load(Ordering::Acquire) {
                    return cycles;
                }
            }
        });

        let reports: Vec<_> = (0..20)
            .map(|round| {
                engine.ingest([
                    format!("Round {} the cat sat.", round),
                    format!("The dog barked {} times!", round),
                ])
            })
            .collect();
        done.store(true, Ordering::Release);
        (reports, maintainer.join().unwrap())
    });

    assert!(cycles >= 1);
    for report in &reports {
        // Both agents finished every unit; none panicked or gave up.
        assert_eq!(report.agents.len(), 2);
        assert_eq!(report.units_skipped(), 0);
    }

    let snapshot = engine.graph().snapshot();
    for association in &snapshot.associations {
        assert!(engine.graph().contains(association.key.source), "dangling {}", association.key);
        assert!(engine.graph().contains(association.key.target), "dangling {}", association.key);
    }

    engine.run_maintenance().unwrap();
    assert!(engine.stats().concepts_by_tier[&Tier::Ephemeral] <= 2);
}

#[test]
fn test_edge_dedup() {
    let (engine, _) = engine();
    let graph = engine.graph();
    let a = graph.upsert("a", ConceptKind::Token, 0.2, None).unwrap().id;
    let b = graph.upsert("b", ConceptKind::Token, 0.2, None).unwrap().id;

    let first = graph.link(a, b, AssociationType::Semantic, 0.3).unwrap();
    let second = graph.link(b, a, AssociationType::Semantic, 0.3).unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert!(second.strength > first.strength);
    assert_eq!(engine.stats().associations, 1);
}

#[test]
fn test_malformed_units_skipped() {
    let (engine, _) = engine();
    let units: [&[u8]; 5] = [b"The cat sat.", b"", b"\xff\xfe", b"   ", b"The cat slept."];

    let report = engine.ingest(units);

    assert_eq!(report.units, 5);
    assert_eq!(report.units_skipped(), 3);
    let temporal = engine.stats().associations_by_type[&AssociationType::Temporal];
    assert_eq!(temporal, 1);
}

#[test]
fn test_invalid_config_refuses_to_start() {
    let config = EngineConfig::from_toml_str(
        r#"
        [policy.thresholds]
        short_term = 0.3
        medium_term = 0.2
        "#,
    )
    .unwrap();

    assert!(matches!(
        Engine::with_clock(config, Arc::new(ManualClock::at_epoch())),
        Err(Error::InvalidConfiguration(_))
    ));

    let config = EngineConfig::from_toml_str("[policy]\ndecay_rate = 0.0\n").unwrap();
    assert!(Engine::new(config).is_err());
}
