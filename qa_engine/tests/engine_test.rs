//! End-to-end engine tests against an in-memory knowledge-graph
//! fixture: resolution, path search, scoring, application and the
//! failure modes that must stay non-fatal.

use async_trait::async_trait;
use qa_engine::errors::{EngineError, EngineResult};
use qa_engine::kg::{BatchOutcome, EntityKind, KnowledgeGraph, SearchCache};
use qa_engine::models::{Entity, EntitySet, ItemsBatch, PhraseVariant};
use qa_engine::services::KnowledgeService;
use questor_models::{GraphPattern, ItemData, PatternBindings, PatternTerm, SearchHit};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("qa_engine=debug")
        .try_init();
}

/// In-memory graph: triples plus English labels. Single-hop patterns
/// are matched exactly; longer patterns return no rows, which drives
/// the iterative deepening the same way a silent remote graph would.
#[derive(Default)]
struct GraphFixture {
    facts: Vec<(String, String, String)>,
    labels: HashMap<String, String>,
    search: HashMap<String, Vec<SearchHit>>,
    /// Hop counts of every executed pattern, batched or single.
    queried_lengths: Mutex<Vec<usize>>,
    pattern_calls: AtomicUsize,
    fail_all: bool,
}

impl GraphFixture {
    fn new() -> Self {
        let mut fixture = Self::default();
        fixture.add_fact("Q152057", "P159", "Q727");
        fixture.label("Q152057", "Heineken");
        fixture.label("Q727", "Amsterdam");
        fixture.searchable("heineken", "Q152057", "Heineken");
        fixture.searchable("amsterdam", "Q727", "Amsterdam");
        fixture
    }

    fn add_fact(&mut self, subject: &str, property: &str, object: &str) {
        self.facts.push((
            subject.to_string(),
            property.to_string(),
            object.to_string(),
        ));
    }

    fn label(&mut self, id: &str, label: &str) {
        self.labels.insert(id.to_string(), label.to_string());
    }

    fn searchable(&mut self, text: &str, id: &str, label: &str) {
        self.search.insert(
            text.to_string(),
            vec![SearchHit {
                id: id.to_string(),
                label: Some(label.to_string()),
                description: None,
            }],
        );
    }

    fn label_of(&self, id: &str) -> String {
        self.labels
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn unify_node(term: &PatternTerm, id: &str, row: &mut HashMap<String, String>) -> bool {
        match term {
            PatternTerm::Item(bound) => bound == id,
            PatternTerm::Variable(name) => {
                row.insert(name.clone(), id.to_string());
                true
            }
            PatternTerm::Property(_) => false,
        }
    }

    fn unify_predicate(
        term: &PatternTerm,
        property: &str,
        row: &mut HashMap<String, String>,
    ) -> bool {
        match term {
            PatternTerm::Property(bound) => bound == property,
            PatternTerm::Variable(name) => {
                row.insert(name.clone(), property.to_string());
                true
            }
            PatternTerm::Item(_) => false,
        }
    }

    fn run_pattern(&self, pattern: &GraphPattern) -> PatternBindings {
        let mut variables = pattern.select.clone();
        for var in &pattern.labeled {
            variables.push(format!("{}Label", var));
        }
        let mut rows = Vec::new();
        if pattern.triples.len() == 1 {
            let triple = &pattern.triples[0];
            for (subject, property, object) in &self.facts {
                let mut row = HashMap::new();
                if !Self::unify_node(&triple.subject, subject, &mut row) {
                    continue;
                }
                if !Self::unify_predicate(&triple.predicate, property, &mut row) {
                    continue;
                }
                if !Self::unify_node(&triple.object, object, &mut row) {
                    continue;
                }
                for var in &pattern.labeled {
                    if let Some(id) = row.get(var).cloned() {
                        row.insert(format!("{}Label", var), self.label_of(&id));
                    }
                }
                rows.push(row);
            }
        }
        if let Some(limit) = pattern.limit {
            rows.truncate(limit);
        }
        PatternBindings { variables, rows }
    }

    fn record(&self, pattern: &GraphPattern) {
        self.pattern_calls.fetch_add(1, Ordering::SeqCst);
        self.queried_lengths
            .lock()
            .unwrap()
            .push(pattern.triples.len());
    }

    fn max_queried_length(&self) -> usize {
        self.queried_lengths
            .lock()
            .unwrap()
            .iter()
            .copied()
            .max()
            .unwrap_or(0)
    }
}

#[async_trait]
impl KnowledgeGraph for GraphFixture {
    async fn search_by_label(
        &self,
        text: &str,
        _kind: EntityKind,
    ) -> EngineResult<Vec<SearchHit>> {
        Ok(self.search.get(text).cloned().unwrap_or_default())
    }

    async fn search_by_label_batch(
        &self,
        texts: &[String],
    ) -> EngineResult<HashMap<String, Option<Vec<SearchHit>>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let hits = self.search.get(text).filter(|hits| !hits.is_empty()).cloned();
                (text.clone(), hits)
            })
            .collect())
    }

    async fn execute_pattern(&self, pattern: &GraphPattern) -> EngineResult<PatternBindings> {
        self.record(pattern);
        if self.fail_all {
            return Err(EngineError::NoResponse("fixture outage".to_string()));
        }
        Ok(self.run_pattern(pattern))
    }

    async fn execute_pattern_batch(
        &self,
        patterns: &[GraphPattern],
        timeout_secs: Option<f64>,
    ) -> EngineResult<BatchOutcome> {
        let responses = patterns
            .iter()
            .map(|pattern| {
                self.record(pattern);
                if self.fail_all {
                    None
                } else {
                    Some(self.run_pattern(pattern))
                }
            })
            .collect();
        Ok(BatchOutcome {
            responses,
            avg_latency_secs: timeout_secs.unwrap_or(0.01).min(0.01),
        })
    }

    async fn fetch_items(&self, ids: &[String]) -> EngineResult<HashMap<String, ItemData>> {
        Ok(ids
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    ItemData {
                        id: id.clone(),
                        label: self.labels.get(id).cloned(),
                        description: None,
                        claims: HashMap::new(),
                    },
                )
            })
            .collect())
    }
}

fn entity(phrase: &str, id: &str, label: &str) -> Entity {
    let batch = ItemsBatch::from_hits(
        PhraseVariant::new(phrase),
        vec![SearchHit {
            id: id.to_string(),
            label: Some(label.to_string()),
            description: None,
        }],
        1,
    )
    .unwrap();
    Entity::new(phrase, vec![batch]).unwrap()
}

fn heineken_sets() -> (Vec<EntitySet>, Vec<EntitySet>) {
    (
        vec![EntitySet::new(vec![entity("heineken", "Q152057", "Heineken")])],
        vec![EntitySet::new(vec![entity("amsterdam", "Q727", "Amsterdam")])],
    )
}

fn service(fixture: Arc<GraphFixture>) -> KnowledgeService {
    KnowledgeService::new(fixture, Arc::new(SearchCache::new()))
}

#[tokio::test]
async fn one_hop_connection_is_found_and_scored() {
    init_tracing();
    let fixture = Arc::new(GraphFixture::new());
    let service = service(fixture.clone());

    let (question, answer) = heineken_sets();
    let learned = service.learn_sets(question, answer).await.unwrap();

    assert_eq!(learned.solutions.len(), 1);
    let best = &learned.solutions[0];
    assert_eq!(best.path.length, 1);
    assert_eq!(best.path.tokens, vec!["P159"]);
    assert!((best.score - 1.0 / 3.0).abs() < 1e-9);

    assert_eq!(learned.records.len(), 1);
    assert_eq!(learned.records[0].tokens, vec!["P159"]);
    assert_eq!(learned.records[0].direction_config, vec![0]);
}

#[tokio::test]
async fn solved_pairs_stop_searching_beyond_one_extra_length() {
    let fixture = Arc::new(GraphFixture::new());
    let service = service(fixture.clone());

    let (question, answer) = heineken_sets();
    service.learn_sets(question, answer).await.unwrap();

    // Found at length 1: length 2 is still attempted, 3 and 4 are not.
    assert_eq!(fixture.max_queried_length(), 2);
}

#[tokio::test]
async fn backend_outage_yields_an_empty_result_not_an_error() {
    let mut fixture = GraphFixture::new();
    fixture.fail_all = true;
    let fixture = Arc::new(fixture);
    let service = service(fixture.clone());

    let (question, answer) = heineken_sets();
    let learned = service.learn_sets(question, answer).await.unwrap();

    assert!(learned.solutions.is_empty());
    assert!(learned.records.is_empty());
    // Every length was attempted; the pair never closed.
    assert_eq!(fixture.max_queried_length(), 4);
}

#[tokio::test]
async fn cancellation_stops_dispatch_and_returns_accumulated_state() {
    let fixture = Arc::new(GraphFixture::new());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let service = KnowledgeService::new(fixture.clone(), Arc::new(SearchCache::new()))
        .with_cancellation(cancel);

    let (question, answer) = heineken_sets();
    let learned = service.learn_sets(question, answer).await.unwrap();

    assert!(learned.solutions.is_empty());
    assert_eq!(fixture.pattern_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn applying_a_learned_path_recovers_the_original_answer() {
    let fixture = Arc::new(GraphFixture::new());
    let service = service(fixture.clone());

    let (question, answer) = heineken_sets();
    let learned = service.learn_sets(question, answer).await.unwrap();
    let path = &learned.solutions.last().unwrap().path;

    let (count, answers) = service.applier().apply(path, "Q152057").await;
    assert_eq!(count, Some(1));
    assert_eq!(answers, vec!["Amsterdam"]);
}

#[tokio::test]
async fn reference_answering_votes_across_items_and_records() {
    let fixture = Arc::new(GraphFixture::new());
    let service = service(fixture.clone());

    let (question, answer) = heineken_sets();
    let learned = service.learn_sets(question, answer).await.unwrap();

    let items: Vec<_> = heineken_sets()
        .0
        .iter()
        .flat_map(|set| set.items())
        .cloned()
        .collect();
    let votes = service
        .answer_with_reference(&learned.records, &items)
        .await;
    assert_eq!(votes.get("Amsterdam"), Some(&1));
}

#[tokio::test]
async fn substitutes_enumerate_every_pair_matching_the_shape() {
    let mut fixture = GraphFixture::new();
    fixture.add_fact("Q154975", "P159", "Q34370");
    fixture.label("Q154975", "Grolsch");
    fixture.label("Q34370", "Enschede");
    let fixture = Arc::new(fixture);
    let service = service(fixture.clone());

    let (question, answer) = heineken_sets();
    let learned = service.learn_sets(question, answer).await.unwrap();
    let path = &learned.solutions.last().unwrap().path;

    let (strict_used, count, pairs) = service.mine_substitutes(path).await;
    assert!(!strict_used);
    assert_eq!(count, Some(2));
    assert!(pairs.contains(&("Heineken".to_string(), "Amsterdam".to_string())));
    assert!(pairs.contains(&("Grolsch".to_string(), "Enschede".to_string())));
}

#[tokio::test]
async fn blind_answering_connects_synthetic_item_groups() {
    let fixture = Arc::new(GraphFixture::new());
    let service = service(fixture.clone());

    let (mut question, mut answer) = heineken_sets();
    let mut sets = Vec::new();
    sets.append(&mut question);
    sets.append(&mut answer);

    let solutions = service.answer_blind(sets).await.unwrap();
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].path.tokens, vec!["P159"]);
}

#[tokio::test]
async fn resolution_feeds_the_search_end_to_end() -> anyhow::Result<()> {
    init_tracing();
    let fixture = Arc::new(GraphFixture::new());
    let service = service(fixture.clone());

    let learned = service
        .learn(
            &[(
                "heineken".to_string(),
                vec![PhraseVariant::new("heineken")],
            )],
            &[(
                "amsterdam".to_string(),
                vec![PhraseVariant::new("amsterdam")],
            )],
        )
        .await?;
    assert_eq!(learned.solutions.len(), 1);
    assert_eq!(learned.solutions[0].path.tokens, vec!["P159"]);
    Ok(())
}
