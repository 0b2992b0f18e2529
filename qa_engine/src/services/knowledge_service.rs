use crate::entity_resolution::{EntityResolver, ResolverConfig};
use crate::errors::EngineResult;
use crate::kg::{KnowledgeGraph, SearchCache};
use crate::models::{CandidateItem, EntitySet, LabeledGroups, Path, PhraseVariant, Solution};
use crate::path_search::{
    ApplyConfig, FinderConfig, PathApplier, PathFinder, PathScorer, ScoringConfig,
};
use questor_models::PathRecord;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub resolver: ResolverConfig,
    pub finder: FinderConfig,
    pub scoring: ScoringConfig,
    pub apply: ApplyConfig,
    /// Best-path records produced per learned question/answer pair.
    pub records_limit: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            finder: FinderConfig::default(),
            scoring: ScoringConfig::default(),
            apply: ApplyConfig::default(),
            records_limit: 10,
        }
    }
}

/// Knowledge learned from one question/answer pair: every scored path
/// plus the serialized records handed to the persistence collaborator.
#[derive(Debug, Clone)]
pub struct LearnedKnowledge {
    pub solutions: Vec<Solution>,
    pub records: Vec<PathRecord>,
}

/// Facade wiring resolver, finder, scorer and applier together for the
/// three primary flows: learning a path shape from a question/answer
/// pair, answering through learned records, and reference-free
/// answering.
pub struct KnowledgeService {
    resolver: EntityResolver,
    finder: PathFinder,
    scorer: PathScorer,
    applier: PathApplier,
    records_limit: usize,
}

impl KnowledgeService {
    pub fn new(backend: Arc<dyn KnowledgeGraph>, cache: Arc<SearchCache>) -> Self {
        Self::with_config(backend, cache, ServiceConfig::default())
    }

    pub fn with_config(
        backend: Arc<dyn KnowledgeGraph>,
        cache: Arc<SearchCache>,
        config: ServiceConfig,
    ) -> Self {
        let resolver = EntityResolver::new(backend.clone(), cache, config.resolver);
        let finder = PathFinder::new(backend.clone(), config.finder);
        let scorer = PathScorer::new(config.scoring);
        let applier = PathApplier::new(backend, config.apply);
        Self {
            resolver,
            finder,
            scorer,
            applier,
            records_limit: config.records_limit.max(1),
        }
    }

    /// Propagate an external abort signal into the path search.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.finder = self.finder.with_cancellation(cancel);
        self
    }

    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    pub fn applier(&self) -> &PathApplier {
        &self.applier
    }

    /// Learn path shapes connecting a question's entities to an
    /// answer's entities. An empty outcome is valid "no knowledge
    /// found", not an error.
    pub async fn learn(
        &self,
        question_phrases: &[(String, Vec<PhraseVariant>)],
        answer_phrases: &[(String, Vec<PhraseVariant>)],
    ) -> EngineResult<LearnedKnowledge> {
        let question_sets = self.resolver.resolve_groups(question_phrases).await?;
        let answer_sets = self.resolver.resolve_groups(answer_phrases).await?;
        self.learn_sets(question_sets, answer_sets).await
    }

    /// Same flow for already-resolved entity sets.
    pub async fn learn_sets(
        &self,
        question_sets: Vec<EntitySet>,
        answer_sets: Vec<EntitySet>,
    ) -> EngineResult<LearnedKnowledge> {
        let mut groups = LabeledGroups::new();
        groups.insert("question".to_string(), question_sets);
        groups.insert("answer".to_string(), answer_sets);

        let solutions = self
            .finder
            .connect(&groups, &[("question".to_string(), "answer".to_string())])
            .await?;
        if solutions.is_empty() {
            info!("Connection at graph wasn't found");
            return Ok(LearnedKnowledge {
                solutions: Vec::new(),
                records: Vec::new(),
            });
        }
        info!("{} connections found", solutions.len());

        let scored = self.scorer.evaluate_solutions(&solutions);
        let start = scored.len().saturating_sub(self.records_limit);
        let records = scored[start..]
            .iter()
            .map(|solution| solution.path.to_record())
            .collect();
        Ok(LearnedKnowledge {
            solutions: scored,
            records,
        })
    }

    /// Apply learned records to every candidate item and vote answers
    /// by frequency. Backend failures cost votes, never the call.
    pub async fn answer_with_reference(
        &self,
        records: &[PathRecord],
        items: &[CandidateItem],
    ) -> HashMap<String, usize> {
        let mut votes: HashMap<String, usize> = HashMap::new();
        for item in items {
            for record in records {
                let path = Path::from_record(record);
                let (_, answers) = self.applier.apply(&path, &item.id).await;
                for answer in answers {
                    *votes.entry(answer).or_insert(0) += 1;
                }
            }
        }
        votes
    }

    /// Reference-free answering: every entity set gets a synthetic
    /// label and all label pairs are searched.
    pub async fn answer_blind(&self, sets: Vec<EntitySet>) -> EngineResult<Vec<Solution>> {
        let mut groups = LabeledGroups::new();
        let mut labels = Vec::new();
        for (idx, set) in sets.into_iter().enumerate() {
            let label = format!("item{}", idx);
            labels.push(label.clone());
            groups.insert(label, vec![set]);
        }
        let mut pairs = Vec::new();
        for i in 0..labels.len() {
            for j in (i + 1)..labels.len() {
                pairs.push((labels[i].clone(), labels[j].clone()));
            }
        }
        let solutions = self.finder.connect(&groups, &pairs).await?;
        Ok(self.scorer.evaluate_solutions(&solutions))
    }

    /// Substitute pairs for a learned shape, falling back to strict
    /// chaining when the free-variable form fails. Returns whether the
    /// strict fallback was used.
    pub async fn mine_substitutes(
        &self,
        path: &Path,
    ) -> (bool, Option<usize>, Vec<(String, String)>) {
        let (count, pairs) = self.applier.substitutes(path, false).await;
        if count.is_some() {
            return (false, count, pairs);
        }
        let (count, pairs) = self.applier.substitutes(path, true).await;
        (true, count, pairs)
    }
}
