use crate::errors::EngineResult;
use crate::kg::KnowledgeGraph;
use crate::models::{CandidateItem, Direction, LabeledGroups, PairKey, Path};
use questor_models::{GraphPattern, PatternBindings, PatternTerm, TriplePattern};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct FinderConfig {
    /// Exclusive upper bound on searched path lengths; the default 5
    /// searches lengths 1 through 4.
    pub max_path_length: usize,
    /// Seed timeout for the first pattern batch, in seconds.
    pub default_timeout_secs: f64,
    /// Retry failed batch members one by one before skipping them.
    pub retry_failed_single: bool,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            max_path_length: 5,
            default_timeout_secs: 10.0,
            retry_failed_single: false,
        }
    }
}

/// Search state of one label pair.
///
/// A pair found at length M keeps searching M+1 (longer deductive paths
/// are still plausible there) and closes beyond that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairState {
    Unsolved,
    SolvedPending(usize),
    SolvedClosed,
}

/// One (candidate pair x direction vector) combination queued for a
/// length.
struct SearchJob {
    pair: PairKey,
    item_from: CandidateItem,
    item_to: CandidateItem,
    directions: Vec<Direction>,
    pattern: GraphPattern,
}

/// All direction-bit vectors of the given hop count.
pub fn direction_vectors(length: usize) -> Vec<Vec<Direction>> {
    (0..1usize << length)
        .map(|bits| {
            (0..length)
                .map(|hop| Direction::from_bit((bits >> hop & 1) as u8))
                .collect()
        })
        .collect()
}

/// Build the L-hop pattern anchored at the two candidate items, with
/// each hop's subject/object swapped according to its direction bit.
pub fn build_pattern(from_id: &str, to_id: &str, directions: &[Direction]) -> GraphPattern {
    let length = directions.len();
    let mut select = Vec::new();
    for idx in 1..=length {
        select.push(format!("prop{}", idx));
        if idx != length {
            select.push(format!("item{}", idx + 1));
        }
    }
    let mut triples = Vec::new();
    for idx in 1..=length {
        let subject = if idx == 1 {
            PatternTerm::Item(from_id.to_string())
        } else {
            PatternTerm::variable(format!("item{}", idx))
        };
        let object = if idx == length {
            PatternTerm::Item(to_id.to_string())
        } else {
            PatternTerm::variable(format!("item{}", idx + 1))
        };
        let predicate = PatternTerm::variable(format!("prop{}", idx));
        let (subject, object) = match directions[idx - 1] {
            Direction::Forward => (subject, object),
            Direction::Reverse => (object, subject),
        };
        triples.push(TriplePattern {
            subject,
            predicate,
            object,
        });
    }
    GraphPattern {
        triples,
        select,
        labeled: Vec::new(),
        limit: None,
    }
}

/// Iterative-deepening search for minimal relational paths between
/// every requested pair of entity groups.
pub struct PathFinder {
    backend: Arc<dyn KnowledgeGraph>,
    config: FinderConfig,
    cancel: CancellationToken,
}

impl PathFinder {
    pub fn new(backend: Arc<dyn KnowledgeGraph>, config: FinderConfig) -> Self {
        Self {
            backend,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token; cancelling it stops further query
    /// dispatch and returns whatever accumulated.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn connect(
        &self,
        groups: &LabeledGroups,
        label_pairs: &[(String, String)],
    ) -> EngineResult<HashMap<PairKey, Vec<Path>>> {
        // Entities that lost every item to strict filtering contribute
        // nothing.
        let items_by_label: HashMap<&str, Vec<CandidateItem>> = groups
            .iter()
            .map(|(label, sets)| {
                let items: Vec<CandidateItem> = sets
                    .iter()
                    .flat_map(|set| set.items())
                    .cloned()
                    .collect();
                (label.as_str(), items)
            })
            .collect();

        let mut pairs: Vec<(PairKey, String, String)> = Vec::new();
        let mut states: HashMap<PairKey, PairState> = HashMap::new();
        for (from, to) in label_pairs {
            let key = PairKey::new(from.clone(), to.clone());
            if states.insert(key.clone(), PairState::Unsolved).is_none() {
                pairs.push((key, from.clone(), to.clone()));
            }
        }

        let mut solutions: HashMap<PairKey, Vec<Path>> = HashMap::new();
        let mut timeout: Option<f64> = None;

        for length in 1..self.config.max_path_length {
            if self.cancel.is_cancelled() {
                info!(
                    "Search cancelled before length {}; returning accumulated solutions",
                    length
                );
                break;
            }
            if let Some(current) = timeout {
                timeout = Some((current + 5.0).powi(2));
            }
            let started = Instant::now();

            let mut jobs: Vec<SearchJob> = Vec::new();
            for (key, from_label, to_label) in &pairs {
                match states.get(key).copied().unwrap_or(PairState::Unsolved) {
                    PairState::SolvedClosed => continue,
                    PairState::SolvedPending(found) if length > found + 1 => {
                        debug!("Solution found for {}; no further search", key);
                        states.insert(key.clone(), PairState::SolvedClosed);
                        continue;
                    }
                    PairState::SolvedPending(_) => {
                        debug!("Solution found for {}; last level attempt", key);
                    }
                    PairState::Unsolved => {}
                }
                debug!("Length {}, labels {} -> {}", length, from_label, to_label);
                let (Some(from_items), Some(to_items)) = (
                    items_by_label.get(from_label.as_str()),
                    items_by_label.get(to_label.as_str()),
                ) else {
                    continue;
                };
                for item_from in from_items {
                    for item_to in to_items {
                        for directions in direction_vectors(length) {
                            let pattern =
                                build_pattern(&item_from.id, &item_to.id, &directions);
                            jobs.push(SearchJob {
                                pair: key.clone(),
                                item_from: item_from.clone(),
                                item_to: item_to.clone(),
                                directions,
                                pattern,
                            });
                        }
                    }
                }
            }
            if jobs.is_empty() {
                continue;
            }
            debug!(
                "{} pattern queries at length {} (timeout {:?})",
                jobs.len(),
                length,
                timeout
            );

            let patterns: Vec<GraphPattern> =
                jobs.iter().map(|job| job.pattern.clone()).collect();
            let outcome = match self.backend.execute_pattern_batch(&patterns, timeout).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!("Batch dispatch failed at length {}: {}", length, err);
                    continue;
                }
            };
            timeout = Some(outcome.avg_latency_secs);

            let mut found: Vec<PairKey> = Vec::new();
            for (job, response) in jobs.into_iter().zip(outcome.responses.into_iter()) {
                let response = match response {
                    Some(response) => response,
                    None if self.config.retry_failed_single
                        && !self.cancel.is_cancelled() =>
                    {
                        match self.backend.execute_pattern(&job.pattern).await {
                            Ok(response) => response,
                            Err(err) => {
                                debug!(
                                    "Combination {} -> {} skipped: {}",
                                    job.item_from.id, job.item_to.id, err
                                );
                                continue;
                            }
                        }
                    }
                    None => {
                        debug!(
                            "No response for combination {} -> {}",
                            job.item_from.id, job.item_to.id
                        );
                        continue;
                    }
                };
                let paths = Self::filter_paths(Self::paths_from_bindings(&job, &response));
                if paths.is_empty() {
                    continue;
                }
                debug!(
                    "{} paths at length {} for {}",
                    paths.len(),
                    length,
                    job.pair
                );
                found.push(job.pair.clone());
                solutions.entry(job.pair).or_default().extend(paths);
            }
            for key in found {
                if matches!(states.get(&key), Some(PairState::Unsolved)) {
                    states.insert(key, PairState::SolvedPending(length));
                }
            }
            debug!(
                "Length {} processed in {:.3}s",
                length,
                started.elapsed().as_secs_f64()
            );
        }
        Ok(solutions)
    }

    /// Rows become token chains in projection order; incomplete rows
    /// are dropped.
    fn paths_from_bindings(job: &SearchJob, bindings: &PatternBindings) -> Vec<Path> {
        let mut paths = Vec::new();
        for row in &bindings.rows {
            let mut tokens = Vec::with_capacity(job.pattern.select.len());
            let mut complete = true;
            for var in &job.pattern.select {
                match row.get(var) {
                    Some(value) => tokens.push(value.clone()),
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                continue;
            }
            paths.push(Path::new(
                tokens,
                job.directions.clone(),
                Some(job.item_from.clone()),
                Some(job.item_to.clone()),
            ));
        }
        paths
    }

    fn filter_paths(paths: Vec<Path>) -> Vec<Path> {
        paths
            .into_iter()
            .filter(|path| {
                if path.is_symmetric() {
                    debug!("Filtered symmetric path {}", path);
                    return false;
                }
                if path.is_property_chain() {
                    debug!("Filtered property-property path {}", path);
                    return false;
                }
                true
            })
            .collect()
    }
}
