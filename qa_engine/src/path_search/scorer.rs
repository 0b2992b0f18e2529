use crate::models::{PairKey, Path, Solution};
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Base of the length penalty: a path of length L starts at
    /// `1 / base^L`.
    pub length_base: f64,
    /// Offset added to the average sibling similarity before dividing.
    pub similarity_offset: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            length_base: 3.0,
            similarity_offset: 1.0,
        }
    }
}

/// Ranks discovered paths per concrete endpoint pair by length and
/// structural distinctiveness. Output is ascending; callers take the
/// tail as top candidates.
pub struct PathScorer {
    config: ScoringConfig,
}

impl PathScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn evaluate_solutions(
        &self,
        solutions: &HashMap<PairKey, Vec<Path>>,
    ) -> Vec<Solution> {
        // Endpoint grouping ignores which label pair produced a path;
        // unbound paths cannot be grouped and are skipped.
        let paths: Vec<&Path> = solutions.values().flatten().collect();
        let mut endpoints: Vec<(String, String)> = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        for path in &paths {
            let (Some(from), Some(to)) = (&path.item_from, &path.item_to) else {
                continue;
            };
            let key = (from.id.clone(), to.id.clone());
            if seen.insert(key.clone()) {
                endpoints.push(key);
            }
        }

        let mut evaluated: Vec<Solution> = Vec::new();
        for (from_id, to_id) in endpoints {
            let group: Vec<&Path> = paths
                .iter()
                .copied()
                .filter(|path| {
                    path.item_from.as_ref().map(|item| item.id.as_str()) == Some(&from_id)
                        && path.item_to.as_ref().map(|item| item.id.as_str()) == Some(&to_id)
                })
                .collect();
            let Some(min_length) = group.iter().map(|path| path.length).min() else {
                continue;
            };
            let minimal: Vec<&Path> = group
                .into_iter()
                .filter(|path| path.length == min_length)
                .collect();
            let base = 1.0 / self.config.length_base.powi(min_length as i32);

            if minimal.len() == 1 {
                evaluated.push(Solution {
                    score: base,
                    path: minimal[0].clone(),
                });
                continue;
            }
            // Several minimal explanations: penalize the generic ones.
            for (idx, path) in minimal.iter().enumerate() {
                let others: Vec<&Path> = minimal
                    .iter()
                    .enumerate()
                    .filter(|(other_idx, _)| *other_idx != idx)
                    .map(|(_, other)| *other)
                    .collect();
                let similarity = path.similarity_to_others(&others);
                let average = if similarity.is_empty() {
                    0.0
                } else {
                    similarity.iter().sum::<usize>() as f64 / similarity.len() as f64
                };
                evaluated.push(Solution {
                    score: base / (average + self.config.similarity_offset),
                    path: (*path).clone(),
                });
            }
        }
        evaluated.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(Ordering::Equal)
        });
        evaluated
    }
}
