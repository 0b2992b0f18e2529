use crate::errors::{EngineError, EngineResult};
use crate::kg::KnowledgeGraph;
use crate::models::{is_property_token, Direction, Path};
use questor_models::{GraphPattern, PatternTerm, TriplePattern};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct ApplyConfig {
    /// Answer cap when a path is applied to a bound source.
    pub answers_limit: usize,
    /// Result cap when mining substitute endpoint pairs.
    pub substitutes_limit: usize,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            answers_limit: 5,
            substitutes_limit: 500,
        }
    }
}

/// Skeleton pattern rebuilt from a path shape: hop triples plus the
/// names of the free endpoint variables.
#[derive(Debug)]
struct PatternPlan {
    triples: Vec<TriplePattern>,
    from_var: String,
    to_var: String,
}

impl PatternPlan {
    /// Rebuild a path's pattern with free endpoints.
    ///
    /// Non-strict: only the hop properties are fixed; every item
    /// position is a free variable. Strict: the path's concrete
    /// intermediate items are bound, chaining the endpoints through the
    /// exact recorded nodes.
    fn from_path(path: &Path, strict: bool) -> EngineResult<Self> {
        let canonical: Vec<&str> = path.canonical_tokens();
        if canonical.is_empty() || !is_property_token(canonical[0]) {
            return Err(EngineError::Internal(
                "path carries no applicable property chain".to_string(),
            ));
        }

        let (from_var, to_var) = if strict {
            ("from".to_string(), "to".to_string())
        } else {
            let hops = canonical.iter().filter(|t| is_property_token(t)).count();
            ("item0".to_string(), format!("item{}", 2 * hops))
        };

        let mut triples = Vec::new();
        let mut hop = 0usize;
        for (real_idx, token) in canonical.iter().enumerate() {
            if real_idx % 2 != 0 {
                continue;
            }
            if !is_property_token(token) {
                return Err(EngineError::Internal(format!(
                    "unexpected token '{}' in property position",
                    token
                )));
            }
            let subject_term = if strict {
                if real_idx == 0 {
                    PatternTerm::variable(from_var.clone())
                } else {
                    PatternTerm::Item(canonical[real_idx - 1].to_string())
                }
            } else {
                PatternTerm::variable(format!("item{}", real_idx))
            };
            let object_term = if strict {
                if real_idx + 1 == canonical.len() {
                    PatternTerm::variable(to_var.clone())
                } else {
                    PatternTerm::Item(canonical[real_idx + 1].to_string())
                }
            } else {
                PatternTerm::variable(format!("item{}", real_idx + 2))
            };
            let direction = path.directions.get(hop).copied().unwrap_or(Direction::Forward);
            let (subject, object) = match direction {
                Direction::Forward => (subject_term, object_term),
                Direction::Reverse => (object_term, subject_term),
            };
            triples.push(TriplePattern {
                subject,
                predicate: PatternTerm::Property(token.to_string()),
                object,
            });
            hop += 1;
        }
        Ok(Self {
            triples,
            from_var,
            to_var,
        })
    }

    /// Replace the free source variable with a bound item.
    fn bind_source(mut self, source_id: &str) -> Self {
        let bound = PatternTerm::Item(source_id.to_string());
        let free = PatternTerm::variable(self.from_var.clone());
        for triple in &mut self.triples {
            if triple.subject == free {
                triple.subject = bound.clone();
            }
            if triple.object == free {
                triple.object = bound.clone();
            }
        }
        self
    }

    fn into_pattern(self, select: Vec<String>, labeled: Vec<String>, limit: usize) -> GraphPattern {
        GraphPattern {
            triples: self.triples,
            select,
            labeled,
            limit: Some(limit),
        }
    }
}

/// Reuses a learned path shape to answer for a bound source entity or
/// to enumerate new source/destination pairs for training-data mining.
pub struct PathApplier {
    backend: Arc<dyn KnowledgeGraph>,
    config: ApplyConfig,
}

impl PathApplier {
    pub fn new(backend: Arc<dyn KnowledgeGraph>, config: ApplyConfig) -> Self {
        Self { backend, config }
    }

    /// Answers reachable from `source_id` along the path shape.
    /// Collaborator failure is absorbed into `(None, [])`.
    pub async fn apply(&self, path: &Path, source_id: &str) -> (Option<usize>, Vec<String>) {
        let plan = match PatternPlan::from_path(path, false) {
            Ok(plan) => plan,
            Err(err) => {
                debug!("Cannot rebuild pattern for application: {}", err);
                return (None, Vec::new());
            }
        };
        let to_var = plan.to_var.clone();
        let pattern = plan.bind_source(source_id).into_pattern(
            vec![to_var.clone()],
            vec![to_var.clone()],
            self.config.answers_limit,
        );
        match self.backend.execute_pattern(&pattern).await {
            Ok(bindings) => {
                let label_var = format!("{}Label", to_var);
                let answers = bindings
                    .rows
                    .iter()
                    .filter_map(|row| row.get(&label_var).cloned())
                    .collect();
                (Some(bindings.rows.len()), answers)
            }
            Err(err) => {
                debug!("Path application failed: {}", err);
                (None, Vec::new())
            }
        }
    }

    /// Source/target label pairs matching the path shape, with both
    /// endpoints free. Strict mode chains through the recorded
    /// intermediate nodes and is the fallback when the free form yields
    /// nothing usable.
    pub async fn substitutes(
        &self,
        path: &Path,
        strict: bool,
    ) -> (Option<usize>, Vec<(String, String)>) {
        let plan = match PatternPlan::from_path(path, strict) {
            Ok(plan) => plan,
            Err(err) => {
                debug!("Cannot rebuild pattern for substitutes: {}", err);
                return (None, Vec::new());
            }
        };
        let from_var = plan.from_var.clone();
        let to_var = plan.to_var.clone();
        let pattern = plan.into_pattern(
            vec![from_var.clone(), to_var.clone()],
            vec![from_var.clone(), to_var.clone()],
            self.config.substitutes_limit,
        );
        match self.backend.execute_pattern(&pattern).await {
            Ok(bindings) => {
                let from_label = format!("{}Label", from_var);
                let to_label = format!("{}Label", to_var);
                let pairs = bindings
                    .rows
                    .iter()
                    .filter_map(|row| {
                        Some((row.get(&from_label)?.clone(), row.get(&to_label)?.clone()))
                    })
                    .collect();
                (Some(bindings.rows.len()), pairs)
            }
            Err(err) => {
                debug!("Substitute mining failed: {}", err);
                (None, Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;

    fn shape(tokens: &[&str], bits: &[u8]) -> Path {
        Path::new(
            tokens.iter().map(|t| t.to_string()).collect(),
            bits.iter().map(|b| Direction::from_bit(*b)).collect(),
            None,
            None,
        )
    }

    #[test]
    fn free_plan_fixes_properties_and_frees_items() {
        let plan = PatternPlan::from_path(&shape(&["P131", "Q55", "P31"], &[0, 1]), false)
            .unwrap();
        assert_eq!(plan.from_var, "item0");
        assert_eq!(plan.to_var, "item4");
        assert_eq!(plan.triples.len(), 2);
        assert_eq!(
            plan.triples[0].predicate,
            PatternTerm::Property("P131".to_string())
        );
        // The concrete intermediate Q55 must NOT appear.
        assert_eq!(
            plan.triples[0].object,
            PatternTerm::variable("item2".to_string())
        );
        // Second hop is reversed.
        assert_eq!(
            plan.triples[1].subject,
            PatternTerm::variable("item4".to_string())
        );
        assert_eq!(
            plan.triples[1].object,
            PatternTerm::variable("item2".to_string())
        );
    }

    #[test]
    fn strict_plan_chains_through_recorded_items() {
        let plan = PatternPlan::from_path(&shape(&["P131", "Q55", "P31"], &[0, 0]), true)
            .unwrap();
        assert_eq!(plan.from_var, "from");
        assert_eq!(plan.to_var, "to");
        assert_eq!(plan.triples[0].object, PatternTerm::Item("Q55".to_string()));
        assert_eq!(plan.triples[1].subject, PatternTerm::Item("Q55".to_string()));
        assert_eq!(plan.triples[1].object, PatternTerm::variable("to".to_string()));
    }

    #[test]
    fn bind_source_replaces_the_free_source_variable() {
        let plan = PatternPlan::from_path(&shape(&["P159"], &[0]), false).unwrap();
        let plan = plan.bind_source("Q152057");
        assert_eq!(
            plan.triples[0].subject,
            PatternTerm::Item("Q152057".to_string())
        );
        assert_eq!(
            plan.triples[0].object,
            PatternTerm::variable("item2".to_string())
        );
    }

    #[test]
    fn statement_tokens_are_skipped_when_rebuilding() {
        // A reified hop: statement node and statement-namespace
        // property stay verbatim and are dropped from the rebuild.
        let plan = PatternPlan::from_path(
            &shape(
                &[
                    "P159",
                    "http://www.wikidata.org/entity/statement/Q1-abc",
                    "http://www.wikidata.org/prop/statement/P159",
                ],
                &[0, 0],
            ),
            false,
        )
        .unwrap();
        assert_eq!(plan.triples.len(), 1);
        assert_eq!(plan.to_var, "item2");
    }

    #[test]
    fn paths_without_property_hops_are_rejected() {
        let err = PatternPlan::from_path(&shape(&["Q5"], &[0]), false).unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
    }
}
