use crate::errors::{EngineError, EngineResult};
use crate::models::CandidateItem;
use questor_models::SearchHit;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A ranked surface-text variant of one original phrase, produced by the
/// external phrase-variant collaborator. Rank is carried by position in
/// the variant list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseVariant {
    pub text: String,
}

impl PhraseVariant {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Search results for one phrase variant, in backend relevance order.
#[derive(Debug, Clone)]
pub struct ItemsBatch {
    pub variant: PhraseVariant,
    pub items: Vec<CandidateItem>,
}

impl ItemsBatch {
    /// Build a batch from search hits; `None` when the variant returned
    /// nothing. The top `primary_count` candidates are flagged primary.
    pub fn from_hits(
        variant: PhraseVariant,
        hits: Vec<SearchHit>,
        primary_count: usize,
    ) -> Option<Self> {
        if hits.is_empty() {
            return None;
        }
        let mut items: Vec<CandidateItem> =
            hits.into_iter().map(CandidateItem::from_search_hit).collect();
        for item in items.iter_mut().take(primary_count) {
            item.primary = true;
        }
        Some(Self { variant, items })
    }

    /// Candidates whose label equals the variant text, ignoring case.
    /// Unlabeled candidates never survive.
    fn strict_filter(&self) -> Vec<CandidateItem> {
        self.items
            .iter()
            .filter(|item| {
                item.label
                    .as_deref()
                    .map(|label| label.eq_ignore_ascii_case(&self.variant.text))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Reduce the batch to disambiguated candidates: optional
    /// strict-name filtering first, then primary-flagged items only.
    pub fn strictify(&mut self, strict_name: bool) {
        if strict_name {
            self.items = self.strict_filter();
        }
        self.items.retain(|item| item.primary);
    }
}

/// One original phrase together with every variant batch that returned
/// candidates.
#[derive(Debug, Clone)]
pub struct Entity {
    pub phrase: String,
    pub batches: Vec<ItemsBatch>,
}

impl Entity {
    /// Fails with `EmptyEntity` when no variant produced candidates.
    pub fn new(phrase: impl Into<String>, batches: Vec<ItemsBatch>) -> EngineResult<Self> {
        let phrase = phrase.into();
        if batches.iter().all(|batch| batch.items.is_empty()) {
            return Err(EngineError::EmptyEntity(phrase));
        }
        Ok(Self { phrase, batches })
    }

    /// Union of all batch candidates.
    pub fn items(&self) -> Vec<&CandidateItem> {
        self.batches
            .iter()
            .flat_map(|batch| batch.items.iter())
            .collect()
    }

    pub fn strictify(&mut self, strict_name: bool) {
        for batch in &mut self.batches {
            batch.strictify(strict_name);
        }
    }
}

/// A group of entities believed to denote overlapping referents.
#[derive(Debug, Clone, Default)]
pub struct EntitySet {
    pub entities: Vec<Entity>,
}

impl EntitySet {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self { entities }
    }

    pub fn items(&self) -> Vec<&CandidateItem> {
        self.entities
            .iter()
            .flat_map(|entity| entity.items())
            .collect()
    }

    pub fn item_ids(&self) -> HashSet<String> {
        self.items().into_iter().map(|item| item.id.clone()).collect()
    }
}

/// PathFinder input: role label -> entity sets carrying that role.
pub type LabeledGroups = HashMap<String, Vec<EntitySet>>;

/// Unordered pair of group labels; `("a", "b")` and `("b", "a")` key the
/// same solutions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    first: String,
    second: String,
}

impl PairKey {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let a = a.into();
        let b = b.into();
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn second(&self) -> &str {
        &self.second
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.first, self.second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, label: Option<&str>) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            label: label.map(|l| l.to_string()),
            description: None,
        }
    }

    #[test]
    fn empty_entity_fails_construction() {
        let err = Entity::new("heineken", vec![]).unwrap_err();
        assert!(matches!(err, EngineError::EmptyEntity(_)));
    }

    #[test]
    fn batch_flags_top_candidates_as_primary() {
        let batch = ItemsBatch::from_hits(
            PhraseVariant::new("amsterdam"),
            vec![hit("Q727", Some("Amsterdam")), hit("Q9899", Some("Amsterdam"))],
            1,
        )
        .unwrap();
        assert!(batch.items[0].primary);
        assert!(!batch.items[1].primary);
    }

    #[test]
    fn strictify_filters_by_label_before_primary_reduction() {
        let mut batch = ItemsBatch::from_hits(
            PhraseVariant::new("amsterdam"),
            vec![
                hit("Q123", Some("Amsterdam Centraal")),
                hit("Q727", Some("Amsterdam")),
            ],
            2,
        )
        .unwrap();
        // Both are primary; the strict-name filter must run first and
        // drop the non-matching label.
        batch.strictify(true);
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].id, "Q727");
    }

    #[test]
    fn strictify_defaults_to_primary_reduction_only() {
        let mut batch = ItemsBatch::from_hits(
            PhraseVariant::new("amsterdam"),
            vec![
                hit("Q123", Some("Amsterdam Centraal")),
                hit("Q727", Some("Amsterdam")),
            ],
            1,
        )
        .unwrap();
        batch.strictify(false);
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].id, "Q123");
    }

    #[test]
    fn pair_key_is_unordered() {
        assert_eq!(PairKey::new("question", "answer"), PairKey::new("answer", "question"));
    }
}
