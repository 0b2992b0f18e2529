use crate::entity_resolution::merge_entity_sets;
use crate::errors::{EngineError, EngineResult};
use crate::kg::{KnowledgeGraph, SearchCache};
use crate::models::{CandidateItem, Entity, EntitySet, ItemsBatch, PhraseVariant};
use questor_models::SearchHit;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Disambiguation tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// How many top-ranked candidates per batch are flagged primary.
    pub primary_count: usize,
    /// Require a case-insensitive label match against the variant text
    /// before primary reduction.
    pub strict_name: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            primary_count: 1,
            strict_name: false,
        }
    }
}

/// Turns ranked surface-text variants into disambiguated entities and
/// merges entity groups that share candidate items.
#[derive(Clone)]
pub struct EntityResolver {
    backend: Arc<dyn KnowledgeGraph>,
    cache: Arc<SearchCache>,
    config: ResolverConfig,
}

impl EntityResolver {
    pub fn new(
        backend: Arc<dyn KnowledgeGraph>,
        cache: Arc<SearchCache>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            backend,
            cache,
            config,
        }
    }

    /// Search hits for every text, cache first, one backend batch for
    /// the rest. Non-empty results are written back to the cache.
    async fn search_variants(
        &self,
        texts: &[String],
    ) -> EngineResult<HashMap<String, Option<Vec<SearchHit>>>> {
        let mut matching = HashMap::new();
        let mut uncached = Vec::new();
        for text in texts {
            match self.cache.get(text) {
                Some(hits) => {
                    matching.insert(text.clone(), Some(hits));
                }
                None => uncached.push(text.clone()),
            }
        }
        uncached.sort();
        uncached.dedup();
        if !uncached.is_empty() {
            let fetched = self.backend.search_by_label_batch(&uncached).await?;
            for (text, hits) in fetched {
                if let Some(hits) = &hits {
                    self.cache.insert(&text, hits.clone());
                }
                matching.insert(text, hits);
            }
        }
        Ok(matching)
    }

    fn entity_from_matching(
        &self,
        phrase: &str,
        variants: &[PhraseVariant],
        matching: &HashMap<String, Option<Vec<SearchHit>>>,
    ) -> EngineResult<Entity> {
        let mut batches = Vec::new();
        for variant in variants {
            match matching.get(&variant.text).cloned().flatten() {
                Some(hits) => {
                    if let Some(batch) =
                        ItemsBatch::from_hits(variant.clone(), hits, self.config.primary_count)
                    {
                        batches.push(batch);
                    }
                }
                None => debug!("Variant '{}' returned no candidates", variant.text),
            }
        }
        if batches.is_empty() {
            return Err(EngineError::EmptyEntity(phrase.to_string()));
        }
        Entity::new(phrase, batches)
    }

    /// Resolve one phrase; fails with `EmptyEntity` when every variant
    /// comes back empty.
    pub async fn resolve(
        &self,
        phrase: &str,
        variants: &[PhraseVariant],
    ) -> EngineResult<Entity> {
        let texts: Vec<String> = variants.iter().map(|v| v.text.clone()).collect();
        let matching = self.search_variants(&texts).await?;
        self.entity_from_matching(phrase, variants, &matching)
    }

    /// Sentence-level resolution: one backend batch across every
    /// phrase's variants, empty phrases dropped, surviving entities
    /// merged into shared-referent sets and strictified.
    ///
    /// Fails with `InvalidEntitiesSet` when no phrase is resolvable;
    /// the caller treats that as "unanswerable".
    pub async fn resolve_groups(
        &self,
        phrases: &[(String, Vec<PhraseVariant>)],
    ) -> EngineResult<Vec<EntitySet>> {
        let texts: Vec<String> = phrases
            .iter()
            .flat_map(|(_, variants)| variants.iter().map(|v| v.text.clone()))
            .collect();
        let matching = self.search_variants(&texts).await?;

        let mut entities = Vec::new();
        for (phrase, variants) in phrases {
            match self.entity_from_matching(phrase, variants, &matching) {
                Ok(entity) => {
                    debug!("Entity created for '{}'", phrase);
                    entities.push(entity);
                }
                Err(EngineError::EmptyEntity(phrase)) => {
                    debug!("Phrase '{}' skipped (empty entities set)", phrase);
                }
                Err(other) => return Err(other),
            }
        }
        if entities.is_empty() {
            return Err(EngineError::InvalidEntitiesSet);
        }
        info!("{} entities linked in total", entities.len());

        let sets = entities
            .into_iter()
            .map(|entity| EntitySet::new(vec![entity]))
            .collect();
        let mut sets = merge_entity_sets(sets);
        info!("{} entity sets after merge", sets.len());

        for set in &mut sets {
            for entity in &mut set.entities {
                entity.strictify(self.config.strict_name);
            }
        }
        Ok(sets)
    }

    pub fn strictify(&self, entity: &mut Entity) {
        entity.strictify(self.config.strict_name);
    }

    /// Fill in missing claims through the item-fetch interface; items
    /// that already carry claims are left untouched.
    pub async fn attach_claims(&self, items: &mut [CandidateItem]) -> EngineResult<()> {
        let mut missing: Vec<String> = items
            .iter()
            .filter(|item| !item.has_claims())
            .map(|item| item.id.clone())
            .collect();
        missing.sort();
        missing.dedup();
        if missing.is_empty() {
            return Ok(());
        }
        let fetched = self.backend.fetch_items(&missing).await?;
        for item in items.iter_mut() {
            if let Some(data) = fetched.get(&item.id) {
                item.attach_claims(data.claims.clone());
            }
        }
        Ok(())
    }
}
