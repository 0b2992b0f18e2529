use crate::errors::EngineResult;
use async_trait::async_trait;
use questor_models::{GraphPattern, ItemData, PatternBindings, SearchHit};
use std::collections::HashMap;

/// What kind of graph object a label search should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Item,
    Property,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Item => "item",
            EntityKind::Property => "property",
        }
    }
}

/// Outcome of one batched pattern dispatch: per-pattern bindings (`None`
/// when that member timed out or returned a malformed body) plus the
/// average observed latency in seconds, which seeds the adaptive
/// timeout of the next batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub responses: Vec<Option<PatternBindings>>,
    pub avg_latency_secs: f64,
}

/// The remote knowledge-graph boundary.
///
/// Implementations own transport, retries and rate-limit handling; the
/// engine only sees per-member success or absence.
#[async_trait]
pub trait KnowledgeGraph: Send + Sync {
    /// Ordered candidates for a surface-text label; empty when the
    /// backend knows nothing for the text.
    async fn search_by_label(&self, text: &str, kind: EntityKind)
        -> EngineResult<Vec<SearchHit>>;

    /// Batched label search. `None` means no answer for that member
    /// within the batch's time budget (timeout, malformed body, or zero
    /// results).
    async fn search_by_label_batch(
        &self,
        texts: &[String],
    ) -> EngineResult<HashMap<String, Option<Vec<SearchHit>>>>;

    /// Execute one graph pattern; fails with `NoResponse` on timeout or
    /// malformed body.
    async fn execute_pattern(&self, pattern: &GraphPattern) -> EngineResult<PatternBindings>;

    /// Execute a batch of graph patterns with bounded fan-out.
    /// `timeout_secs` overrides the per-request timeout for this batch.
    async fn execute_pattern_batch(
        &self,
        patterns: &[GraphPattern],
        timeout_secs: Option<f64>,
    ) -> EngineResult<BatchOutcome>;

    /// Fetch full item payloads, auto-chunked above the backend's per
    /// call id limit.
    async fn fetch_items(&self, ids: &[String]) -> EngineResult<HashMap<String, ItemData>>;
}
