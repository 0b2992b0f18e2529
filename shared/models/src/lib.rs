use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One entry of a label-search response from the knowledge graph.
///
/// Search backends return candidates ordered by relevance; the order is
/// preserved all the way into disambiguation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchHit {
    pub id: String,
    pub label: Option<String>,
    pub description: Option<String>,
}

/// Full item payload from the item-fetch interface, including claims
/// (property id -> referenced item ids).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemData {
    pub id: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub claims: HashMap<String, Vec<String>>,
}

/// A term inside a graph pattern: either a free variable or a bound
/// graph identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PatternTerm {
    Variable(String),
    Item(String),
    Property(String),
}

impl PatternTerm {
    pub fn variable(name: impl Into<String>) -> Self {
        PatternTerm::Variable(name.into())
    }
}

/// One hop of a graph pattern: `subject predicate object`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: PatternTerm,
    pub predicate: PatternTerm,
    pub object: PatternTerm,
}

/// An ordered multi-hop graph pattern submitted to the pattern-query
/// interface.
///
/// `select` lists projection variables in output order. Variables in
/// `labeled` additionally get their canonical English label resolved
/// server-side (as `<var>Label`). Results are restricted to
/// graph-namespace values; literals and foreign graphs are excluded by
/// the executing backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphPattern {
    pub triples: Vec<TriplePattern>,
    pub select: Vec<String>,
    pub labeled: Vec<String>,
    pub limit: Option<usize>,
}

/// Tabular variable bindings returned for one graph pattern.
///
/// Rows map variable names (and `<var>Label` for labeled variables) to
/// normalized values: canonical ids where the value lives in the graph
/// namespace, verbatim URIs otherwise (e.g. statement nodes).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternBindings {
    pub variables: Vec<String>,
    pub rows: Vec<HashMap<String, String>>,
}

impl PatternBindings {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Serialized form of one learned path, handed to the persistence
/// collaborator: the token chain plus the per-hop direction bits
/// (0 = subject -> object, 1 = object -> subject).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PathRecord {
    pub tokens: Vec<String>,
    pub direction_config: Vec<u8>,
}
