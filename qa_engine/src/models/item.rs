use questor_models::{ItemData, SearchHit};
use std::collections::HashMap;

/// One possible knowledge-graph item a phrase might refer to.
///
/// Claims are fetched lazily through the item-fetch interface and never
/// replaced once present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateItem {
    pub id: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub claims: Option<HashMap<String, Vec<String>>>,
    /// Set on the top-ranked candidates of a search batch.
    pub primary: bool,
}

impl CandidateItem {
    pub fn from_search_hit(hit: SearchHit) -> Self {
        Self {
            id: hit.id,
            label: hit.label,
            description: hit.description,
            claims: None,
            primary: false,
        }
    }

    pub fn from_item_data(data: ItemData) -> Self {
        Self {
            id: data.id,
            label: data.label,
            description: data.description,
            claims: Some(data.claims),
            primary: false,
        }
    }

    pub fn has_claims(&self) -> bool {
        self.claims.is_some()
    }

    /// Attach fetched claims. A no-op when claims are already present.
    pub fn attach_claims(&mut self, claims: HashMap<String, Vec<String>>) {
        if self.claims.is_none() {
            self.claims = Some(claims);
        }
    }
}
