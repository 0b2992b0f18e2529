use crate::models::CandidateItem;
use lazy_static::lazy_static;
use questor_models::PathRecord;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;

lazy_static! {
    static ref ITEM_ID: Regex = Regex::new(r"^Q\d+$").unwrap();
    static ref PROPERTY_ID: Regex = Regex::new(r"^P\d+$").unwrap();
}

/// Traversal direction of one hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// subject -> object
    Forward,
    /// object -> subject
    Reverse,
}

impl Direction {
    pub fn from_bit(bit: u8) -> Self {
        if bit == 0 {
            Direction::Forward
        } else {
            Direction::Reverse
        }
    }

    pub fn as_bit(self) -> u8 {
        match self {
            Direction::Forward => 0,
            Direction::Reverse => 1,
        }
    }
}

pub fn is_item_token(token: &str) -> bool {
    ITEM_ID.is_match(token)
}

pub fn is_property_token(token: &str) -> bool {
    PROPERTY_ID.is_match(token)
}

/// A discovered chain of relations between two graph items.
///
/// `tokens` alternates property and item ids starting and ending with a
/// property; the bound endpoints are not part of the token chain.
/// Backends with a reification model may put synthetic statement nodes
/// (verbatim URIs) in item positions; those never count toward `length`.
#[derive(Debug, Clone)]
pub struct Path {
    pub tokens: Vec<String>,
    pub directions: Vec<Direction>,
    pub item_from: Option<CandidateItem>,
    pub item_to: Option<CandidateItem>,
    pub length: usize,
}

impl Path {
    pub fn new(
        tokens: Vec<String>,
        directions: Vec<Direction>,
        item_from: Option<CandidateItem>,
        item_to: Option<CandidateItem>,
    ) -> Self {
        let mut length = tokens.len() / 2 + 1;
        for (idx, token) in tokens.iter().enumerate() {
            if idx % 2 == 1 && !is_item_token(token) {
                length -= 1;
            }
        }
        Self {
            tokens,
            directions,
            item_from,
            item_to,
            length,
        }
    }

    pub fn from_record(record: &PathRecord) -> Self {
        Self::new(
            record.tokens.clone(),
            record
                .direction_config
                .iter()
                .map(|bit| Direction::from_bit(*bit))
                .collect(),
            None,
            None,
        )
    }

    pub fn to_record(&self) -> PathRecord {
        PathRecord {
            tokens: self.tokens.clone(),
            direction_config: self.directions.iter().map(|d| d.as_bit()).collect(),
        }
    }

    /// A path is symmetric when any node token repeats.
    pub fn is_symmetric(&self) -> bool {
        let unique: HashSet<&str> = self.tokens.iter().map(String::as_str).collect();
        unique.len() != self.tokens.len()
    }

    /// Two directly adjacent property tokens form a degenerate chain
    /// that threads through a property as if it were an item.
    pub fn is_property_chain(&self) -> bool {
        self.tokens.windows(2).any(|pair| {
            is_property_token(&pair[0]) && is_property_token(&pair[1])
        })
    }

    /// Per-hop-position counts of property tokens shared with sibling
    /// paths. Position i covers the token at index 2i.
    pub fn similarity_to_others(&self, others: &[&Path]) -> Vec<usize> {
        let mut similarity = vec![0usize; self.tokens.len() / 2 + 1];
        for other in others {
            for (idx, (mine, theirs)) in
                self.tokens.iter().zip(other.tokens.iter()).enumerate()
            {
                if idx % 2 == 0 && mine == theirs {
                    similarity[idx / 2] += 1;
                }
            }
        }
        similarity
    }

    /// Canonical item ids appearing inside the chain.
    pub fn items(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .map(String::as_str)
            .filter(|token| is_item_token(token))
            .collect()
    }

    /// Tokens with synthetic statement nodes removed, keeping the
    /// filtered position of each survivor.
    pub fn canonical_tokens(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .map(String::as_str)
            .filter(|token| is_item_token(token) || is_property_token(token))
            .collect()
    }

    fn endpoint_id(item: &Option<CandidateItem>) -> String {
        match item {
            Some(item) => format!("[{}]", item.id),
            None => "[__]".to_string(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut nodes = vec![Self::endpoint_id(&self.item_from)];
        for (idx, token) in self.tokens.iter().enumerate() {
            if idx % 2 == 0 {
                match self.directions.get(idx / 2).copied().unwrap_or(Direction::Forward) {
                    Direction::Forward => nodes.push(format!("= {} =>", token)),
                    Direction::Reverse => nodes.push(format!("<= {} =", token)),
                }
            } else {
                nodes.push(token.clone());
            }
        }
        nodes.push(Self::endpoint_id(&self.item_to));
        write!(f, "@{} {}", self.length, nodes.join(" "))
    }
}

/// One scored path; scorer output is ordered ascending by score.
#[derive(Debug, Clone)]
pub struct Solution {
    pub score: f64,
    pub path: Path,
}
