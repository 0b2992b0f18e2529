use crate::errors::{EngineError, EngineResult};
use crate::kg::backend::{BatchOutcome, EntityKind, KnowledgeGraph};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use questor_config::Settings;
use questor_models::{GraphPattern, ItemData, PatternBindings, PatternTerm, SearchHit};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const PROPERTY_NAMESPACE: &str = "http://www.wikidata.org/prop/";
const ENTITY_NAMESPACE: &str = "http://www.wikidata.org/entity/";
const PROPERTY_STATEMENT_NAMESPACE: &str = "http://www.wikidata.org/prop/statement/";
const ENTITY_STATEMENT_NAMESPACE: &str = "http://www.wikidata.org/entity/statement/";

/// Connection and dispatch tuning for the Wikidata backends.
#[derive(Debug, Clone, Deserialize)]
pub struct WikidataConfig {
    pub api_endpoint: String,
    pub sparql_endpoint: String,
    pub user_agent: String,
    /// Hard ceiling for any single HTTP request, in seconds.
    pub http_timeout_secs: u64,
    /// Result cap for one label search.
    pub search_limit: usize,
    /// Fan-out cap for batched label searches.
    pub search_concurrency: usize,
    /// Fan-out cap for batched pattern queries.
    pub pattern_concurrency: usize,
    pub search_timeout_secs: f64,
    pub default_pattern_timeout_secs: f64,
    /// Fixed delay before retrying a rate-limited batch, in seconds.
    pub rate_limit_delay_secs: f64,
    /// Timeout escalation factor applied on each rate-limit retry.
    pub timeout_multiplier: f64,
    /// Ceiling on rate-limit retries of one batch.
    pub max_rate_limit_retries: usize,
    /// Max ids per item-fetch call; larger requests are chunked.
    pub item_chunk_limit: usize,
}

impl Default for WikidataConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl WikidataConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            api_endpoint: settings.api_endpoint.clone(),
            sparql_endpoint: settings.sparql_endpoint.clone(),
            user_agent: settings.user_agent.clone(),
            http_timeout_secs: settings.http_timeout_secs,
            search_limit: 20,
            search_concurrency: 15,
            pattern_concurrency: 2,
            search_timeout_secs: 10.0,
            default_pattern_timeout_secs: 10.0,
            rate_limit_delay_secs: 20.0,
            timeout_multiplier: 3.0,
            max_rate_limit_retries: 3,
            item_chunk_limit: 50,
        }
    }
}

/// Result of one SPARQL request inside a batch.
struct QueryOutcome {
    bindings: Option<PatternBindings>,
    elapsed_secs: Option<f64>,
    rate_limited: bool,
}

impl QueryOutcome {
    fn failed() -> Self {
        Self {
            bindings: None,
            elapsed_secs: None,
            rate_limited: false,
        }
    }
}

/// Wikidata implementation of the knowledge-graph boundary: the
/// MediaWiki action API for label search and item fetch, the SPARQL
/// endpoint for pattern queries.
pub struct WikidataClient {
    http: reqwest::Client,
    config: WikidataConfig,
}

impl WikidataClient {
    pub fn new(config: WikidataConfig) -> EngineResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn from_settings(settings: &Settings) -> EngineResult<Self> {
        Self::new(WikidataConfig::from_settings(settings))
    }

    /// Strip graph-namespace prefixes down to canonical ids; statement
    /// node URIs stay verbatim so path construction can discount them.
    fn normalize_value(value: &str) -> String {
        let strip = (value.starts_with(PROPERTY_NAMESPACE)
            && !value.starts_with(PROPERTY_STATEMENT_NAMESPACE))
            || (value.starts_with(ENTITY_NAMESPACE)
                && !value.starts_with(ENTITY_STATEMENT_NAMESPACE));
        if strip {
            value.rsplit('/').next().unwrap_or(value).to_string()
        } else {
            value.to_string()
        }
    }

    fn render_term(term: &PatternTerm) -> String {
        match term {
            PatternTerm::Variable(name) => format!("?{}", name),
            PatternTerm::Item(id) => format!("wd:{}", id),
            PatternTerm::Property(id) => format!("wdt:{}", id),
        }
    }

    /// Render a graph pattern as SPARQL: one triple line per hop,
    /// namespace restrictions for every projected variable, and the
    /// label service join for English labels.
    fn render_sparql(pattern: &GraphPattern) -> String {
        let predicate_vars: HashSet<&str> = pattern
            .triples
            .iter()
            .filter_map(|triple| match &triple.predicate {
                PatternTerm::Variable(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();

        let mut projection = Vec::new();
        for var in &pattern.select {
            projection.push(format!("?{}", var));
            if pattern.labeled.contains(var) {
                projection.push(format!("?{}Label", var));
            }
        }

        let mut body = String::new();
        for triple in &pattern.triples {
            body.push_str(&format!(
                "{} {} {} .\n",
                Self::render_term(&triple.subject),
                Self::render_term(&triple.predicate),
                Self::render_term(&triple.object),
            ));
        }
        for var in &pattern.select {
            let namespace = if predicate_vars.contains(var.as_str()) {
                PROPERTY_NAMESPACE
            } else {
                ENTITY_NAMESPACE
            };
            body.push_str(&format!(
                "FILTER ( strstarts(str(?{}), \"{}\") )\n",
                var, namespace
            ));
        }
        body.push_str("SERVICE wikibase:label { bd:serviceParam wikibase:language \"en\" }\n");

        let mut query = format!("SELECT {}\nWHERE {{\n{}}}", projection.join(" "), body);
        if let Some(limit) = pattern.limit {
            query.push_str(&format!("\nLIMIT {}", limit));
        }
        query
    }

    fn parse_bindings(body: &Value) -> EngineResult<PatternBindings> {
        let variables: Vec<String> = body
            .get("head")
            .and_then(|head| head.get("vars"))
            .and_then(|vars| vars.as_array())
            .ok_or_else(|| EngineError::NoResponse("missing head.vars in response".to_string()))?
            .iter()
            .filter_map(|var| var.as_str().map(str::to_string))
            .collect();
        let bindings = body
            .get("results")
            .and_then(|results| results.get("bindings"))
            .and_then(|bindings| bindings.as_array())
            .ok_or_else(|| {
                EngineError::NoResponse("missing results.bindings in response".to_string())
            })?;

        let mut rows = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let mut row = HashMap::new();
            for var in &variables {
                if let Some(value) = binding
                    .get(var)
                    .and_then(|cell| cell.get("value"))
                    .and_then(|value| value.as_str())
                {
                    row.insert(var.clone(), Self::normalize_value(value));
                }
            }
            rows.push(row);
        }
        Ok(PatternBindings { variables, rows })
    }

    fn parse_search(body: &Value) -> EngineResult<Vec<SearchHit>> {
        let entries = body
            .get("search")
            .cloned()
            .ok_or_else(|| EngineError::NoResponse("missing search results".to_string()))?;
        serde_json::from_value(entries)
            .map_err(|err| EngineError::NoResponse(err.to_string()))
    }

    /// Claims whose every statement carries an item-valued mainsnak;
    /// properties with non-item datavalues are skipped whole.
    fn extract_claims(entity: &Value) -> HashMap<String, Vec<String>> {
        let mut claims = HashMap::new();
        let Some(object) = entity.get("claims").and_then(|claims| claims.as_object()) else {
            return claims;
        };
        for (property, statements) in object {
            let Some(statements) = statements.as_array() else {
                continue;
            };
            let mut ids = Vec::new();
            let mut regular = true;
            for statement in statements {
                match statement
                    .pointer("/mainsnak/datavalue/value/id")
                    .and_then(|id| id.as_str())
                {
                    Some(id) if id.starts_with('Q') => ids.push(id.to_string()),
                    Some(_) => {}
                    None => {
                        regular = false;
                        break;
                    }
                }
            }
            if regular {
                claims.insert(property.clone(), ids);
            }
        }
        claims
    }

    async fn get_json(
        &self,
        url: &str,
        params: &[(&str, &str)],
        timeout_secs: f64,
    ) -> EngineResult<Value> {
        let response = self
            .http
            .get(url)
            .query(params)
            .timeout(Duration::from_secs_f64(timeout_secs))
            .send()
            .await
            .map_err(|err| EngineError::NoResponse(err.to_string()))?;
        response
            .json::<Value>()
            .await
            .map_err(|err| EngineError::NoResponse(err.to_string()))
    }

    async fn search_once(
        &self,
        text: &str,
        kind: EntityKind,
        timeout_secs: f64,
    ) -> EngineResult<Vec<SearchHit>> {
        let limit = self.config.search_limit.to_string();
        let params = [
            ("action", "wbsearchentities"),
            ("format", "json"),
            ("search", text),
            ("language", "en"),
            ("type", kind.as_str()),
            ("limit", limit.as_str()),
        ];
        let body = self
            .get_json(&self.config.api_endpoint, &params, timeout_secs)
            .await?;
        Self::parse_search(&body)
    }

    async fn sparql_once(&self, query: &str, timeout_secs: f64) -> QueryOutcome {
        let started = Instant::now();
        let response = match self
            .http
            .get(&self.config.sparql_endpoint)
            .query(&[("query", query), ("format", "json")])
            .timeout(Duration::from_secs_f64(timeout_secs))
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                debug!("SPARQL request failed: {}", err);
                return QueryOutcome::failed();
            }
        };
        let elapsed_secs = Some(started.elapsed().as_secs_f64());
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return QueryOutcome {
                bindings: None,
                elapsed_secs,
                rate_limited: true,
            };
        }
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                debug!("SPARQL body was not JSON: {}", err);
                return QueryOutcome {
                    bindings: None,
                    elapsed_secs,
                    rate_limited: false,
                };
            }
        };
        match Self::parse_bindings(&body) {
            Ok(bindings) => QueryOutcome {
                bindings: Some(bindings),
                elapsed_secs,
                rate_limited: false,
            },
            Err(err) => {
                debug!("SPARQL response malformed: {}", err);
                QueryOutcome {
                    bindings: None,
                    elapsed_secs,
                    rate_limited: false,
                }
            }
        }
    }

    /// One pass over the batch at the given timeout. Returns responses
    /// in input order, observed latencies, and whether any member was
    /// rate limited.
    async fn dispatch_batch(
        &self,
        queries: &[String],
        timeout_secs: f64,
    ) -> (Vec<Option<PatternBindings>>, Vec<f64>, bool) {
        let mut outcomes: Vec<(usize, QueryOutcome)> = stream::iter(queries.iter().cloned().enumerate())
            .map(|(idx, query)| async move {
                (idx, self.sparql_once(&query, timeout_secs).await)
            })
            .buffer_unordered(self.config.pattern_concurrency)
            .collect()
            .await;
        outcomes.sort_by_key(|(idx, _)| *idx);

        let rate_limited = outcomes.iter().any(|(_, outcome)| outcome.rate_limited);
        let latencies: Vec<f64> = outcomes
            .iter()
            .filter_map(|(_, outcome)| outcome.elapsed_secs)
            .collect();
        let responses = outcomes
            .into_iter()
            .map(|(_, outcome)| outcome.bindings)
            .collect();
        (responses, latencies, rate_limited)
    }
}

#[async_trait]
impl KnowledgeGraph for WikidataClient {
    async fn search_by_label(
        &self,
        text: &str,
        kind: EntityKind,
    ) -> EngineResult<Vec<SearchHit>> {
        self.search_once(text, kind, self.config.search_timeout_secs)
            .await
    }

    async fn search_by_label_batch(
        &self,
        texts: &[String],
    ) -> EngineResult<HashMap<String, Option<Vec<SearchHit>>>> {
        if texts.is_empty() {
            return Ok(HashMap::new());
        }
        let results: Vec<(String, Option<Vec<SearchHit>>)> = stream::iter(texts.iter().cloned())
            .map(|text| async move {
                let hits = match self
                    .search_once(&text, EntityKind::Item, self.config.search_timeout_secs)
                    .await
                {
                    Ok(hits) if !hits.is_empty() => Some(hits),
                    Ok(_) => None,
                    Err(err) => {
                        debug!("Label search for '{}' failed: {}", text, err);
                        None
                    }
                };
                (text, hits)
            })
            .buffer_unordered(self.config.search_concurrency)
            .collect()
            .await;
        Ok(results.into_iter().collect())
    }

    async fn execute_pattern(&self, pattern: &GraphPattern) -> EngineResult<PatternBindings> {
        let query = Self::render_sparql(pattern);
        let outcome = self
            .sparql_once(&query, self.config.default_pattern_timeout_secs)
            .await;
        outcome
            .bindings
            .ok_or_else(|| EngineError::NoResponse("pattern query failed".to_string()))
    }

    async fn execute_pattern_batch(
        &self,
        patterns: &[GraphPattern],
        timeout_secs: Option<f64>,
    ) -> EngineResult<BatchOutcome> {
        let mut timeout = timeout_secs.unwrap_or(self.config.default_pattern_timeout_secs);
        if patterns.is_empty() {
            return Ok(BatchOutcome {
                responses: Vec::new(),
                avg_latency_secs: timeout,
            });
        }
        let queries: Vec<String> = patterns.iter().map(Self::render_sparql).collect();

        let mut attempts = 0;
        loop {
            let (responses, latencies, rate_limited) =
                self.dispatch_batch(&queries, timeout).await;
            if rate_limited && attempts < self.config.max_rate_limit_retries {
                attempts += 1;
                timeout *= self.config.timeout_multiplier;
                warn!(
                    "Rate limited; retrying batch of {} in {}s (timeout {}s, attempt {})",
                    queries.len(),
                    self.config.rate_limit_delay_secs,
                    timeout,
                    attempts
                );
                tokio::time::sleep(Duration::from_secs_f64(self.config.rate_limit_delay_secs))
                    .await;
                continue;
            }
            let avg_latency_secs = if latencies.is_empty() {
                timeout
            } else {
                latencies.iter().sum::<f64>() / latencies.len() as f64
            };
            return Ok(BatchOutcome {
                responses,
                avg_latency_secs,
            });
        }
    }

    async fn fetch_items(&self, ids: &[String]) -> EngineResult<HashMap<String, ItemData>> {
        let mut items = HashMap::new();
        for chunk in ids.chunks(self.config.item_chunk_limit.max(1)) {
            let joined = chunk.join("|");
            let params = [
                ("action", "wbgetentities"),
                ("format", "json"),
                ("ids", joined.as_str()),
                ("languages", "en"),
            ];
            let body = self
                .get_json(&self.config.api_endpoint, &params, self.config.search_timeout_secs)
                .await?;
            let Some(entities) = body.get("entities").and_then(|entities| entities.as_object())
            else {
                return Err(EngineError::NoResponse(
                    "missing entities in item response".to_string(),
                ));
            };
            for (id, entity) in entities {
                items.insert(
                    id.clone(),
                    ItemData {
                        id: id.clone(),
                        label: entity
                            .pointer("/labels/en/value")
                            .and_then(|label| label.as_str())
                            .map(str::to_string),
                        description: entity
                            .pointer("/descriptions/en/value")
                            .and_then(|description| description.as_str())
                            .map(str::to_string),
                        claims: Self::extract_claims(entity),
                    },
                );
            }
        }
        Ok(items)
    }
}
