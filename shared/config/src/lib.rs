use tracing::debug;

/// Environment-driven settings shared by every component that talks to
/// the knowledge-graph backends.
///
/// One instance is created per run and passed by reference; components
/// never read the environment themselves.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Entity search / item fetch endpoint (MediaWiki action API).
    pub api_endpoint: String,
    /// Pattern query endpoint (SPARQL).
    pub sparql_endpoint: String,
    /// User agent sent with every request, per the backend's etiquette.
    pub user_agent: String,
    /// Hard ceiling for a single HTTP request, in seconds.
    pub http_timeout_secs: u64,
}

impl Settings {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let settings = Self {
            api_endpoint: std::env::var("KG_API_URL")
                .unwrap_or_else(|_| "https://www.wikidata.org/w/api.php".to_string()),
            sparql_endpoint: std::env::var("KG_SPARQL_URL")
                .unwrap_or_else(|_| "https://query.wikidata.org/sparql".to_string()),
            user_agent: std::env::var("QUESTOR_USER_AGENT")
                .unwrap_or_else(|_| format!("questor/{}", env!("CARGO_PKG_VERSION"))),
            http_timeout_secs: std::env::var("QUESTOR_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        };
        debug!(
            "Settings loaded: api={}, sparql={}",
            settings.api_endpoint, settings.sparql_endpoint
        );
        settings
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_endpoint: "https://www.wikidata.org/w/api.php".to_string(),
            sparql_endpoint: "https://query.wikidata.org/sparql".to_string(),
            user_agent: format!("questor/{}", env!("CARGO_PKG_VERSION")),
            http_timeout_secs: 60,
        }
    }
}
