use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No response from knowledge graph: {0}")]
    NoResponse(String),

    #[error("No candidate items for any variant of '{0}'")]
    EmptyEntity(String),

    #[error("No usable entities in the sentence")]
    InvalidEntitiesSet,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
