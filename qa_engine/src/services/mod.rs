pub mod knowledge_service;

pub use knowledge_service::*;
