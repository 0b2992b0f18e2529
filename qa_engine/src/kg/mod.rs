pub mod backend;
pub mod cache;
pub mod wikidata;

pub use backend::*;
pub use cache::*;
pub use wikidata::*;
