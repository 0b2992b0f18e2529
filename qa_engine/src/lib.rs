pub mod models;
pub mod kg;
pub mod entity_resolution;
pub mod path_search;
pub mod services;
pub mod errors;
