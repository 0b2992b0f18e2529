pub mod applier;
pub mod finder;
pub mod scorer;

pub use applier::*;
pub use finder::*;
pub use scorer::*;
