pub mod error;
pub mod join;
pub mod keys;
pub mod loader;
pub mod resolver;
pub mod semantic;
pub mod similarity;
pub mod table;
pub mod type_selector;

pub use error::{FuzzyJoinError, Result};
pub use join::{FuzzyJoin, JoinMode, JoinSpec};
pub use semantic::SemanticType;
pub use similarity::StringScorer;
pub use table::{Dataset, Table};
pub use type_selector::{select_family, MatchFamily};
