//! Library search.
//!
//! A search string is split into tokens, the tokens are classified as
//! postcodes, states, counties, cities or library names, and the resulting
//! [`Query`] picks a search strategy that the [`SearchEngine`] executes.

pub mod classifier;
pub mod engine;
pub mod query;
pub mod sequence;
pub mod token;
pub mod vocabulary;

pub use classifier::{classify_all, TokenClassifier};
pub use engine::{AreaScope, LibraryFinder, SearchEngine, SearchSettings};
pub use query::{GeoTarget, Query, SearchType, MAX_SEARCH_STRING_LEN};
pub use sequence::TokenSequence;
pub use token::{Token, TokenType};
