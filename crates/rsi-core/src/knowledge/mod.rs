//! Knowledge layer
//!
//! Durable record of observed errors, their accepted fixes, and the patterns
//! and rules generalized from them, plus the derived lookup structures:
//!
//! - [`store`]: the file-backed knowledge base (source of truth)
//! - [`index`]: rebuildable keyword index
//! - [`similarity`]: fuzzy matching of new errors against history
//! - [`documenter`]: recording new fixes with automatic similarity links

pub mod documenter;
pub mod index;
pub mod similarity;
pub mod store;
pub mod types;

// Re-exports
pub use documenter::{DocumentOutcome, ErrorReport, FixDocumenter};
pub use index::{EntryType, IndexEntry, KeywordIndex};
pub use similarity::{FixRecommendation, MatchContext, SimilarError, SimilarityMatcher};
pub use store::KnowledgeStore;
pub use types::*;
