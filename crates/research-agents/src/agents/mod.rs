//! Retrieval agents, one per channel

pub mod news;
pub mod semantic;
pub mod structured;

pub use news::{ArticleRecord, NewsDigest, NewsRetrievalAgent};
pub use semantic::{RetrievalMatch, SemanticFindings, SemanticRetrievalAgent};
pub use structured::{GeneratedQuery, StructuredFindings, StructuredQueryAgent};
