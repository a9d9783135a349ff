//! Company research pipeline
//!
//! This crate answers financial-research questions about a single company by
//! fusing three independent retrieval channels into one report:
//!
//! - Semantic search over indexed filings, partitioned by year and quarter
//!   ([`SemanticRetrievalAgent`])
//! - Structured time-series data queried through a generated SQL statement
//!   and rendered as line charts ([`StructuredQueryAgent`])
//! - Live news from a web search, filtered to trusted domains and recent
//!   dates ([`NewsRetrievalAgent`])
//!
//! # Architecture
//!
//! Every external service sits behind a narrow trait in [`api`] (embedding,
//! vector index, tabular store, object store, news search) or
//! [`generator`] (text generation). Agents receive `Arc<dyn Trait>` handles
//! at construction, so tests swap in mocks and the CLI wires real HTTP
//! clients. [`ResearchOrchestrator`] runs the three agents concurrently and
//! captures each outcome in a [`ReportBundle`].
//!
//! Documents enter the vector index through [`ingestion`], which splits
//! markdown by headers with [`ingestion::segment`] before embedding.
//!
//! # Example
//!
//! ```rust,ignore
//! use research_agents::{ReportOrchestrator, ResearchConfig, ResearchOrchestrator, TimeRange};
//!
//! # async fn run(orchestrator: ResearchOrchestrator) -> research_agents::Result<()> {
//! let range: TimeRange = "2023:1,4".parse()?;
//! let bundle = orchestrator.generate_report("revenue trends", &range).await;
//! println!("{}", bundle.to_markdown());
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod api;
pub mod chart;
pub mod config;
pub mod engine;
pub mod error;
pub mod generator;
pub mod ingestion;
pub mod prompts;
pub mod sql;
pub mod time_range;

pub use agents::{
    ArticleRecord, GeneratedQuery, NewsDigest, NewsRetrievalAgent, RetrievalMatch,
    SemanticFindings, SemanticRetrievalAgent, StructuredFindings, StructuredQueryAgent,
};
pub use config::{ResearchConfig, TableSchema};
pub use engine::{
    ReportBundle, ReportOrchestrator, ResearchOrchestrator, ResearchServices, StageFailure,
    StageOutcome,
};
pub use error::{ErrorKind, ResearchError, Result};
pub use generator::{LlmGenerator, ProviderEmbedder, TextGenerator};
pub use ingestion::{DocumentChunk, DocumentSegmenter, IngestReport, Ingestor};
pub use time_range::{Partition, Quarter, TimeRange};
