//! Semantic retrieval over the partitioned vector index

use crate::api::{Embedder, IndexMatch, VectorIndex, bounded};
use crate::config::ResearchConfig;
use crate::error::{ResearchError, Result};
use crate::generator::TextGenerator;
use crate::prompts::PromptSet;
use crate::time_range::{Partition, Quarter, TimeRange};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// One indexed chunk returned for a partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMatch {
    pub text: String,
    pub year: i32,
    pub quarter: Quarter,
    pub score: f32,
}

impl RetrievalMatch {
    fn from_hit(hit: IndexMatch, partition: Partition) -> Option<Self> {
        let text = hit.text()?.to_string();
        Some(Self {
            text,
            year: partition.year,
            quarter: partition.quarter,
            score: hit.score,
        })
    }

    /// `Year: Y, Quarter: Q - text`
    pub fn context_line(&self) -> String {
        format!("Year: {}, Quarter: {} - {}", self.year, self.quarter, self.text)
    }
}

/// Matches plus the optional per-quarter analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticFindings {
    pub matches: Vec<RetrievalMatch>,
    pub analysis: Option<String>,
}

/// Queries the vector index once per (year, quarter) partition
pub struct SemanticRetrievalAgent {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn TextGenerator>,
    prompts: PromptSet,
    config: Arc<ResearchConfig>,
}

impl SemanticRetrievalAgent {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn TextGenerator>,
        config: Arc<ResearchConfig>,
    ) -> Result<Self> {
        Ok(Self {
            embedder,
            index,
            generator,
            prompts: PromptSet::new()?,
            config,
        })
    }

    /// Top matches for `query` in every partition of `range`
    ///
    /// Each partition gets the quota for the partition count. Results keep
    /// the index's order within a partition and the range's order across
    /// partitions. A failing partition is skipped; only when all fail is the
    /// first failure returned.
    #[instrument(skip(self, range), fields(partitions = range.len()))]
    pub async fn retrieve(&self, query: &str, range: &TimeRange) -> Result<Vec<RetrievalMatch>> {
        if query.trim().is_empty() {
            return Err(ResearchError::EmptyInput("query must not be empty".to_string()));
        }
        let partitions = range.partitions();
        if partitions.is_empty() {
            return Err(ResearchError::EmptyInput(
                "no time partitions specified".to_string(),
            ));
        }

        let top_k = self.config.quota_for(partitions.len());
        let limit = self.config.request_timeout;
        let vector = bounded("embedder", limit, self.embedder.embed(query)).await?;

        let outcomes = join_all(partitions.iter().map(|partition| {
            bounded(
                "vector-index",
                limit,
                self.index.query(&vector, *partition, top_k),
            )
        }))
        .await;

        let mut matches = Vec::new();
        let mut first_failure = None;
        let mut failed = 0;
        for (partition, outcome) in partitions.iter().zip(outcomes) {
            match outcome {
                Ok(hits) => {
                    debug!(%partition, hits = hits.len(), "Partition queried");
                    matches.extend(
                        hits.into_iter()
                            .filter_map(|hit| RetrievalMatch::from_hit(hit, *partition)),
                    );
                }
                Err(e) => {
                    warn!(%partition, error = %e, "Partition query failed, skipping");
                    failed += 1;
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }
        }

        if failed == partitions.len() {
            if let Some(err) = first_failure {
                if matches!(err, ResearchError::UpstreamUnavailable { .. }) {
                    return Err(err);
                }
                return Err(ResearchError::upstream("vector-index", err));
            }
        }
        if matches.is_empty() {
            return Err(ResearchError::NoMatches("no relevant matches".to_string()));
        }

        info!(matches = matches.len(), top_k, "Semantic retrieval complete");
        Ok(matches)
    }

    /// Per-quarter analysis of `matches` for `query`
    #[instrument(skip(self, matches), fields(matches = matches.len()))]
    pub async fn analyze(&self, query: &str, matches: &[RetrievalMatch]) -> Result<String> {
        let context: Vec<String> = matches.iter().map(RetrievalMatch::context_line).collect();
        let prompt = self.prompts.quarter_analysis(
            &self.config.company,
            query,
            &context,
            self.config.ideal_word_count,
        )?;
        bounded(
            "language-model",
            self.config.request_timeout,
            self.generator.generate(&prompt),
        )
        .await
    }

    /// Retrieve, then analyse; a failed analysis leaves `analysis` empty
    pub async fn research(&self, query: &str, range: &TimeRange) -> Result<SemanticFindings> {
        let matches = self.retrieve(query, range).await?;
        let analysis = match self.analyze(query, &matches).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "Quarter analysis failed");
                None
            }
        };
        Ok(SemanticFindings { matches, analysis })
    }
}
