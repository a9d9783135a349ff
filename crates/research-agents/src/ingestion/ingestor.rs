//! Document ingestion into the vector index

use crate::api::{Embedder, VectorIndex, VectorRecord, bounded};
use crate::config::ResearchConfig;
use crate::error::{ResearchError, Result};
use crate::time_range::Quarter;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use super::segmenter::{DocumentChunk, DocumentSegmenter};

const EMBED_CONCURRENCY: usize = 8;

/// Summary of one ingested document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub source: String,
    pub year: i32,
    pub quarter: Quarter,
    pub chunks: usize,
    pub upserted: usize,
    /// Chunks with no text besides whitespace
    pub skipped: usize,
}

/// Segments documents, embeds each chunk and upserts it under its partition
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    segmenter: DocumentSegmenter,
    timeout: Duration,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: &ResearchConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            segmenter: DocumentSegmenter::from_config(config),
            timeout: config.request_timeout,
        }
    }

    #[instrument(skip(self, markdown), fields(bytes = markdown.len()))]
    pub async fn ingest(
        &self,
        markdown: &str,
        year: i32,
        quarter: Quarter,
        source: &str,
    ) -> Result<IngestReport> {
        let source = source.trim();
        if source.is_empty() {
            return Err(ResearchError::EmptyInput("source must not be empty".to_string()));
        }
        let chunks = self.segmenter.segment(markdown);
        let indexed: Vec<(usize, DocumentChunk)> = chunks
            .iter()
            .cloned()
            .enumerate()
            .filter(|(_, chunk)| !chunk.content.trim().is_empty())
            .collect();
        if indexed.is_empty() {
            return Err(ResearchError::EmptyInput(
                "document has no content".to_string(),
            ));
        }
        let skipped = chunks.len() - indexed.len();

        let records: Vec<VectorRecord> = stream::iter(indexed)
            .map(|(n, chunk)| async move {
                let values = bounded(
                    "embedder",
                    self.timeout,
                    self.embedder.embed(chunk.content.trim()),
                )
                .await?;
                Ok::<_, ResearchError>(VectorRecord {
                    id: format!("{source}-{year}-q{quarter}-{n}"),
                    values,
                    metadata: chunk_metadata(&chunk, year, quarter, source),
                })
            })
            .buffered(EMBED_CONCURRENCY)
            .try_collect()
            .await?;

        let upserted = bounded("vector-index", self.timeout, self.index.upsert(records)).await?;
        info!(chunks = chunks.len(), upserted, skipped, "Document ingested");

        Ok(IngestReport {
            source: source.to_string(),
            year,
            quarter,
            chunks: chunks.len(),
            upserted,
            skipped,
        })
    }
}

/// Year and quarter are stored as strings to match the query filter
fn chunk_metadata(
    chunk: &DocumentChunk,
    year: i32,
    quarter: Quarter,
    source: &str,
) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("text".into(), Value::String(chunk.content.trim().to_string()));
    metadata.insert("year".into(), Value::String(year.to_string()));
    metadata.insert("quarter".into(), Value::String(quarter.to_string()));
    metadata.insert("source".into(), Value::String(source.to_string()));
    if let Some(header) = &chunk.header {
        metadata.insert("header".into(), Value::String(header.clone()));
    }
    if let Some(part) = chunk.part {
        metadata.insert("part".into(), Value::from(part));
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{IndexMatch, MockEmbedder, MockVectorIndex};
    use crate::time_range::Partition;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingIndex {
        records: Mutex<Vec<VectorRecord>>,
    }

    #[async_trait]
    impl VectorIndex for CapturingIndex {
        async fn query(
            &self,
            _vector: &[f32],
            _filter: Partition,
            _top_k: usize,
        ) -> Result<Vec<IndexMatch>> {
            Ok(vec![])
        }

        async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize> {
            let n = records.len();
            self.records.lock().unwrap().extend(records);
            Ok(n)
        }
    }

    fn embedder() -> Arc<dyn Embedder> {
        let mut mock = MockEmbedder::new();
        mock.expect_embed()
            .returning(|text| Ok(vec![text.len() as f32, 1.0]));
        Arc::new(mock)
    }

    fn q(n: u8) -> Quarter {
        Quarter::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_ids_and_metadata() {
        let index = Arc::new(CapturingIndex::default());
        let ingestor = Ingestor::new(embedder(), index.clone(), &ResearchConfig::default());
        let doc = format!("# Revenue\n{}\n# Outlook\n{}\n", "r".repeat(300), "o".repeat(300));

        let report = ingestor.ingest(&doc, 2023, q(1), "nvda-10q").await.unwrap();
        assert_eq!(report.chunks, 2);
        assert_eq!(report.upserted, 2);
        assert_eq!(report.skipped, 0);

        let records = index.records.lock().unwrap();
        assert_eq!(records[0].id, "nvda-10q-2023-q1-0");
        assert_eq!(records[1].id, "nvda-10q-2023-q1-1");

        let meta = &records[1].metadata;
        assert_eq!(meta["year"], "2023");
        assert_eq!(meta["quarter"], "1");
        assert_eq!(meta["header"], "# Outlook");
        assert_eq!(meta["source"], "nvda-10q");
        assert!(meta["text"].as_str().unwrap().starts_with("# Outlook"));
        assert!(meta.get("part").is_none());
    }

    #[tokio::test]
    async fn test_split_chunks_carry_part() {
        let index = Arc::new(CapturingIndex::default());
        let ingestor = Ingestor::new(embedder(), index.clone(), &ResearchConfig::default());
        let doc = format!("# Results\n{}", vec!["growth"; 900].join(" "));

        ingestor.ingest(&doc, 2024, q(2), "call").await.unwrap();

        let records = index.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].metadata["part"], 1);
        assert_eq!(records[1].metadata["part"], 2);
        assert_eq!(records[1].metadata["header"], "# Results");
    }

    #[tokio::test]
    async fn test_empty_document_and_source_rejected() {
        let mut embedder = MockEmbedder::new();
        embedder.expect_embed().times(0);
        let mut index = MockVectorIndex::new();
        index.expect_upsert().times(0);
        let ingestor = Ingestor::new(
            Arc::new(embedder),
            Arc::new(index),
            &ResearchConfig::default(),
        );

        assert!(matches!(
            ingestor.ingest("   \n", 2023, q(1), "doc").await,
            Err(ResearchError::EmptyInput(_))
        ));
        assert!(matches!(
            ingestor.ingest("# A\ntext", 2023, q(1), " ").await,
            Err(ResearchError::EmptyInput(_))
        ));
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_before_upsert() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .returning(|_| Err(ResearchError::upstream("embedder", "401")));
        let mut index = MockVectorIndex::new();
        index.expect_upsert().times(0);
        let ingestor = Ingestor::new(
            Arc::new(embedder),
            Arc::new(index),
            &ResearchConfig::default(),
        );

        let err = ingestor.ingest("# A\ntext", 2023, q(1), "doc").await.unwrap_err();
        assert!(matches!(err, ResearchError::UpstreamUnavailable { .. }));
    }
}
