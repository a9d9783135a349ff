//! Concurrent fan-out over the three retrieval agents

use crate::agents::{NewsRetrievalAgent, SemanticRetrievalAgent, StructuredQueryAgent};
use crate::api::{Embedder, NewsSearch, ObjectStore, StructuredStore, VectorIndex};
use crate::config::ResearchConfig;
use crate::error::Result;
use crate::generator::TextGenerator;
use crate::time_range::TimeRange;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};

use super::result::{ReportBundle, StageOutcome};

/// Produces a report bundle for a question over a time range
#[async_trait]
pub trait ReportOrchestrator: Send + Sync {
    /// Never fails as a whole; each stage's error is captured in the bundle
    async fn generate_report(&self, query: &str, range: &TimeRange) -> ReportBundle;
}

/// Service handles the agents are built from
#[derive(Clone)]
pub struct ResearchServices {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub generator: Arc<dyn TextGenerator>,
    pub store: Arc<dyn StructuredStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub news: Arc<dyn NewsSearch>,
}

/// Runs semantic, structured and news retrieval concurrently
pub struct ResearchOrchestrator {
    semantic: SemanticRetrievalAgent,
    structured: StructuredQueryAgent,
    news: NewsRetrievalAgent,
}

impl ResearchOrchestrator {
    pub fn new(
        semantic: SemanticRetrievalAgent,
        structured: StructuredQueryAgent,
        news: NewsRetrievalAgent,
    ) -> Self {
        Self {
            semantic,
            structured,
            news,
        }
    }

    /// Build all three agents over shared service handles
    pub fn from_services(services: ResearchServices, config: Arc<ResearchConfig>) -> Result<Self> {
        let semantic = SemanticRetrievalAgent::new(
            services.embedder,
            services.index,
            Arc::clone(&services.generator),
            Arc::clone(&config),
        )?;
        let structured = StructuredQueryAgent::new(
            Arc::clone(&services.generator),
            services.store,
            services.objects,
            Arc::clone(&config),
        )?;
        let news = NewsRetrievalAgent::new(services.news, services.generator, config)?;
        Ok(Self::new(semantic, structured, news))
    }

    pub fn news(&self) -> &NewsRetrievalAgent {
        &self.news
    }
}

#[async_trait]
impl ReportOrchestrator for ResearchOrchestrator {
    #[instrument(skip(self, range), fields(range = %range))]
    async fn generate_report(&self, query: &str, range: &TimeRange) -> ReportBundle {
        let (semantic, structured, news) = tokio::join!(
            self.semantic.research(query, range),
            self.structured.research(query, range),
            self.news.digest(query),
        );

        let bundle = ReportBundle {
            query: query.to_string(),
            range: range.clone(),
            semantic: StageOutcome::from_result(semantic),
            structured: StageOutcome::from_result(structured),
            news: StageOutcome::from_result(news),
            generated_at: Utc::now(),
        };
        info!(
            semantic = bundle.semantic.is_success(),
            structured = bundle.structured.is_success(),
            news = bundle.news.is_success(),
            "Report generated"
        );
        bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        IndexMatch, MockEmbedder, MockNewsSearch, MockStructuredStore, QueryRows, RawArticle,
        VectorRecord,
    };
    use crate::error::{ErrorKind, ResearchError};
    use crate::time_range::Partition;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::Mutex;

    struct OneHitIndex;

    #[async_trait]
    impl VectorIndex for OneHitIndex {
        async fn query(
            &self,
            _vector: &[f32],
            filter: Partition,
            _top_k: usize,
        ) -> Result<Vec<IndexMatch>> {
            let mut metadata = serde_json::Map::new();
            metadata.insert("text".into(), format!("Revenue in {filter}").into());
            Ok(vec![IndexMatch {
                id: filter.to_string(),
                score: 0.8,
                metadata,
            }])
        }

        async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize> {
            Ok(records.len())
        }
    }

    /// Answers by prompt kind, like a model following its instructions
    struct ScriptedGenerator;

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            if prompt.contains("You write SQL") {
                Ok("```sql\nSELECT DATE, CLOSE, YEAR, QUARTER FROM NVIDIA_FIN_DATA WHERE YEAR = 2023 AND QUARTER IN (1, 4);\n```".to_string())
            } else if prompt.contains("Summarise the recent news") {
                Ok("News summary.".to_string())
            } else {
                Ok("Quarter analysis.".to_string())
            }
        }
    }

    #[derive(Default)]
    struct MemoryObjects {
        keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStore for MemoryObjects {
        async fn put(&self, key: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<String> {
            self.keys.lock().unwrap().push(key.to_string());
            Ok(format!("https://bucket.test/{key}"))
        }

        async fn list_urls(&self, prefix: &str) -> Result<Vec<String>> {
            Ok(self
                .keys
                .lock()
                .unwrap()
                .iter()
                .filter(|k| k.starts_with(prefix))
                .map(|k| format!("https://bucket.test/{k}"))
                .collect())
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
    }

    fn services(store: MockStructuredStore) -> ResearchServices {
        let mut embedder = MockEmbedder::new();
        embedder.expect_embed().returning(|_| Ok(vec![0.5; 8]));

        let mut news = MockNewsSearch::new();
        news.expect_search().returning(|query, _| {
            Ok(vec![RawArticle {
                title: format!("{query} headline"),
                source: Some("Reuters".to_string()),
                link: "https://www.reuters.com/technology/x".to_string(),
                date: Some("Dec 20, 2024".to_string()),
                snippet: None,
            }])
        });

        ResearchServices {
            embedder: Arc::new(embedder),
            index: Arc::new(OneHitIndex),
            generator: Arc::new(ScriptedGenerator),
            store: Arc::new(store),
            objects: Arc::new(MemoryObjects::default()),
            news: Arc::new(news),
        }
    }

    fn orchestrator(services: ResearchServices) -> ResearchOrchestrator {
        let config = Arc::new(ResearchConfig::default());
        let semantic = SemanticRetrievalAgent::new(
            services.embedder,
            services.index,
            Arc::clone(&services.generator),
            Arc::clone(&config),
        )
        .unwrap();
        let structured = StructuredQueryAgent::new(
            Arc::clone(&services.generator),
            services.store,
            services.objects,
            Arc::clone(&config),
        )
        .unwrap();
        let news = NewsRetrievalAgent::new(services.news, services.generator, config)
            .unwrap()
            .with_today(today());
        ResearchOrchestrator::new(semantic, structured, news)
    }

    fn price_store() -> MockStructuredStore {
        let mut store = MockStructuredStore::new();
        store.expect_execute().returning(|_| {
            Ok(QueryRows {
                column_names: vec!["DATE".into(), "CLOSE".into(), "YEAR".into(), "QUARTER".into()],
                rows: vec![
                    vec![json!("2023-01-03"), json!(14.3), json!(2023), json!(1)],
                    vec![json!("2023-10-02"), json!(44.7), json!(2023), json!(4)],
                ],
            })
        });
        store
    }

    #[tokio::test]
    async fn test_generate_report_end_to_end() {
        let orchestrator = orchestrator(services(price_store()));
        let range = TimeRange::from_pairs([(2023, 1), (2023, 4)]).unwrap();

        let bundle = orchestrator.generate_report("revenue trends", &range).await;

        let semantic = bundle.semantic.data().unwrap();
        assert_eq!(semantic.matches.len(), 2);
        assert_eq!(semantic.matches[0].text, "Revenue in 2023-Q1");
        assert_eq!(semantic.analysis.as_deref(), Some("Quarter analysis."));

        let structured = bundle.structured.data().unwrap();
        assert_eq!(structured.chart_urls.len(), 1);
        assert!(structured.chart_urls[0].ends_with("/CLOSE.svg"));

        let news = bundle.news.data().unwrap();
        assert_eq!(news.summary, "News summary.");
        assert!(news.markdown.contains("## News about \"revenue trends\""));
        assert!(news.markdown.contains("## General NVIDIA news"));
        assert_eq!(news.query_articles[0].title, "revenue trends headline");

        assert_eq!(bundle.range, range);
        assert!(!bundle.is_empty());
    }

    #[tokio::test]
    async fn test_stage_failure_does_not_cancel_others() {
        let mut store = MockStructuredStore::new();
        store
            .expect_execute()
            .returning(|_| Err(ResearchError::ExecutionFailed("warehouse suspended".to_string())));
        let orchestrator = orchestrator(services(store));
        let range: TimeRange = "2023:1".parse().unwrap();

        let bundle = orchestrator.generate_report("revenue trends", &range).await;

        let failure = bundle.structured.failure().unwrap();
        assert_eq!(failure.kind, ErrorKind::ExecutionFailed);
        assert!(failure.message.contains("warehouse suspended"));
        assert!(bundle.semantic.is_success());
        assert!(bundle.news.is_success());
    }

    #[tokio::test]
    async fn test_empty_range_fails_range_stages_only() {
        let orchestrator = orchestrator(services(MockStructuredStore::new()));

        let bundle = orchestrator
            .generate_report("revenue trends", &TimeRange::new())
            .await;

        assert_eq!(bundle.semantic.failure().unwrap().kind, ErrorKind::EmptyInput);
        assert_eq!(bundle.structured.failure().unwrap().kind, ErrorKind::EmptyInput);
        assert!(bundle.news.is_success());
    }
}
