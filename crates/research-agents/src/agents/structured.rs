//! Natural-language questions answered with SQL and line charts

use crate::api::{ObjectStore, QueryRows, StructuredStore, bounded};
use crate::chart::line_charts;
use crate::config::ResearchConfig;
use crate::error::{ResearchError, Result};
use crate::generator::TextGenerator;
use crate::prompts::{PromptSet, SqlPromptInput};
use crate::sql::{extract_statement, select_columns};
use crate::time_range::TimeRange;
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const SVG_CONTENT_TYPE: &str = "image/svg+xml";

/// A statement synthesized for a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub statement: String,
    pub question: String,
}

/// Outcome of the structured stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredFindings {
    pub query: GeneratedQuery,
    pub columns: Vec<String>,
    pub row_count: usize,
    /// Listing of the run folder, possibly empty
    pub chart_urls: Vec<String>,
}

/// Generates a statement, executes it and charts every metric column
pub struct StructuredQueryAgent {
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn StructuredStore>,
    objects: Arc<dyn ObjectStore>,
    prompts: PromptSet,
    config: Arc<ResearchConfig>,
}

impl StructuredQueryAgent {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn StructuredStore>,
        objects: Arc<dyn ObjectStore>,
        config: Arc<ResearchConfig>,
    ) -> Result<Self> {
        Ok(Self {
            generator,
            store,
            objects,
            prompts: PromptSet::new()?,
            config,
        })
    }

    /// Ask the model for one statement filtered to `range`
    #[instrument(skip(self, range))]
    pub async fn generate_query(&self, query: &str, range: &TimeRange) -> Result<GeneratedQuery> {
        if query.trim().is_empty() {
            return Err(ResearchError::EmptyInput("query must not be empty".to_string()));
        }
        if range.is_empty() {
            return Err(ResearchError::EmptyInput(
                "no time partitions specified".to_string(),
            ));
        }

        let prompt = self.prompts.sql_synthesis(&SqlPromptInput {
            company: &self.config.company,
            schema: &self.config.schema,
            question: query,
            range,
            time_column: &self.config.time_column,
            year_column: &self.config.year_column,
            quarter_column: &self.config.quarter_column,
        })?;
        let text = bounded(
            "language-model",
            self.config.request_timeout,
            self.generator.generate(&prompt),
        )
        .await?;

        let statement = extract_statement(&text).ok_or(ResearchError::NoStatementFound)?;
        debug!(statement, "Statement extracted");
        Ok(GeneratedQuery {
            statement: statement.to_string(),
            question: query.to_string(),
        })
    }

    /// Chart URLs for `query` over `range`
    pub async fn run(&self, query: &str, range: &TimeRange) -> Result<Vec<String>> {
        Ok(self.research(query, range).await?.chart_urls)
    }

    /// Generate, execute and chart, keeping the intermediate details
    #[instrument(skip(self, range))]
    pub async fn research(&self, query: &str, range: &TimeRange) -> Result<StructuredFindings> {
        let generated = self.generate_query(query, range).await?;
        let rows = bounded(
            "structured-store",
            self.config.request_timeout,
            self.store.execute(&generated.statement),
        )
        .await?;

        let columns = resolve_columns(&generated.statement, &rows);
        let chart_urls = self.publish_charts(&columns, &rows.rows).await?;
        info!(
            rows = rows.rows.len(),
            charts = chart_urls.len(),
            "Structured query complete"
        );

        Ok(StructuredFindings {
            query: generated,
            columns,
            row_count: rows.rows.len(),
            chart_urls,
        })
    }

    async fn publish_charts(
        &self,
        columns: &[String],
        rows: &[Vec<serde_json::Value>],
    ) -> Result<Vec<String>> {
        let charts = line_charts(columns, rows, &self.config);
        if charts.is_empty() {
            debug!("No chartable columns");
            return Ok(Vec::new());
        }

        let folder = self.run_folder();
        let mut uploads = Vec::with_capacity(charts.len());
        for chart in &charts {
            let svg = chart.render_svg()?;
            uploads.push((format!("{folder}/{}", chart.file_name()), svg.into_bytes()));
        }

        let limit = self.config.request_timeout;
        let results = join_all(uploads.into_iter().map(|(key, bytes)| async move {
            bounded(
                "object-store",
                limit,
                self.objects.put(&key, bytes, SVG_CONTENT_TYPE),
            )
            .await
        }))
        .await;
        for result in results {
            result?;
        }

        bounded("object-store", limit, self.objects.list_urls(&folder)).await
    }

    /// `<prefix>/<UTC timestamp>-<8 hex>`
    fn run_folder(&self) -> String {
        let run_id = Uuid::new_v4().simple().to_string();
        format!(
            "{}/{}-{}",
            self.config.chart_prefix.trim_end_matches('/'),
            Utc::now().format("%Y%m%dT%H%M%SZ"),
            &run_id[..8]
        )
    }
}

/// Output names from the select list, or the store's when the counts differ
fn resolve_columns(statement: &str, rows: &QueryRows) -> Vec<String> {
    let width = rows
        .rows
        .first()
        .map_or(rows.column_names.len(), Vec::len);
    match select_columns(statement) {
        Some(parsed) if parsed.len() == width => parsed,
        parsed => {
            warn!(
                parsed = parsed.as_ref().map_or(0, Vec::len),
                width, "Select list does not match result width, using store column names"
            );
            rows.column_names.clone()
        }
    }
}
