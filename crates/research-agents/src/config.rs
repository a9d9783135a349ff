//! Configuration for research operations

use crate::error::{ResearchError, Result};
use research_utils::{optional_env, parsed_env};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
    "nvidia.com",
    "investor.nvidia.com",
    "techcrunch.com",
    "theverge.com",
    "wired.com",
    "engadget.com",
    "arstechnica.com",
    "venturebeat.com",
    "cnet.com",
    "gizmodo.com",
    "finance.yahoo.com",
    "marketwatch.com",
    "wsj.com",
    "bloomberg.com",
    "reuters.com",
    "forbes.com",
    "businessinsider.com",
    "bbc.com",
    "cnn.com",
    "nytimes.com",
    "guardian.com",
    "tomshardware.com",
    "anandtech.com",
    "extremetech.com",
    "pcgamer.com",
];

/// One column of the tabular store, as described to the language model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: String,
    pub description: String,
}

/// Table the structured agent generates statements against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    /// Daily market data table with precomputed year and quarter columns
    pub fn daily_market_data(table: impl Into<String>) -> Self {
        let columns = [
            ("DATE", "TIMESTAMP_NTZ", "Timestamp of the record, one row per trading day"),
            ("OPEN", "FLOAT", "Opening price of the stock on that day"),
            ("DAILYCHANGE", "FLOAT", "Absolute price change compared to the previous day"),
            ("MA10", "FLOAT", "10-day moving average of the price"),
            ("HIGH", "FLOAT", "Highest price recorded on that day"),
            ("CLOSE", "FLOAT", "Closing price of the stock on that day"),
            ("RSI", "FLOAT", "Relative Strength Index (overbought/oversold indicator)"),
            ("VOLUME", "NUMBER", "Number of shares traded on that day"),
            ("DAILYCHANGEPERCENT", "FLOAT", "Percentage price change compared to the previous day"),
            ("TICKER", "TEXT", "Stock symbol"),
            ("DOLLARVOLUME", "FLOAT", "Total dollar volume traded (price times volume)"),
            ("LOW", "FLOAT", "Lowest price recorded on that day"),
            ("MA30", "FLOAT", "30-day moving average of the price"),
            ("VOLATILITY20D", "FLOAT", "20-day volatility of the price"),
            ("YEAR", "INT", "Year of the record"),
            ("QUARTER", "INT", "Quarter of the record (1-4)"),
        ];

        Self {
            table: table.into(),
            columns: columns
                .into_iter()
                .map(|(name, sql_type, description)| ColumnSpec {
                    name: name.to_string(),
                    sql_type: sql_type.to_string(),
                    description: description.to_string(),
                })
                .collect(),
        }
    }
}

/// Configuration for research operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Company the pipeline researches
    pub company: String,

    /// Query used for the general company news section; date filtering is
    /// skipped when the user query equals it
    pub general_news_query: String,

    /// Hosts whose articles are kept (suffix match on the URL host)
    pub allowed_domains: Vec<String>,

    /// Articles older than this many days are dropped
    pub recency_days: i64,

    /// Maximum articles kept per news query
    pub result_limit: usize,

    /// Raw results requested for the user query
    pub query_fetch_count: u32,

    /// Raw results requested for the general company query
    pub general_fetch_count: u32,

    /// Per-partition top-k by partition count; the last entry applies to
    /// every larger count
    pub quota_table: Vec<usize>,

    /// Target words per chunk; chunks over 1.5x are split in two
    pub ideal_word_count: usize,

    /// Sections with less content than this are merged with neighbours
    pub min_content_chars: usize,

    /// Bound on every outbound call
    pub request_timeout: Duration,

    /// Language model identifier
    pub model: String,

    /// Maximum tokens per generation
    pub max_tokens: usize,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Table description used for statement synthesis
    pub schema: TableSchema,

    /// Column plotted on the x axis
    pub time_column: String,

    /// Partition columns excluded from charts
    pub year_column: String,
    pub quarter_column: String,

    /// Object-store folder that chart runs are written under
    pub chart_prefix: String,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            company: "NVIDIA".to_string(),
            general_news_query: "NVIDIA".to_string(),
            allowed_domains: DEFAULT_ALLOWED_DOMAINS
                .iter()
                .map(|d| (*d).to_string())
                .collect(),
            recency_days: 90,
            result_limit: 5,
            query_fetch_count: 30,
            general_fetch_count: 25,
            quota_table: vec![20, 10, 7, 5],
            ideal_word_count: 500,
            min_content_chars: 200,
            request_timeout: Duration::from_secs(30),
            model: "gemini-1.5-pro-latest".to_string(),
            max_tokens: 4096,
            temperature: None,
            schema: TableSchema::daily_market_data("NVIDIA_FIN_DATA"),
            time_column: "DATE".to_string(),
            year_column: "YEAR".to_string(),
            quarter_column: "QUARTER".to_string(),
            chart_prefix: "charts".to_string(),
        }
    }
}

impl ResearchConfig {
    /// Create a new configuration builder
    pub fn builder() -> ResearchConfigBuilder {
        ResearchConfigBuilder::default()
    }

    /// Apply `RESEARCH_MODEL`, `RESEARCH_COMPANY` and `RESEARCH_TIMEOUT_SECS`
    pub fn with_env(mut self) -> Result<Self> {
        if let Some(model) = optional_env("RESEARCH_MODEL") {
            self.model = model;
        }
        if let Some(company) = optional_env("RESEARCH_COMPANY") {
            self.general_news_query.clone_from(&company);
            self.company = company;
        }
        if let Some(secs) = parsed_env::<u64>("RESEARCH_TIMEOUT_SECS")? {
            self.request_timeout = Duration::from_secs(secs);
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.company.trim().is_empty() {
            return Err(ResearchError::Config("company must not be empty".to_string()));
        }
        if self.quota_table.is_empty() || self.quota_table.contains(&0) {
            return Err(ResearchError::Config(
                "quota_table must be non-empty with positive entries".to_string(),
            ));
        }
        if self.result_limit == 0 {
            return Err(ResearchError::Config(
                "result_limit must be greater than 0".to_string(),
            ));
        }
        if self.ideal_word_count == 0 {
            return Err(ResearchError::Config(
                "ideal_word_count must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ResearchError::Config(
                "request_timeout must be greater than 0".to_string(),
            ));
        }
        if self.recency_days < 0 {
            return Err(ResearchError::Config(
                "recency_days must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-partition result quota for `partitions` partitions
    pub fn quota_for(&self, partitions: usize) -> usize {
        let last = self.quota_table.len().saturating_sub(1);
        let idx = partitions.saturating_sub(1).min(last);
        self.quota_table.get(idx).copied().unwrap_or(1)
    }

    /// Whether `column` is the time axis or a partition column
    pub fn is_axis_column(&self, column: &str) -> bool {
        [&self.time_column, &self.year_column, &self.quarter_column]
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }
}

/// Builder for ResearchConfig
#[derive(Debug, Default)]
pub struct ResearchConfigBuilder {
    company: Option<String>,
    general_news_query: Option<String>,
    allowed_domains: Option<Vec<String>>,
    recency_days: Option<i64>,
    result_limit: Option<usize>,
    quota_table: Option<Vec<usize>>,
    request_timeout: Option<Duration>,
    model: Option<String>,
    temperature: Option<f32>,
    schema: Option<TableSchema>,
    chart_prefix: Option<String>,
}

impl ResearchConfigBuilder {
    /// Set the company; also becomes the general news query unless one is set
    pub fn company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn general_news_query(mut self, query: impl Into<String>) -> Self {
        self.general_news_query = Some(query.into());
        self
    }

    pub fn allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = Some(domains);
        self
    }

    pub fn recency_days(mut self, days: i64) -> Self {
        self.recency_days = Some(days);
        self
    }

    pub fn result_limit(mut self, limit: usize) -> Self {
        self.result_limit = Some(limit);
        self
    }

    pub fn quota_table(mut self, table: Vec<usize>) -> Self {
        self.quota_table = Some(table);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn schema(mut self, schema: TableSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn chart_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.chart_prefix = Some(prefix.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ResearchConfig> {
        let defaults = ResearchConfig::default();
        let company = self.company.unwrap_or(defaults.company);

        let config = ResearchConfig {
            general_news_query: self.general_news_query.unwrap_or_else(|| company.clone()),
            company,
            allowed_domains: self.allowed_domains.unwrap_or(defaults.allowed_domains),
            recency_days: self.recency_days.unwrap_or(defaults.recency_days),
            result_limit: self.result_limit.unwrap_or(defaults.result_limit),
            quota_table: self.quota_table.unwrap_or(defaults.quota_table),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            model: self.model.unwrap_or(defaults.model),
            temperature: self.temperature.or(defaults.temperature),
            schema: self.schema.unwrap_or(defaults.schema),
            chart_prefix: self.chart_prefix.unwrap_or(defaults.chart_prefix),
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResearchConfig::default();
        assert_eq!(config.company, "NVIDIA");
        assert_eq!(config.allowed_domains.len(), 25);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_quota_table() {
        let config = ResearchConfig::default();
        let quotas: Vec<usize> = (1..=5).map(|n| config.quota_for(n)).collect();
        assert_eq!(quotas, vec![20, 10, 7, 5, 5]);
        assert_eq!(config.quota_for(12), 5);
    }

    #[test]
    fn test_config_builder() {
        let config = ResearchConfig::builder()
            .company("AMD")
            .result_limit(3)
            .request_timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        assert_eq!(config.company, "AMD");
        assert_eq!(config.general_news_query, "AMD");
        assert_eq!(config.result_limit, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.query_fetch_count, 30);
    }

    #[test]
    fn test_validation_rejects_bad_quota() {
        let result = ResearchConfig::builder().quota_table(vec![10, 0]).build();
        assert!(matches!(result, Err(ResearchError::Config(_))));

        let config = ResearchConfig {
            quota_table: Vec::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_axis_columns_case_insensitive() {
        let config = ResearchConfig::default();
        assert!(config.is_axis_column("Date"));
        assert!(config.is_axis_column("year"));
        assert!(config.is_axis_column("Quarter"));
        assert!(!config.is_axis_column("CLOSE"));
    }

    #[test]
    fn test_schema_lists_partition_columns() {
        let schema = TableSchema::daily_market_data("T");
        assert_eq!(schema.table, "T");
        assert!(schema.columns.iter().any(|c| c.name == "YEAR"));
        assert!(schema.columns.iter().any(|c| c.name == "QUARTER"));
    }
}
