//! Recent company news from web search
//!
//! Raw search hits go through a domain allow-list, a recency window (skipped
//! for the general company query), a newest-first sort and truncation before
//! being rendered as markdown.

use crate::api::{NewsSearch, RawArticle, bounded};
use crate::config::ResearchConfig;
use crate::error::{ResearchError, Result};
use crate::generator::TextGenerator;
use crate::prompts::PromptSet;
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

const DATE_FORMATS: &[&str] = &["%b %d, %Y", "%B %d, %Y", "%Y-%m-%d"];

/// A curated news article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub source: Option<String>,
    pub link: String,
    pub published_date: Option<NaiveDate>,
    /// Date text as the search returned it
    pub raw_date: Option<String>,
    pub snippet: Option<String>,
}

impl From<RawArticle> for ArticleRecord {
    fn from(raw: RawArticle) -> Self {
        let published_date = raw.date.as_deref().and_then(parse_published);
        Self {
            title: raw.title,
            source: raw.source,
            link: raw.link,
            published_date,
            raw_date: raw.date,
            snippet: raw.snippet,
        }
    }
}

/// News for the user query and for the company in general
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsDigest {
    pub summary: String,
    pub markdown: String,
    pub query_articles: Vec<ArticleRecord>,
    pub general_articles: Vec<ArticleRecord>,
}

/// First of the known date formats that parses
pub fn parse_published(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

pub struct NewsRetrievalAgent {
    search: Arc<dyn NewsSearch>,
    generator: Arc<dyn TextGenerator>,
    prompts: PromptSet,
    config: Arc<ResearchConfig>,
    today: Option<NaiveDate>,
}

impl NewsRetrievalAgent {
    pub fn new(
        search: Arc<dyn NewsSearch>,
        generator: Arc<dyn TextGenerator>,
        config: Arc<ResearchConfig>,
    ) -> Result<Self> {
        Ok(Self {
            search,
            generator,
            prompts: PromptSet::new()?,
            config,
            today: None,
        })
    }

    /// Pin the reference date for the recency window
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Search for `query`, requesting `count` raw hits, then curate them
    #[instrument(skip(self))]
    pub async fn retrieve(&self, query: &str, count: u32) -> Result<Vec<ArticleRecord>> {
        if query.trim().is_empty() {
            return Err(ResearchError::EmptyInput("query must not be empty".to_string()));
        }
        let raw = bounded(
            "news-search",
            self.config.request_timeout,
            self.search.search(query, count),
        )
        .await?;
        let fetched = raw.len();
        let articles = self.curate(raw, query);
        debug!(fetched, kept = articles.len(), "News curated");
        Ok(articles)
    }

    /// Filter, sort and truncate raw hits
    pub fn curate(&self, raw: Vec<RawArticle>, query: &str) -> Vec<ArticleRecord> {
        let general = self.is_general_query(query);
        let cutoff = self.today() - Duration::days(self.config.recency_days);

        let mut articles: Vec<ArticleRecord> = raw
            .into_iter()
            .filter(|a| self.is_allowed(&a.link))
            .map(ArticleRecord::from)
            .filter(|a| general || a.published_date.is_some_and(|d| d >= cutoff))
            .collect();

        // Newest first; `None` orders below every date
        articles.sort_by(|a, b| b.published_date.cmp(&a.published_date));
        articles.truncate(self.config.result_limit);
        articles
    }

    fn is_general_query(&self, query: &str) -> bool {
        query
            .trim()
            .eq_ignore_ascii_case(self.config.general_news_query.trim())
    }

    /// Whether the link's host is an allow-listed domain or a subdomain of one
    pub fn is_allowed(&self, link: &str) -> bool {
        let Some(host) = Url::parse(link)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        else {
            return false;
        };
        self.config.allowed_domains.iter().any(|domain| {
            let domain = domain.to_ascii_lowercase();
            host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        })
    }

    /// Markdown block per article
    pub fn render_markdown(articles: &[ArticleRecord]) -> String {
        if articles.is_empty() {
            return "_No recent articles found._\n\n".to_string();
        }
        let mut out = String::new();
        for article in articles {
            out.push_str(&format!("##### {}\n", article.title));
            if let Some(snippet) = article.snippet.as_deref().filter(|s| !s.trim().is_empty()) {
                out.push_str(&format!("> {}\n", snippet.trim()));
            }
            out.push('\n');
            out.push_str(&format!(
                "**Source:** {} | **Published:** {}\n",
                article.source.as_deref().unwrap_or("Unknown"),
                article.raw_date.as_deref().unwrap_or("Unknown"),
            ));
            out.push_str(&format!("[Read more]({})\n\n---\n\n", article.link));
        }
        out
    }

    /// Query-specific and general news, rendered and summarized
    #[instrument(skip(self))]
    pub async fn digest(&self, query: &str) -> Result<NewsDigest> {
        let (specific, general) = tokio::join!(
            self.retrieve(query, self.config.query_fetch_count),
            self.retrieve(&self.config.general_news_query, self.config.general_fetch_count),
        );

        let (specific, general) = match (specific, general) {
            (Err(first), Err(second)) => {
                warn!(query_error = %first, general_error = %second, "Both news fetches failed");
                if matches!(first, ResearchError::UpstreamUnavailable { .. }) {
                    return Err(first);
                }
                return Err(ResearchError::upstream("news-search", first));
            }
            pair => pair,
        };

        let mut markdown = String::new();
        markdown.push_str(&format!("## News about \"{}\"\n\n", query.trim()));
        let query_articles = Self::section(&mut markdown, specific);
        markdown.push_str(&format!("## General {} news\n\n", self.config.company));
        let general_articles = Self::section(&mut markdown, general);

        let prompt = self
            .prompts
            .news_summary(&self.config.company, query, &markdown)?;
        let summary = bounded(
            "language-model",
            self.config.request_timeout,
            self.generator.generate(&prompt),
        )
        .await?;

        info!(
            query_articles = query_articles.len(),
            general_articles = general_articles.len(),
            "News digest complete"
        );
        Ok(NewsDigest {
            summary,
            markdown,
            query_articles,
            general_articles,
        })
    }

    fn section(
        markdown: &mut String,
        fetched: Result<Vec<ArticleRecord>>,
    ) -> Vec<ArticleRecord> {
        match fetched {
            Ok(articles) => {
                markdown.push_str(&Self::render_markdown(&articles));
                articles
            }
            Err(e) => {
                warn!(error = %e, "News fetch failed");
                markdown.push_str(&format!("_News unavailable: {e}_\n\n"));
                Vec::new()
            }
        }
    }
}
