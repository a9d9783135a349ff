//! Command-line interface for the company research pipeline
//!
//! # Usage
//!
//! ```bash
//! # Full report over two quarters
//! research report "revenue trends" --range "2023:1,4"
//!
//! # Curated news only
//! research news "export restrictions"
//!
//! # Preview how a filing would be chunked, then index it
//! research segment filings/2023_Q1.md
//! research ingest filings/2023_Q1.md --year 2023 --quarter 1
//! ```
//!
//! Credentials are read from the environment: `GEMINI_API_KEY` or
//! `OPENAI_API_KEY`, `PINECONE_*`, `SNOWFLAKE_*`, `AWS_*` and
//! `SERPAPI_API_KEY`.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use research_agents::api::{PineconeIndex, S3Store, SerpApiClient, SnowflakeClient};
use research_agents::{
    ArticleRecord, DocumentSegmenter, Ingestor, LlmGenerator, NewsRetrievalAgent,
    ProviderEmbedder, Quarter, ReportOrchestrator, ResearchConfig, ResearchOrchestrator,
    ResearchServices, TextGenerator, TimeRange,
};
use research_llm::LLMProvider;
use research_llm::providers::{GeminiProvider, OpenAIEmbedder, OpenAIProvider};
use research_utils::{LogFormat, init_tracing_with, optional_env};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "research")]
#[command(about = "Company research reports from filings, market data and news", long_about = None)]
struct Args {
    /// Log output format (pretty or json)
    #[arg(long, global = true, default_value = "pretty")]
    log_format: LogFormat,

    /// Language model provider
    #[arg(long, global = true, value_enum, default_value_t = ProviderKind::Gemini)]
    provider: ProviderKind,

    /// Model identifier; defaults to RESEARCH_MODEL or the provider's default
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run semantic, structured and news retrieval and print the report
    Report {
        query: String,
        /// Periods as `YEAR:Q,Q;YEAR:Q`, e.g. `2023:1,4;2024:2`
        #[arg(long)]
        range: TimeRange,
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
    },
    /// Fetch and summarize recent news
    News {
        query: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
    },
    /// Print the chunks a markdown file would be indexed as
    Segment { file: PathBuf },
    /// Segment, embed and upsert a markdown file into the vector index
    Ingest {
        file: PathBuf,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        quarter: Quarter,
        /// Id prefix for the records; defaults to the file stem
        #[arg(long)]
        source: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProviderKind {
    Gemini,
    Openai,
}

impl ProviderKind {
    fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-1.5-pro-latest",
            Self::Openai => "gpt-4o-mini",
        }
    }

    fn build(self) -> anyhow::Result<Arc<dyn LLMProvider>> {
        let provider: Arc<dyn LLMProvider> = match self {
            Self::Gemini => Arc::new(GeminiProvider::from_env()?),
            Self::Openai => Arc::new(OpenAIProvider::from_env()?),
        };
        Ok(provider)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
    /// Article table (news only)
    Table,
}

fn load_config(args: &Args) -> anyhow::Result<Arc<ResearchConfig>> {
    let mut config = ResearchConfig::default().with_env()?;
    config.model = args
        .model
        .clone()
        .or_else(|| optional_env("RESEARCH_MODEL"))
        .unwrap_or_else(|| args.provider.default_model().to_string());
    config.validate()?;
    Ok(Arc::new(config))
}

fn generator(args: &Args, config: &ResearchConfig) -> anyhow::Result<Arc<dyn TextGenerator>> {
    Ok(Arc::new(LlmGenerator::new(args.provider.build()?, config)))
}

fn embedder() -> anyhow::Result<Arc<ProviderEmbedder>> {
    Ok(Arc::new(ProviderEmbedder::new(Arc::new(OpenAIEmbedder::from_env()?))))
}

fn services(args: &Args, config: &ResearchConfig) -> anyhow::Result<ResearchServices> {
    let timeout = config.request_timeout;
    Ok(ResearchServices {
        embedder: embedder()?,
        index: Arc::new(PineconeIndex::from_env(timeout)?),
        generator: generator(args, config)?,
        store: Arc::new(SnowflakeClient::from_env(timeout)?),
        objects: Arc::new(S3Store::from_env(timeout)?),
        news: Arc::new(SerpApiClient::from_env(timeout)?),
    })
}

fn article_table(title: &str, articles: &[ArticleRecord]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![title, "Published", "Source", "Link"]);
    for article in articles {
        table.add_row(vec![
            article.title.clone(),
            article
                .published_date
                .map_or_else(|| "-".to_string(), |d| d.to_string()),
            article.source.clone().unwrap_or_else(|| "-".to_string()),
            article.link.clone(),
        ]);
    }
    table
}

fn read_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing_with(args.log_format);

    match &args.command {
        Command::Report {
            query,
            range,
            format,
        } => {
            let config = load_config(&args)?;
            let orchestrator =
                ResearchOrchestrator::from_services(services(&args, &config)?, config)?;
            info!(%range, "Generating report");

            let bundle = orchestrator.generate_report(query, range).await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&bundle)?),
                OutputFormat::Markdown | OutputFormat::Table => {
                    println!("{}", bundle.to_markdown());
                }
            }
            if bundle.is_empty() {
                anyhow::bail!("every research stage failed");
            }
        }
        Command::News { query, format } => {
            let config = load_config(&args)?;
            let search = Arc::new(SerpApiClient::from_env(config.request_timeout)?);
            let agent =
                NewsRetrievalAgent::new(search, generator(&args, &config)?, Arc::clone(&config))?;

            let digest = agent.digest(query).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&digest)?),
                OutputFormat::Markdown => println!("{}\n\n{}", digest.summary, digest.markdown),
                OutputFormat::Table => {
                    println!("{}\n", digest.summary);
                    println!("{}", article_table(query, &digest.query_articles));
                    println!(
                        "{}",
                        article_table(&config.general_news_query, &digest.general_articles)
                    );
                }
            }
        }
        Command::Segment { file } => {
            let text = read_file(file)?;
            let config = ResearchConfig::default().with_env()?;
            let chunks = DocumentSegmenter::from_config(&config).segment(&text);
            println!("{}", serde_json::to_string_pretty(&chunks)?);
        }
        Command::Ingest {
            file,
            year,
            quarter,
            source,
        } => {
            let text = read_file(file)?;
            let source = source
                .clone()
                .or_else(|| file.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .context("cannot derive a source name from the file path")?;
            let config = ResearchConfig::default().with_env()?;
            let index = Arc::new(PineconeIndex::from_env(config.request_timeout)?);
            let ingestor = Ingestor::new(embedder()?, index, &config);

            let report = ingestor.ingest(&text, *year, *quarter, &source).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
