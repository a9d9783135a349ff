//! External service seams and their HTTP clients
//!
//! Each trait is the narrow contract an agent needs from one service. The
//! submodules provide concrete clients: SerpApi for news, Pinecone for the
//! vector index, the Snowflake SQL API for tabular data and S3 for chart
//! storage.

pub mod pinecone;
pub mod s3;
pub mod serpapi;
pub mod sigv4;
pub mod snowflake;

pub use pinecone::PineconeIndex;
pub use s3::S3Store;
pub use serpapi::SerpApiClient;
pub use snowflake::SnowflakeClient;

use crate::error::{ResearchError, Result};
use crate::time_range::Partition;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::future::Future;
use std::time::Duration;

/// Turns text into a dense vector
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Equality filter on the `year` and `quarter` metadata fields
pub type PartitionFilter = Partition;

/// A scored hit from the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMatch {
    pub id: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl IndexMatch {
    /// Indexed chunk text, if the record carries one
    pub fn text(&self) -> Option<&str> {
        self.metadata.get("text").and_then(serde_json::Value::as_str)
    }
}

/// A vector plus metadata to store in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Similarity search over indexed document chunks
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top `top_k` matches restricted to one partition
    async fn query(
        &self,
        vector: &[f32],
        filter: PartitionFilter,
        top_k: usize,
    ) -> Result<Vec<IndexMatch>>;

    /// Insert or replace records, returning how many were written
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize>;
}

/// Rows returned by a tabular statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    /// Column names as reported by the store
    pub column_names: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Executes read-only SQL against the tabular store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StructuredStore: Send + Sync {
    /// Store-side rejections surface as [`ResearchError::ExecutionFailed`]
    async fn execute(&self, statement: &str) -> Result<QueryRows>;
}

/// Blob storage for rendered charts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes under `key`, returning the object's URL
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    /// Shareable URLs for every image under `prefix`
    async fn list_urls(&self, prefix: &str) -> Result<Vec<String>>;
}

/// A news search hit before filtering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "source_name")]
    pub source: Option<String>,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// Sources arrive either as a bare name or as `{"name": ...}`
fn source_name<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Object(map)) => map
            .get("name")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
        _ => None,
    })
}

/// Web news search
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NewsSearch: Send + Sync {
    async fn search(&self, query: &str, count: u32) -> Result<Vec<RawArticle>>;
}

/// Bound an outbound call; elapsed timeouts become `UpstreamUnavailable`
pub(crate) async fn bounded<T, F>(service: &str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
        Err(ResearchError::upstream(
            service,
            format!("timed out after {}ms", limit.as_millis()),
        ))
    })
}
