//! Pinecone vector index client (data plane REST API)

use super::{IndexMatch, PartitionFilter, VectorIndex, VectorRecord};
use crate::error::{ResearchError, Result};
use async_trait::async_trait;
use reqwest::Client;
use research_utils::{optional_env, required_env};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

const SERVICE: &str = "vector-index";
const API_VERSION: &str = "2024-07";
const UPSERT_BATCH: usize = 100;

/// Pinecone index handle
pub struct PineconeIndex {
    client: Client,
    host: String,
    api_key: String,
    namespace: Option<String>,
}

impl PineconeIndex {
    /// `host` is the index's data-plane host, with or without scheme
    pub fn new(
        host: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let host = host.into();
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{host}")
        };
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            host: host.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            namespace: None,
        })
    }

    /// Reads `PINECONE_INDEX_HOST`, `PINECONE_API_KEY` and optional
    /// `PINECONE_NAMESPACE`
    pub fn from_env(timeout: Duration) -> Result<Self> {
        let index = Self::new(
            required_env("PINECONE_INDEX_HOST")?,
            required_env("PINECONE_API_KEY")?,
            timeout,
        )?;
        Ok(match optional_env("PINECONE_NAMESPACE") {
            Some(ns) => index.with_namespace(ns),
            None => index,
        })
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        let response = self
            .client
            .post(format!("{}{path}", self.host))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ResearchError::upstream(
                SERVICE,
                format!("{path} failed ({status}): {body}"),
            ));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| {
                ResearchError::upstream(SERVICE, format!("unreadable {path} response: {e}"))
            })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    filter: serde_json::Value,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<IndexMatch>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

/// Metadata stores year and quarter as strings
pub(crate) fn partition_filter(filter: PartitionFilter) -> serde_json::Value {
    json!({
        "year": { "$eq": filter.year.to_string() },
        "quarter": { "$eq": filter.quarter.to_string() },
    })
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    #[instrument(skip(self, vector), fields(partition = %filter))]
    async fn query(
        &self,
        vector: &[f32],
        filter: PartitionFilter,
        top_k: usize,
    ) -> Result<Vec<IndexMatch>> {
        let request = QueryRequest {
            vector,
            top_k,
            filter: partition_filter(filter),
            include_metadata: true,
            namespace: self.namespace.as_deref(),
        };
        let response: QueryResponse = self.post("/query", &request).await?;
        debug!("{} matches", response.matches.len());
        Ok(response.matches)
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize> {
        let mut written = 0;
        for batch in records.chunks(UPSERT_BATCH) {
            let request = UpsertRequest {
                vectors: batch,
                namespace: self.namespace.as_deref(),
            };
            let response: UpsertResponse = self.post("/vectors/upsert", &request).await?;
            written += response.upserted_count;
        }
        Ok(written)
    }
}
