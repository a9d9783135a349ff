//! Snowflake SQL API v2 client
//!
//! Submits a statement, polls while it is still running and collects every
//! result partition. Values arrive as strings and are converted to JSON
//! numbers for numeric column types.

use super::{QueryRows, StructuredStore};
use crate::error::{ResearchError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use research_utils::{optional_env, required_env};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const SERVICE: &str = "structured-store";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Connection settings for the SQL API
#[derive(Debug, Clone)]
pub struct SnowflakeConfig {
    /// Account identifier, e.g. `myorg-myaccount`
    pub account: String,
    /// OAuth, key-pair JWT or programmatic access token
    pub token: String,
    /// Value for `X-Snowflake-Authorization-Token-Type`
    pub token_type: String,
    pub database: String,
    pub schema: String,
    pub warehouse: Option<String>,
    pub role: Option<String>,
}

impl SnowflakeConfig {
    /// Reads `SNOWFLAKE_ACCOUNT`, `SNOWFLAKE_TOKEN` and the optional
    /// `SNOWFLAKE_TOKEN_TYPE`, `SNOWFLAKE_DATABASE`, `SNOWFLAKE_SCHEMA`,
    /// `SNOWFLAKE_WAREHOUSE` and `SNOWFLAKE_ROLE`
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            account: required_env("SNOWFLAKE_ACCOUNT")?,
            token: required_env("SNOWFLAKE_TOKEN")?,
            token_type: optional_env("SNOWFLAKE_TOKEN_TYPE")
                .unwrap_or_else(|| "PROGRAMMATIC_ACCESS_TOKEN".to_string()),
            database: optional_env("SNOWFLAKE_DATABASE").unwrap_or_else(|| "NVIDIA_DB".to_string()),
            schema: optional_env("SNOWFLAKE_SCHEMA").unwrap_or_else(|| "NVIDIA_SCHEMA".to_string()),
            warehouse: optional_env("SNOWFLAKE_WAREHOUSE"),
            role: optional_env("SNOWFLAKE_ROLE"),
        })
    }

    fn base_url(&self) -> String {
        format!("https://{}.snowflakecomputing.com/api/v2/statements", self.account)
    }
}

/// [`StructuredStore`] backed by the Snowflake SQL API
pub struct SnowflakeClient {
    client: Client,
    config: SnowflakeConfig,
    timeout: Duration,
}

impl SnowflakeClient {
    pub fn new(config: SnowflakeConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            config,
            timeout,
        })
    }

    pub fn from_env(timeout: Duration) -> Result<Self> {
        Self::new(SnowflakeConfig::from_env()?, timeout)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.config.token)
            .header("X-Snowflake-Authorization-Token-Type", &self.config.token_type)
            .header("Accept", "application/json")
    }

    async fn fetch_partition(
        &self,
        handle: &str,
        partition: usize,
    ) -> Result<Vec<Vec<Option<String>>>> {
        let url = format!("{}/{handle}?partition={partition}", self.config.base_url());
        let response = self.authorized(self.client.get(url)).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ResearchError::upstream(
                SERVICE,
                format!("partition {partition} fetch failed ({status}): {body}"),
            ));
        }
        let page: PartitionPage = response.json().await?;
        Ok(page.data)
    }
}

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    database: &'a str,
    schema: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<ColumnType>,
    #[serde(default)]
    partition_info: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ColumnType {
    name: String,
    #[serde(rename = "type")]
    column_type: String,
}

#[derive(Debug, Deserialize)]
struct PartitionPage {
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

/// Convert a raw cell by the column's declared type
fn convert_cell(column_type: &str, raw: Option<String>) -> serde_json::Value {
    let Some(raw) = raw else {
        return serde_json::Value::Null;
    };
    match column_type.to_ascii_lowercase().as_str() {
        "fixed" | "real" => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or(serde_json::Value::String(raw), serde_json::Value::Number),
        "boolean" => serde_json::Value::Bool(raw.eq_ignore_ascii_case("true")),
        // Days since the epoch
        "date" => raw
            .parse::<i64>()
            .ok()
            .and_then(|days| chrono::DateTime::from_timestamp(days * 86_400, 0))
            .map_or(serde_json::Value::String(raw), |dt| {
                serde_json::Value::String(dt.date_naive().to_string())
            }),
        _ => serde_json::Value::String(raw),
    }
}

fn to_rows(types: &[ColumnType], raw: Vec<Vec<Option<String>>>) -> Vec<Vec<serde_json::Value>> {
    raw.into_iter()
        .map(|row| {
            row.into_iter()
                .enumerate()
                .map(|(i, cell)| {
                    let ty = types.get(i).map_or("text", |t| t.column_type.as_str());
                    convert_cell(ty, cell)
                })
                .collect()
        })
        .collect()
}

#[async_trait]
impl StructuredStore for SnowflakeClient {
    #[instrument(skip(self, statement), fields(account = %self.config.account))]
    async fn execute(&self, statement: &str) -> Result<QueryRows> {
        let request = StatementRequest {
            statement,
            timeout: self.timeout.as_secs().max(1),
            database: &self.config.database,
            schema: &self.config.schema,
            warehouse: self.config.warehouse.as_deref(),
            role: self.config.role.as_deref(),
        };

        let mut response = self
            .authorized(self.client.post(self.config.base_url()))
            .json(&request)
            .send()
            .await?;

        // 202 means the statement is still running; poll its handle
        while response.status() == StatusCode::ACCEPTED {
            let pending: StatementResponse = response.json().await?;
            let handle = pending.statement_handle.ok_or_else(|| {
                ResearchError::upstream(SERVICE, "statement accepted without a handle")
            })?;
            debug!(%handle, "Statement still running");
            tokio::time::sleep(POLL_INTERVAL).await;
            response = self
                .authorized(self.client.get(format!("{}/{handle}", self.config.base_url())))
                .send()
                .await?;
        }

        let status = response.status();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let failed: StatementResponse = response.json().await?;
            let message = failed
                .message
                .unwrap_or_else(|| "statement rejected".to_string());
            warn!(%message, "Statement failed");
            return Err(ResearchError::ExecutionFailed(message));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ResearchError::upstream(
                SERVICE,
                format!("statement request failed ({status}): {body}"),
            ));
        }

        let result: StatementResponse = response.json().await?;
        let meta = result.result_set_meta_data.ok_or_else(|| {
            ResearchError::upstream(SERVICE, "response carried no result metadata")
        })?;

        let mut raw = result.data;
        if let Some(handle) = result.statement_handle.as_deref() {
            for partition in 1..meta.partition_info.len() {
                raw.extend(self.fetch_partition(handle, partition).await?);
            }
        }

        let rows = to_rows(&meta.row_type, raw);
        info!("Statement returned {} rows", rows.len());

        Ok(QueryRows {
            column_names: meta.row_type.into_iter().map(|c| c.name).collect(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_cell() {
        assert_eq!(convert_cell("fixed", Some("42".into())), serde_json::json!(42.0));
        assert_eq!(convert_cell("REAL", Some("1.5".into())), serde_json::json!(1.5));
        assert_eq!(
            convert_cell("timestamp_ntz", Some("1672531200.000000000".into())),
            serde_json::json!("1672531200.000000000")
        );
        assert_eq!(convert_cell("date", Some("19358".into())), serde_json::json!("2023-01-01"));
        assert_eq!(convert_cell("fixed", None), serde_json::Value::Null);
        assert_eq!(convert_cell("fixed", Some("n/a".into())), serde_json::json!("n/a"));
    }

    #[test]
    fn test_parse_statement_response() {
        let body = r#"{
            "resultSetMetaData": {
                "numRows": 2,
                "rowType": [{"name": "DATE", "type": "timestamp_ntz"}, {"name": "CLOSE", "type": "real"}],
                "partitionInfo": [{"rowCount": 2}]
            },
            "data": [["1672531200.000000000", "143.15"], ["1672617600.000000000", null]],
            "code": "090001",
            "statementHandle": "01b2-abc"
        }"#;
        let parsed: StatementResponse = serde_json::from_str(body).unwrap();
        let meta = parsed.result_set_meta_data.unwrap();
        let rows = to_rows(&meta.row_type, parsed.data);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], serde_json::json!(143.15));
        assert_eq!(rows[1][1], serde_json::Value::Null);
    }

    #[test]
    fn test_request_omits_unset_fields() {
        let request = StatementRequest {
            statement: "SELECT 1;",
            timeout: 30,
            database: "DB",
            schema: "S",
            warehouse: None,
            role: Some("ANALYST"),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("warehouse").is_none());
        assert_eq!(json["role"], "ANALYST");
    }
}
