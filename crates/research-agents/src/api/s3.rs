//! S3 object store for rendered charts
//!
//! Uploads with signed PUTs, lists a folder with `ListObjectsV2` and hands
//! back presigned GET URLs for the image files it finds.

use super::ObjectStore;
use super::sigv4::{
    AwsCredentials, SignableRequest, Signer, canonical_query, encode_key_path, hex_sha256,
};
use crate::error::{ResearchError, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use research_utils::{optional_env, required_env};
use std::time::Duration;
use tracing::{debug, info, instrument};

const SERVICE: &str = "object-store";
const PRESIGN_EXPIRY_SECS: u64 = 3600;
const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".bmp", ".svg"];

/// S3 bucket location
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint host (MinIO, LocalStack); path-style addressing
    pub endpoint: Option<String>,
}

impl S3Config {
    /// Reads `AWS_S3_BUCKET_NAME`, `AWS_REGION` and optional `AWS_S3_ENDPOINT`
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bucket: required_env("AWS_S3_BUCKET_NAME")?,
            region: optional_env("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            endpoint: optional_env("AWS_S3_ENDPOINT"),
        })
    }

    fn host(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string(),
            None => format!("{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }

    fn scheme(&self) -> &'static str {
        match &self.endpoint {
            Some(endpoint) if endpoint.starts_with("http://") => "http",
            _ => "https",
        }
    }

    /// Request path for `key`, bucket-prefixed for custom endpoints
    fn object_path(&self, key: &str) -> String {
        match self.endpoint {
            Some(_) => format!("/{}{}", self.bucket, encode_key_path(key)),
            None => encode_key_path(key),
        }
    }

    fn bucket_path(&self) -> String {
        match self.endpoint {
            Some(_) => format!("/{}", self.bucket),
            None => "/".to_string(),
        }
    }
}

/// S3-backed [`ObjectStore`]
pub struct S3Store {
    client: Client,
    config: S3Config,
    signer: Signer,
}

impl S3Store {
    pub fn new(config: S3Config, credentials: AwsCredentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let signer = Signer::new(credentials, config.region.clone(), "s3");
        Ok(Self {
            client,
            config,
            signer,
        })
    }

    pub fn from_env(timeout: Duration) -> Result<Self> {
        Self::new(S3Config::from_env()?, AwsCredentials::from_env()?, timeout)
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let host = self.config.host();
        let path = self.config.bucket_path();
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("prefix".to_string(), prefix.to_string()),
            ];
            if let Some(token) = &continuation {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let payload_hash = hex_sha256(b"");
            let headers = self.signer.sign_headers(
                &SignableRequest {
                    method: "GET",
                    host: &host,
                    path: &path,
                    query: &query,
                    headers: &[],
                    payload_hash: &payload_hash,
                },
                Utc::now(),
            )?;

            let url = format!(
                "{}://{host}{path}?{}",
                self.config.scheme(),
                canonical_query(&query)
            );
            let mut request = self.client.get(url);
            for (name, value) in &headers {
                request = request.header(name.as_str(), value.as_str());
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(ResearchError::upstream(
                    SERVICE,
                    format!("ListObjectsV2 failed ({status}): {}", truncate(&body, 300)),
                ));
            }

            let xml = response.text().await?;
            let page = parse_list_response(&xml);
            keys.extend(page.keys);

            match page.next_token {
                Some(token) if page.truncated => continuation = Some(token),
                _ => break,
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self, bytes), fields(bucket = %self.config.bucket, size = bytes.len()))]
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let host = self.config.host();
        let path = self.config.object_path(key);
        let payload_hash = hex_sha256(&bytes);

        let headers = self.signer.sign_headers(
            &SignableRequest {
                method: "PUT",
                host: &host,
                path: &path,
                query: &[],
                headers: &[("content-type".to_string(), content_type.to_string())],
                payload_hash: &payload_hash,
            },
            Utc::now(),
        )?;

        let url = format!("{}://{host}{path}", self.config.scheme());
        let mut request = self.client.put(&url).body(bytes);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ResearchError::upstream(
                SERVICE,
                format!("PUT {key} failed ({status}): {}", truncate(&body, 300)),
            ));
        }

        debug!("Uploaded {key}");
        Ok(url)
    }

    #[instrument(skip(self), fields(bucket = %self.config.bucket))]
    async fn list_urls(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };

        let keys = self.list_keys(&prefix).await?;
        let host = self.config.host();
        let now = Utc::now();

        let urls = keys
            .iter()
            .filter(|key| is_image_key(key))
            .map(|key| {
                self.signer.presign_get(
                    self.config.scheme(),
                    &host,
                    &self.config.object_path(key),
                    PRESIGN_EXPIRY_SECS,
                    now,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        info!("Found {} images under {prefix}", urls.len());
        Ok(urls)
    }
}

fn is_image_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

struct ListPage {
    keys: Vec<String>,
    truncated: bool,
    next_token: Option<String>,
}

fn parse_list_response(xml: &str) -> ListPage {
    let mut keys = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("<Contents>") {
        let body = &rest[start + "<Contents>".len()..];
        let Some(end) = body.find("</Contents>") else {
            break;
        };
        if let Some(key) = xml_value(&body[..end], "Key") {
            if !key.ends_with('/') {
                keys.push(key);
            }
        }
        rest = &body[end + "</Contents>".len()..];
    }

    ListPage {
        keys,
        truncated: xml_value(xml, "IsTruncated").is_some_and(|v| v == "true"),
        next_token: xml_value(xml, "NextContinuationToken"),
    }
}

fn xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let len = xml[start..].find(&close)?;
    Some(unescape_xml(&xml[start..start + len]))
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
