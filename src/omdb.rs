use crate::movie::MovieRecord;
use crate::normalize::{is_affirmative, movie_from_details};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;

pub const OMDB_API_BASE: &str = "https://www.omdbapi.com/";

/// Upstream metadata source used by the lookup service.
#[async_trait]
pub trait MovieProvider: Send + Sync {
    /// Resolves free text into provider ids, in provider order.
    async fn resolve_search_ids(&self, query: &str) -> Result<Vec<String>>;

    /// Full details for one id, `None` when the provider reports no match.
    async fn fetch_details(&self, id: &str) -> Result<Option<MovieRecord>>;
}

#[derive(Debug, Clone)]
pub struct OmdbClient {
    client: Client,
    api_key: String,
    base_url: Url,
}

impl OmdbClient {
    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Self::normalize_base_url(
            Url::parse(base_url).with_context(|| format!("invalid OMDb base URL {base_url}"))?,
        );
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build OMDb HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    fn normalize_base_url(mut base_url: Url) -> Url {
        if !base_url.path().ends_with('/') {
            let mut path = base_url.path().to_owned();
            path.push('/');
            base_url.set_path(&path);
        }
        base_url
    }

    fn request_url(&self, param: &str, value: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("apikey", &self.api_key)
            .append_pair(param, value);
        url
    }

    // The credential travels in the query string, so only the parameter is logged.
    async fn get_json(&self, param: &str, value: &str) -> Result<Value> {
        let url = self.request_url(param, value);
        tracing::debug!(param, value, "OMDb request");

        let body = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to send OMDb request ({param}={value})"))?
            .error_for_status()
            .context("OMDb HTTP error")?
            .text()
            .await
            .context("failed to read OMDb response body")?;

        serde_json::from_str(&body).map_err(|e| {
            anyhow!(
                "Failed to decode OMDb JSON: {e}; body: {}",
                truncate(&body, 900)
            )
        })
    }
}

#[async_trait]
impl MovieProvider for OmdbClient {
    async fn resolve_search_ids(&self, query: &str) -> Result<Vec<String>> {
        let root = self.get_json("s", query).await?;
        Ok(search_ids(&root))
    }

    async fn fetch_details(&self, id: &str) -> Result<Option<MovieRecord>> {
        let root = self.get_json("i", id).await?;
        if !is_affirmative(&root) {
            let reason = root.get("Error").and_then(Value::as_str).unwrap_or("");
            tracing::debug!(id, reason, "OMDb reported no details");
            return Ok(None);
        }

        let mut movie = movie_from_details(&root, Utc::now());
        if movie.id.is_empty() {
            movie.id = id.to_string();
        }
        Ok(Some(movie))
    }
}

/// Ids from a search payload; a negative flag or missing `Search` is simply no matches.
fn search_ids(root: &Value) -> Vec<String> {
    if !is_affirmative(root) {
        return Vec::new();
    }

    let Some(results) = root.get("Search").and_then(Value::as_array) else {
        return Vec::new();
    };

    results
        .iter()
        .map(|entry| {
            entry
                .get("imdbID")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

fn truncate(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}… ({} bytes truncated)", &s[..end], s.len() - end)
}
