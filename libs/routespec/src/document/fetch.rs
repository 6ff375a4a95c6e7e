use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::Value;

/// Source of additional API documents.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<Value>;
}

/// Fetches documents over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<Value> {
        let doc: Value = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("{url} did not return JSON"))?;
        if !doc.is_object() {
            bail!("{url} did not return a JSON object");
        }
        Ok(doc)
    }
}

/// Fetcher for setups without additional documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFetch;

#[async_trait]
impl DocumentFetcher for NoFetch {
    async fn fetch(&self, url: &str) -> anyhow::Result<Value> {
        bail!("fetching {url} is disabled")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn fetches_json_documents() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/openapi.json");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({ "openapi": "3.1.0", "paths": {} }));
            })
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let doc = fetcher.fetch(&server.url("/openapi.json")).await.unwrap();
        assert_eq!(doc["openapi"], "3.1.0");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejects_non_objects_and_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/list");
                then.status(200).json_body(json!([1, 2]));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing");
                then.status(404);
            })
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        assert!(fetcher.fetch(&server.url("/list")).await.is_err());
        assert!(fetcher.fetch(&server.url("/missing")).await.is_err());
    }
}
