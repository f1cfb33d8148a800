use anyhow::{Context, anyhow, bail};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Turns text into a fixed-dimension vector.
pub trait Embedder: Send + Sync {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<f32>>>;
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    encoding_format: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    async fn request(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: EMBEDDING_MODEL,
                input: text,
                encoding_format: "float",
            })
            .send()
            .await
            .context("embedding request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            bail!("embedding API returned {}: {}", status, excerpt);
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("embedding response was not valid JSON")?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow!("embedding API returned no vectors"))
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<f32>>> {
        Box::pin(self.request(text))
    }
}

/// Stand-in used when no API key is configured: every call fails, which the
/// send path tolerates and the search path reports as 502.
pub struct UnavailableEmbedder;

impl Embedder for UnavailableEmbedder {
    fn embed<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<f32>>> {
        Box::pin(async { Err(anyhow!("no embedding provider configured")) })
    }
}
