//! Embeddings over any OpenAI-compatible `/embeddings` endpoint.
//!
//! Only available with the `openai` feature.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{Result, RetrievalError};

const PROVIDER: &str = "OpenAI";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSIONS: usize = 1536;

/// An [`EmbeddingProvider`] that posts batches to `{base_url}/embeddings`.
///
/// Transport failures, non-2xx statuses, and undecodable bodies all surface
/// as [`RetrievalError::Embedding`], so the pipeline's retry policy applies.
///
/// ```rust,ignore
/// use retrieval_core::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?
///     .with_model("text-embedding-3-large")
///     .with_dimensions(256);
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// Sent as `dimensions` so the server truncates (Matryoshka models).
    truncate_to: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Provider for `text-embedding-3-small` (1536 dimensions) on api.openai.com.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] for a blank key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RetrievalError::Config("OpenAI API key must not be empty".into()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            truncate_to: None,
        })
    }

    /// Build from `OPENAI_API_KEY`, honouring `OPENAI_BASE_URL` and
    /// `OPENAI_EMBEDDING_MODEL` when set.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if the key is missing or blank.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| RetrievalError::Config("OPENAI_API_KEY is not set".into()))?;
        let mut provider = Self::new(key)?;
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            provider = provider.with_base_url(url);
        }
        if let Ok(model) = std::env::var("OPENAI_EMBEDDING_MODEL") {
            provider = provider.with_model(model);
        }
        Ok(provider)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Base URL without the `/embeddings` suffix; trailing slashes are dropped.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Ask the server for `dims`-wide vectors. Also changes
    /// [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.truncate_to = Some(dims);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorMessage,
}

#[derive(Deserialize)]
struct ApiErrorMessage {
    message: String,
}

/// Turn a non-2xx response into an error, preferring the API's own message.
fn api_error(status: StatusCode, body: &str) -> RetrievalError {
    let detail = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    RetrievalError::embedding(PROVIDER, format!("API returned {status}: {detail}"))
}

/// Decode a success body into vectors ordered by input position.
fn decode_embeddings(body: &[u8], expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut response: EmbeddingsResponse = serde_json::from_slice(body)
        .map_err(|e| RetrievalError::embedding(PROVIDER, format!("undecodable response: {e}")))?;
    response.data.sort_by_key(|item| item.index);

    let in_order = response.data.iter().enumerate().all(|(i, item)| item.index == i);
    if response.data.len() != expected || !in_order {
        return Err(RetrievalError::embedding(
            PROVIDER,
            format!("expected indexes 0..{expected}, got {} items", response.data.len()),
        ));
    }
    Ok(response.data.into_iter().map(|item| item.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .pop()
            .ok_or_else(|| RetrievalError::embedding(PROVIDER, "empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, model = %self.model, batch_size = texts.len(), "embedding batch");

        let request =
            EmbeddingsRequest { model: &self.model, input: texts, dimensions: self.truncate_to };
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RetrievalError::embedding(PROVIDER, format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| RetrievalError::embedding(PROVIDER, format!("reading body: {e}")))?;

        if !status.is_success() {
            let err = api_error(status, &String::from_utf8_lossy(&body));
            error!(provider = PROVIDER, %status, error = %err, "embeddings request rejected");
            return Err(err);
        }
        decode_embeddings(&body, texts.len())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
