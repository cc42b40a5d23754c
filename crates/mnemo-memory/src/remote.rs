// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP clients for OpenAI-compatible embedding and rerank APIs.
//!
//! Both clients share [`ApiClient`], which handles bearer authentication,
//! request timeouts, and a single retry on transient status codes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use mnemo_config::model::ModelParams;
use mnemo_core::error::MnemoError;
use mnemo_core::traits::adapter::PluginAdapter;
use mnemo_core::traits::{EmbeddingAdapter, RerankAdapter};
use mnemo_core::types::{
    AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus, RerankInput, RerankOutput,
    RerankScore,
};

/// Which error variant a failed call maps to.
#[derive(Debug, Clone, Copy)]
enum ApiKind {
    Embedding,
    Rerank,
}

impl ApiKind {
    fn error(
        self,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> MnemoError {
        match self {
            ApiKind::Embedding => MnemoError::Embedding { message, source },
            ApiKind::Rerank => MnemoError::Rerank { message, source },
        }
    }
}

#[derive(Debug, Clone)]
struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl ApiClient {
    fn new(params: &ModelParams) -> Result<Self, MnemoError> {
        let mut headers = HeaderMap::new();
        if let Some(credential) = params.credential.as_deref().filter(|c| !c.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {credential}")).map_err(|e| {
                    MnemoError::Config(format!("invalid credential header value: {e}"))
                })?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(params.request_timeout_secs))
            .build()
            .map_err(|e| MnemoError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: params.endpoint.trim_end_matches('/').to_string(),
            max_retries: 1,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// POST `body` as JSON to `{base_url}/{route}` and decode the response.
    ///
    /// Retries once after a short delay on 429/500/502/503.
    async fn post_json<B, R>(&self, route: &str, body: &B, kind: ApiKind) -> Result<R, MnemoError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{route}", self.base_url);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, url = %url, "retrying request after transient error");
                tokio::time::sleep(self.retry_delay).await;
            }

            let response = self
                .client
                .post(&url)
                .json(body)
                .send()
                .await
                .map_err(|e| kind.error(format!("HTTP request failed: {e}"), Some(Box::new(e))))?;

            let status = response.status();
            debug!(status = %status, attempt, url = %url, "response received");

            if status.is_success() {
                let text = response.text().await.map_err(|e| {
                    kind.error(format!("failed to read response body: {e}"), Some(Box::new(e)))
                })?;
                return serde_json::from_str(&text).map_err(|e| {
                    kind.error(format!("failed to parse API response: {e}"), Some(Box::new(e)))
                });
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, body = %body, "transient error, will retry");
                last_error = Some(kind.error(format!("API returned {status}: {body}"), None));
                continue;
            }

            return Err(kind.error(format!("API returned {status}: {body}"), None));
        }

        Err(last_error
            .unwrap_or_else(|| kind.error("request failed after retries".to_string(), None)))
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

/// Accepts the OpenAI `data[]` shape as well as bare `embeddings` /
/// `embedding` arrays returned by simpler servers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Data { data: Vec<EmbeddingDatum> },
    Batch { embeddings: Vec<Vec<f32>> },
    Single { embedding: Vec<f32> },
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    fn into_vectors(self) -> Vec<Vec<f32>> {
        match self {
            EmbeddingResponse::Data { mut data } => {
                if data.iter().all(|d| d.index.is_some()) {
                    data.sort_by_key(|d| d.index);
                }
                data.into_iter().map(|d| d.embedding).collect()
            }
            EmbeddingResponse::Batch { embeddings } => embeddings,
            EmbeddingResponse::Single { embedding } => vec![embedding],
        }
    }
}

/// Embedding adapter backed by a remote `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct RemoteEmbedder {
    api: ApiClient,
    model: String,
    batch_size: usize,
    dimensions: usize,
}

impl RemoteEmbedder {
    pub fn new(params: &ModelParams, dimensions: usize) -> Result<Self, MnemoError> {
        Ok(Self {
            api: ApiClient::new(params)?,
            model: params.model_name.clone(),
            batch_size: params.batch_size.max(1),
            dimensions,
        })
    }
}

#[async_trait]
impl PluginAdapter for RemoteEmbedder {
    fn name(&self) -> &str {
        "remote-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, MnemoError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MnemoError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for RemoteEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, MnemoError> {
        let mut embeddings = Vec::with_capacity(input.texts.len());

        for batch in input.texts.chunks(self.batch_size) {
            let request = EmbeddingRequest {
                model: &self.model,
                input: batch,
                encoding_format: "float",
            };
            let response: EmbeddingResponse = self
                .api
                .post_json("embeddings", &request, ApiKind::Embedding)
                .await?;
            let vectors = response.into_vectors();
            if vectors.len() != batch.len() {
                return Err(MnemoError::Embedding {
                    message: format!(
                        "expected {} embeddings, API returned {}",
                        batch.len(),
                        vectors.len()
                    ),
                    source: None,
                });
            }
            embeddings.extend(vectors);
        }

        Ok(EmbeddingOutput {
            dimensions: embeddings.first().map(Vec::len).unwrap_or(self.dimensions),
            embeddings,
        })
    }
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
    return_documents: bool,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankScore>,
}

/// Rerank adapter backed by a remote `/rerank` endpoint.
#[derive(Debug, Clone)]
pub struct RemoteReranker {
    api: ApiClient,
    model: String,
}

impl RemoteReranker {
    pub fn new(params: &ModelParams) -> Result<Self, MnemoError> {
        Ok(Self {
            api: ApiClient::new(params)?,
            model: params.model_name.clone(),
        })
    }
}

#[async_trait]
impl PluginAdapter for RemoteReranker {
    fn name(&self) -> &str {
        "remote-reranker"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Reranker
    }

    async fn health_check(&self) -> Result<HealthStatus, MnemoError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MnemoError> {
        Ok(())
    }
}

#[async_trait]
impl RerankAdapter for RemoteReranker {
    async fn rerank(&self, input: RerankInput) -> Result<RerankOutput, MnemoError> {
        let request = RerankRequest {
            model: &self.model,
            query: &input.query,
            documents: &input.documents,
            top_n: input.top_n,
            return_documents: false,
        };
        let response: RerankResponse = self
            .api
            .post_json("rerank", &request, ApiKind::Rerank)
            .await?;

        let document_count = input.documents.len();
        if let Some(bad) = response.results.iter().find(|r| r.index >= document_count) {
            return Err(MnemoError::Rerank {
                message: format!(
                    "API returned index {} for {document_count} documents",
                    bad.index
                ),
                source: None,
            });
        }

        Ok(RerankOutput {
            results: response.results,
        })
    }
}
