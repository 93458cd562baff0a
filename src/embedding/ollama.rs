//! Ollama 임베딩 프로바이더
//!
//! `POST {endpoint}/api/embed` 로 여러 입력을 한 번에 임베딩합니다.
//! ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-embeddings

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::knowledge::Vector;

use super::EmbeddingProvider;

/// 요청당 입력 수
const BATCH_SIZE: usize = 32;
/// 동시에 진행하는 배치 수 (순서는 유지됨)
const MAX_IN_FLIGHT: usize = 2;
/// 재시도 횟수 (연결 실패, 429, 5xx)
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 500;

/// Ollama 임베딩 구현체
#[derive(Debug, Clone)]
pub struct OllamaEmbedding {
    client: reqwest::Client,
    url: String,
    model: String,
    dimension: usize,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

impl OllamaEmbedding {
    /// 새 인스턴스 생성
    ///
    /// # Arguments
    /// * `endpoint` - Ollama 서버 주소 (예: http://localhost:11434)
    /// * `model` - 임베딩 모델 (예: all-minilm)
    /// * `dimension` - 모델 출력 차원
    /// * `timeout` - 요청당 타임아웃
    pub fn new(endpoint: &str, model: &str, dimension: usize, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}/api/embed", endpoint.trim_end_matches('/')),
            model: model.to_string(),
            dimension,
            timeout,
        })
    }

    fn backend_name(&self) -> String {
        format!("ollama embedding ({})", self.model)
    }

    /// 배치 하나 요청 (재시도 포함)
    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vector>> {
        let request = EmbedRequest {
            model: &self.model,
            input: batch,
        };

        let mut last_error: Option<RagError> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1));
                tracing::warn!(
                    "Embedding request failed, retrying in {:?} (attempt {}/{})",
                    backoff,
                    attempt,
                    MAX_RETRIES
                );
                tokio::time::sleep(backoff).await;
            }

            let response = match self.client.post(&self.url).json(&request).send().await {
                Ok(resp) => resp,
                Err(e) if e.is_timeout() => {
                    return Err(RagError::BackendTimeout {
                        backend: self.backend_name(),
                        timeout: self.timeout,
                    });
                }
                Err(e) => {
                    last_error = Some(RagError::backend(
                        self.backend_name(),
                        format!("Failed to send embedding request: {}", e),
                    ));
                    continue;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| RagError::backend(self.backend_name(), e.to_string()))?;

            if status.is_success() {
                let parsed: EmbedResponse = serde_json::from_str(&body).map_err(|e| {
                    RagError::backend(
                        self.backend_name(),
                        format!("Failed to parse embedding response: {}", e),
                    )
                })?;
                return self.validate(batch.len(), parsed.embeddings);
            }

            let message = serde_json::from_str::<OllamaError>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            let err = RagError::backend(self.backend_name(), format!("{}: {}", status, message));

            if status.as_u16() == 429 || status.is_server_error() {
                last_error = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_error.unwrap_or_else(|| {
            RagError::backend(
                self.backend_name(),
                format!("Embedding failed after {} retries", MAX_RETRIES),
            )
        }))
    }

    /// 응답 개수/차원 확인
    fn validate(&self, expected_count: usize, embeddings: Vec<Vector>) -> Result<Vec<Vector>> {
        if embeddings.len() != expected_count {
            return Err(RagError::backend(
                self.backend_name(),
                format!(
                    "Expected {} embeddings, got {}",
                    expected_count,
                    embeddings.len()
                ),
            ));
        }
        if let Some(bad) = embeddings.iter().find(|v| v.len() != self.dimension) {
            return Err(RagError::DimensionMismatch {
                context: format!("embedding model '{}'", self.model),
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vector> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::backend(self.backend_name(), "Empty embedding response"))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let total = texts.len().div_ceil(BATCH_SIZE);

        // 스트림 항목은 소유 배치여야 Send를 만족
        let owned: Vec<Vec<String>> = texts.chunks(BATCH_SIZE).map(<[String]>::to_vec).collect();

        // buffered()는 완료 순서와 관계없이 입력 순서대로 결과를 냅니다
        let batches: Vec<Vec<Vector>> = stream::iter(owned.into_iter().enumerate())
            .map(|(i, batch)| async move {
                tracing::debug!("Embedding batch {}/{}", i + 1, total);
                self.embed_batch(&batch).await
            })
            .buffered(MAX_IN_FLIGHT)
            .try_collect()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> String {
        format!("ollama/{}", self.model)
    }
}

// ============================================================================
// Tests
// ============================================================================
