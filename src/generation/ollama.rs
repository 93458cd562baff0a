//! Ollama 채팅 API 생성 백엔드
//!
//! `POST {endpoint}/api/chat` (stream=false)
//! ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-chat-completion

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GenerationSettings;
use crate::error::{RagError, Result};

use super::{GenerationBackend, GenerationRequest};

/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 500;
/// 백오프 상한 (ms)
const MAX_BACKOFF_MS: u64 = 30_000;

/// Ollama 생성 백엔드
#[derive(Debug, Clone)]
pub struct OllamaGeneration {
    client: reqwest::Client,
    url: String,
    model: String,
    timeout: Duration,
    max_retries: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

/// 한 번의 시도 결과
enum Attempt {
    Done(String),
    /// 재시도 가능한 실패
    Retry(RagError),
}

impl OllamaGeneration {
    /// 설정으로 생성
    pub fn new(settings: &GenerationSettings) -> Result<Self> {
        // 타임아웃은 tokio::time::timeout으로 시도마다 적용
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}/api/chat", settings.endpoint.trim_end_matches('/')),
            model: settings.model.clone(),
            timeout: settings.timeout(),
            max_retries: settings.max_retries,
            temperature: settings.temperature,
        })
    }

    fn build_request(&self, request: &GenerationRequest) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.to_prompt(),
            }],
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        }
    }

    async fn attempt(&self, body: &ChatRequest<'_>) -> Result<Attempt> {
        let response = match self.client.post(&self.url).json(body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                return Ok(Attempt::Retry(RagError::backend(
                    self.name(),
                    format!("Failed to send chat request: {}", e),
                )));
            }
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RagError::backend(self.name(), e.to_string()))?;

        if status.is_success() {
            let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
                RagError::backend(self.name(), format!("Unexpected chat response: {}", e))
            })?;
            return Ok(Attempt::Done(parsed.message.content.trim().to_string()));
        }

        let message = serde_json::from_str::<OllamaError>(&text)
            .map(|e| e.error)
            .unwrap_or(text);
        let err = RagError::backend(self.name(), format!("{}: {}", status, message));

        if status.as_u16() == 429 || status.is_server_error() {
            Ok(Attempt::Retry(err))
        } else {
            Err(err)
        }
    }
}

#[async_trait]
impl GenerationBackend for OllamaGeneration {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = self.build_request(request);
        let mut last_error: Option<RagError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_for(attempt);
                tracing::warn!(
                    "Generation failed, retrying in {:?} (attempt {}/{})",
                    backoff,
                    attempt,
                    self.max_retries
                );
                tokio::time::sleep(backoff).await;
            }

            match tokio::time::timeout(self.timeout, self.attempt(&body)).await {
                Ok(Ok(Attempt::Done(answer))) => return Ok(answer),
                Ok(Ok(Attempt::Retry(err))) => last_error = Some(err),
                Ok(Err(err)) => return Err(err),
                Err(_) => {
                    last_error = Some(RagError::BackendTimeout {
                        backend: self.name().to_string(),
                        timeout: self.timeout,
                    });
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RagError::backend(self.name(), "Generation failed")))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// n번째 재시도 전 대기 시간 (지수 증가, 상한 있음)
fn backoff_for(attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(INITIAL_BACKOFF_MS.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let backend = OllamaGeneration::new(&GenerationSettings::default()).unwrap();
        assert_eq!(backend.url, "http://localhost:11434/api/chat");

        let request = GenerationRequest::grounded("ctx", "q?");
        let body = serde_json::to_value(backend.build_request(&request)).unwrap();

        assert_eq!(body["model"], "llama3");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body["messages"][0]["content"]
            .as_str()
            .unwrap()
            .contains("Question:\nq?"));
    }

    #[test]
    fn test_parse_response() {
        let raw = r#"{"model":"llama3","message":{"role":"assistant","content":"  42  "},"done":true}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.message.content.trim(), "42");
    }

    #[test]
    fn test_backoff_is_bounded() {
        assert_eq!(backoff_for(1), Duration::from_millis(500));
        assert_eq!(backoff_for(2), Duration::from_millis(1000));
        assert_eq!(backoff_for(64), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(backoff_for(u32::MAX), Duration::from_millis(MAX_BACKOFF_MS));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_backend_failure() {
        let settings = GenerationSettings {
            // 연결이 즉시 거부되는 포트
            endpoint: "http://127.0.0.1:9".to_string(),
            timeout_secs: 5,
            max_retries: 0,
            ..Default::default()
        };
        let backend = OllamaGeneration::new(&settings).unwrap();
        let err = backend
            .generate(&GenerationRequest::grounded("ctx", "q"))
            .await
            .unwrap_err();
        assert!(err.is_backend_failure());
    }
}
