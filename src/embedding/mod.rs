//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 텍스트를 고정 차원 벡터로 변환하는 프로바이더입니다.
//! 같은 모델/버전에서 같은 텍스트는 항상 같은 벡터를 반환해야 합니다.
//!
//! - [`HashEmbedding`]: 오프라인 해시 임베딩 (기본값)
//! - [`OllamaEmbedding`]: Ollama `/api/embed` (all-minilm 등)
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = HashEmbedding::new(384)?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

mod hash;
mod ollama;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{EmbeddingKind, Settings};
use crate::error::Result;
use crate::knowledge::Vector;

pub use hash::{HashEmbedding, HASH_MODEL_ID};
pub use ollama::OllamaEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vector>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    ///
    /// 반환 순서는 입력 순서와 같아야 합니다.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 모델 식별자 (인덱스 스냅샷 호환성 확인용)
    fn model_id(&self) -> String;
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(settings: &Settings) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &settings.embedding;

    let embedder: Arc<dyn EmbeddingProvider> = match embedding.provider {
        EmbeddingKind::Hash => Arc::new(HashEmbedding::new(embedding.dimension)?),
        EmbeddingKind::Ollama => Arc::new(OllamaEmbedding::new(
            &settings.generation.endpoint,
            &embedding.model,
            embedding.dimension,
            settings.generation.timeout(),
        )?),
    };

    tracing::info!(
        "Using embedding model {} (dimension: {})",
        embedder.model_id(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_default_embedder() {
        let settings = Settings::default();
        let embedder = create_embedder(&settings).unwrap();
        assert_eq!(embedder.dimension(), 384);
        assert_eq!(embedder.model_id(), HASH_MODEL_ID);
    }

    #[test]
    fn test_create_ollama_embedder() {
        let mut settings = Settings::default();
        settings.embedding.provider = EmbeddingKind::Ollama;
        let embedder = create_embedder(&settings).unwrap();
        assert_eq!(embedder.model_id(), settings.embedding_model_id());
    }
}
