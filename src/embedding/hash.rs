//! 해시 임베딩 - 외부 모델 없이 동작하는 결정적 임베딩
//!
//! 소문자화한 단어 유니그램/바이그램을 SHA-256으로 해시해 버킷에 부호와 함께 누적하고
//! L2 정규화합니다 (feature hashing). 같은 어휘를 공유하는 텍스트일수록
//! 코사인 유사도가 높아집니다.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::knowledge::Vector;

use super::EmbeddingProvider;

/// 해시 임베딩 모델 식별자 (알고리즘이 바뀌면 버전을 올려야 함)
pub const HASH_MODEL_ID: &str = "hash-v1";

/// 바이그램 가중치 (유니그램 = 1.0)
const BIGRAM_WEIGHT: f32 = 0.5;

/// 해시 임베딩
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::Config(
                "Hash embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    /// 동기 임베딩
    pub fn embed_sync(&self, text: &str) -> Vector {
        let mut vector = vec![0.0f32; self.dimension];

        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        for token in &tokens {
            self.accumulate(&mut vector, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut vector, bigram.as_bytes(), BIGRAM_WEIGHT);
        }

        let norm = crate::knowledge::l2_norm(&vector);
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }

    /// 특징 하나를 버킷에 누적
    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let digest = Sha256::digest(feature);
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vector> {
        Ok(self.embed_sync(text))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vector>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> String {
        HASH_MODEL_ID.to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
