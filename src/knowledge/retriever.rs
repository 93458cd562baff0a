//! Retriever - 질의 임베딩 + 인덱스 검색
//!
//! 인덱스가 비어 있으면 임베더를 호출하지 않고 빈 결과를 반환합니다.
//! "지식 없음" 처리는 호출자 책임입니다.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;

use super::index::{IndexSlot, QueryResult};

/// 검색기
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    slot: Arc<IndexSlot>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, slot: Arc<IndexSlot>) -> Self {
        Self { embedder, slot }
    }

    /// 상위 k개 청크 검색
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<QueryResult> {
        let index = self.slot.snapshot();
        if index.is_empty() || k == 0 {
            tracing::debug!("Retrieve on empty index: {:?}", query);
            return Ok(QueryResult::empty());
        }

        let query_vector = self.embedder.embed(query).await?;
        let result = index.search(&query_vector, k)?;

        tracing::debug!(
            "Retrieved {} chunks (top score: {:?})",
            result.len(),
            result.top().map(|h| h.score)
        );
        Ok(result)
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn slot(&self) -> &Arc<IndexSlot> {
        &self.slot
    }
}

// ============================================================================
// Tests
// ============================================================================
