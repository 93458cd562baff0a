//! Vector Index - 코사인 유사도 기반 최근접 이웃 검색
//!
//! 전수 비교(flat) 인덱스입니다. 삽입은 append-only이며,
//! 문서 집합이 바뀌면 [`IndexBuilder`]로 새 인덱스를 만들어 [`IndexSlot`]에 교체합니다.
//!
//! 유사도: 코사인 유사도 (-1.0 ~ 1.0). 정규화 벡터의 L2 거리와 순위가 같습니다.
//! 동점은 먼저 삽입된 항목이 앞섭니다.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::error::{RagError, Result};

use super::chunker::Chunk;

/// 임베딩 벡터
pub type Vector = Vec<f32>;

// ============================================================================
// Types
// ============================================================================

/// 청크의 출처 정보
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMetadata {
    pub document_id: String,
    pub source_path: Option<PathBuf>,
    pub ingested_at: Option<DateTime<Utc>>,
}

/// 인덱스 엔트리
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub vector: Vector,
    pub chunk: Chunk,
    pub source: SourceMetadata,
    /// 삽입 시 계산한 L2 norm
    norm: f32,
}

/// 검색된 청크와 유사도
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// 검색 결과 (유사도 내림차순, 길이 ≤ k)
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    hits: Vec<ScoredChunk>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn hits(&self) -> &[ScoredChunk] {
        &self.hits
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredChunk> {
        self.hits.iter()
    }

    /// 최상위 결과
    pub fn top(&self) -> Option<&ScoredChunk> {
        self.hits.first()
    }
}

impl From<Vec<ScoredChunk>> for QueryResult {
    fn from(hits: Vec<ScoredChunk>) -> Self {
        Self { hits }
    }
}

impl IntoIterator for QueryResult {
    type Item = ScoredChunk;
    type IntoIter = std::vec::IntoIter<ScoredChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a ScoredChunk;
    type IntoIter = std::slice::Iter<'a, ScoredChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

// ============================================================================
// VectorIndex
// ============================================================================

/// 전수 비교 벡터 인덱스
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// 차원 D 고정 인덱스 생성
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 삽입 순서대로 엔트리 순회
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// 청크와 벡터 배치 삽입 (출처 정보 없음)
    pub fn insert_many(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vector>) -> Result<usize> {
        self.insert_with_source(&SourceMetadata::default(), chunks, vectors)
    }

    /// 같은 문서에서 나온 청크 배치 삽입
    ///
    /// 배치 전체를 먼저 검증하므로 실패 시 인덱스는 변경되지 않습니다.
    pub fn insert_with_source(
        &mut self,
        source: &SourceMetadata,
        chunks: Vec<Chunk>,
        vectors: Vec<Vector>,
    ) -> Result<usize> {
        if chunks.len() != vectors.len() {
            return Err(RagError::DimensionMismatch {
                context: "chunk/vector count".to_string(),
                expected: chunks.len(),
                actual: vectors.len(),
            });
        }

        for (chunk, vector) in chunks.iter().zip(&vectors) {
            if vector.is_empty() {
                return Err(RagError::EmptyVector {
                    chunk_id: chunk.id.clone(),
                });
            }
            if vector.len() != self.dimension {
                return Err(RagError::DimensionMismatch {
                    context: format!("vector for chunk '{}'", chunk.id),
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
            // NaN/inf 성분 거부
            if !is_finite(vector) {
                return Err(RagError::NonFiniteVector {
                    context: format!("vector for chunk '{}'", chunk.id),
                });
            }
        }

        let count = chunks.len();
        self.entries.reserve(count);
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            let norm = l2_norm(&vector);
            self.entries.push(IndexEntry {
                vector,
                chunk,
                source: source.clone(),
                norm,
            });
        }

        Ok(count)
    }

    /// 상위 k개 검색
    ///
    /// 빈 인덱스나 k=0은 빈 결과를 반환합니다 (에러 아님).
    pub fn search(&self, query: &[f32], k: usize) -> Result<QueryResult> {
        if self.entries.is_empty() || k == 0 {
            return Ok(QueryResult::empty());
        }

        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                context: "query vector".to_string(),
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if !is_finite(query) {
            return Err(RagError::NonFiniteVector {
                context: "query vector".to_string(),
            });
        }

        let query_norm = l2_norm(query);

        // (점수, 삽입 위치)
        let mut scored: Vec<(f32, usize)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (cosine_with_norms(query, query_norm, &entry.vector, entry.norm), pos))
            .collect();

        // 점수 내림차순, 동점이면 먼저 삽입된 것 우선
        let rank = |a: &(f32, usize), b: &(f32, usize)| -> Ordering {
            b.0.total_cmp(&a.0).then(a.1.cmp(&b.1))
        };

        let k = k.min(scored.len());
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, rank);
            scored.truncate(k);
        }
        scored.sort_unstable_by(rank);

        let hits = scored
            .into_iter()
            .map(|(score, pos)| ScoredChunk {
                chunk: self.entries[pos].chunk.clone(),
                score,
            })
            .collect::<Vec<_>>();

        Ok(QueryResult::from(hits))
    }
}

// ============================================================================
// IndexBuilder / IndexSlot
// ============================================================================

/// 새 인덱스를 구성하는 빌더
///
/// 완성된 인덱스는 불변이며 [`IndexSlot::swap`]으로 서비스에 투입됩니다.
#[derive(Debug)]
pub struct IndexBuilder {
    index: VectorIndex,
}

impl IndexBuilder {
    pub fn new(dimension: usize) -> Self {
        Self {
            index: VectorIndex::new(dimension),
        }
    }

    /// 문서 하나의 청크 추가
    pub fn add(
        &mut self,
        source: &SourceMetadata,
        chunks: Vec<Chunk>,
        vectors: Vec<Vector>,
    ) -> Result<usize> {
        self.index.insert_with_source(source, chunks, vectors)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn build(self) -> Arc<VectorIndex> {
        tracing::debug!(
            "Built vector index (entries={}, dimension={})",
            self.index.len(),
            self.index.dimension()
        );
        Arc::new(self.index)
    }
}

/// 서비스 중인 인덱스 슬롯
///
/// 쿼리는 스냅샷(`Arc`)을 받아 사용하므로 빌드 중 교체가 일어나도
/// 이전 완성본 또는 새 완성본만 관찰합니다.
#[derive(Debug)]
pub struct IndexSlot {
    current: RwLock<Arc<VectorIndex>>,
}

impl IndexSlot {
    /// 빈 인덱스로 시작
    pub fn new(dimension: usize) -> Self {
        Self::with_index(Arc::new(VectorIndex::new(dimension)))
    }

    pub fn with_index(index: Arc<VectorIndex>) -> Self {
        Self {
            current: RwLock::new(index),
        }
    }

    /// 현재 인덱스 스냅샷
    pub fn snapshot(&self) -> Arc<VectorIndex> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// 새 인덱스로 교체하고 이전 인덱스 반환
    pub fn swap(&self, index: Arc<VectorIndex>) -> Arc<VectorIndex> {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, index)
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

fn is_finite(vector: &[f32]) -> bool {
    vector.iter().all(|x| x.is_finite())
}

/// 코사인 유사도 계산
///
/// 길이가 다르거나 비어 있거나 norm이 0이면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    cosine_with_norms(a, l2_norm(a), b, l2_norm(b))
}

#[inline]
fn cosine_with_norms(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}

#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(i: usize) -> Chunk {
        Chunk {
            id: format!("doc-{}", i),
            source_name: "test.txt".to_string(),
            text: format!("chunk {}", i),
            sequence: i,
        }
    }

    fn one_hot(dim: usize, i: usize) -> Vector {
        let mut v = vec![0.0; dim];
        v[i] = 1.0;
        v
    }

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_empty() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_search_empty_index() {
        let index = VectorIndex::new(3);
        assert!(index.is_empty());
        let result = index.search(&[1.0, 0.0, 0.0], 4).unwrap();
        assert!(result.is_empty());

        // 빈 인덱스는 차원이 달라도 빈 결과
        let result = index.search(&[1.0], 4).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_search_identical_vector_ranks_first() {
        let dim = 8;
        let mut index = VectorIndex::new(dim);
        let chunks: Vec<_> = (0..dim).map(chunk).collect();
        let vectors: Vec<_> = (0..dim).map(|i| one_hot(dim, i)).collect();
        index.insert_many(chunks, vectors).unwrap();

        for i in 0..dim {
            let result = index.search(&one_hot(dim, i), 3).unwrap();
            assert_eq!(result.len(), 3);
            let top = result.top().unwrap();
            assert_eq!(top.chunk.sequence, i);
            assert!((top.score - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_search_descending_and_ties_by_insertion() {
        let mut index = VectorIndex::new(2);
        index
            .insert_many(
                vec![chunk(0), chunk(1), chunk(2), chunk(3)],
                vec![
                    vec![0.0, 1.0],
                    vec![1.0, 1.0],
                    vec![2.0, 0.0],
                    vec![5.0, 0.0],
                ],
            )
            .unwrap();

        let result = index.search(&[1.0, 0.0], 4).unwrap();
        let order: Vec<_> = result.iter().map(|h| h.chunk.sequence).collect();
        // 2와 3은 같은 방향 → 동점, 먼저 삽입된 2가 앞
        assert_eq!(order, vec![2, 3, 1, 0]);

        let scores: Vec<_> = result.iter().map(|h| h.score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));

        let top2 = index.search(&[1.0, 0.0], 2).unwrap();
        let order: Vec<_> = top2.iter().map(|h| h.chunk.sequence).collect();
        assert_eq!(order, vec![2, 3]);
    }

    #[test]
    fn test_k_larger_than_index() {
        let mut index = VectorIndex::new(2);
        index.insert_many(vec![chunk(0)], vec![vec![1.0, 0.0]]).unwrap();
        assert_eq!(index.search(&[1.0, 0.0], 10).unwrap().len(), 1);
        assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_insert_count_mismatch() {
        let mut index = VectorIndex::new(2);
        let err = index
            .insert_many(vec![chunk(0), chunk(1)], vec![vec![1.0, 0.0]])
            .unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_wrong_dimension_is_atomic() {
        let mut index = VectorIndex::new(2);
        let err = index
            .insert_many(
                vec![chunk(0), chunk(1)],
                vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch { expected: 2, actual: 3, .. }
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_empty_vector() {
        let mut index = VectorIndex::new(2);
        let err = index.insert_many(vec![chunk(0)], vec![vec![]]).unwrap_err();
        assert!(matches!(err, RagError::EmptyVector { .. }));
    }

    #[test]
    fn test_non_finite_vector_rejected() {
        let mut index = VectorIndex::new(2);
        index.insert_many(vec![chunk(0)], vec![vec![1.0, 0.0]]).unwrap();

        for bad in [vec![f32::NAN, 0.0], vec![f32::INFINITY, 1.0]] {
            let err = index.insert_many(vec![chunk(1)], vec![bad]).unwrap_err();
            assert!(matches!(err, RagError::NonFiniteVector { .. }));
        }
        assert_eq!(index.len(), 1);
        assert_eq!(index.search(&[1.0, 0.0], 5).unwrap().top().unwrap().chunk.sequence, 0);

        assert!(matches!(
            index.search(&[f32::NAN, 0.0], 1),
            Err(RagError::NonFiniteVector { .. })
        ));
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let mut index = VectorIndex::new(2);
        index.insert_many(vec![chunk(0)], vec![vec![1.0, 0.0]]).unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0], 1).is_err());
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let mut index = VectorIndex::new(2);
        index
            .insert_many(vec![chunk(0), chunk(1)], vec![vec![0.0, 0.0], vec![-1.0, 0.0]])
            .unwrap();
        let result = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(result.top().unwrap().chunk.sequence, 0);
        assert_eq!(result.top().unwrap().score, 0.0);
    }

    #[test]
    fn test_slot_swap() {
        let slot = IndexSlot::new(2);
        let before = slot.snapshot();
        assert!(before.is_empty());

        let mut builder = IndexBuilder::new(2);
        builder
            .add(&SourceMetadata::default(), vec![chunk(0)], vec![vec![1.0, 0.0]])
            .unwrap();
        let previous = slot.swap(builder.build());

        assert!(previous.is_empty());
        // 교체 전에 받은 스냅샷은 그대로
        assert!(before.is_empty());
        assert_eq!(slot.snapshot().len(), 1);
    }
}
