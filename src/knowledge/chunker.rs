//! Text Chunking Module
//!
//! 고정 크기 + 오버랩 문자 단위 청킹을 제공합니다.
//! 문자는 유니코드 스칼라 값 기준이며, 멀티바이트 문자 중간에서 자르지 않습니다.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

use super::Document;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 연속 청크 간 오버랩 (문자 수)
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            overlap: 100,
        }
    }
}

impl ChunkConfig {
    /// 오버랩 없는 설정
    pub fn without_overlap(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            overlap: 0,
        }
    }

    /// chunk_size > overlap ≥ 0 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "Invalid chunk config: chunk_size={} overlap={} (need chunk_size > overlap)",
                self.chunk_size, self.overlap
            )));
        }
        Ok(())
    }

    /// 다음 청크 시작까지의 이동 거리
    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

// ============================================================================
// Chunk
// ============================================================================

/// 검색 단위 청크
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// "{document_id}-{sequence}"
    pub id: String,
    /// 원본 문서 이름 (파일명)
    pub source_name: String,
    pub text: String,
    /// 문서 내 순번 (0부터)
    pub sequence: usize,
}

// ============================================================================
// Chunker
// ============================================================================

/// 고정 크기 청커
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    /// 설정으로 생성 (잘못된 설정은 에러)
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    /// 텍스트를 지연 분할
    ///
    /// 반환된 이터레이터는 `Clone`으로 처음부터 다시 순회할 수 있습니다.
    pub fn split<'a>(&self, text: &'a str) -> TextChunks<'a> {
        TextChunks {
            text,
            config: self.config,
            start: 0,
            done: text.is_empty(),
        }
    }

    /// 문서를 출처 정보가 붙은 청크로 분할
    pub fn chunk_document<'a>(&self, doc: &'a Document) -> impl Iterator<Item = Chunk> + 'a {
        self.split(&doc.text)
            .enumerate()
            .map(move |(sequence, text)| Chunk {
                id: format!("{}-{}", doc.id, sequence),
                source_name: doc.source_name.clone(),
                text: text.to_string(),
                sequence,
            })
    }
}

/// 청크 텍스트 이터레이터
#[derive(Debug, Clone)]
pub struct TextChunks<'a> {
    text: &'a str,
    config: ChunkConfig,
    /// 현재 청크 시작 바이트 위치
    start: usize,
    done: bool,
}

impl<'a> Iterator for TextChunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let rest = &self.text[self.start..];
        let end = self.start + byte_offset_of_char(rest, self.config.chunk_size);
        let chunk = &self.text[self.start..end];

        if end >= self.text.len() {
            self.done = true;
        } else {
            self.start += byte_offset_of_char(rest, self.config.step());
        }

        Some(chunk)
    }
}

impl std::iter::FusedIterator for TextChunks<'_> {}

/// `n`번째 문자의 바이트 위치 (문자열보다 길면 끝)
#[inline]
fn byte_offset_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

// ============================================================================
// Tests
// ============================================================================
