//! Knowledge 모듈 - 검색 파이프라인
//!
//! - Chunker: 고정 크기 + 오버랩 문자 분할
//! - Index: 코사인 유사도 전수 검색, 빌드 후 슬롯 교체
//! - Store: SQLite 인덱스 스냅샷
//! - Retriever / ContextAssembler: 질의 → 청크 → 컨텍스트

mod chunker;
mod context;
mod document;
mod index;
mod retriever;
mod store;

// Re-exports
pub use chunker::{Chunk, ChunkConfig, Chunker, TextChunks};
pub use context::{ContextAssembler, CHUNK_SEPARATOR};
pub use document::Document;
pub use index::{
    cosine_similarity, l2_norm, IndexBuilder, IndexEntry, IndexSlot, QueryResult, ScoredChunk,
    SourceMetadata, Vector, VectorIndex,
};
pub use retriever::Retriever;
pub use store::{IndexStore, SnapshotInfo, INDEX_DB_FILE};
