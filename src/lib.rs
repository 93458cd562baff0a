//! docchat-rag - 문서 기반 질의응답 RAG 시스템
//!
//! PDF/HTML/텍스트 문서를 청크로 나눠 임베딩하고, 질문과 가장 가까운
//! 청크를 컨텍스트로 생성 백엔드(Ollama)에 전달합니다.
//! 대화 기록은 JSON 파일로 유지됩니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod knowledge;
pub mod pipeline;
pub mod session;

// Re-exports
pub use collector::{CollectedFile, CollectorConfig, FileCollector, FileType};
pub use config::{get_data_dir, EmbeddingKind, Settings};
pub use embedding::{create_embedder, EmbeddingProvider, HashEmbedding, OllamaEmbedding};
pub use error::{RagError, Result};
pub use extractor::ContentExtractor;
pub use generation::{GenerationBackend, GenerationRequest, OllamaGeneration};
pub use knowledge::{
    Chunk, ChunkConfig, Chunker, ContextAssembler, Document, IndexBuilder, IndexSlot, IndexStore,
    QueryResult, Retriever, ScoredChunk, VectorIndex,
};
pub use pipeline::{Answer, AnswerStatus, IngestReport, RagCore, SourceRef};
pub use session::{ConversationTurn, Sender, SessionStore};
