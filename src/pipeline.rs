//! RagCore - 수집/질의 파이프라인 오케스트레이션
//!
//! 문서 → 청크 → 임베딩 → 인덱스 빌드 → 슬롯 교체,
//! 질문 → 검색 → 컨텍스트 조립 → 생성 → 대화 기록.
//!
//! 대화 기록은 질의가 끝난 뒤에만 추가되므로 `ask` future를 중간에
//! 버려도 기록에는 아무것도 남지 않습니다.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

use crate::collector::CollectedFile;
use crate::config::Settings;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::extractor::ContentExtractor;
use crate::generation::{GenerationBackend, GenerationRequest, OllamaGeneration};
use crate::knowledge::{
    Chunk, ChunkConfig, Chunker, ContextAssembler, Document, IndexBuilder, IndexSlot,
    IndexStore, QueryResult, Retriever, SourceMetadata, VectorIndex,
};
use crate::session::{ConversationTurn, SessionStore};

/// 인덱스가 비어 있을 때의 답변
pub const NO_KNOWLEDGE_ANSWER: &str = "Please ingest documents and build the index first.";

/// 생성/임베딩 백엔드를 사용할 수 없을 때의 답변
pub const UNAVAILABLE_ANSWER: &str =
    "The answer service is temporarily unavailable. Please try again later.";

// ============================================================================
// Types
// ============================================================================

/// 답변 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// 백엔드가 컨텍스트로 답변함
    Answered,
    /// 검색할 지식이 없음
    NoKnowledge,
    /// 백엔드 실패 (기록하지 않음)
    Unavailable,
}

/// 답변에 사용된 청크
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub source_name: String,
    pub chunk_id: String,
    pub sequence: usize,
    pub score: f32,
}

/// 질의 결과
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub status: AnswerStatus,
    /// 컨텍스트에 실제로 포함된 청크 (순위 순)
    pub sources: Vec<SourceRef>,
}

impl Answer {
    fn without_sources(text: &str, status: AnswerStatus) -> Self {
        Self {
            text: text.to_string(),
            status,
            sources: Vec::new(),
        }
    }
}

/// 건너뛴 파일
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub name: String,
    pub reason: String,
}

/// 수집 결과
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub skipped: Vec<SkippedFile>,
    /// 스냅샷 저장 여부
    pub persisted: bool,
}

// ============================================================================
// RagCore
// ============================================================================

/// 검색 증강 생성 파이프라인
pub struct RagCore {
    settings: Settings,
    chunker: Chunker,
    retriever: Retriever,
    slot: Arc<IndexSlot>,
    assembler: ContextAssembler,
    backend: Arc<dyn GenerationBackend>,
    store: Option<IndexStore>,
    session: Mutex<SessionStore>,
    /// 백엔드 호출 전체(재시도 포함)의 상한
    backend_deadline: Duration,
}

impl RagCore {
    /// 구성 요소를 직접 지정해 생성
    pub fn new(
        settings: Settings,
        embedder: Arc<dyn EmbeddingProvider>,
        backend: Arc<dyn GenerationBackend>,
        session: SessionStore,
    ) -> Result<Self> {
        settings.validate()?;

        let chunker = Chunker::new(ChunkConfig {
            chunk_size: settings.chunk_size,
            overlap: settings.overlap,
        })?;
        let slot = Arc::new(IndexSlot::new(embedder.dimension()));
        let retriever = Retriever::new(embedder, slot.clone());
        let assembler = ContextAssembler::new(settings.context_char_budget);

        let backend_deadline = settings.generation.backend_deadline();

        Ok(Self {
            chunker,
            retriever,
            slot,
            assembler,
            backend,
            store: None,
            session: Mutex::new(session),
            backend_deadline,
            settings,
        })
    }

    /// 데이터 디렉토리 기준으로 전체 구성
    ///
    /// 설정에 맞는 임베더와 Ollama 백엔드를 만들고, 저장된 인덱스
    /// 스냅샷과 대화 기록을 불러옵니다.
    pub fn open(data_dir: &Path, settings: Settings) -> Result<Self> {
        let embedder = create_embedder(&settings)?;
        let backend = Arc::new(OllamaGeneration::new(&settings.generation)?);
        let session = SessionStore::open_in(data_dir)?;
        let store = IndexStore::open_in(data_dir)?;

        let core = Self::new(settings, embedder, backend, session)?.with_index_store(store);
        core.load_index()?;
        Ok(core)
    }

    /// 인덱스 스냅샷 저장소 연결
    pub fn with_index_store(mut self, store: IndexStore) -> Self {
        self.store = Some(store);
        self
    }

    /// 백엔드 호출 상한 변경
    pub fn with_backend_deadline(mut self, deadline: Duration) -> Self {
        self.backend_deadline = deadline;
        self
    }

    /// 저장된 스냅샷을 서비스 슬롯에 적재
    ///
    /// 다른 모델로 만든 스냅샷은 경고 후 무시합니다 (다시 수집 필요).
    pub fn load_index(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let embedder = self.retriever.embedder();
        match store.load(&embedder.model_id(), embedder.dimension()) {
            Ok(Some(index)) => {
                let count = index.len();
                self.slot.swap(Arc::new(index));
                tracing::info!("Loaded index snapshot ({} chunks)", count);
                Ok(count)
            }
            Ok(None) => Ok(0),
            Err(e @ (RagError::DimensionMismatch { .. } | RagError::Config(_))) => {
                tracing::warn!("Ignoring stored index: {}. Run ingest again.", e);
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Ingest
    // ========================================================================

    /// 문서 집합으로 인덱스를 새로 빌드해 교체
    ///
    /// 빌드 중 오류가 나면 이전 인덱스가 그대로 서비스됩니다.
    pub async fn ingest(&self, documents: Vec<Document>) -> Result<IngestReport> {
        if documents.is_empty() {
            return Err(RagError::Config("No documents to ingest".to_string()));
        }

        let per_document: Vec<Vec<Chunk>> = documents
            .iter()
            .map(|doc| self.chunker.chunk_document(doc).collect())
            .collect();
        let texts: Vec<String> = per_document
            .iter()
            .flatten()
            .map(|chunk| chunk.text.clone())
            .collect();
        if texts.is_empty() {
            return Err(RagError::Config(
                "Documents produced no chunks; keeping the current index".to_string(),
            ));
        }

        tracing::info!(
            "Embedding {} chunks from {} documents",
            texts.len(),
            documents.len()
        );
        let embedder = self.retriever.embedder();
        let vectors = embedder.embed_many(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(RagError::DimensionMismatch {
                context: "embedding batch size".to_string(),
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        let mut vectors = vectors.into_iter();

        let mut builder = IndexBuilder::new(embedder.dimension());
        for (doc, chunks) in documents.iter().zip(per_document) {
            let doc_vectors: Vec<_> = vectors.by_ref().take(chunks.len()).collect();
            let source = SourceMetadata {
                document_id: doc.id.clone(),
                source_path: doc.source_path.clone(),
                ingested_at: Some(doc.ingested_at),
            };
            builder.add(&source, chunks, doc_vectors)?;
        }
        let index = builder.build();

        let persisted = self.persist(&index)?;
        let chunks = index.len();
        self.slot.swap(index);

        tracing::info!("Index rebuilt: {} chunks", chunks);
        Ok(IngestReport {
            documents: documents.len(),
            chunks,
            skipped: Vec::new(),
            persisted,
        })
    }

    /// 파일을 추출해 수집 (추출 실패 파일은 건너뜀)
    pub async fn ingest_paths(&self, files: &[CollectedFile]) -> Result<IngestReport> {
        self.ingest_files(files, Vec::new()).await
    }

    /// 이미 만들어진 문서와 파일을 함께 하나의 인덱스로 수집
    pub async fn ingest_files(
        &self,
        files: &[CollectedFile],
        mut documents: Vec<Document>,
    ) -> Result<IngestReport> {
        let extractor = ContentExtractor::new();
        documents.reserve(files.len());
        let mut skipped = Vec::new();

        for file in files {
            match extractor.extract(file).await {
                Ok(Some(doc)) => documents.push(doc),
                Ok(None) => skipped.push(SkippedFile {
                    name: file.display_name(),
                    reason: "no text extracted".to_string(),
                }),
                Err(e @ RagError::Extraction { .. }) => {
                    tracing::warn!("Skipping {}: {}", file.display_name(), e);
                    skipped.push(SkippedFile {
                        name: file.display_name(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if documents.is_empty() {
            return Err(RagError::Config(format!(
                "No readable documents ({} skipped)",
                skipped.len()
            )));
        }

        let mut report = self.ingest(documents).await?;
        report.skipped = skipped;
        Ok(report)
    }

    fn persist(&self, index: &VectorIndex) -> Result<bool> {
        match &self.store {
            Some(store) => {
                store.save(index, &self.retriever.embedder().model_id())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ========================================================================
    // Ask
    // ========================================================================

    /// 설정된 top_k로 질의
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        self.ask_with_k(question, self.settings.top_k).await
    }

    /// 질의
    ///
    /// 백엔드 실패는 `Unavailable` 답변으로 변환되며 기록되지 않습니다.
    pub async fn ask_with_k(&self, question: &str, k: usize) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Config("Question must not be empty".to_string()));
        }
        if k == 0 {
            return Err(RagError::Config("k must be greater than zero".to_string()));
        }

        let result = match self.retriever.retrieve(question, k).await {
            Ok(result) => result,
            Err(e) if e.is_backend_failure() => return Ok(self.unavailable(&e)),
            Err(e) => return Err(e),
        };

        if result.is_empty() {
            let answer = Answer::without_sources(NO_KNOWLEDGE_ANSWER, AnswerStatus::NoKnowledge);
            self.record(question, &answer.text)?;
            return Ok(answer);
        }

        let (context, included) = self.assembler.assemble_with_count(&result);
        let request = GenerationRequest::grounded(context, question);

        let generated =
            match tokio::time::timeout(self.backend_deadline, self.backend.generate(&request))
                .await
            {
                Ok(Ok(text)) => text,
                Ok(Err(e)) if e.is_backend_failure() => return Ok(self.unavailable(&e)),
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    let e = RagError::BackendTimeout {
                        backend: self.backend.name().to_string(),
                        timeout: self.backend_deadline,
                    };
                    return Ok(self.unavailable(&e));
                }
            };

        self.record(question, &generated)?;
        Ok(Answer {
            text: generated,
            status: AnswerStatus::Answered,
            sources: source_refs(&result, included),
        })
    }

    fn unavailable(&self, error: &RagError) -> Answer {
        tracing::warn!("Answer unavailable: {}", error);
        Answer::without_sources(UNAVAILABLE_ANSWER, AnswerStatus::Unavailable)
    }

    /// 완료된 질의/답변 한 쌍 기록 (await 없이 잠금)
    fn record(&self, question: &str, answer: &str) -> Result<()> {
        self.lock_session().append_exchange(question, answer)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// 대화 기록 사본
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.lock_session().turns().to_vec()
    }

    /// 대화 기록 비우기
    pub fn clear_history(&self) -> Result<()> {
        self.lock_session().clear()
    }

    /// 서비스 중인 인덱스의 청크 수
    pub fn index_len(&self) -> usize {
        self.slot.snapshot().len()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index_store(&self) -> Option<&IndexStore> {
        self.store.as_ref()
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionStore> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn source_refs(result: &QueryResult, included: usize) -> Vec<SourceRef> {
    result
        .iter()
        .take(included)
        .map(|hit| SourceRef {
            source_name: hit.chunk.source_name.clone(),
            chunk_id: hit.chunk.id.clone(),
            sequence: hit.chunk.sequence,
            score: hit.score,
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
