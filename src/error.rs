//! 에러 타입 - 검색 파이프라인 전체에서 사용하는 에러 분류
//!
//! - 추출 실패: 해당 문서만 건너뛰고 배치는 계속
//! - 차원 불일치 / 빈 벡터: 인덱스 빌드 중단 (복구 불가)
//! - 백엔드 타임아웃 / 오류: "일시적으로 사용 불가" 응답으로 변환
//! - 손상된 히스토리: 로그 후 빈 히스토리로 시작

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 문서를 열거나 파싱할 수 없음
    #[error("Extraction failed for '{source_name}': {message}")]
    Extraction {
        source_name: String,
        message: String,
    },

    /// 벡터 차원 또는 개수 불일치
    #[error("Dimension mismatch ({context}): expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// 빈 벡터 삽입 시도
    #[error("Empty vector for chunk '{chunk_id}'")]
    EmptyVector { chunk_id: String },

    /// NaN 또는 무한대 성분이 있는 벡터
    #[error("Non-finite component in {context}")]
    NonFiniteVector { context: String },

    /// 백엔드 응답 시간 초과
    #[error("{backend} timed out after {timeout:?}")]
    BackendTimeout { backend: String, timeout: Duration },

    /// 백엔드 연결 실패 또는 잘못된 응답
    #[error("{backend} error: {message}")]
    Backend { backend: String, message: String },

    /// 저장된 대화 기록을 파싱할 수 없음
    #[error("Corrupt history at {path:?}: {message}")]
    CorruptHistory { path: PathBuf, message: String },

    /// 잘못된 설정 또는 입력
    #[error("Configuration error: {0}")]
    Config(String),

    /// 인덱스 스냅샷 저장소 오류
    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// 백엔드 에러 생성 헬퍼
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// 백엔드 관련 에러 여부 (사용자에게 "사용 불가" 응답으로 변환 대상)
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::Backend { .. } | Self::BackendTimeout { .. })
    }
}

impl From<rusqlite::Error> for RagError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// 파이프라인 Result 별칭
pub type Result<T> = std::result::Result<T, RagError>;
