//! 수집 문서 타입

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// 추출이 끝난 원본 문서
///
/// 청킹 후에는 버려지고 청크만 인덱스에 남습니다.
#[derive(Debug, Clone)]
pub struct Document {
    /// UUID v4
    pub id: String,
    /// 표시용 이름 (파일명)
    pub source_name: String,
    /// 원본 파일 경로 (직접 입력된 텍스트는 None)
    pub source_path: Option<PathBuf>,
    pub text: String,
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    /// 새 문서 생성 (ID 자동 발급)
    pub fn new(source_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_name: source_name.into(),
            source_path: None,
            text: text.into(),
            ingested_at: Utc::now(),
        }
    }

    /// 원본 경로 지정
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }
}
