//! 콘텐츠 추출 모듈
//!
//! 수집된 파일에서 텍스트를 추출해 `Document`로 만듭니다.
//! - 텍스트 파일: UTF-8로 직접 읽기
//! - HTML 파일: scraper로 본문 텍스트 추출
//! - PDF 파일: pdf-extract로 페이지별 추출 후 줄바꿈으로 연결
//!
//! 추출 실패는 `RagError::Extraction`으로 보고되며, 호출자는 해당 문서만
//! 건너뛰고 배치를 계속 진행합니다.

pub mod html;
pub mod pdf;

use std::path::Path;

use crate::collector::{CollectedFile, FileType};
use crate::error::{RagError, Result};
use crate::knowledge::Document;

/// 콘텐츠 추출기
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 파일에서 문서 추출
    ///
    /// 추출된 텍스트가 비어 있으면 경고 후 `None`.
    pub async fn extract(&self, file: &CollectedFile) -> Result<Option<Document>> {
        let name = file.display_name();
        let text = self.extract_text(&file.path, file.file_type, &name).await?;

        if text.trim().is_empty() {
            tracing::warn!("Skipping {}: no text extracted", name);
            return Ok(None);
        }

        tracing::debug!("Extracted {} chars from {}", text.chars().count(), name);
        Ok(Some(Document::new(name, text).with_path(&file.path)))
    }

    /// 경로에서 직접 추출 (확장자로 형식 판단)
    pub async fn extract_path(&self, path: &Path) -> Result<Option<Document>> {
        let file = CollectedFile::from_path(path.to_path_buf())
            .map_err(|e| extraction_error(path, e.to_string()))?
            .ok_or_else(|| extraction_error(path, "Unsupported file type".to_string()))?;
        self.extract(&file).await
    }

    /// 형식별 텍스트 추출
    pub async fn extract_text(&self, path: &Path, file_type: FileType, name: &str) -> Result<String> {
        match file_type {
            FileType::Text => {
                let bytes = read_bytes(path, name).await?;
                String::from_utf8(bytes).map_err(|e| RagError::Extraction {
                    source_name: name.to_string(),
                    message: format!("File is not valid UTF-8: {}", e),
                })
            }
            FileType::Html => {
                let bytes = read_bytes(path, name).await?;
                // HTML은 인코딩이 섞여 있는 경우가 많아 손실 변환
                Ok(html::extract_text(&String::from_utf8_lossy(&bytes)))
            }
            FileType::Pdf => {
                // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
                let owned_path = path.to_path_buf();
                let owned_name = name.to_string();
                let pages = tokio::task::spawn_blocking(move || {
                    pdf::extract_pages(&owned_path, &owned_name)
                })
                .await
                .map_err(|e| RagError::Extraction {
                    source_name: name.to_string(),
                    message: format!("PDF extraction task failed: {}", e),
                })??;

                Ok(pdf::join_pages(&pages))
            }
        }
    }
}

async fn read_bytes(path: &Path, name: &str) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| RagError::Extraction {
        source_name: name.to_string(),
        message: format!("Failed to read file: {}", e),
    })
}

fn extraction_error(path: &Path, message: String) -> RagError {
    RagError::Extraction {
        source_name: path.display().to_string(),
        message,
    }
}

// ============================================================================
// Tests
// ============================================================================
