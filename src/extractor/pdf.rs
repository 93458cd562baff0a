//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 텍스트를 추출합니다.
//! CPU 바운드이므로 호출자는 spawn_blocking 안에서 실행해야 합니다.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use crate::error::{RagError, Result};

/// PDF에서 페이지별 텍스트 추출
///
/// 텍스트가 없는 페이지는 제외됩니다. 스캔 문서처럼 텍스트가 전혀 없으면
/// 빈 벡터를 반환합니다.
pub fn extract_pages(path: &Path, source_name: &str) -> Result<Vec<String>> {
    let fail = |message: String| RagError::Extraction {
        source_name: source_name.to_string(),
        message,
    };

    let bytes = std::fs::read(path).map_err(|e| fail(format!("Failed to read PDF: {}", e)))?;

    // 손상된 파일에서 파서가 panic하는 경우가 있음
    let text = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(&bytes)
    }))
    .map_err(|_| fail("PDF parser panicked".to_string()))?
    .map_err(|e| fail(format!("Failed to extract text from PDF: {}", e)))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(Vec::new());
    }

    Ok(split_pages(&text))
}

/// 폼피드 문자 (\x0c) 기준으로 페이지 분리
fn split_pages(text: &str) -> Vec<String> {
    text.split('\x0c')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// 페이지를 줄바꿈 하나로 이어 붙임
pub fn join_pages(pages: &[String]) -> String {
    pages.join("\n")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_pages_with_formfeed() {
        let text = "Page 1 content\x0cPage 2 content\x0cPage 3 content";
        let pages = split_pages(text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], "Page 1 content");
        assert_eq!(pages[1], "Page 2 content");
    }

    #[test]
    fn test_empty_pages_contribute_nothing() {
        let pages = split_pages("first\x0c   \x0c\x0csecond");
        assert_eq!(join_pages(&pages), "first\nsecond");
    }

    #[test]
    fn test_split_pages_no_separator() {
        let pages = split_pages("Just some text without page breaks");
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn test_invalid_pdf_is_extraction_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        let err = extract_pages(&path, "broken.pdf").unwrap_err();
        assert!(matches!(err, RagError::Extraction { .. }));
    }

    #[test]
    fn test_missing_pdf_is_extraction_error() {
        let dir = TempDir::new().unwrap();
        let err = extract_pages(&dir.path().join("gone.pdf"), "gone.pdf").unwrap_err();
        assert!(matches!(err, RagError::Extraction { .. }));
    }
}
