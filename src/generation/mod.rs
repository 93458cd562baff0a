//! 생성 백엔드 모듈
//!
//! (컨텍스트, 질문)을 받아 답변 텍스트를 반환하는 외부 LLM 호출 계약입니다.
//! 백엔드에는 "컨텍스트로만 답하고 없으면 모른다고 말하라"는 지시가 함께 전달됩니다.

mod ollama;

use async_trait::async_trait;

use crate::error::Result;

pub use ollama::OllamaGeneration;

/// 컨텍스트에 답이 없을 때 백엔드가 사용하는 문장
pub const NOT_FOUND_ANSWER: &str = "Information not found in the documents.";

/// 기본 그라운딩 지시문
pub const GROUNDING_INSTRUCTION: &str = "Answer the question ONLY using the context.\n\
If the answer is not in the context, say:\n\
\"Information not found in the documents.\"";

// ============================================================================
// Request
// ============================================================================

/// 생성 요청
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub context: String,
    pub question: String,
    pub instruction: String,
}

impl GenerationRequest {
    /// 기본 지시문으로 요청 생성
    pub fn grounded(context: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            question: question.into(),
            instruction: GROUNDING_INSTRUCTION.to_string(),
        }
    }

    /// 단일 프롬프트로 렌더링
    pub fn to_prompt(&self) -> String {
        format!(
            "{}\n\nContext:\n{}\n\nQuestion:\n{}\n\nAnswer:",
            self.instruction, self.context, self.question
        )
    }
}

// ============================================================================
// GenerationBackend Trait
// ============================================================================

/// 생성 백엔드 트레이트
///
/// 타임아웃과 재시도는 구현체가 책임집니다.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// 답변 생성 (응답 텍스트를 그대로 답변으로 사용)
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// 백엔드 이름
    fn name(&self) -> &str;
}
