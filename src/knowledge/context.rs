//! Context Assembler - 검색 결과를 생성 백엔드 입력으로 조립

use super::index::QueryResult;

/// 청크 구분자 (빈 줄)
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// 컨텍스트 조립기
///
/// 순위 순서로 청크를 이어 붙이고, 예산(문자 수)을 넘으면
/// 낮은 순위 청크부터 통째로 버립니다. 청크 중간에서 자르지 않습니다.
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    char_budget: usize,
}

impl ContextAssembler {
    pub fn new(char_budget: usize) -> Self {
        Self { char_budget }
    }

    pub fn char_budget(&self) -> usize {
        self.char_budget
    }

    /// 컨텍스트 문자열 생성
    pub fn assemble(&self, result: &QueryResult) -> String {
        self.assemble_with_count(result).0
    }

    /// 컨텍스트와 포함된 청크 수 반환
    pub fn assemble_with_count(&self, result: &QueryResult) -> (String, usize) {
        let separator_len = CHUNK_SEPARATOR.chars().count();
        let mut context = String::new();
        let mut used = 0;
        let mut included = 0;

        for hit in result {
            let len = hit.chunk.text.chars().count();
            let extra = if included == 0 { len } else { separator_len + len };

            if used + extra > self.char_budget {
                tracing::debug!(
                    "Context budget reached: kept {} of {} chunks",
                    included,
                    result.len()
                );
                break;
            }

            if included > 0 {
                context.push_str(CHUNK_SEPARATOR);
            }
            context.push_str(&hit.chunk.text);
            used += extra;
            included += 1;
        }

        (context, included)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{Chunk, ScoredChunk};

    fn result(texts: &[&str]) -> QueryResult {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| ScoredChunk {
                chunk: Chunk {
                    id: format!("d-{}", i),
                    source_name: "doc".to_string(),
                    text: t.to_string(),
                    sequence: i,
                },
                score: 1.0 - i as f32 * 0.1,
            })
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_empty_result() {
        assert_eq!(ContextAssembler::new(100).assemble(&QueryResult::empty()), "");
    }

    #[test]
    fn test_joins_in_rank_order() {
        let context = ContextAssembler::new(100).assemble(&result(&["first", "second", "third"]));
        assert_eq!(context, "first\n\nsecond\n\nthird");
    }

    #[test]
    fn test_drops_lowest_ranked_whole_chunks() {
        let chunks = ["a".repeat(40), "b".repeat(40), "c".repeat(40)];
        let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let assembler = ContextAssembler::new(100);

        let (context, included) = assembler.assemble_with_count(&result(&refs));
        assert_eq!(included, 2);
        assert_eq!(context, format!("{}\n\n{}", chunks[0], chunks[1]));
        assert!(context.chars().count() <= 100);
        assert!(!context.contains('c'));
    }

    #[test]
    fn test_never_exceeds_budget() {
        let texts: Vec<String> = (1..20).map(|n| "x".repeat(n * 7)).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        for budget in [0, 1, 10, 50, 123, 500, 10_000] {
            let context = ContextAssembler::new(budget).assemble(&result(&refs));
            assert!(context.chars().count() <= budget, "budget={budget}");
        }
    }

    #[test]
    fn test_budget_counts_characters() {
        // 한글 3글자 = 9바이트지만 3문자
        let context = ContextAssembler::new(3).assemble(&result(&["가나다"]));
        assert_eq!(context, "가나다");
    }
}
