//! HTML 텍스트 추출 모듈
//!
//! 본문 영역(article > main > body)의 텍스트만 남기고 태그를 제거합니다.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// 본문 후보 선택자 (우선순위 순)
const CONTENT_SELECTORS: &[&str] = &["article", "main", "[role=main]", "body"];

/// 이보다 짧은 후보는 건너뛰고 다음 선택자를 시도
const MIN_CONTENT_CHARS: usize = 100;

/// HTML 문서에서 텍스트 추출
///
/// `<title>`이 있으면 첫 줄로 둡니다.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let content = extract_content(&document);

    match extract_title(&document) {
        Some(title) if !content.starts_with(&title) => format!("{}\n{}", title, content),
        _ => content,
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

fn extract_content(document: &Html) -> String {
    let mut fallback = String::new();

    for selector_str in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = text_of(&element);
            if text.chars().count() >= MIN_CONTENT_CHARS {
                return text;
            }
            if fallback.is_empty() {
                fallback = text;
            }
        }
    }

    // 조각 문서 (body 없음)
    if fallback.is_empty() {
        fallback = text_of(&document.root_element());
    }
    fallback
}

/// 요소의 텍스트 (script/style 제외)
fn text_of(element: &ElementRef) -> String {
    let mut text = String::new();

    for node in element.descendants() {
        let Some(chunk) = node.value().as_text() else {
            continue;
        };
        let inside_code = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| matches!(e.name(), "script" | "style" | "noscript"))
                .unwrap_or(false)
        });
        if inside_code {
            continue;
        }

        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed);
        }
    }

    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    static WHITESPACE: OnceLock<Option<Regex>> = OnceLock::new();
    match WHITESPACE.get_or_init(|| Regex::new(r"\s+").ok()) {
        Some(re) => re.replace_all(text, " ").trim().to_string(),
        None => text.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_first_line() {
        let html = r#"
            <html>
                <head><title>Refund Policy</title></head>
                <body><p>Refunds are accepted within 30 days.</p></body>
            </html>
        "#;
        let text = extract_text(html);
        assert_eq!(text, "Refund Policy\nRefunds are accepted within 30 days.");
    }

    #[test]
    fn test_prefers_article() {
        let html = r#"
            <html>
                <body>
                    <nav>Navigation menu</nav>
                    <article>
                        This is the main article content.
                        It should be extracted as the primary content.
                        More text to ensure it's over one hundred characters.
                    </article>
                    <footer>Footer content</footer>
                </body>
            </html>
        "#;
        let text = extract_text(html);
        assert!(text.contains("main article content"));
        assert!(!text.contains("Navigation"));
        assert!(!text.contains("  "));
    }

    #[test]
    fn test_skips_script_and_style() {
        let html = r#"
            <html><head><style>p { color: red; }</style></head>
            <body><script>var x = 1;</script><p>Visible text</p></body></html>
        "#;
        let text = extract_text(html);
        assert_eq!(text, "Visible text");
    }

    #[test]
    fn test_fragment() {
        assert_eq!(extract_text("<p>just a <b>fragment</b></p>"), "just a fragment");
    }

    #[test]
    fn test_empty_document() {
        assert!(extract_text("<html><body>  </body></html>").is_empty());
    }
}
