//! CLI 모듈
//!
//! docchat-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::collector::{CollectedFile, CollectionStats, CollectorConfig, FileCollector, FileType};
use crate::config::{get_data_dir, EmbeddingKind, Settings};
use crate::knowledge::{Document, IndexStore};
use crate::pipeline::{Answer, AnswerStatus, RagCore, SkippedFile};
use crate::session::{ConversationTurn, Sender, SessionStore};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docchat-rag")]
#[command(version, about = "문서 기반 질의응답 RAG 시스템", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// 모든 명령어에 공통인 옵션
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// 데이터 디렉토리 (기본: ~/.docchat-rag)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// 설정 파일 경로 (기본: <data-dir>/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Ollama 엔드포인트
    #[arg(long, global = true)]
    pub ollama_url: Option<String>,

    /// 생성 모델 이름
    #[arg(long, global = true)]
    pub model: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 문서를 수집해 인덱스를 새로 빌드
    Ingest {
        /// 수집할 파일 경로 (여러 번 지정 가능)
        #[arg(short, long)]
        file: Vec<PathBuf>,

        /// 수집할 폴더 경로 (재귀, 여러 번 지정 가능)
        #[arg(short, long)]
        dir: Vec<PathBuf>,

        /// 직접 입력할 텍스트
        #[arg(short, long)]
        text: Option<String>,

        /// 최대 파일 크기 (바이트, 0이면 제한 없음)
        #[arg(long)]
        max_file_size: Option<u64>,
    },

    /// 한 번 질문하기
    Ask {
        /// 질문
        question: String,

        /// 검색할 청크 수
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// 대화형 질의응답
    Chat {
        /// 검색할 청크 수
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// 대화 기록 보기
    History {
        /// 최근 N개만 표시
        #[arg(short, long)]
        limit: Option<usize>,

        /// 대화 기록 삭제
        #[arg(long)]
        clear: bool,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let global = cli.global;
    match cli.command {
        Commands::Ingest {
            file,
            dir,
            text,
            max_file_size,
        } => cmd_ingest(&global, file, dir, text, max_file_size).await,
        Commands::Ask { question, k } => cmd_ask(&global, &question, k).await,
        Commands::Chat { k } => cmd_chat(&global, k).await,
        Commands::History { limit, clear } => cmd_history(&global, limit, clear),
        Commands::Status => cmd_status(&global),
    }
}

/// 데이터 디렉토리와 설정 결정
///
/// 기본값 ← 설정 파일 ← 환경변수 ← CLI 옵션 순으로 덮어씁니다.
fn resolve(global: &GlobalArgs) -> Result<(PathBuf, Settings)> {
    let data_dir = global.data_dir.clone().unwrap_or_else(get_data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("데이터 디렉토리 생성 실패: {}", data_dir.display()))?;

    let mut settings =
        Settings::load(&data_dir, global.config.as_deref()).context("설정 로드 실패")?;

    if let Some(ref url) = global.ollama_url {
        settings.generation.endpoint = url.clone();
    }
    if let Some(ref model) = global.model {
        settings.generation.model = model.clone();
    }
    settings.validate().context("잘못된 설정")?;

    tracing::debug!("Resolved settings: {:?}", settings);
    Ok((data_dir, settings))
}

fn open_core(global: &GlobalArgs) -> Result<RagCore> {
    let (data_dir, settings) = resolve(global)?;
    RagCore::open(&data_dir, settings).context("RagCore 초기화 실패")
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 문서 수집 명령어 (ingest)
///
/// 지정한 파일/폴더 전체로 인덱스를 다시 빌드합니다.
async fn cmd_ingest(
    global: &GlobalArgs,
    file: Vec<PathBuf>,
    dir: Vec<PathBuf>,
    text: Option<String>,
    max_file_size: Option<u64>,
) -> Result<()> {
    if file.is_empty() && dir.is_empty() && text.is_none() {
        bail!("--file, --dir, --text 중 하나 이상을 지정해야 합니다");
    }

    let mut config = CollectorConfig::default();
    if let Some(size) = max_file_size {
        config.max_file_size = size;
    }
    let collector = FileCollector::new(config);
    let (files, unreadable) = collect_inputs(&collector, &file, &dir);
    for skipped in &unreadable {
        println!("[!] 건너뜀: {} ({})", skipped.name, skipped.reason);
    }

    let core = open_core(global)?;

    if !files.is_empty() {
        let stats = CollectionStats::from_files(&files);
        println!("[*] 수집 대상: {} 파일", stats.total_files);
        println!(
            "    텍스트: {}, HTML: {}, PDF: {}",
            stats.text_files, stats.html_files, stats.pdf_files
        );
        println!("    총 크기: {}", format_bytes(stats.total_size));
        println!();

        for (i, collected) in files.iter().enumerate() {
            let type_str = match collected.file_type {
                FileType::Text => "TXT",
                FileType::Html => "HTM",
                FileType::Pdf => "PDF",
            };
            println!(
                "[{}/{}] [{}] {}",
                i + 1,
                files.len(),
                type_str,
                collected.display_name()
            );
        }
        println!();
    }

    println!("[*] 텍스트 추출 및 임베딩 생성 중...");

    let documents: Vec<Document> = text
        .map(|t| Document::new("direct-input", t))
        .into_iter()
        .collect();
    let report = core
        .ingest_files(&files, documents)
        .await
        .context("인덱스 빌드 실패")?;
    for skipped in &report.skipped {
        println!("[!] 건너뜀: {} ({})", skipped.name, skipped.reason);
    }

    println!();
    println!(
        "[OK] 완료: 문서 {}, 청크 {}, 건너뜀 {}",
        report.documents,
        report.chunks,
        unreadable.len() + report.skipped.len()
    );

    Ok(())
}

/// --file/--dir 경로 수집
///
/// 열 수 없는 경로는 건너뛴 목록에 기록하고 나머지는 계속 수집합니다.
fn collect_inputs(
    collector: &FileCollector,
    files: &[PathBuf],
    dirs: &[PathBuf],
) -> (Vec<CollectedFile>, Vec<SkippedFile>) {
    let mut collected = Vec::new();
    let mut skipped = Vec::new();

    for path in files {
        match collector.collect_file(path) {
            Ok(Some(f)) => collected.push(f),
            Ok(None) => skipped.push(SkippedFile {
                name: path.display().to_string(),
                reason: "지원하지 않거나 너무 큰 파일".to_string(),
            }),
            Err(e) => {
                tracing::warn!("Skipping {:?}: {}", path, e);
                skipped.push(SkippedFile {
                    name: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
    for path in dirs {
        match collector.collect_directory(path) {
            Ok(found) => collected.extend(found),
            Err(e) => {
                tracing::warn!("Skipping directory {:?}: {}", path, e);
                skipped.push(SkippedFile {
                    name: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    (collected, skipped)
}

/// 질문 명령어 (ask)
async fn cmd_ask(global: &GlobalArgs, question: &str, k: Option<usize>) -> Result<()> {
    let core = open_core(global)?;
    let k = k.unwrap_or(core.settings().top_k);

    println!("[*] 질문: \"{}\"", question);
    let answer = core.ask_with_k(question, k).await.context("질의 실패")?;
    print_answer(&answer);

    Ok(())
}

/// 대화형 명령어 (chat)
///
/// 기존 대화 기록을 먼저 보여준 뒤 한 줄씩 질문을 받습니다.
/// 답변 대기 중 Ctrl-C를 누르면 해당 질문만 취소되고 기록은 남지 않습니다.
async fn cmd_chat(global: &GlobalArgs, k: Option<usize>) -> Result<()> {
    let core = open_core(global)?;
    let k = k.unwrap_or(core.settings().top_k);

    let history = core.history();
    if !history.is_empty() {
        println!("[*] 이전 대화 ({} 턴)", history.len());
        for turn in &history {
            print_turn(turn);
        }
        println!();
    }
    if let Some(hint) = embedding_hint(core.settings()) {
        println!("[i] {}", hint);
    }
    if core.index_len() == 0 {
        println!("[!] 인덱스가 비어 있습니다. 먼저 `docchat-rag ingest`를 실행하세요.");
    }
    println!("질문을 입력하세요. 종료: /quit 또는 Ctrl-D");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "/quit" || question == "/exit" {
            break;
        }

        tokio::select! {
            result = core.ask_with_k(question, k) => match result {
                Ok(answer) => print_answer(&answer),
                Err(e) => println!("[!] 질의 실패: {}", e),
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("[!] 질문이 취소되었습니다");
            }
        }
        println!();
    }

    Ok(())
}

/// 대화 기록 명령어 (history)
fn cmd_history(global: &GlobalArgs, limit: Option<usize>, clear: bool) -> Result<()> {
    let (data_dir, _) = resolve(global)?;
    let mut store = SessionStore::open_in(&data_dir).context("대화 기록 열기 실패")?;

    if clear {
        let count = store.len();
        store.clear().context("대화 기록 삭제 실패")?;
        println!("[OK] 대화 기록 {} 턴 삭제됨", count);
        return Ok(());
    }

    let turns = store.turns();
    if turns.is_empty() {
        println!("[!] 대화 기록이 없습니다.");
        return Ok(());
    }

    let skip = limit.map(|n| turns.len().saturating_sub(n)).unwrap_or(0);
    println!("[OK] 대화 기록 ({} / {} 턴):\n", turns.len() - skip, turns.len());
    for turn in &turns[skip..] {
        print_turn(turn);
    }

    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(global: &GlobalArgs) -> Result<()> {
    println!("docchat-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let (data_dir, settings) = resolve(global)?;
    println!("[*] 데이터 디렉토리: {}", data_dir.display());
    println!(
        "[*] 청크: {}자 (오버랩 {}), k={}, 컨텍스트 예산 {}자",
        settings.chunk_size, settings.overlap, settings.top_k, settings.context_char_budget
    );
    println!(
        "[*] 임베딩: {} (차원 {})",
        settings.embedding_model_id(),
        settings.embedding.dimension
    );
    if let Some(hint) = embedding_hint(&settings) {
        println!("    {}", hint);
    }
    println!(
        "[*] 생성: {} @ {} (타임아웃 {}초)",
        settings.generation.model, settings.generation.endpoint, settings.generation.timeout_secs
    );

    print_index_status(&data_dir, &settings);

    match SessionStore::open_in(&data_dir) {
        Ok(store) => println!("[OK] 대화 기록: {} 턴", store.len()),
        Err(e) => println!("[!] 대화 기록 열기 실패: {}", e),
    }

    Ok(())
}

/// 로컬 해시 임베딩 사용 중이면 의미 기반 검색 안내
fn embedding_hint(settings: &Settings) -> Option<&'static str> {
    match settings.embedding.provider {
        EmbeddingKind::Hash => Some(
            "해시 임베딩은 단어 일치 기반입니다. 의미 기반 검색은 DOCCHAT_EMBEDDING=ollama (all-minilm)로 설정한 뒤 다시 ingest 하세요.",
        ),
        EmbeddingKind::Ollama => None,
    }
}

fn print_index_status(data_dir: &Path, settings: &Settings) {
    let info = match IndexStore::open_in(data_dir).and_then(|store| store.info()) {
        Ok(info) => info,
        Err(e) => {
            println!("[!] 인덱스 열기 실패: {}", e);
            return;
        }
    };

    match info {
        Some(info) => {
            println!(
                "[OK] 인덱스: 문서 {}, 청크 {} ({})",
                info.document_count, info.chunk_count, info.model_id
            );
            if let Some(built_at) = info.built_at {
                println!("     빌드 시각: {}", built_at.format("%Y-%m-%d %H:%M"));
            }
            if info.model_id != settings.embedding_model_id() {
                println!("[!] 현재 임베딩 설정과 다른 모델로 빌드됨. 다시 수집하세요.");
            }
        }
        None => println!("[!] 인덱스: 없음 (`docchat-rag ingest` 필요)"),
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_answer(answer: &Answer) {
    match answer.status {
        AnswerStatus::Answered => println!("\n{}\n", answer.text),
        AnswerStatus::NoKnowledge | AnswerStatus::Unavailable => {
            println!("\n[!] {}\n", answer.text)
        }
    }

    if !answer.sources.is_empty() {
        println!("출처:");
        for (i, source) in answer.sources.iter().enumerate() {
            println!(
                "  {}. {} #{} [점수: {:.4}]",
                i + 1,
                source.source_name,
                source.sequence,
                source.score
            );
        }
    }
}

fn print_turn(turn: &ConversationTurn) {
    let label = match turn.sender {
        Sender::User => "나",
        Sender::Assistant => "봇",
    };
    println!("  [{}] {}", label, truncate_text(&turn.text, 200));
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_inputs_skips_missing_paths() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.txt");
        std::fs::write(&good, "refunds within 30 days").unwrap();
        let missing_file = dir.path().join("missing.txt");
        let missing_dir = dir.path().join("no-such-dir");

        let collector = FileCollector::with_defaults();
        let (files, skipped) = collect_inputs(
            &collector,
            &[missing_file.clone(), good.clone()],
            &[missing_dir.clone()],
        );

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].display_name(), "good.txt");
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].name, missing_file.display().to_string());
        assert_eq!(skipped[1].name, missing_dir.display().to_string());
    }

    #[test]
    fn test_embedding_hint_only_for_hash() {
        let mut settings = Settings::default();
        assert!(embedding_hint(&settings).unwrap().contains("DOCCHAT_EMBEDDING=ollama"));

        settings.embedding.provider = EmbeddingKind::Ollama;
        assert!(embedding_hint(&settings).is_none());
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_truncate_unicode() {
        let korean = "안녕하세요 세계";
        let truncated = truncate_text(korean, 5);
        assert_eq!(truncated, "안녕하세요...");
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "docchat-rag",
            "ask",
            "What is the refund window?",
            "-k",
            "2",
            "--data-dir",
            "/tmp/docchat",
        ])
        .unwrap();

        assert_eq!(cli.global.data_dir, Some(PathBuf::from("/tmp/docchat")));
        match cli.command {
            Commands::Ask { question, k } => {
                assert_eq!(question, "What is the refund window?");
                assert_eq!(k, Some(2));
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_parse_repeated_ingest_paths() {
        let cli = Cli::try_parse_from([
            "docchat-rag",
            "ingest",
            "--file",
            "a.pdf",
            "--file",
            "b.txt",
            "--dir",
            "docs",
        ])
        .unwrap();

        match cli.command {
            Commands::Ingest { file, dir, .. } => {
                assert_eq!(file.len(), 2);
                assert_eq!(dir, vec![PathBuf::from("docs")]);
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_resolve_uses_data_dir_and_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let global = GlobalArgs {
            data_dir: Some(dir.path().to_path_buf()),
            model: Some("mistral".to_string()),
            ..Default::default()
        };

        let (data_dir, settings) = resolve(&global).unwrap();
        assert_eq!(data_dir, dir.path());
        assert_eq!(settings.generation.model, "mistral");
    }
}
