//! Session Store - 대화 기록 저장소
//!
//! 사람이 읽을 수 있는 JSON 배열로 저장합니다.
//! 저장 위치: ~/.docchat-rag/chat_history.json
//!
//! 저장할 때마다 전체 로그를 임시 파일에 쓰고 fsync 후 rename하므로
//! 중간에 프로세스가 죽어도 이전 상태 또는 새 상태 중 하나만 남습니다.
//!
//! 같은 파일을 여러 프로세스가 쓸 수 있으므로 (`chat`과 `ask`),
//! 추가할 때는 디스크의 최신 로그를 다시 읽어 그 뒤에 붙입니다.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// 히스토리 파일 이름
pub const HISTORY_FILE: &str = "chat_history.json";

// ============================================================================
// Types
// ============================================================================

/// 발화자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    /// 예전 프런트엔드는 "bot"으로 기록
    #[serde(alias = "bot")]
    Assistant,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "assistant"),
        }
    }
}

/// 대화 한 턴
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub sender: Sender,
    pub text: String,
    /// 로그 내 위치 (저장하지 않고 로드 시 부여)
    #[serde(skip)]
    pub order: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ConversationTurn {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            order: 0,
            created_at: Some(Utc::now()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, text)
    }
}

// ============================================================================
// SessionStore
// ============================================================================

/// 대화 기록 저장소
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    turns: Vec<ConversationTurn>,
}

impl SessionStore {
    /// 저장소 열기
    ///
    /// 파일이 없으면 빈 히스토리, 손상된 파일이면 `.corrupt`로 복사해 두고
    /// 빈 히스토리로 시작합니다.
    pub fn open(path: &Path) -> Result<Self> {
        let turns = match Self::load(path) {
            Ok(turns) => turns,
            Err(RagError::CorruptHistory { path: bad, message }) => {
                tracing::warn!("Ignoring corrupt history {:?}: {}", bad, message);
                let backup = corrupt_backup_path(&bad);
                if let Err(e) = fs::copy(&bad, &backup) {
                    tracing::warn!("Failed to back up corrupt history: {}", e);
                } else {
                    tracing::info!("Corrupt history copied to {:?}", backup);
                }
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        tracing::debug!("Session store opened at {:?} ({} turns)", path, turns.len());
        Ok(Self {
            path: path.to_path_buf(),
            turns,
        })
    }

    /// 데이터 디렉토리에서 열기
    pub fn open_in(data_dir: &Path) -> Result<Self> {
        Self::open(&data_dir.join(HISTORY_FILE))
    }

    /// 저장된 히스토리 읽기
    ///
    /// 파일이 없으면 빈 목록, 파싱 실패 시 `CorruptHistory`.
    pub fn load(path: &Path) -> Result<Vec<ConversationTurn>> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut turns: Vec<ConversationTurn> =
            serde_json::from_str(&raw).map_err(|e| RagError::CorruptHistory {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        for (order, turn) in turns.iter_mut().enumerate() {
            turn.order = order;
        }
        Ok(turns)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 전체 히스토리 (순서대로)
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// 한 턴 추가 후 저장
    pub fn append(&mut self, turn: ConversationTurn) -> Result<()> {
        self.append_all(vec![turn])
    }

    /// 질문/답변 한 쌍을 한 번의 쓰기로 저장
    pub fn append_exchange(&mut self, question: &str, answer: &str) -> Result<()> {
        self.append_all(vec![
            ConversationTurn::user(question),
            ConversationTurn::assistant(answer),
        ])
    }

    /// 히스토리 비우기
    pub fn clear(&mut self) -> Result<()> {
        persist(&self.path, &[])?;
        self.turns.clear();
        Ok(())
    }

    /// 디스크의 최신 로그 뒤에 추가하고, 저장에 성공했을 때만 메모리에 반영
    fn append_all(&mut self, new_turns: Vec<ConversationTurn>) -> Result<()> {
        let mut next = match Self::load(&self.path) {
            Ok(turns) => turns,
            Err(RagError::CorruptHistory { message, .. }) => {
                tracing::warn!("History became unreadable, keeping in-memory copy: {}", message);
                self.turns.clone()
            }
            Err(e) => return Err(e),
        };
        for mut turn in new_turns {
            turn.order = next.len();
            next.push(turn);
        }

        persist(&self.path, &next)?;
        self.turns = next;
        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 임시 파일에 쓰고 rename으로 교체
fn persist(path: &Path, turns: &[ConversationTurn]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(turns)
        .map_err(|e| RagError::Storage(format!("Failed to serialize history: {}", e)))?;

    // 쓰는 쪽마다 고유한 임시 파일
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(&temp_prefix(path))
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    // rename 자체를 디렉토리에 기록 (유닉스에서만 의미 있음)
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
    }

    Ok(())
}

fn temp_prefix(path: &Path) -> String {
    format!(".{}.", path.file_name().unwrap_or_default().to_string_lossy())
}

fn corrupt_backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".corrupt");
    path.with_file_name(name)
}

// ============================================================================
// Tests
// ============================================================================
