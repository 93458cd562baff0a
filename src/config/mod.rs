//! 설정 모듈
//!
//! 기본값 ← JSON 설정 파일 ← 환경변수 ← CLI 플래그 순서로 덮어씁니다.
//! 저장 위치: ~/.docchat-rag/config.json

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// 설정 파일 이름
pub const CONFIG_FILE: &str = "config.json";

/// 생성 요청당 타임아웃 상한 (초)
pub const MAX_TIMEOUT_SECS: u64 = 3600;
/// 생성 재시도 횟수 상한
pub const MAX_GENERATION_RETRIES: u32 = 10;
/// 백엔드 호출 전체 기한에 더하는 여유 시간
const DEADLINE_GRACE: Duration = Duration::from_secs(5);

/// 데이터 디렉토리 경로 (~/.docchat-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docchat-rag")
}

// ============================================================================
// Settings
// ============================================================================

/// 임베딩 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingKind {
    /// 로컬 해시 임베딩 (오프라인, 결정적)
    Hash,
    /// Ollama /api/embed
    Ollama,
}

impl std::str::FromStr for EmbeddingKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "ollama" => Ok(Self::Ollama),
            other => Err(RagError::Config(format!(
                "Unknown embedding provider: {} (expected 'hash' or 'ollama')",
                other
            ))),
        }
    }
}

/// 임베딩 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingKind,
    /// 모델 식별자 (ollama: all-minilm 등)
    pub model: String,
    /// 벡터 차원
    pub dimension: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingKind::Hash,
            model: "all-minilm".to_string(),
            dimension: 384,
        }
    }
}

/// 생성 백엔드 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Ollama 서버 주소
    pub endpoint: String,
    pub model: String,
    /// 요청당 타임아웃 (초)
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            timeout_secs: 180,
            max_retries: 2,
            temperature: 0.2,
        }
    }
}

impl GenerationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 재시도를 모두 포함한 백엔드 호출 기한
    ///
    /// timeout × (max_retries + 1) + 5초, 오버플로 시 포화
    pub fn backend_deadline(&self) -> Duration {
        self.timeout()
            .saturating_mul(self.max_retries.saturating_add(1))
            .saturating_add(DEADLINE_GRACE)
    }
}

/// 전체 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 청크 간 오버랩 (문자 수)
    pub overlap: usize,
    /// 검색 결과 개수
    pub top_k: usize,
    /// 컨텍스트 최대 문자 수
    pub context_char_budget: usize,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            overlap: 100,
            top_k: 4,
            context_char_budget: 4000,
            embedding: EmbeddingSettings::default(),
            generation: GenerationSettings::default(),
        }
    }
}

impl Settings {
    /// 설정 로드
    ///
    /// `path`가 주어지면 해당 파일을 반드시 읽고, 없으면
    /// `<data_dir>/config.json`이 존재할 때만 읽습니다.
    /// 이후 환경변수를 적용하고 검증합니다.
    pub fn load(data_dir: &Path, path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = data_dir.join(CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// JSON 파일에서 읽기 (누락된 필드는 기본값)
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&raw).map_err(|e| {
            RagError::Config(format!("Invalid config file {:?}: {}", path, e))
        })?;
        tracing::debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// 환경변수 적용
    ///
    /// - `DOCCHAT_OLLAMA_URL`
    /// - `DOCCHAT_GENERATION_MODEL`
    /// - `DOCCHAT_EMBEDDING` (hash | ollama)
    /// - `DOCCHAT_EMBEDDING_MODEL`
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_value("DOCCHAT_OLLAMA_URL") {
            self.generation.endpoint = url;
        }
        if let Some(model) = env_value("DOCCHAT_GENERATION_MODEL") {
            self.generation.model = model;
        }
        if let Some(kind) = env_value("DOCCHAT_EMBEDDING") {
            self.embedding.provider = kind.parse()?;
        }
        if let Some(model) = env_value("DOCCHAT_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        Ok(())
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "overlap ({}) must be less than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if self.context_char_budget < self.chunk_size {
            return Err(RagError::Config(format!(
                "context_char_budget ({}) must be at least chunk_size ({})",
                self.context_char_budget, self.chunk_size
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(RagError::Config("embedding dimension must be greater than zero".to_string()));
        }
        if self.generation.timeout_secs == 0 {
            return Err(RagError::Config("generation timeout must be greater than zero".to_string()));
        }
        if self.generation.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(RagError::Config(format!(
                "generation timeout ({}s) must be at most {}s",
                self.generation.timeout_secs, MAX_TIMEOUT_SECS
            )));
        }
        if self.generation.max_retries > MAX_GENERATION_RETRIES {
            return Err(RagError::Config(format!(
                "generation max_retries ({}) must be at most {}",
                self.generation.max_retries, MAX_GENERATION_RETRIES
            )));
        }
        url::Url::parse(&self.generation.endpoint).map_err(|e| {
            RagError::Config(format!(
                "Invalid generation endpoint '{}': {}",
                self.generation.endpoint, e
            ))
        })?;
        Ok(())
    }

    /// 현재 임베딩 설정의 모델 식별자 (인덱스 스냅샷 호환성 확인용)
    pub fn embedding_model_id(&self) -> String {
        match self.embedding.provider {
            EmbeddingKind::Hash => crate::embedding::HASH_MODEL_ID.to_string(),
            EmbeddingKind::Ollama => format!("ollama/{}", self.embedding.model),
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.chunk_size, 800);
        assert_eq!(settings.overlap, 100);
        assert_eq!(settings.top_k, 4);
    }

    #[test]
    fn test_overlap_must_be_smaller() {
        let settings = Settings {
            chunk_size: 100,
            overlap: 100,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_budget_must_fit_one_chunk() {
        let settings = Settings {
            context_char_budget: 500,
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("context_char_budget"));
    }

    #[test]
    fn test_invalid_endpoint() {
        let mut settings = Settings::default();
        settings.generation.endpoint = "not a url".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_generation_limits() {
        let mut settings = Settings::default();
        settings.generation.timeout_secs = MAX_TIMEOUT_SECS;
        settings.generation.max_retries = MAX_GENERATION_RETRIES;
        assert!(settings.validate().is_ok());

        settings.generation.timeout_secs = u64::MAX / 2;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("timeout"));

        settings.generation.timeout_secs = 180;
        settings.generation.max_retries = u32::MAX;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn test_backend_deadline() {
        let generation = GenerationSettings {
            timeout_secs: 10,
            max_retries: 2,
            ..Default::default()
        };
        assert_eq!(generation.backend_deadline(), Duration::from_secs(35));

        // 검증을 거치지 않은 값도 패닉 없이 포화
        let generation = GenerationSettings {
            timeout_secs: u64::MAX / 2,
            max_retries: u32::MAX,
            ..Default::default()
        };
        assert_eq!(generation.backend_deadline(), Duration::MAX);
    }

    #[test]
    fn test_partial_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{ "chunk_size": 500, "generation": { "model": "mistral" } }"#)
            .unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.chunk_size, 500);
        assert_eq!(settings.overlap, 100);
        assert_eq!(settings.generation.model, "mistral");
        assert_eq!(settings.generation.timeout_secs, 180);
    }

    #[test]
    fn test_broken_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Settings::from_file(&path),
            Err(RagError::Config(_))
        ));
    }

    #[test]
    fn test_embedding_kind_parse() {
        assert_eq!("hash".parse::<EmbeddingKind>().unwrap(), EmbeddingKind::Hash);
        assert_eq!("Ollama".parse::<EmbeddingKind>().unwrap(), EmbeddingKind::Ollama);
        assert!("openai".parse::<EmbeddingKind>().is_err());
    }

    #[test]
    fn test_embedding_model_id() {
        let mut settings = Settings::default();
        assert_eq!(settings.embedding_model_id(), "hash-v1");
        settings.embedding.provider = EmbeddingKind::Ollama;
        assert_eq!(settings.embedding_model_id(), "ollama/all-minilm");
    }
}
