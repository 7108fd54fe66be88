//! 설정 모듈
//!
//! JSON 설정 파일(선택) → 환경변수 순서로 덮어씁니다.
//! 모든 필드는 기본값이 있으므로 설정 파일 없이도 동작합니다.
//!
//! | 환경변수 | 필드 |
//! |---|---|
//! | `PDFQA_USE_OCR` | `use_ocr` |
//! | `PDFQA_OCR_POLICY` | `ocr_policy` (`always`, `when-layer-insufficient[:N]`) |
//! | `PDFQA_OCR_BACKEND` | `ocr_backend` (`auto`, `tesseract`, `gemini-vision`) |
//! | `PDFQA_CHUNK_TOKENS` | `chunk_tokens` |
//! | `PDFQA_RENDER_SCALE` | `render_scale` |
//! | `PDFQA_TOKENIZER` | `tokenizer_path` |
//! | `PDFQA_RULES` | `rules_path` |
//! | `PDFQA_DATA_DIR` | `data_dir` |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::ocr::{PreprocessConfig, RecognitionConfig};

/// 텍스트 레이어 충분 판정 기본 글자 수
pub const DEFAULT_MIN_LAYER_CHARS: usize = 50;

// ============================================================================
// OCR Policy / Backend
// ============================================================================

/// OCR 실행 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OcrPolicy {
    /// OCR 우선 (텍스트 레이어 품질을 신뢰하지 않음)
    #[default]
    Always,
    /// 텍스트 레이어가 `min_chars` 미만일 때만 OCR
    WhenLayerInsufficient { min_chars: usize },
}

impl FromStr for OcrPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        if s == "always" {
            return Ok(OcrPolicy::Always);
        }

        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s.as_str(), None),
        };

        match name {
            "when-layer-insufficient" | "when_layer_insufficient" | "fallback" => {
                let min_chars = match arg {
                    Some(n) => n
                        .trim()
                        .parse()
                        .with_context(|| format!("Invalid min_chars '{}'", n))?,
                    None => DEFAULT_MIN_LAYER_CHARS,
                };
                Ok(OcrPolicy::WhenLayerInsufficient { min_chars })
            }
            _ => bail!(
                "Unknown OCR policy '{}'. Use 'always' or 'when-layer-insufficient[:N]'",
                s
            ),
        }
    }
}

impl fmt::Display for OcrPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcrPolicy::Always => write!(f, "always"),
            OcrPolicy::WhenLayerInsufficient { min_chars } => {
                write!(f, "when-layer-insufficient:{}", min_chars)
            }
        }
    }
}

/// OCR 백엔드 선택
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OcrBackend {
    /// Tesseract 가 빌드되어 있으면 Tesseract, 아니면 Gemini Vision
    #[default]
    Auto,
    Tesseract,
    GeminiVision,
}

impl FromStr for OcrBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(OcrBackend::Auto),
            "tesseract" => Ok(OcrBackend::Tesseract),
            "gemini-vision" | "gemini" | "vision" => Ok(OcrBackend::GeminiVision),
            other => bail!(
                "Unknown OCR backend '{}'. Use 'auto', 'tesseract' or 'gemini-vision'",
                other
            ),
        }
    }
}

impl fmt::Display for OcrBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcrBackend::Auto => write!(f, "auto"),
            OcrBackend::Tesseract => write!(f, "tesseract"),
            OcrBackend::GeminiVision => write!(f, "gemini-vision"),
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// OCR 사용 여부 (false 면 텍스트 레이어만)
    pub use_ocr: bool,
    pub ocr_policy: OcrPolicy,
    pub ocr_backend: OcrBackend,
    /// 렌더링 배율
    pub render_scale: f32,
    /// 청크 토큰 예산
    pub chunk_tokens: usize,
    /// 저신뢰 임계값
    pub low_confidence: f32,
    /// 질문당 검색 청크 수
    pub top_k: usize,
    /// `tokenizer.json` 경로 (None = cl100k_base)
    pub tokenizer_path: Option<PathBuf>,
    /// 추가 보정 규칙 JSON 경로
    pub rules_path: Option<PathBuf>,
    /// tessdata 디렉토리
    pub tessdata_path: Option<String>,
    /// 데이터 디렉토리 (None = 플랫폼 기본값)
    pub data_dir: Option<PathBuf>,
    pub recognition: RecognitionConfig,
    pub preprocess: PreprocessConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_ocr: true,
            ocr_policy: OcrPolicy::Always,
            ocr_backend: OcrBackend::Auto,
            render_scale: 2.0,
            chunk_tokens: 500,
            low_confidence: crate::ocr::selector::DEFAULT_LOW_CONFIDENCE,
            top_k: 5,
            tokenizer_path: None,
            rules_path: None,
            tessdata_path: None,
            data_dir: None,
            recognition: RecognitionConfig::default(),
            preprocess: PreprocessConfig::default(),
        }
    }
}

impl Settings {
    /// 설정 파일(선택) + 환경변수로 로드
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// JSON 설정 파일 로드
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// 키 조회 함수로 값 덮어쓰기 (빈 문자열은 무시)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PDFQA_USE_OCR") {
            self.use_ocr = parse_bool(&v).with_context(|| format!("PDFQA_USE_OCR='{}'", v))?;
        }
        if let Some(v) = get("PDFQA_OCR_POLICY") {
            self.ocr_policy = v.parse()?;
        }
        if let Some(v) = get("PDFQA_OCR_BACKEND") {
            self.ocr_backend = v.parse()?;
        }
        if let Some(v) = get("PDFQA_CHUNK_TOKENS") {
            self.chunk_tokens = v
                .trim()
                .parse()
                .with_context(|| format!("PDFQA_CHUNK_TOKENS='{}'", v))?;
        }
        if let Some(v) = get("PDFQA_RENDER_SCALE") {
            self.render_scale = v
                .trim()
                .parse()
                .with_context(|| format!("PDFQA_RENDER_SCALE='{}'", v))?;
        }
        if let Some(v) = get("PDFQA_TOKENIZER") {
            self.tokenizer_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("PDFQA_RULES") {
            self.rules_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("PDFQA_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_tokens == 0 {
            bail!("chunk_tokens must be greater than 0");
        }
        if !(self.render_scale > 0.0) {
            bail!("render_scale must be positive, got {}", self.render_scale);
        }
        if self.top_k == 0 {
            bail!("top_k must be greater than 0");
        }
        Ok(())
    }

    /// 데이터 디렉토리
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}

/// 플랫폼 기본 데이터 디렉토리
///
/// - Windows: `%LOCALAPPDATA%\.pdfqa-ocr\`
/// - Linux: `~/.local/share/.pdfqa-ocr/`
/// - macOS: `~/Library/Application Support/.pdfqa-ocr/`
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pdfqa-ocr")
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got '{}'", other),
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// Gemini API 키 로드
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Some(key) = non_empty_env(var) {
            tracing::debug!("Using API key from {}", var);
            return Ok(key);
        }
    }

    bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// Gemini API 키 존재 여부
pub fn has_api_key() -> bool {
    non_empty_env("GEMINI_API_KEY").is_some() || non_empty_env("GOOGLE_AI_API_KEY").is_some()
}

/// 대체 생성기용 OpenAI 키
pub fn openai_api_key() -> Option<String> {
    non_empty_env("OPENAI_API_KEY")
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.use_ocr);
        assert_eq!(settings.ocr_policy, OcrPolicy::Always);
        assert_eq!(settings.chunk_tokens, 500);
        assert_eq!(settings.render_scale, 2.0);
        assert_eq!(settings.top_k, 5);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("always".parse::<OcrPolicy>().unwrap(), OcrPolicy::Always);
        assert_eq!(
            "when-layer-insufficient".parse::<OcrPolicy>().unwrap(),
            OcrPolicy::WhenLayerInsufficient { min_chars: 50 }
        );
        assert_eq!(
            "when-layer-insufficient:120".parse::<OcrPolicy>().unwrap(),
            OcrPolicy::WhenLayerInsufficient { min_chars: 120 }
        );
        assert!("sometimes".parse::<OcrPolicy>().is_err());
        assert!("fallback:abc".parse::<OcrPolicy>().is_err());
    }

    #[test]
    fn test_policy_display_roundtrip() {
        let policy = OcrPolicy::WhenLayerInsufficient { min_chars: 80 };
        assert_eq!(policy.to_string().parse::<OcrPolicy>().unwrap(), policy);
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings
            .apply_overrides(overrides(&[
                ("PDFQA_USE_OCR", "false"),
                ("PDFQA_OCR_BACKEND", "gemini-vision"),
                ("PDFQA_CHUNK_TOKENS", "256"),
                ("PDFQA_RENDER_SCALE", "3.0"),
                ("PDFQA_DATA_DIR", "/tmp/pdfqa"),
                ("PDFQA_RULES", ""),
            ]))
            .unwrap();

        assert!(!settings.use_ocr);
        assert_eq!(settings.ocr_backend, OcrBackend::GeminiVision);
        assert_eq!(settings.chunk_tokens, 256);
        assert_eq!(settings.render_scale, 3.0);
        assert_eq!(settings.data_dir(), PathBuf::from("/tmp/pdfqa"));
        assert!(settings.rules_path.is_none());
    }

    #[test]
    fn test_invalid_override_is_error() {
        let mut settings = Settings::default();
        let err = settings
            .apply_overrides(overrides(&[("PDFQA_CHUNK_TOKENS", "many")]))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("PDFQA_CHUNK_TOKENS"));
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let settings = Settings {
            chunk_tokens: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "chunk_tokens": 300, "ocr_policy": {{ "mode": "when_layer_insufficient", "min_chars": 10 }} }}"#
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.chunk_tokens, 300);
        assert_eq!(
            settings.ocr_policy,
            OcrPolicy::WhenLayerInsufficient { min_chars: 10 }
        );
        assert_eq!(settings.render_scale, 2.0);
        assert_eq!(settings.recognition, RecognitionConfig::default());
    }

    #[test]
    fn test_default_data_dir_name() {
        assert!(default_data_dir().ends_with(".pdfqa-ocr"));
    }
}
