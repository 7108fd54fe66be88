//! OCR 품질 파이프라인
//!
//! 페이지 비트맵에서 가장 품질이 좋은 인식 결과를 골라냅니다.
//!
//! - preprocess: 그레이스케일/리사이즈/노이즈 제거/적응형 이진화/대비 보정
//! - quality: 인식 텍스트 품질 점수 (휴리스틱)
//! - selector: 원본/전처리 이미지 후보 중 최고 점수 선택
//! - tesseract: Tesseract 엔진 어댑터 (`tesseract` feature)
//! - vision: Gemini Vision 엔진 어댑터

pub mod preprocess;
pub mod quality;
pub mod selector;
#[cfg(feature = "tesseract")]
pub mod tesseract;
pub mod vision;

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

pub use preprocess::{PreprocessConfig, Preprocessor};
pub use quality::{QualityScorer, QualityWeights};
pub use selector::{Candidate, CandidateSource, CandidateSelector, Selection};
#[cfg(feature = "tesseract")]
pub use tesseract::TesseractEngine;
pub use vision::GeminiVisionEngine;

// ============================================================================
// Recognition Configuration
// ============================================================================

/// 인식 설정 (엔진 모드, 페이지 분할 모드, 언어)
///
/// 문자열 형식: `--oem 3 --psm 6 -l kor+eng`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// OCR 엔진 모드 (3 = 기본)
    pub engine_mode: u8,
    /// 페이지 분할 모드 (6 = 단일 텍스트 블록)
    pub page_seg_mode: u8,
    /// 언어 코드 목록
    pub languages: Vec<String>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            engine_mode: 3,
            page_seg_mode: 6,
            languages: vec!["kor".to_string(), "eng".to_string()],
        }
    }
}

impl RecognitionConfig {
    /// Tesseract 언어 조합 문자열 (`kor+eng`)
    pub fn language_spec(&self) -> String {
        self.languages.join("+")
    }
}

impl fmt::Display for RecognitionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "--oem {} --psm {} -l {}",
            self.engine_mode,
            self.page_seg_mode,
            self.language_spec()
        )
    }
}

impl FromStr for RecognitionConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut config = RecognitionConfig::default();
        let mut tokens = s.split_whitespace();

        while let Some(flag) = tokens.next() {
            let value = tokens
                .next()
                .with_context(|| format!("Missing value for {}", flag))?;

            match flag {
                "--oem" => {
                    config.engine_mode = value
                        .parse()
                        .with_context(|| format!("Invalid engine mode: {}", value))?;
                }
                "--psm" => {
                    config.page_seg_mode = value
                        .parse()
                        .with_context(|| format!("Invalid segmentation mode: {}", value))?;
                }
                "-l" | "--lang" => {
                    config.languages = value
                        .split('+')
                        .filter(|l| !l.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                other => bail!("Unknown recognition option: {}", other),
            }
        }

        if config.languages.is_empty() {
            bail!("Recognition config needs at least one language");
        }

        Ok(config)
    }
}

// ============================================================================
// RecognitionEngine Trait
// ============================================================================

/// OCR 엔진 어댑터
///
/// 비트맵 + 설정 → 원시 텍스트. 시도별 에러는 호출자(선택기)가 처리합니다.
pub trait RecognitionEngine: Send + Sync {
    /// 엔진 이름
    fn name(&self) -> &str;

    /// 텍스트 인식
    fn recognize(&self, image: &DynamicImage, config: &RecognitionConfig) -> Result<String>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_string() {
        let config = RecognitionConfig::default();
        assert_eq!(config.to_string(), "--oem 3 --psm 6 -l kor+eng");
        assert_eq!(config.language_spec(), "kor+eng");
    }

    #[test]
    fn test_parse_config() {
        let config: RecognitionConfig = "--psm 4 -l kor".parse().unwrap();
        assert_eq!(config.engine_mode, 3);
        assert_eq!(config.page_seg_mode, 4);
        assert_eq!(config.languages, vec!["kor".to_string()]);

        let again: RecognitionConfig = config.to_string().parse().unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn test_parse_config_errors() {
        assert!("--oem".parse::<RecognitionConfig>().is_err());
        assert!("--psm x".parse::<RecognitionConfig>().is_err());
        assert!("--dpi 300".parse::<RecognitionConfig>().is_err());
        assert!("-l +".parse::<RecognitionConfig>().is_err());
    }
}
