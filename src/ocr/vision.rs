//! Gemini Vision 엔진 어댑터
//!
//! 페이지 비트맵을 PNG + Base64 로 인코딩해 Gemini `generateContent` 에 보내고
//! 추출된 텍스트를 받습니다. Tesseract 가 없는 환경의 대체 백엔드입니다.
//!
//! `RecognitionEngine` 은 동기 트레이트이므로 런타임 핸들로 요청을 블로킹 실행합니다.
//! 비동기 태스크 안이 아니라 `spawn_blocking` 스레드에서 호출해야 합니다.

use std::io::Cursor;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use super::{RecognitionConfig, RecognitionEngine};

/// Gemini Vision API 엔드포인트
const GEMINI_VISION_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";

/// 요청 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Gemini Vision OCR 엔진
pub struct GeminiVisionEngine {
    api_key: String,
    client: reqwest::Client,
    handle: Handle,
}

impl GeminiVisionEngine {
    /// 현재 tokio 런타임 핸들로 생성
    pub fn new(api_key: String) -> Result<Self> {
        let handle = Handle::try_current().context("Gemini Vision engine needs a tokio runtime")?;
        Self::with_handle(api_key, handle)
    }

    pub fn with_handle(api_key: String, handle: Handle) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            handle,
        })
    }

    async fn request(&self, request: &VisionRequest) -> Result<String> {
        let response = self
            .client
            .post(GEMINI_VISION_URL)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .context("Failed to send Vision API request")?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            anyhow::bail!("Vision API error ({}): {}", status, body);
        }

        let parsed: VisionResponse =
            serde_json::from_str(&body).context("Failed to parse Vision API response")?;

        Ok(parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default())
    }
}

impl RecognitionEngine for GeminiVisionEngine {
    fn name(&self) -> &str {
        "gemini-vision"
    }

    fn recognize(&self, image: &DynamicImage, config: &RecognitionConfig) -> Result<String> {
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .context("Failed to encode page image")?;

        let request = VisionRequest {
            contents: vec![VisionContent {
                parts: vec![
                    VisionPart::Text {
                        text: extraction_prompt(config),
                    },
                    VisionPart::InlineData {
                        inline_data: InlineData {
                            mime_type: "image/png".to_string(),
                            data: STANDARD.encode(png.get_ref()),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                max_output_tokens: 8192,
            },
        };

        self.handle.block_on(self.request(&request))
    }
}

/// 언어 설정을 반영한 추출 프롬프트
fn extraction_prompt(config: &RecognitionConfig) -> String {
    let languages: Vec<&str> = config
        .languages
        .iter()
        .map(|code| match code.as_str() {
            "kor" => "한국어",
            "eng" => "영어",
            other => other,
        })
        .collect();

    format!(
        r#"이 문서 이미지에서 모든 텍스트를 그대로 추출해주세요.

지시사항:
1. 보이는 텍스트만 원문 그대로 옮깁니다 ({})
2. 설명, 요약, 마크다운 서식을 붙이지 않습니다
3. 읽기 순서대로 줄 단위로 출력합니다
4. 텍스트가 없으면 아무것도 출력하지 않습니다"#,
        languages.join(", ")
    )
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct VisionRequest {
    contents: Vec<VisionContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct VisionContent {
    parts: Vec<VisionPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum VisionPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct VisionResponse {
    #[serde(default)]
    candidates: Vec<VisionCandidate>,
}

#[derive(Debug, Deserialize)]
struct VisionCandidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

// ============================================================================
// Tests
// ============================================================================
