//! 답변 생성 모듈
//!
//! Gemini 를 기본으로 쓰고, 실패하면 OpenAI 로 넘어갑니다.
//! 어느 쪽이 답했는지는 `Answer::provider` 로 돌려줍니다.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

/// 생성 요청 타임아웃
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

const GEMINI_GENERATE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

// ============================================================================
// AnswerGenerator Trait
// ============================================================================

/// 프롬프트 → 답변 텍스트
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// 생성 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// 실제로 답한 프로바이더 이름
    pub provider: String,
}

/// 문서 발췌와 질문으로 프롬프트 구성
pub fn build_prompt(question: &str, excerpts: &[&str]) -> String {
    format!(
        r#"PDF 문서 내용:
{}

질문: {}

지침:
- 질문에 직접적으로 답변하세요
- 문서 내용만 사용하세요
- 간결하게 답변하세요
- OCR 오류는 자동으로 수정하세요

답변:
"#,
        excerpts.join("\n\n"),
        question
    )
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(GENERATION_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

// ============================================================================
// Gemini
// ============================================================================

/// Gemini 답변 생성기
pub struct GeminiGenerator {
    api_key: String,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            api_key,
            client: http_client()?,
        })
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiTextPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiTextPart {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(GEMINI_GENERATE_URL)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to call Gemini generateContent")?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            bail!("Gemini returned {}: {}", status, body);
        }

        let parsed: GeminiResponse =
            serde_json::from_str(&body).context("Failed to parse Gemini response")?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            bail!("Gemini returned an empty answer");
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// OpenAI
// ============================================================================

/// OpenAI Chat Completions 생성기 (대체용)
pub struct OpenAiGenerator {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_model(api_key, DEFAULT_OPENAI_MODEL.to_string())
    }

    pub fn with_model(api_key: String, model: String) -> Result<Self> {
        Ok(Self {
            api_key,
            model,
            client: http_client()?,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key.trim()))
                .context("invalid OpenAI API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = ChatRequest {
            model: &self.model,
            temperature: 0.2,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .context("Failed to call OpenAI chat completions")?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("OpenAI returned {}: {}", status, text);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;
        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .context("OpenAI returned an empty answer")
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// Fallback Pair
// ============================================================================

/// 기본/대체 생성기 쌍
pub struct FallbackGenerator {
    primary: Box<dyn AnswerGenerator>,
    fallback: Option<Box<dyn AnswerGenerator>>,
    timeout: Duration,
}

impl FallbackGenerator {
    pub fn new(
        primary: Box<dyn AnswerGenerator>,
        fallback: Option<Box<dyn AnswerGenerator>>,
    ) -> Self {
        Self {
            primary,
            fallback,
            timeout: GENERATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 환경변수 키로 구성 (Gemini 필수, OpenAI 선택)
    pub fn from_env() -> Result<Self> {
        let primary = GeminiGenerator::new(crate::config::get_api_key()?)?;
        let fallback = match crate::config::openai_api_key() {
            Some(key) => Some(Box::new(OpenAiGenerator::new(key)?) as Box<dyn AnswerGenerator>),
            None => None,
        };
        Ok(Self::new(Box::new(primary), fallback))
    }

    async fn attempt(&self, generator: &dyn AnswerGenerator, prompt: &str) -> Result<String> {
        match tokio::time::timeout(self.timeout, generator.generate(prompt)).await {
            Ok(result) => result,
            Err(_) => bail!("{} timed out after {:?}", generator.name(), self.timeout),
        }
    }

    /// 기본 생성기 실패 시 대체 생성기로 재시도
    pub async fn generate(&self, prompt: &str) -> Result<Answer> {
        let primary_error = match self.attempt(self.primary.as_ref(), prompt).await {
            Ok(text) => {
                return Ok(Answer {
                    text,
                    provider: self.primary.name().to_string(),
                })
            }
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            return Err(primary_error.context(format!("{} generation failed", self.primary.name())));
        };

        tracing::warn!(
            "{} generation failed, falling back to {}: {:#}",
            self.primary.name(),
            fallback.name(),
            primary_error
        );

        let text = self
            .attempt(fallback.as_ref(), prompt)
            .await
            .with_context(|| {
                format!(
                    "{} and {} both failed (primary: {:#})",
                    self.primary.name(),
                    fallback.name(),
                    primary_error
                )
            })?;

        Ok(Answer {
            text,
            provider: fallback.name().to_string(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticGenerator {
        name: &'static str,
        reply: Option<&'static str>,
        delay: Duration,
    }

    impl StaticGenerator {
        fn boxed(name: &'static str, reply: Option<&'static str>) -> Box<dyn AnswerGenerator> {
            Box::new(Self {
                name,
                reply,
                delay: Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl AnswerGenerator for StaticGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            match self.reply {
                Some(text) => Ok(text.to_string()),
                None => bail!("{} is down", self.name),
            }
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    #[test]
    fn test_prompt_layout() {
        let prompt = build_prompt("경력은?", &["첫 청크", "둘째 청크"]);
        assert!(prompt.contains("PDF 문서 내용:\n첫 청크\n\n둘째 청크"));
        assert!(prompt.contains("질문: 경력은?"));
        assert!(prompt.contains("OCR 오류는 자동으로 수정하세요"));
        assert!(prompt.trim_end().ends_with("답변:"));
    }

    #[tokio::test]
    async fn test_primary_answers() {
        let generator = FallbackGenerator::new(
            StaticGenerator::boxed("primary", Some("답")),
            Some(StaticGenerator::boxed("secondary", Some("대체 답"))),
        );
        let answer = generator.generate("q").await.unwrap();
        assert_eq!(answer.provider, "primary");
        assert_eq!(answer.text, "답");
    }

    #[tokio::test]
    async fn test_fallback_on_failure() {
        let generator = FallbackGenerator::new(
            StaticGenerator::boxed("primary", None),
            Some(StaticGenerator::boxed("secondary", Some("대체 답"))),
        );
        let answer = generator.generate("q").await.unwrap();
        assert_eq!(answer.provider, "secondary");
    }

    #[tokio::test]
    async fn test_both_fail_preserves_messages() {
        let generator = FallbackGenerator::new(
            StaticGenerator::boxed("primary", None),
            Some(StaticGenerator::boxed("secondary", None)),
        );
        let err = generator.generate("q").await.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("primary is down"));
        assert!(message.contains("secondary is down"));
    }

    #[tokio::test]
    async fn test_no_fallback_surfaces_error() {
        let generator = FallbackGenerator::new(StaticGenerator::boxed("primary", None), None);
        assert!(generator.generate("q").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_triggers_fallback() {
        let slow = Box::new(StaticGenerator {
            name: "slow",
            reply: Some("늦은 답"),
            delay: Duration::from_secs(60),
        });
        let generator = FallbackGenerator::new(
            slow,
            Some(StaticGenerator::boxed("secondary", Some("빠른 답"))),
        );
        let answer = generator.generate("q").await.unwrap();
        assert_eq!(answer.provider, "secondary");
    }
}
