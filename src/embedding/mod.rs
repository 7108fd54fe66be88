//! 임베딩 모듈 - Gemini API를 통한 텍스트 벡터화
//!
//! 청크는 `RETRIEVAL_DOCUMENT`, 질문은 `RETRIEVAL_QUERY` 태스크로 임베딩합니다.
//! 적재 시에는 `batchEmbedContents` 로 최대 100개씩 묶어 보냅니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = GeminiEmbedder::from_env()?;
//! let vector = embedder.embed("경력 사항", EmbedTask::Query).await?;
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::get_api_key;

// ============================================================================
// Embedder Trait
// ============================================================================

/// 임베딩 용도
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedTask {
    /// 인덱스에 넣을 청크
    Document,
    /// 검색 질문
    Query,
}

impl EmbedTask {
    fn as_api_str(self) -> &'static str {
        match self {
            EmbedTask::Document => "RETRIEVAL_DOCUMENT",
            EmbedTask::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// 텍스트 → 고정 길이 벡터
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>>;

    /// 여러 텍스트를 입력 순서대로 임베딩
    async fn embed_batch(&self, texts: &[String], task: EmbedTask) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text, task).await?);
        }
        Ok(vectors)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    fn name(&self) -> &str;
}

// ============================================================================
// Rate Limiter
// ============================================================================

/// 슬라이딩 윈도우 + 최소 간격 제한
#[derive(Debug)]
struct RateLimiter {
    sent: VecDeque<Instant>,
    max_requests: usize,
    window: Duration,
    min_gap: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration, min_gap: Duration) -> Self {
        Self {
            sent: VecDeque::with_capacity(max_requests),
            max_requests: max_requests.max(1),
            window,
            min_gap,
        }
    }

    /// `now` 기준으로 다음 요청까지 기다려야 하는 시간
    fn wait_time(&mut self, now: Instant) -> Duration {
        while let Some(&oldest) = self.sent.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.sent.pop_front();
            } else {
                break;
            }
        }

        let gap = self
            .sent
            .back()
            .map(|&last| self.min_gap.saturating_sub(now.saturating_duration_since(last)))
            .unwrap_or_default();

        let window = if self.sent.len() >= self.max_requests {
            self.sent
                .front()
                .map(|&oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)))
                .unwrap_or_default()
        } else {
            Duration::ZERO
        };

        gap.max(window)
    }

    /// 허용될 때까지 대기한 뒤 요청 기록
    async fn acquire(&mut self) {
        let wait = self.wait_time(Instant::now());
        if !wait.is_zero() {
            tracing::debug!("Embedding rate limit, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }

        let now = Instant::now();
        self.wait_time(now);
        self.sent.push_back(now);
    }
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

const GEMINI_MODEL: &str = "models/gemini-embedding-001";

/// 단건 / 배치 엔드포인트 (gemini-embedding-001 - MRL 지원)
/// source: https://ai.google.dev/gemini-api/docs/embeddings
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";
const GEMINI_BATCH_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:batchEmbedContents";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// 배치 요청당 최대 텍스트 수 (API 제한)
const MAX_BATCH: usize = 100;

/// Gemini 무료 티어: 60 RPM
const RATE_LIMIT_RPM: usize = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
const MIN_GAP: Duration = Duration::from_millis(1000);

/// 429/전송 실패 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;

/// 한 번의 HTTP 시도 결과
enum Attempt<T> {
    Done(T),
    /// 재시도할 수 있는 실패 (전송 실패, 429, 5xx)
    Retry(anyhow::Error),
}

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedder {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    limiter: Mutex<RateLimiter>,
}

impl GeminiEmbedder {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    /// 차원 지정 (768, 1536, 3072 중 선택)
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        if ![768, 1536, 3072].contains(&dimension) {
            bail!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            dimension,
            limiter: Mutex::new(RateLimiter::new(RATE_LIMIT_RPM, RATE_LIMIT_WINDOW, MIN_GAP)),
        })
    }

    /// 환경변수 API 키로 생성 (GEMINI_API_KEY > GOOGLE_AI_API_KEY)
    pub fn from_env() -> Result<Self> {
        Self::new(get_api_key()?)
    }

    fn build_request<'a>(&self, text: &'a str, task: EmbedTask) -> EmbedRequest<'a> {
        EmbedRequest {
            model: GEMINI_MODEL,
            content: EmbedContent {
                parts: vec![EmbedPart { text }],
            },
            task_type: task.as_api_str(),
            output_dimensionality: self.dimension,
        }
    }

    fn check_dimension(&self, values: Vec<f32>) -> Result<Vec<f32>> {
        if values.len() != self.dimension {
            bail!(
                "Gemini returned a {}-dimensional vector, expected {}",
                values.len(),
                self.dimension
            );
        }
        Ok(values)
    }

    /// POST 한 번. 재시도 가능 여부를 구분해서 돌려줌
    async fn post_once<B, R>(&self, url: &str, body: &B) -> Result<Attempt<R>>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        self.limiter.lock().await.acquire().await;

        // API 키는 URL이 아닌 헤더로 전송
        let response = match self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Ok(Attempt::Retry(anyhow!("Failed to send embedding request: {}", e))),
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read response body")?;

        if status.is_success() {
            let parsed = serde_json::from_str(&text).context("Failed to parse embedding response")?;
            return Ok(Attempt::Done(parsed));
        }

        let message = serde_json::from_str::<GeminiError>(&text)
            .map(|e| format!("{} {}", e.error.status, e.error.message))
            .unwrap_or(text);

        if status.as_u16() == 429 || status.is_server_error() {
            return Ok(Attempt::Retry(anyhow!("Gemini API error ({}): {}", status, message)));
        }
        bail!("Gemini API error ({}): {}", status, message)
    }

    /// 지수 백오프 재시도
    async fn post<B, R>(&self, url: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut attempt = 0;
        loop {
            match self.post_once(url, body).await? {
                Attempt::Done(parsed) => return Ok(parsed),
                Attempt::Retry(e) if attempt < MAX_RETRIES => {
                    tracing::warn!(
                        "{:#}, retrying in {:?} (attempt {}/{})",
                        e,
                        backoff(attempt),
                        attempt + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff(attempt)).await;
                    attempt += 1;
                }
                Attempt::Retry(e) => {
                    return Err(e.context(format!("Embedding failed after {} retries", MAX_RETRIES)))
                }
            }
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: EmbedContent<'a>,
    task_type: &'a str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let response: EmbedResponse = self
            .post(GEMINI_EMBED_URL, &self.build_request(text, task))
            .await?;
        self.check_dimension(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[String], task: EmbedTask) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (i, group) in texts.chunks(MAX_BATCH).enumerate() {
            tracing::debug!(
                "Embedding batch {}/{} ({} texts)",
                i + 1,
                texts.len().div_ceil(MAX_BATCH),
                group.len()
            );

            // 빈 텍스트는 API 에 보내지 않고 영벡터로 채움
            let requests: Vec<EmbedRequest<'_>> = group
                .iter()
                .filter(|t| !t.trim().is_empty())
                .map(|t| self.build_request(t, task))
                .collect();

            let mut returned = if requests.is_empty() {
                Vec::new()
            } else {
                let response: BatchResponse =
                    self.post(GEMINI_BATCH_URL, &BatchRequest { requests }).await?;
                response.embeddings
            }
            .into_iter();

            for text in group {
                if text.trim().is_empty() {
                    vectors.push(vec![0.0; self.dimension]);
                    continue;
                }
                let values = returned
                    .next()
                    .context("Gemini returned fewer embeddings than requested")?;
                vectors.push(self.check_dimension(values.values)?);
            }
        }

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_dimension() {
        let err = GeminiEmbedder::with_dimension("fake_key".to_string(), 999).unwrap_err();
        assert!(err.to_string().contains("Invalid dimension"));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in [768, 1536, 3072] {
            assert!(GeminiEmbedder::with_dimension("fake_key".to_string(), dim).is_ok());
        }
    }

    #[test]
    fn test_request_fields() {
        let embedder = GeminiEmbedder::new("fake_key".to_string()).unwrap();

        let doc = serde_json::to_value(embedder.build_request("본문", EmbedTask::Document)).unwrap();
        assert_eq!(doc["taskType"], "RETRIEVAL_DOCUMENT");
        assert_eq!(doc["outputDimensionality"], 768);
        assert_eq!(doc["content"]["parts"][0]["text"], "본문");

        let batch = BatchRequest {
            requests: vec![
                embedder.build_request("질문", EmbedTask::Query),
                embedder.build_request("둘째", EmbedTask::Query),
            ],
        };
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["requests"][1]["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(json["requests"][0]["model"], GEMINI_MODEL);
    }

    #[test]
    fn test_batch_response_parses() {
        let parsed: BatchResponse =
            serde_json::from_str(r#"{"embeddings":[{"values":[0.1,0.2]},{"values":[0.3,0.4]}]}"#)
                .unwrap();
        assert_eq!(parsed.embeddings.len(), 2);
        assert_eq!(parsed.embeddings[1].values, vec![0.3, 0.4]);
    }

    #[test]
    fn test_dimension_check() {
        let embedder = GeminiEmbedder::new("fake_key".to_string()).unwrap();
        assert!(embedder.check_dimension(vec![0.0; 768]).is_ok());
        assert!(embedder.check_dimension(vec![0.0; 3]).is_err());
    }

    #[tokio::test]
    async fn test_blank_text_is_zero_vector() {
        let embedder = GeminiEmbedder::new("fake_key".to_string()).unwrap();
        let vector = embedder.embed("   ", EmbedTask::Document).await.unwrap();
        assert_eq!(vector.len(), 768);
        assert!(vector.iter().all(|v| *v == 0.0));

        let batch = embedder
            .embed_batch(&["".to_string(), " ".to_string()], EmbedTask::Document)
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|v| v.len() == 768));
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(0), Duration::from_millis(2000));
        assert_eq!(backoff(2), Duration::from_millis(8000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_min_gap() {
        let mut limiter = RateLimiter::new(10, Duration::from_secs(60), Duration::from_secs(1));
        let start = Instant::now();
        assert_eq!(limiter.wait_time(start), Duration::ZERO);

        limiter.acquire().await;
        assert_eq!(limiter.wait_time(Instant::now()), Duration::from_secs(1));

        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert_eq!(limiter.sent.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_window() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(60), Duration::ZERO);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.wait_time(Instant::now()), Duration::from_secs(60));

        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_secs(60));
        // 앞의 두 요청은 윈도우 밖으로 밀려남
        assert_eq!(limiter.sent.len(), 1);
    }
}
