//! PDF 질의응답 서비스
//!
//! 문서 한 건을 인덱스에 넣고 질문에 답합니다.
//!
//! - `process_pdf`: 추출 → 청킹 → 배치 임베딩 → 기존 인덱스 비우기 → 저장
//!   (추출이나 임베딩이 실패하면 기존 인덱스는 그대로)
//! - `ask`: 질문 임베딩 → 상위 청크 검색 → 프롬프트 → 생성 (Gemini → OpenAI)
//! - `status`: 인덱스 통계

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::Settings;
use crate::embedding::{EmbedTask, Embedder, GeminiEmbedder};
use crate::extractor::{Capabilities, DocumentExtractor, ExtractionError, ProgressReporter};
use crate::knowledge::{ChunkMetadata, IndexEntry, IndexStats, LanceVectorIndex, VectorIndex};
use crate::llm::{build_prompt, FallbackGenerator};

/// 질문당 기본 검색 청크 수
pub const DEFAULT_TOP_K: usize = 5;

/// 출처 발췌 최대 글자 수
const SNIPPET_CHARS: usize = 200;

/// 관련 청크가 없을 때의 답변
pub const NO_MATCH_ANSWER: &str =
    "죄송합니다. 질문과 관련된 정보를 찾을 수 없습니다. PDF가 업로드되었는지 확인해주세요.";

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum QaError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Vector index error: {0:#}")]
    Index(anyhow::Error),

    #[error("Embedding error: {0:#}")]
    Embedding(anyhow::Error),

    #[error("Answer generation failed: {0:#}")]
    Generation(anyhow::Error),
}

/// 적재 결과
#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub chunks_processed: usize,
    /// 원본 파일 SHA-256
    pub fingerprint: String,
    pub source: String,
}

/// 답변 근거
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub chunk_id: String,
    pub snippet: String,
}

/// 출처가 붙은 답변
#[derive(Debug, Clone, Serialize)]
pub struct AnswerWithSources {
    pub answer: String,
    /// 답한 프로바이더 (검색 결과가 없으면 None)
    pub provider: Option<String>,
    pub sources: Vec<Source>,
}

// ============================================================================
// PdfQaSystem
// ============================================================================

pub struct PdfQaSystem {
    extractor: DocumentExtractor,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    generator: FallbackGenerator,
    top_k: usize,
}

impl PdfQaSystem {
    pub fn new(
        extractor: DocumentExtractor,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        generator: FallbackGenerator,
    ) -> Self {
        Self {
            extractor,
            index,
            embedder,
            generator,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// 설정과 환경변수로 전체 구성
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let extractor = DocumentExtractor::from_settings(settings)?;
        let embedder = GeminiEmbedder::from_env()?;

        let data_dir = settings.data_dir();
        let index = LanceVectorIndex::open_with_dimension(
            &data_dir.join("chunks.lance"),
            embedder.dimension(),
        )
        .await?;

        Ok(Self::new(
            extractor,
            Arc::new(index),
            Arc::new(embedder),
            FallbackGenerator::from_env()?,
        )
        .with_top_k(settings.top_k))
    }

    pub fn capabilities(&self) -> Capabilities {
        self.extractor.capabilities()
    }

    /// PDF 를 처리해 인덱스를 교체
    pub async fn process_pdf(
        &self,
        path: &Path,
        progress: Option<Arc<dyn ProgressReporter>>,
    ) -> Result<ProcessReport, QaError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))
            .map_err(ExtractionError::Unexpected)?;
        let fingerprint = format!("{:x}", Sha256::digest(&bytes));
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let chunks = self.extractor.process_document(path, progress).await?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts, EmbedTask::Document)
            .await
            .map_err(QaError::Embedding)?;

        // 문서는 한 번에 하나
        self.index.delete_all().await.map_err(QaError::Index)?;

        let ingested_at = chrono::Utc::now().to_rfc3339();
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            self.index
                .upsert(IndexEntry {
                    id: chunk.id.clone(),
                    embedding,
                    metadata: ChunkMetadata {
                        chunk_id: chunk.id.clone(),
                        text: chunk.text.clone(),
                        source: source.clone(),
                        fingerprint: fingerprint.clone(),
                        ingested_at: ingested_at.clone(),
                    },
                })
                .await
                .map_err(QaError::Index)?;
        }

        tracing::info!("Indexed {} chunks from {}", chunks.len(), source);

        Ok(ProcessReport {
            chunks_processed: chunks.len(),
            fingerprint,
            source,
        })
    }

    /// 기본 top_k 로 질문
    pub async fn ask(&self, question: &str) -> Result<AnswerWithSources, QaError> {
        self.ask_with_top_k(question, self.top_k).await
    }

    pub async fn ask_with_top_k(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<AnswerWithSources, QaError> {
        let query = self
            .embedder
            .embed(question, EmbedTask::Query)
            .await
            .map_err(QaError::Embedding)?;

        let matches = self
            .index
            .query(&query, top_k)
            .await
            .map_err(QaError::Index)?;

        if matches.is_empty() {
            return Ok(AnswerWithSources {
                answer: NO_MATCH_ANSWER.to_string(),
                provider: None,
                sources: vec![],
            });
        }

        let excerpts: Vec<&str> = matches.iter().map(|m| m.metadata.text.as_str()).collect();
        let prompt = build_prompt(question, &excerpts);

        let answer = self.generator.generate(&prompt).await.map_err(|e| {
            tracing::error!("Answer generation failed: {:#}", e);
            QaError::Generation(e)
        })?;

        let sources = matches
            .iter()
            .map(|m| Source {
                chunk_id: m.metadata.chunk_id.clone(),
                snippet: snippet(&m.metadata.text),
            })
            .collect();

        Ok(AnswerWithSources {
            answer: answer.text,
            provider: Some(answer.provider),
            sources,
        })
    }

    pub async fn status(&self) -> Result<IndexStats, QaError> {
        self.index.stats().await.map_err(QaError::Index)
    }
}

/// 앞 200자 (+ "...")
fn snippet(text: &str) -> String {
    if text.chars().count() > SNIPPET_CHARS {
        let head: String = text.chars().take(SNIPPET_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
