//! Vector Index - 벡터 인덱스 트레이트 및 메모리 구현
//!
//! 청크 임베딩을 저장하고 질문 임베딩과 가까운 청크를 찾습니다.
//! 한 번에 문서 하나만 다루므로 새 문서를 넣기 전에 `delete_all` 로 비웁니다.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// 벡터 임베딩 차원 (Gemini gemini-embedding-001 기본값)
pub const EMBEDDING_DIMENSION: usize = 768;

// ============================================================================
// Types
// ============================================================================

/// 청크 메타데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_id: String,
    pub text: String,
    /// 원본 파일 이름
    pub source: String,
    /// 원본 파일 SHA-256
    pub fingerprint: String,
    /// RFC 3339 적재 시각
    pub ingested_at: String,
}

/// 인덱스 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub id: String,
    /// 유사도 스코어 (높을수록 가까움)
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// 인덱스 통계
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub count: usize,
    /// 저장된 벡터 차원 (비어 있으면 0)
    pub dimension: usize,
    /// 용량 대비 사용률 (제한 없는 저장소는 0.0)
    pub fullness: f32,
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// 벡터 인덱스 공통 인터페이스
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 같은 id 가 있으면 교체
    async fn upsert(&self, entry: IndexEntry) -> Result<()>;

    /// 유사도 내림차순 상위 `top_k`
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<IndexMatch>>;

    async fn delete_all(&self) -> Result<()>;

    async fn stats(&self) -> Result<IndexStats>;
}

// ============================================================================
// MemoryVectorIndex
// ============================================================================

/// 프로세스 메모리 인덱스 (코사인 유사도, 전수 탐색)
#[derive(Debug, Default)]
pub struct MemoryVectorIndex {
    entries: RwLock<HashMap<String, IndexEntry>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, entry: IndexEntry) -> Result<()> {
        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.values().next() {
            if existing.embedding.len() != entry.embedding.len() {
                bail!(
                    "Dimension mismatch: index holds {}, got {}",
                    existing.embedding.len(),
                    entry.embedding.len()
                );
            }
        }

        entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<IndexMatch>> {
        let entries = self.entries.read().await;

        let mut matches: Vec<IndexMatch> = entries
            .values()
            .map(|entry| IndexMatch {
                id: entry.id.clone(),
                score: cosine_similarity(embedding, &entry.embedding),
                metadata: entry.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete_all(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let entries = self.entries.read().await;
        Ok(IndexStats {
            count: entries.len(),
            dimension: entries.values().next().map_or(0, |e| e.embedding.len()),
            fullness: 0.0,
        })
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================
