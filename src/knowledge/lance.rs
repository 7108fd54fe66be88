//! LanceDB Vector Index - 디스크 기반 벡터 검색
//!
//! 데이터 디렉토리 아래 `chunks.lance` 에 청크 임베딩과 메타데이터를 저장합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use super::vector::{
    ChunkMetadata, IndexEntry, IndexMatch, IndexStats, VectorIndex, EMBEDDING_DIMENSION,
};

/// 청크 테이블 이름
const TABLE_NAME: &str = "chunks";

/// 메타데이터 문자열 컬럼 (순서 고정)
const TEXT_COLUMNS: [&str; 6] = [
    "id",
    "chunk_id",
    "text",
    "source",
    "fingerprint",
    "ingested_at",
];

// ============================================================================
// LanceVectorIndex
// ============================================================================

/// LanceDB 벡터 인덱스 구현
pub struct LanceVectorIndex {
    db: Connection,
    dimension: usize,
}

impl LanceVectorIndex {
    /// 기본 차원(768)으로 열기
    pub async fn open(path: &Path) -> Result<Self> {
        Self::open_with_dimension(path, EMBEDDING_DIMENSION).await
    }

    pub async fn open_with_dimension(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db, dimension })
    }

    fn schema(&self) -> Schema {
        let mut fields: Vec<Field> = TEXT_COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, false))
            .collect();
        fields.push(Field::new(
            "embedding",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                self.dimension as i32,
            ),
            false,
        ));
        Schema::new(fields)
    }

    /// 엔트리를 Arrow RecordBatch로 변환
    fn entry_to_batch(&self, entry: &IndexEntry) -> Result<RecordBatch> {
        if entry.embedding.len() != self.dimension {
            anyhow::bail!(
                "Dimension mismatch: index expects {}, got {}",
                self.dimension,
                entry.embedding.len()
            );
        }

        let meta = &entry.metadata;
        let texts = [
            entry.id.as_str(),
            meta.chunk_id.as_str(),
            meta.text.as_str(),
            meta.source.as_str(),
            meta.fingerprint.as_str(),
            meta.ingested_at.as_str(),
        ];

        let mut columns: Vec<Arc<dyn Array>> = texts
            .iter()
            .map(|value| Arc::new(StringArray::from(vec![*value])) as Arc<dyn Array>)
            .collect();

        let values = Float32Array::from(entry.embedding.clone());
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embedding = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;
        columns.push(Arc::new(embedding));

        RecordBatch::try_new(Arc::new(self.schema()), columns)
            .context("Failed to create RecordBatch")
    }

    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.iter().any(|n| n == TABLE_NAME))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open chunk table")
    }
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn upsert(&self, entry: IndexEntry) -> Result<()> {
        let batch = self.entry_to_batch(&entry)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            let table = self.open_table().await?;
            table
                .delete(&format!("id = '{}'", escape_literal(&entry.id)))
                .await
                .context("Failed to replace existing vector")?;
            table
                .add(batches)
                .execute()
                .await
                .context("Failed to add vector to table")?;
        } else {
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        Ok(())
    }

    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<IndexMatch>> {
        if !self.table_exists().await {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;
        let results = table
            .vector_search(embedding.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(top_k)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = results.try_collect().await?;
        let mut matches = Vec::new();

        for batch in batches {
            let column = |name: &str| -> Result<&StringArray> {
                batch
                    .column_by_name(name)
                    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                    .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
            };

            let ids = column("id")?;
            let chunk_ids = column("chunk_id")?;
            let texts = column("text")?;
            let sources = column("source")?;
            let fingerprints = column("fingerprint")?;
            let ingested = column("ingested_at")?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                matches.push(IndexMatch {
                    id: ids.value(i).to_string(),
                    // 코사인 거리 → 유사도
                    score: 1.0 - distances.value(i),
                    metadata: ChunkMetadata {
                        chunk_id: chunk_ids.value(i).to_string(),
                        text: texts.value(i).to_string(),
                        source: sources.value(i).to_string(),
                        fingerprint: fingerprints.value(i).to_string(),
                        ingested_at: ingested.value(i).to_string(),
                    },
                });
            }
        }

        Ok(matches)
    }

    async fn delete_all(&self) -> Result<()> {
        if self.table_exists().await {
            self.db
                .drop_table(TABLE_NAME)
                .await
                .context("Failed to drop chunk table")?;
            tracing::debug!("Dropped LanceDB table '{}'", TABLE_NAME);
        }
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats> {
        if !self.table_exists().await {
            return Ok(IndexStats::default());
        }

        let table = self.open_table().await?;
        let count = table.count_rows(None).await.context("Failed to count rows")?;

        Ok(IndexStats {
            count,
            dimension: if count > 0 { self.dimension } else { 0 },
            fullness: 0.0,
        })
    }
}

/// SQL 문자열 리터럴 이스케이프
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

// ============================================================================
// Tests
// ============================================================================
