//! Knowledge 모듈 - 청킹과 벡터 인덱스
//!
//! - tokenizer: 토큰 카운터 (cl100k_base / HuggingFace)
//! - chunker: 토큰 예산 기반 문장 단위 청킹
//! - vector: 벡터 인덱스 트레이트 + 메모리 구현
//! - lance: LanceDB 디스크 인덱스

mod chunker;
mod lance;
mod tokenizer;
mod vector;

// Re-exports
pub use chunker::{sentence_units, Chunk, Chunker, DEFAULT_CHUNK_TOKENS};
pub use lance::LanceVectorIndex;
pub use tokenizer::{load_token_counter, HfTokenCounter, TokenCounter, WhitespaceTokenCounter};
pub use vector::{
    cosine_similarity, ChunkMetadata, IndexEntry, IndexMatch, IndexStats, MemoryVectorIndex,
    VectorIndex, EMBEDDING_DIMENSION,
};
