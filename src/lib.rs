//! pdfqa-ocr - PDF 질의응답 시스템
//!
//! 스캔 PDF 를 OCR 품질 파이프라인(전처리 → 다중 인식 → 품질 점수 → 선택 → 정규화)으로
//! 텍스트화하고, 청크 임베딩을 LanceDB 에 저장해 질문에 답합니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod extractor;
pub mod knowledge;
pub mod llm;
pub mod ocr;
pub mod qa;
pub mod text;

// Re-exports
pub use config::{get_api_key, has_api_key, OcrBackend, OcrPolicy, Settings};
pub use embedding::{EmbedTask, Embedder, GeminiEmbedder};
pub use extractor::{
    CancelFlag, Capabilities, DocumentExtractor, ExtractionError, ProgressChannel,
    ProgressReporter, ProgressUpdate,
};
pub use knowledge::{
    Chunk, Chunker, IndexMatch, IndexStats, LanceVectorIndex, MemoryVectorIndex, VectorIndex,
};
pub use llm::{Answer, AnswerGenerator, FallbackGenerator};
pub use qa::{AnswerWithSources, PdfQaSystem, ProcessReport, QaError};
pub use text::TextNormalizer;
