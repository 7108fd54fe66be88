//! 문서 추출 오케스트레이터
//!
//! PDF 한 건을 정규화된 텍스트와 청크로 만듭니다.
//!
//! ```text
//! Init → LayerExtract → (Accept | OcrExtract) → Normalize → Done
//!   └──────────────────────┴──────────────────────┴──→ Failed
//! ```
//!
//! - OCR 이 켜져 있고 사용 가능하면 기본 정책(`OcrPolicy::Always`)은 곧장 OCR 로 갑니다.
//! - OCR 이 꺼져 있거나 사용할 수 없으면 텍스트 레이어를 그대로 받아들입니다.
//! - 페이지 렌더링 실패는 문서 전체 실패입니다.
//! - 정규화 후 텍스트가 비면 `NoExtractableText` (OCR 을 요청했지만 못 썼다면 `OcrUnavailable`).
//!
//! OCR 루프는 `spawn_blocking` 한 번 안에서 페이지 순서대로 돕니다.

pub mod capability;
pub mod layer;
pub mod render;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::config::{OcrPolicy, Settings};
use crate::knowledge::{load_token_counter, Chunk, Chunker};
use crate::ocr::{
    CandidateSelector, PreprocessConfig, Preprocessor, QualityScorer, RecognitionConfig,
    RecognitionEngine,
};
use crate::text::TextNormalizer;

pub use capability::{probe, Capabilities, Probe};
pub use layer::{PdfExtractLayer, TextLayer};
pub use render::{PageImage, PageRenderer, PageSink, PdfiumRenderer};

// ============================================================================
// Errors
// ============================================================================

/// 추출 실패 종류 (사용자 조치가 서로 다름)
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error(
        "OCR is not available and the PDF has no usable text layer. \
         Install Tesseract with Korean data (kor+eng) and pdfium, or set GEMINI_API_KEY"
    )]
    OcrUnavailable,

    #[error("No extractable text found in the document")]
    NoExtractableText,

    #[error("Failed to render page {page}: {message}")]
    Render { page: usize, message: String },

    #[error("Extraction cancelled")]
    Cancelled,

    #[error("Unexpected processing error: {0:#}")]
    Unexpected(#[from] anyhow::Error),
}

// ============================================================================
// State / Progress / Cancellation
// ============================================================================

/// 오케스트레이터 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    Init,
    LayerExtract,
    Accept,
    OcrExtract,
    Normalize,
    Done,
    Failed,
}

impl fmt::Display for ExtractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 진행 상황 알림
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// 0 ~ 100, 단조 증가
    pub percent: u8,
    pub label: String,
    /// 1부터 시작 (페이지 단계가 아니면 0)
    pub current_page: usize,
    pub total_pages: usize,
}

/// 진행 상황 수신자
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F> ProgressReporter for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// 채널로 진행 상황 전달
pub struct ProgressChannel(pub UnboundedSender<ProgressUpdate>);

impl ProgressReporter for ProgressChannel {
    fn report(&self, update: ProgressUpdate) {
        // 수신 측이 사라져도 추출은 계속
        let _ = self.0.send(update);
    }
}

/// 비내림차순 보장 래퍼
struct ProgressTracker {
    reporter: Option<Arc<dyn ProgressReporter>>,
    last: u8,
}

impl ProgressTracker {
    fn new(reporter: Option<Arc<dyn ProgressReporter>>) -> Self {
        Self { reporter, last: 0 }
    }

    fn emit(&mut self, percent: u8, label: impl Into<String>, current_page: usize, total_pages: usize) {
        let percent = percent.clamp(self.last, 100);
        self.last = percent;
        if let Some(reporter) = &self.reporter {
            reporter.report(ProgressUpdate {
                percent,
                label: label.into(),
                current_page,
                total_pages,
            });
        }
    }
}

/// 공유 취소 플래그
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Options
// ============================================================================

/// 추출 옵션
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    pub use_ocr: bool,
    pub policy: OcrPolicy,
    pub render_scale: f32,
    pub recognition: RecognitionConfig,
    pub preprocess: PreprocessConfig,
    pub low_confidence: f32,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for ExtractionOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            use_ocr: settings.use_ocr,
            policy: settings.ocr_policy,
            render_scale: settings.render_scale,
            recognition: settings.recognition.clone(),
            preprocess: settings.preprocess.clone(),
            low_confidence: settings.low_confidence,
        }
    }
}

// ============================================================================
// DocumentExtractor
// ============================================================================

/// PDF → 정규화 텍스트 → 청크
pub struct DocumentExtractor {
    capabilities: Capabilities,
    engine: Option<Arc<dyn RecognitionEngine>>,
    renderer: Arc<dyn PageRenderer>,
    layer: Arc<dyn TextLayer>,
    normalizer: Arc<TextNormalizer>,
    chunker: Chunker,
    options: ExtractionOptions,
}

impl DocumentExtractor {
    pub fn new(
        probe: Probe,
        renderer: Arc<dyn PageRenderer>,
        layer: Arc<dyn TextLayer>,
        normalizer: Arc<TextNormalizer>,
        chunker: Chunker,
    ) -> Self {
        Self {
            capabilities: probe.capabilities,
            engine: probe.engine,
            renderer,
            layer,
            normalizer,
            chunker,
            options: ExtractionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExtractionOptions) -> Self {
        self.options = options;
        self
    }

    /// 설정으로 구성 (기능 탐지 포함)
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let normalizer = TextNormalizer::from_rules_file(settings.rules_path.as_deref())?;
        let counter = load_token_counter(settings.tokenizer_path.as_deref())?;

        Ok(Self::new(
            probe(settings),
            Arc::new(PdfiumRenderer),
            Arc::new(PdfExtractLayer),
            Arc::new(normalizer),
            Chunker::new(settings.chunk_tokens, counter),
        )
        .with_options(ExtractionOptions::from(settings)))
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// PDF 를 청크 목록으로
    pub async fn process_document(
        &self,
        path: &Path,
        progress: Option<Arc<dyn ProgressReporter>>,
    ) -> Result<Vec<Chunk>, ExtractionError> {
        self.process_document_with_cancel(path, progress, &CancelFlag::new())
            .await
    }

    pub async fn process_document_with_cancel(
        &self,
        path: &Path,
        progress: Option<Arc<dyn ProgressReporter>>,
        cancel: &CancelFlag,
    ) -> Result<Vec<Chunk>, ExtractionError> {
        let (text, mut tracker) = self.run(path, progress, cancel).await?;

        tracker.emit(95, "청크 분할", 0, 0);
        let chunks = self.chunker.chunk(&text);
        tracker.emit(100, "완료", 0, 0);

        tracing::info!("Extracted {} chunks from {:?}", chunks.len(), path);
        Ok(chunks)
    }

    /// PDF 를 정규화된 텍스트로
    pub async fn extract_text(
        &self,
        path: &Path,
        progress: Option<Arc<dyn ProgressReporter>>,
    ) -> Result<String, ExtractionError> {
        let (text, mut tracker) = self.run(path, progress, &CancelFlag::new()).await?;
        tracker.emit(100, "완료", 0, 0);
        Ok(text)
    }

    async fn run(
        &self,
        path: &Path,
        progress: Option<Arc<dyn ProgressReporter>>,
        cancel: &CancelFlag,
    ) -> Result<(String, ProgressTracker), ExtractionError> {
        let mut tracker = ProgressTracker::new(progress);
        let result = self.transition(path, &mut tracker, cancel).await;

        match result {
            Ok(text) => {
                trace_state(ExtractionState::Done);
                Ok((text, tracker))
            }
            Err(e) => {
                trace_state(ExtractionState::Failed);
                tracing::warn!("Extraction of {:?} failed: {}", path, e);
                Err(e)
            }
        }
    }

    async fn transition(
        &self,
        path: &Path,
        tracker: &mut ProgressTracker,
        cancel: &CancelFlag,
    ) -> Result<String, ExtractionError> {
        trace_state(ExtractionState::Init);
        tracker.emit(0, "시작", 0, 0);

        let ocr_requested = self.options.use_ocr;
        let ocr_engine = self
            .engine
            .clone()
            .filter(|_| ocr_requested && self.capabilities.ocr_ready());
        let ocr_available = ocr_engine.is_some();

        let raw = match (&ocr_engine, self.options.policy) {
            (Some(engine), OcrPolicy::Always) => {
                self.ocr_extract(path, engine.clone(), tracker, cancel).await?
            }
            _ => {
                trace_state(ExtractionState::LayerExtract);
                tracker.emit(5, "텍스트 레이어 추출", 0, 0);
                let layer_text = self.layer_extract(path, ocr_available).await?;

                let insufficient = match self.options.policy {
                    OcrPolicy::WhenLayerInsufficient { min_chars } => {
                        layer_text.trim().chars().count() < min_chars
                    }
                    OcrPolicy::Always => false,
                };

                match ocr_engine {
                    Some(engine) if insufficient => {
                        tracing::info!(
                            "Text layer has {} chars, running OCR",
                            layer_text.trim().chars().count()
                        );
                        self.ocr_extract(path, engine, tracker, cancel).await?
                    }
                    _ => {
                        trace_state(ExtractionState::Accept);
                        tracker.emit(80, "텍스트 레이어 사용", 0, 0);
                        layer_text
                    }
                }
            }
        };

        trace_state(ExtractionState::Normalize);
        tracker.emit(90, "텍스트 정규화", 0, 0);
        let text = self.normalizer.normalize(&raw);

        if text.is_empty() {
            if ocr_requested && !ocr_available {
                return Err(ExtractionError::OcrUnavailable);
            }
            return Err(ExtractionError::NoExtractableText);
        }

        Ok(text)
    }

    async fn layer_extract(
        &self,
        path: &Path,
        ocr_available: bool,
    ) -> Result<String, ExtractionError> {
        let layer = self.layer.clone();
        let owned = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || layer.extract_pages(&owned))
            .await
            .map_err(|e| anyhow::anyhow!("Text layer task failed: {}", e))?;

        match result {
            Ok(pages) => Ok(pages.join("\n")),
            // OCR 로 넘어갈 수 있으면 레이어 실패는 빈 레이어로 취급
            Err(e) if ocr_available => {
                tracing::warn!("Text layer extraction failed: {:#}", e);
                Ok(String::new())
            }
            Err(e) => Err(ExtractionError::Unexpected(e)),
        }
    }

    async fn ocr_extract(
        &self,
        path: &Path,
        engine: Arc<dyn RecognitionEngine>,
        tracker: &mut ProgressTracker,
        cancel: &CancelFlag,
    ) -> Result<String, ExtractionError> {
        trace_state(ExtractionState::OcrExtract);

        if cancel.is_cancelled() {
            return Err(ExtractionError::Cancelled);
        }
        tracker.emit(10, "페이지 렌더링", 0, 0);

        let selector = CandidateSelector::new(
            engine,
            Preprocessor::new(self.options.preprocess.clone()),
            QualityScorer::default(),
            self.options.recognition.clone(),
        )
        .with_low_confidence(self.options.low_confidence);

        let job = OcrJob {
            path: path.to_path_buf(),
            scale: self.options.render_scale,
            renderer: self.renderer.clone(),
            selector,
            cancel: cancel.clone(),
            tracker: std::mem::replace(tracker, ProgressTracker::new(None)),
        };

        let (result, returned) = tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(|e| anyhow::anyhow!("OCR task failed: {}", e))?;
        *tracker = returned;
        result
    }
}

/// 블로킹 스레드에서 도는 OCR 작업
struct OcrJob {
    path: PathBuf,
    scale: f32,
    renderer: Arc<dyn PageRenderer>,
    selector: CandidateSelector,
    cancel: CancelFlag,
    tracker: ProgressTracker,
}

impl OcrJob {
    fn run(mut self) -> (Result<String, ExtractionError>, ProgressTracker) {
        let mut pages: Vec<String> = Vec::new();
        let selector = &self.selector;
        let cancel = &self.cancel;
        let tracker = &mut self.tracker;

        let outcome = self
            .renderer
            .render_pages(&self.path, self.scale, &mut |page: PageImage| {
                if cancel.is_cancelled() {
                    tracing::info!("Cancelled before page {}", page.index + 1);
                    return Err(ExtractionError::Cancelled);
                }

                let selection = selector.select(page.index, &page.image);
                pages.push(selection.into_text());

                let done = page.index + 1;
                let percent = 10 + (70 * done / page.total.max(1)) as u8;
                tracker.emit(
                    percent,
                    format!("페이지 {}/{} 인식", done, page.total),
                    done,
                    page.total,
                );
                Ok(())
            });

        let result = outcome.map(|()| pages.join("\n"));
        (result, self.tracker)
    }
}

fn trace_state(state: ExtractionState) {
    tracing::debug!("Extraction state: {}", state);
}

// ============================================================================
// Tests
// ============================================================================
