//! 실행 환경 기능 탐지
//!
//! 시작 시 한 번 OCR 엔진과 PDF 렌더러를 확인하고 결과를 추출기에 주입합니다.

use std::sync::Arc;

use serde::Serialize;

use super::render::PdfiumRenderer;
use crate::config::{OcrBackend, Settings};
use crate::ocr::{GeminiVisionEngine, RecognitionEngine};

/// 탐지된 기능
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities {
    /// OCR 엔진 초기화 가능
    pub recognition_available: bool,
    /// PDF 래스터라이저 바인딩 가능
    pub imaging_available: bool,
}

impl Capabilities {
    /// OCR 경로 전체 사용 가능 여부
    pub fn ocr_ready(&self) -> bool {
        self.recognition_available && self.imaging_available
    }
}

/// 탐지 결과 (기능 + 선택된 엔진)
pub struct Probe {
    pub capabilities: Capabilities,
    pub engine: Option<Arc<dyn RecognitionEngine>>,
}

/// 설정한 백엔드와 렌더러를 확인
pub fn probe(settings: &Settings) -> Probe {
    let engine = if settings.use_ocr {
        select_engine(settings)
    } else {
        None
    };

    let capabilities = Capabilities {
        recognition_available: engine.is_some(),
        imaging_available: PdfiumRenderer::probe(),
    };

    if !settings.use_ocr {
        tracing::info!("OCR disabled by configuration, using text layer only");
    } else if capabilities.ocr_ready() {
        tracing::info!(
            "OCR ready ({}, {})",
            engine.as_ref().map_or("-", |e| e.name()),
            settings.recognition
        );
    } else {
        tracing::warn!(
            "OCR unavailable (recognition: {}, imaging: {}), falling back to text layer",
            capabilities.recognition_available,
            capabilities.imaging_available
        );
    }

    Probe {
        capabilities,
        engine,
    }
}

fn select_engine(settings: &Settings) -> Option<Arc<dyn RecognitionEngine>> {
    match settings.ocr_backend {
        OcrBackend::Tesseract => tesseract_engine(settings),
        OcrBackend::GeminiVision => vision_engine(),
        OcrBackend::Auto => tesseract_engine(settings).or_else(vision_engine),
    }
}

#[cfg(feature = "tesseract")]
fn tesseract_engine(settings: &Settings) -> Option<Arc<dyn RecognitionEngine>> {
    let engine = crate::ocr::TesseractEngine::new(settings.tessdata_path.clone());
    match engine.probe(&settings.recognition) {
        Ok(()) => Some(Arc::new(engine)),
        Err(e) => {
            tracing::debug!("Tesseract unavailable: {:#}", e);
            None
        }
    }
}

#[cfg(not(feature = "tesseract"))]
fn tesseract_engine(settings: &Settings) -> Option<Arc<dyn RecognitionEngine>> {
    if settings.ocr_backend == OcrBackend::Tesseract {
        tracing::warn!("Built without the `tesseract` feature");
    }
    None
}

fn vision_engine() -> Option<Arc<dyn RecognitionEngine>> {
    let api_key = crate::config::get_api_key().ok()?;
    match GeminiVisionEngine::new(api_key) {
        Ok(engine) => Some(Arc::new(engine)),
        Err(e) => {
            tracing::debug!("Gemini Vision unavailable: {:#}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ocr_ready_needs_both() {
        let caps = Capabilities {
            recognition_available: true,
            imaging_available: false,
        };
        assert!(!caps.ocr_ready());
        assert!(!Capabilities::default().ocr_ready());
        assert!(Capabilities {
            recognition_available: true,
            imaging_available: true
        }
        .ocr_ready());
    }

    #[test]
    fn test_disabled_ocr_has_no_engine() {
        let settings = Settings {
            use_ocr: false,
            ..Settings::default()
        };
        let probe = probe(&settings);
        assert!(probe.engine.is_none());
        assert!(!probe.capabilities.recognition_available);
    }
}
