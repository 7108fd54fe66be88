//! Tesseract 엔진 어댑터 (leptess)
//!
//! `LepTess` 인스턴스는 스레드 간 공유할 수 없으므로 시도마다 새로 초기화합니다.
//! leptess 는 기본 엔진 모드(3)로 초기화되며, 다른 값은 로그만 남깁니다.

use std::io::Cursor;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use leptess::{LepTess, Variable};

use super::{RecognitionConfig, RecognitionEngine};

/// Tesseract 엔진
#[derive(Debug, Clone, Default)]
pub struct TesseractEngine {
    /// tessdata 디렉토리 (None = 시스템 기본값)
    data_path: Option<String>,
}

impl TesseractEngine {
    pub fn new(data_path: Option<String>) -> Self {
        Self { data_path }
    }

    fn init(&self, config: &RecognitionConfig) -> Result<LepTess> {
        LepTess::new(self.data_path.as_deref(), &config.language_spec()).with_context(|| {
            format!(
                "Failed to initialize Tesseract with '{}'. Install the traineddata (e.g. tesseract-ocr-kor)",
                config.language_spec()
            )
        })
    }

    /// 설정한 언어로 초기화 가능한지 확인
    pub fn probe(&self, config: &RecognitionConfig) -> Result<()> {
        self.init(config).map(|_| ())
    }
}

impl RecognitionEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &DynamicImage, config: &RecognitionConfig) -> Result<String> {
        if config.engine_mode != 3 {
            tracing::debug!(
                "leptess uses the default engine mode; requested --oem {} ignored",
                config.engine_mode
            );
        }

        let mut tess = self.init(config)?;
        tess.set_variable(
            Variable::TesseditPagesegMode,
            &config.page_seg_mode.to_string(),
        )
        .context("Failed to set page segmentation mode")?;

        // leptess 는 인코딩된 이미지 바이트를 받음
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .context("Failed to encode page image")?;

        tess.set_image_from_mem(png.get_ref())
            .context("Failed to hand image to Tesseract")?;

        let text = tess.get_utf8_text().context("Tesseract returned invalid UTF-8")?;
        Ok(text)
    }
}
