//! 페이지 렌더링
//!
//! pdfium 으로 페이지를 하나씩 비트맵으로 만들어 콜백에 넘깁니다.
//! 페이지 이미지는 콜백이 끝나면 바로 해제됩니다.

use std::path::Path;

use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::*;

use super::ExtractionError;

/// 렌더링된 페이지
pub struct PageImage {
    /// 0부터 시작하는 페이지 인덱스
    pub index: usize,
    pub total: usize,
    pub image: DynamicImage,
}

/// 페이지 콜백. 에러를 돌려주면 렌더링을 멈춥니다.
pub type PageSink<'a> = dyn FnMut(PageImage) -> Result<(), ExtractionError> + 'a;

/// PDF → 페이지 비트맵
pub trait PageRenderer: Send + Sync {
    /// 모든 페이지를 순서대로 렌더링해 `sink` 에 넘김
    ///
    /// 렌더링에 실패한 페이지가 있으면 `ExtractionError::Render` 로 중단합니다.
    fn render_pages(
        &self,
        path: &Path,
        scale: f32,
        sink: &mut PageSink<'_>,
    ) -> Result<(), ExtractionError>;
}

/// pdfium 기반 렌더러
///
/// 실행 파일 옆의 pdfium 라이브러리를 먼저 찾고, 없으면 시스템 라이브러리를 씁니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumRenderer;

impl PdfiumRenderer {
    fn bind() -> Result<Pdfium, PdfiumError> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())?;
        Ok(Pdfium::new(bindings))
    }

    /// pdfium 바인딩 가능 여부
    pub fn probe() -> bool {
        match Self::bind() {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("pdfium unavailable: {}", e);
                false
            }
        }
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_pages(
        &self,
        path: &Path,
        scale: f32,
        sink: &mut PageSink<'_>,
    ) -> Result<(), ExtractionError> {
        let open_error = |message: String| ExtractionError::Render { page: 1, message };

        let pdfium = Self::bind().map_err(|e| open_error(format!("pdfium unavailable: {}", e)))?;
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| open_error(format!("cannot open {}: {}", path.display(), e)))?;

        let pages = document.pages();
        let total = pages.len() as usize;
        let config = PdfRenderConfig::new().scale_page_by_factor(scale);

        for (index, page) in pages.iter().enumerate() {
            let render_error = |message: String| ExtractionError::Render {
                page: index + 1,
                message,
            };

            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| render_error(e.to_string()))?;
            let width = bitmap.width() as u32;
            let height = bitmap.height() as u32;
            let rgba = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes())
                .ok_or_else(|| render_error(format!("bitmap buffer does not match {}x{}", width, height)))?;

            tracing::debug!("Rendered page {}/{} at {}x{}", index + 1, total, width, height);

            sink(PageImage {
                index,
                total,
                image: DynamicImage::ImageRgba8(rgba),
            })?;
        }

        Ok(())
    }
}
