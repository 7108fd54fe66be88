//! PDF 텍스트 레이어 추출
//!
//! pdf-extract 크레이트로 내장 텍스트를 읽습니다. 이미징 없이 동작합니다.

use std::path::Path;

use anyhow::{Context, Result};

/// 내장 텍스트 레이어 읽기
pub trait TextLayer: Send + Sync {
    /// 페이지 순서대로 텍스트 반환
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>>;
}

/// pdf-extract 기반 구현
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractLayer;

impl TextLayer for PdfExtractLayer {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

        let text = pdf_extract::extract_text_from_mem(&bytes)
            .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

        if text.trim().is_empty() {
            tracing::debug!("PDF has no text layer: {:?}", path);
            return Ok(vec![]);
        }

        Ok(split_pages(&text))
    }
}

/// 폼피드 문자(\x0c)로 페이지 분리
fn split_pages(text: &str) -> Vec<String> {
    text.split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
