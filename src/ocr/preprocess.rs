//! OCR 전처리
//!
//! 순서: 그레이스케일 → 해상도 밴드 리사이즈 → 미디언 필터 →
//! 적응형 가우시안 이진화 → 대비/밝기 보정.
//!
//! 출력은 입력과 같은 `DynamicImage` 이므로 원본 이미지와 바꿔 쓸 수 있습니다.
//! 어떤 입력에도 실패하지 않으며, 처리할 수 없으면 원본을 그대로 돌려줍니다.

use std::panic::{catch_unwind, AssertUnwindSafe};

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::{gaussian_blur_f32, median_filter};
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration
// ============================================================================

/// 전처리 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// 목표 최소 폭 (미만이면 바이큐빅 확대)
    pub min_width: u32,
    /// 목표 최대 폭 (초과하면 축소)
    pub max_width: u32,
    /// 미디언 필터 반경 (커널 = 2r+1)
    pub median_radius: u32,
    /// 적응형 이진화 이웃 크기 (홀수)
    pub threshold_block: u32,
    /// 적응형 이진화 상수 오프셋
    pub threshold_offset: i16,
    /// 대비 배율
    pub contrast: f32,
    /// 밝기 배율
    pub brightness: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            min_width: 1500,
            max_width: 3000,
            median_radius: 3,
            threshold_block: 15,
            threshold_offset: 5,
            contrast: 1.3,
            brightness: 1.0,
        }
    }
}

// ============================================================================
// Preprocessor
// ============================================================================

/// 이미지 전처리기
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// 전처리 실행
    ///
    /// 빈 이미지나 내부 패닉 시 입력을 그대로 반환합니다.
    pub fn process(&self, image: &DynamicImage) -> DynamicImage {
        if image.width() == 0 || image.height() == 0 {
            tracing::warn!(
                "Skipping preprocessing for empty image ({}x{})",
                image.width(),
                image.height()
            );
            return image.clone();
        }

        match catch_unwind(AssertUnwindSafe(|| self.run(image))) {
            Ok(processed) => processed,
            Err(_) => {
                tracing::warn!("Preprocessing failed, using original image");
                image.clone()
            }
        }
    }

    fn run(&self, image: &DynamicImage) -> DynamicImage {
        let gray = to_gray(image);
        let resized = self.resize_to_band(gray);
        let denoised = median_filter(
            &resized,
            self.config.median_radius,
            self.config.median_radius,
        );
        let binary = adaptive_gaussian_threshold(
            &denoised,
            self.config.threshold_block,
            self.config.threshold_offset,
        );
        let adjusted = adjust_levels(binary, self.config.contrast, self.config.brightness);

        tracing::debug!(
            "Preprocessed {}x{} -> {}x{}",
            image.width(),
            image.height(),
            adjusted.width(),
            adjusted.height()
        );

        DynamicImage::ImageLuma8(adjusted)
    }

    /// 폭이 [min_width, max_width] 안에 들어오도록 리사이즈
    pub(crate) fn resize_to_band(&self, gray: GrayImage) -> GrayImage {
        let (width, height) = gray.dimensions();

        let (target_width, filter) = if width < self.config.min_width {
            (self.config.min_width, FilterType::CatmullRom)
        } else if width > self.config.max_width {
            // 축소에는 면적 평균에 가까운 필터
            (self.config.max_width, FilterType::Triangle)
        } else {
            return gray;
        };

        let scale = target_width as f64 / width as f64;
        let target_height = ((height as f64 * scale).round() as u32).max(1);

        image::imageops::resize(&gray, target_width, target_height, filter)
    }
}

// ============================================================================
// Image Operations
// ============================================================================

/// 그레이스케일 변환 (이미 8비트 단일 채널이면 그대로)
fn to_gray(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => other.to_luma8(),
    }
}

/// 적응형 가우시안 이진화
///
/// 픽셀 값이 (가우시안 가중 이웃 평균 - offset) 보다 크면 흰색, 아니면 검은색.
fn adaptive_gaussian_threshold(image: &GrayImage, block: u32, offset: i16) -> GrayImage {
    let block = if block < 3 { 3 } else { block | 1 };
    // 블록 크기에서 시그마 유도
    let sigma = 0.3 * ((block as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let local_mean = gaussian_blur_f32(image, sigma);

    let mut out = GrayImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let threshold = local_mean.get_pixel(x, y)[0] as i16 - offset;
        let value = if pixel[0] as i16 > threshold { 255 } else { 0 };
        out.put_pixel(x, y, Luma([value]));
    }
    out
}

/// 대비(평균 기준 확장)와 밝기(배율) 보정
fn adjust_levels(mut image: GrayImage, contrast: f32, brightness: f32) -> GrayImage {
    let pixel_count = (image.width() as u64 * image.height() as u64).max(1);
    let sum: u64 = image.pixels().map(|p| p[0] as u64).sum();
    let mean = (sum as f32 / pixel_count as f32).round();

    for pixel in image.pixels_mut() {
        let contrasted = mean + contrast * (pixel[0] as f32 - mean);
        let value = (contrasted * brightness).round().clamp(0.0, 255.0);
        pixel[0] = value as u8;
    }
    image
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn striped_rgb(width: u32, height: u32) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |x, _| {
            if (x / 4) % 2 == 0 {
                Rgb([20, 20, 20])
            } else {
                Rgb([230, 230, 230])
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_output_is_binary_gray() {
        let pre = Preprocessor::default();
        let out = pre.process(&striped_rgb(200, 40));

        let gray = out.as_luma8().expect("grayscale output");
        assert_eq!(gray.width(), 1500);
        assert!(gray.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_resize_band() {
        let pre = Preprocessor::default();

        let small = pre.resize_to_band(GrayImage::new(500, 100));
        assert_eq!(small.dimensions(), (1500, 300));

        let large = pre.resize_to_band(GrayImage::new(4000, 400));
        assert_eq!(large.dimensions(), (3000, 300));

        let in_band = pre.resize_to_band(GrayImage::new(2000, 10));
        assert_eq!(in_band.dimensions(), (2000, 10));
    }

    #[test]
    fn test_empty_image_returned_unmodified() {
        let pre = Preprocessor::default();
        let empty = DynamicImage::new_rgb8(0, 0);
        let out = pre.process(&empty);
        assert_eq!(out.width(), 0);
        assert!(out.as_rgb8().is_some());
    }

    #[test]
    fn test_adjust_levels_keeps_binary() {
        let mut img = GrayImage::new(4, 1);
        img.put_pixel(0, 0, Luma([255]));
        img.put_pixel(1, 0, Luma([255]));
        let out = adjust_levels(img, 1.3, 1.0);
        let values: Vec<u8> = out.pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![255, 255, 0, 0]);
    }

    #[test]
    fn test_threshold_separates_dark_text() {
        let mut img = GrayImage::from_pixel(31, 31, Luma([200]));
        img.put_pixel(15, 15, Luma([10]));
        let out = adaptive_gaussian_threshold(&img, 15, 5);
        assert_eq!(out.get_pixel(15, 15)[0], 0);
        assert_eq!(out.get_pixel(0, 0)[0], 255);
    }
}
