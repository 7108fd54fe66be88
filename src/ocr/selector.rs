//! 최적 후보 선택
//!
//! 1. 원본 비트맵을 기본 설정으로 인식하고 채점
//! 2. 점수가 임계값(0.3) 미만이면 전처리 비트맵도 인식하고 채점
//! 3. 더 높은 점수의 후보 채택
//! 4. 모든 시도가 실패하면 원본으로 한 번 더 시도하고 결과를 무조건 수용

use std::sync::Arc;

use image::DynamicImage;

use super::preprocess::Preprocessor;
use super::quality::QualityScorer;
use super::{RecognitionConfig, RecognitionEngine};

/// 저신뢰 임계값 기본값
pub const DEFAULT_LOW_CONFIDENCE: f32 = 0.3;

// ============================================================================
// Types
// ============================================================================

/// 후보 이미지 출처
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Original,
    Preprocessed,
}

impl std::fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandidateSource::Original => write!(f, "original"),
            CandidateSource::Preprocessed => write!(f, "preprocessed"),
        }
    }
}

/// 채점된 인식 후보
#[derive(Debug, Clone)]
pub struct Candidate {
    pub source: CandidateSource,
    pub config: RecognitionConfig,
    pub text: String,
    pub score: f32,
}

/// 페이지 선택 결과
#[derive(Debug, Clone)]
pub enum Selection {
    /// 채점된 후보 중 최고
    Scored(Candidate),
    /// 모든 시도 실패 후 채점 없이 수용한 결과
    Fallback { text: String },
}

impl Selection {
    pub fn text(&self) -> &str {
        match self {
            Selection::Scored(candidate) => &candidate.text,
            Selection::Fallback { text } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Selection::Scored(candidate) => candidate.text,
            Selection::Fallback { text } => text,
        }
    }

    pub fn score(&self) -> Option<f32> {
        match self {
            Selection::Scored(candidate) => Some(candidate.score),
            Selection::Fallback { .. } => None,
        }
    }
}

// ============================================================================
// CandidateSelector
// ============================================================================

/// 후보 선택기
pub struct CandidateSelector {
    engine: Arc<dyn RecognitionEngine>,
    preprocessor: Preprocessor,
    scorer: QualityScorer,
    config: RecognitionConfig,
    low_confidence: f32,
}

impl CandidateSelector {
    pub fn new(
        engine: Arc<dyn RecognitionEngine>,
        preprocessor: Preprocessor,
        scorer: QualityScorer,
        config: RecognitionConfig,
    ) -> Self {
        Self {
            engine,
            preprocessor,
            scorer,
            config,
            low_confidence: DEFAULT_LOW_CONFIDENCE,
        }
    }

    /// 저신뢰 임계값 변경
    pub fn with_low_confidence(mut self, threshold: f32) -> Self {
        self.low_confidence = threshold;
        self
    }

    /// 페이지 비트맵에서 최적 텍스트 선택
    pub fn select(&self, page: usize, image: &DynamicImage) -> Selection {
        let mut best = self.attempt(page, CandidateSource::Original, image);
        let original_score = best.as_ref().map(|c| c.score).unwrap_or(0.0);

        if original_score < self.low_confidence {
            tracing::debug!(
                "Page {}: original score {:.3} below {:.2}, trying preprocessed image",
                page + 1,
                original_score,
                self.low_confidence
            );

            let processed = self.preprocessor.process(image);
            if let Some(candidate) = self.attempt(page, CandidateSource::Preprocessed, &processed) {
                let better = best
                    .as_ref()
                    .map_or(true, |current| candidate.score > current.score);
                if better {
                    best = Some(candidate);
                }
            }
        }

        match best {
            Some(candidate) => {
                tracing::debug!(
                    "Page {}: selected {} candidate (score {:.3})",
                    page + 1,
                    candidate.source,
                    candidate.score
                );
                Selection::Scored(candidate)
            }
            None => self.fallback(page, image),
        }
    }

    /// 인식 1회 + 채점. 에러는 여기서 삼킵니다.
    fn attempt(
        &self,
        page: usize,
        source: CandidateSource,
        image: &DynamicImage,
    ) -> Option<Candidate> {
        match self.engine.recognize(image, &self.config) {
            Ok(text) => {
                let score = self.scorer.score(&text);
                Some(Candidate {
                    source,
                    config: self.config.clone(),
                    text,
                    score,
                })
            }
            Err(e) => {
                tracing::warn!(
                    "Page {}: {} recognition on {} image failed: {:#}",
                    page + 1,
                    self.engine.name(),
                    source,
                    e
                );
                None
            }
        }
    }

    /// 모든 시도 실패 시 마지막 무조건 시도
    fn fallback(&self, page: usize, image: &DynamicImage) -> Selection {
        let text = match self.engine.recognize(image, &self.config) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Page {}: fallback recognition failed: {:#}", page + 1, e);
                String::new()
            }
        };
        Selection::Fallback { text }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// 호출 순서대로 응답을 돌려주는 엔진 (None = 에러)
    struct SequenceEngine {
        responses: Mutex<VecDeque<Option<String>>>,
        calls: Mutex<Vec<bool>>,
    }

    impl SequenceEngine {
        fn new(responses: Vec<Option<&str>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
                calls: Mutex::new(Vec::new()),
            })
        }

        /// 호출별 입력이 전처리(그레이) 이미지였는지
        fn calls(&self) -> Vec<bool> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RecognitionEngine for SequenceEngine {
        fn name(&self) -> &str {
            "sequence"
        }

        fn recognize(
            &self,
            image: &DynamicImage,
            _config: &RecognitionConfig,
        ) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push(image.as_luma8().is_some());
            match self.responses.lock().unwrap().pop_front().flatten() {
                Some(text) => Ok(text),
                None => anyhow::bail!("engine failure"),
            }
        }
    }

    fn selector(engine: Arc<SequenceEngine>) -> CandidateSelector {
        CandidateSelector::new(
            engine,
            Preprocessor::default(),
            QualityScorer::default(),
            RecognitionConfig::default(),
        )
    }

    fn page_image() -> DynamicImage {
        DynamicImage::new_rgb8(20, 4)
    }

    #[test]
    fn test_high_score_skips_preprocessing() {
        let engine = SequenceEngine::new(vec![Some("이력서 김철수 Java Spring 경력")]);
        let selection = selector(engine.clone()).select(0, &page_image());

        assert!(selection.score().unwrap() >= 0.8);
        assert_eq!(engine.calls(), vec![false]);
        match selection {
            Selection::Scored(c) => assert_eq!(c.source, CandidateSource::Original),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_low_score_prefers_better_preprocessed() {
        let engine = SequenceEngine::new(vec![Some("@#$ %^& ~~"), Some("경력 사항 Java")]);
        let selection = selector(engine.clone()).select(0, &page_image());

        assert_eq!(engine.calls(), vec![false, true]);
        assert_eq!(selection.text(), "경력 사항 Java");
        match selection {
            Selection::Scored(c) => assert_eq!(c.source, CandidateSource::Preprocessed),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_keeps_original_when_preprocessed_is_worse() {
        let engine = SequenceEngine::new(vec![Some("a1 @@ ## 22"), Some("@@@@ ####")]);
        let scorer = QualityScorer::default();
        let original_score = scorer.score("a1 @@ ## 22");
        assert!(original_score < DEFAULT_LOW_CONFIDENCE);

        let selection = selector(engine.clone()).select(0, &page_image());
        assert_eq!(engine.calls().len(), 2);
        assert_eq!(selection.text(), "a1 @@ ## 22");
        assert_eq!(selection.score(), Some(original_score));
    }

    #[test]
    fn test_original_error_counts_as_zero() {
        let engine = SequenceEngine::new(vec![None, Some("문서 본문")]);
        let selection = selector(engine.clone()).select(0, &page_image());

        assert_eq!(engine.calls(), vec![false, true]);
        assert_eq!(selection.text(), "문서 본문");
    }

    #[test]
    fn test_all_errors_fall_back_to_unscored_original() {
        let engine = SequenceEngine::new(vec![None, None, Some("?!")]);
        let selection = selector(engine.clone()).select(0, &page_image());

        assert_eq!(engine.calls(), vec![false, true, false]);
        assert!(matches!(selection, Selection::Fallback { ref text } if text == "?!"));
    }

    #[test]
    fn test_fallback_failure_yields_empty_text() {
        let engine = SequenceEngine::new(vec![None, None, None]);
        let selection = selector(engine).select(3, &page_image());
        assert_eq!(selection.into_text(), "");
    }
}
