//! 인식 텍스트 품질 점수
//!
//! 정답 대비 정확도가 아니라 후보 간 비교용 휴리스틱입니다.
//! 가중치는 `QualityWeights` 로 조정할 수 있습니다.
//!
//! ```text
//! basic         = (한글 음절 + 라틴 문자) / 공백 제외 문자 수
//! name_score    = 0.2 × 이름 패턴 매칭 수
//! special_ratio = (단어 문자/공백/한글 외 문자) / 공백 제외 문자 수
//! special_score = max(0, 1 - 3 × special_ratio)
//! score         = min(1, 0.6 × basic + 0.3 × name_score + 0.1 × special_score)
//! ```

use serde::{Deserialize, Serialize};

use crate::text::{is_hangul_syllable, NAME_PATTERN};

/// 점수 가중치
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityWeights {
    pub basic: f32,
    pub name: f32,
    pub special: f32,
    /// 이름 매칭 1건당 점수
    pub per_name: f32,
    /// 특수문자 비율 페널티 배율
    pub special_penalty: f32,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            basic: 0.6,
            name: 0.3,
            special: 0.1,
            per_name: 0.2,
            special_penalty: 3.0,
        }
    }
}

/// 품질 채점기
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityScorer {
    weights: QualityWeights,
}

impl QualityScorer {
    pub fn new(weights: QualityWeights) -> Self {
        Self { weights }
    }

    /// 텍스트 점수 (0.0 ~ 1.0)
    pub fn score(&self, text: &str) -> f32 {
        let mut total = 0usize;
        let mut letters = 0usize;
        let mut special = 0usize;

        for c in text.chars().filter(|c| !c.is_whitespace()) {
            total += 1;
            if is_hangul_syllable(c) || c.is_ascii_alphabetic() {
                letters += 1;
            }
            if !(is_word_char(c) || is_hangul_syllable(c)) {
                special += 1;
            }
        }

        if total == 0 {
            return 0.0;
        }

        let basic = letters as f32 / total as f32;
        let name_score = self.weights.per_name * NAME_PATTERN.find_iter(text).count() as f32;
        let special_ratio = special as f32 / total as f32;
        let special_score = (1.0 - self.weights.special_penalty * special_ratio).max(0.0);

        let score = self.weights.basic * basic
            + self.weights.name * name_score
            + self.weights.special * special_score;

        score.clamp(0.0, 1.0)
    }
}

/// 정규식 `\w` 와 같은 기준의 단어 문자
#[inline]
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
