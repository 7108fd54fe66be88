//! Text Chunking Module
//!
//! 정규화된 문서 텍스트를 토큰 예산 안의 청크로 묶습니다.
//!
//! 1. 이름 패턴 단위를 먼저 추출 (중복 제거, 첫 등장 순)
//! 2. 공백이나 끝이 뒤따르는 `.`, `!`, `?` 로 나눈 일반 단위 중 4글자 이상만 원래 순서대로
//!    (`90.01.01`, `Node.js` 는 쪼개지 않음)
//! 3. 이어 붙인 텍스트의 토큰 수가 예산 이하인 동안 탐욕적으로 채움
//!
//! 단위는 절대 쪼개지 않습니다. 한 단위가 예산보다 크면 단독 청크가 됩니다.

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::tokenizer::TokenCounter;
use crate::text::NAME_UNIT_PATTERN;

/// 기본 토큰 예산
pub const DEFAULT_CHUNK_TOKENS: usize = 500;

/// 일반 단위 최소 길이 (이 값 초과만 유지)
const MIN_UNIT_CHARS: usize = 3;

static SENTENCE_DELIMITER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+(?:\s+|$)").expect("sentence delimiter is valid"));

// ============================================================================
// Chunk
// ============================================================================

/// 벡터 인덱스로 넘기는 청크
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 안정적인 문자열 ID (`chunk_0`, `chunk_1`, ...)
    pub id: String,
    /// 0부터 시작하는 연속 순번
    pub index: usize,
    pub text: String,
    pub token_count: usize,
}

impl Chunk {
    fn new(index: usize, text: String, token_count: usize) -> Self {
        Self {
            id: format!("chunk_{}", index),
            index,
            text,
            token_count,
        }
    }
}

// ============================================================================
// Chunker
// ============================================================================

/// 토큰 예산 기반 문장 단위 청커
#[derive(Clone)]
pub struct Chunker {
    budget: usize,
    counter: Arc<dyn TokenCounter>,
}

impl Chunker {
    pub fn new(budget: usize, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            budget: budget.max(1),
            counter,
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// 텍스트를 청크로 분할
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let units = sentence_units(text);
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0;

        for unit in units {
            if current.is_empty() {
                current_tokens = self.counter.count(&unit);
                current = unit;
                continue;
            }

            let candidate = format!("{} {}", current, unit);
            let candidate_tokens = self.counter.count(&candidate);

            if candidate_tokens <= self.budget {
                current = candidate;
                current_tokens = candidate_tokens;
            } else {
                let index = chunks.len();
                chunks.push(Chunk::new(index, current, current_tokens));
                current_tokens = self.counter.count(&unit);
                current = unit;
            }
        }

        if !current.is_empty() {
            let index = chunks.len();
            chunks.push(Chunk::new(index, current, current_tokens));
        }

        let oversized = chunks
            .iter()
            .filter(|c| c.token_count > self.budget)
            .count();
        if oversized > 0 {
            tracing::debug!(
                "{} chunk(s) exceed the {}-token budget with a single unit",
                oversized,
                self.budget
            );
        }

        tracing::debug!(
            "Chunked {} chars into {} chunks ({})",
            text.chars().count(),
            chunks.len(),
            self.counter.name()
        );
        chunks
    }
}

/// 문장 단위 추출 (이름 단위 → 일반 단위)
pub fn sentence_units(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut units = Vec::new();

    for m in NAME_UNIT_PATTERN.find_iter(text) {
        let name = m.as_str().trim().to_string();
        if seen.insert(name.clone()) {
            units.push(name);
        }
    }

    for span in SENTENCE_DELIMITER.split(text) {
        let span = span.trim();
        if span.chars().count() > MIN_UNIT_CHARS && !seen.contains(span) {
            units.push(span.to_string());
        }
    }

    units
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::tokenizer::{load_token_counter, WhitespaceTokenCounter};
    use crate::text::TextNormalizer;

    fn chunker(budget: usize) -> Chunker {
        Chunker::new(budget, Arc::new(WhitespaceTokenCounter))
    }

    #[test]
    fn test_empty_text() {
        assert!(chunker(10).chunk("").is_empty());
        assert!(chunker(10).chunk("... !!! ??").is_empty());
    }

    #[test]
    fn test_three_units_fill_budget_exactly() {
        let text = "one two three. four five six. seven eight nine.";
        let chunks = chunker(9).chunk(text);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "chunk_0");
        assert_eq!(chunks[0].token_count, 9);
        assert_eq!(
            chunks[0].text,
            "one two three four five six seven eight nine"
        );
    }

    #[test]
    fn test_budget_respected_and_ids_dense() {
        let text = "alpha beta gamma. delta epsilon zeta. eta theta iota. kappa lambda mu. nu xi omicron.";
        let chunks = chunker(6).chunk(text);

        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.id, format!("chunk_{}", i));
            assert!(chunk.token_count <= 6);
            assert_eq!(
                chunk.token_count,
                WhitespaceTokenCounter.count(&chunk.text)
            );
        }
    }

    #[test]
    fn test_oversized_unit_is_not_split() {
        let text = "short unit here. this single sentence has far too many words for the budget. tail end";
        let chunks = chunker(4).chunk(text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks[1].text,
            "this single sentence has far too many words for the budget"
        );
        assert!(chunks[1].token_count > 4);
    }

    #[test]
    fn test_short_units_dropped() {
        let units = sentence_units("네. 좋아요! 경력 사항 요약. ok?");
        assert_eq!(units, vec!["경력 사항 요약".to_string()]);
    }

    #[test]
    fn test_names_first_and_deduplicated() {
        let text = "지원자 목록. 김철수 (90.01.01) 경력 사항. 김철수 (90.01.01) 추가 기록";
        let units = sentence_units(text);

        assert_eq!(units[0], "김철수 (90.01.01)");
        assert_eq!(units.iter().filter(|u| u.as_str() == "김철수 (90.01.01)").count(), 1);
        assert_eq!(units[1], "지원자 목록");
    }

    #[test]
    fn test_dates_and_dotted_terms_stay_whole() {
        let units = sentence_units("김철수 (90.01.01) Node.js 개발. 다음 문장입니다.");
        assert_eq!(units[0], "김철수 (90.01.01)");
        assert_eq!(units[1], "김철수 (90.01.01) Node.js 개발");
        assert_eq!(units[2], "다음 문장입니다");
    }

    #[test]
    fn test_name_unit_not_duplicated_by_generic_split() {
        let units = sentence_units("남궁민수. 경력 본문입니다.");
        assert_eq!(
            units,
            vec!["남궁민수".to_string(), "경력 본문입니다".to_string()]
        );
    }

    #[test]
    fn test_default_budget_on_normalized_korean() {
        let sentence = "저는 백 엔드 개발자로 오 년간 결제 시스템을 운영했습니다. ";
        let normalized = TextNormalizer::new().unwrap().normalize(&sentence.repeat(200));
        let counter = load_token_counter(None).unwrap();
        let chunks = Chunker::new(DEFAULT_CHUNK_TOKENS, counter.clone()).chunk(&normalized);

        assert!(chunks.len() > 1, "got {} chunk(s)", chunks.len());
        for chunk in &chunks {
            assert!(chunk.token_count <= DEFAULT_CHUNK_TOKENS);
            assert_eq!(chunk.token_count, counter.count(&chunk.text));
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn sentence() -> impl Strategy<Value = String> {
            proptest::collection::vec("[a-z]{1,6}", 1..10).prop_map(|words| words.join(" "))
        }

        fn document() -> impl Strategy<Value = String> {
            proptest::collection::vec(sentence(), 0..20).prop_map(|s| s.join(". "))
        }

        proptest! {
            #[test]
            fn ids_dense_and_budget_respected(text in document(), budget in 1usize..30) {
                let chunks = chunker(budget).chunk(&text);
                let units = sentence_units(&text);

                for (i, chunk) in chunks.iter().enumerate() {
                    prop_assert_eq!(chunk.index, i);
                    prop_assert_eq!(&chunk.id, &format!("chunk_{}", i));
                    prop_assert_eq!(chunk.token_count, WhitespaceTokenCounter.count(&chunk.text));
                    if chunk.token_count > budget {
                        prop_assert!(units.contains(&chunk.text), "oversized chunk is not a single unit");
                    }
                }
            }
        }
    }
}
