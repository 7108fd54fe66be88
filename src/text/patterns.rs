//! 한국어 이름 패턴
//!
//! 품질 점수와 청킹에서 공통으로 쓰는 성씨 목록과 정규식입니다.

use once_cell::sync::Lazy;
use regex::Regex;

/// 빈도 상위 한국 성씨 (고정 목록)
pub const SURNAMES: [&str; 40] = [
    "김", "이", "박", "최", "정", "강", "조", "윤", "장", "임", //
    "한", "오", "서", "신", "권", "황", "안", "송", "류", "전", //
    "홍", "고", "문", "양", "손", "배", "백", "허", "유", "남", //
    "심", "노", "하", "곽", "성", "차", "주", "우", "구", "민",
];

/// `(NN.NN.NN)` 형태의 생년월일 꼬리
const DATE_SUFFIX: &str = r"(?:\s*\(\d{2}\.\d{2}\.\d{2}\))?";

/// 성씨 + 1~3 글자 (+ 선택적 날짜). 문맥 경계 없이 매칭합니다.
///
/// 품질 점수용. 경계를 두지 않으므로 성씨로 시작하는 일반 단어도 잡힙니다.
pub static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        "(?:{})[가-힣]{{1,3}}{}",
        surname_alternation(),
        DATE_SUFFIX
    ))
    .expect("name pattern is valid")
});

/// 단어 경계로 둘러싼 이름 패턴 (청킹 단위 추출용)
pub static NAME_UNIT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(?:{})[가-힣]{{1,3}}\b{}",
        surname_alternation(),
        DATE_SUFFIX
    ))
    .expect("name unit pattern is valid")
});

/// 정규식 alternation 문자열 (`김|이|박|...`)
pub fn surname_alternation() -> String {
    SURNAMES.join("|")
}

/// 완성형 한글 음절 여부 (U+AC00..=U+D7A3)
#[inline]
pub fn is_hangul_syllable(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hangul_syllable_range() {
        assert!(is_hangul_syllable('가'));
        assert!(is_hangul_syllable('힣'));
        assert!(!is_hangul_syllable('ㄱ'));
        assert!(!is_hangul_syllable('a'));
    }

    #[test]
    fn test_name_pattern_with_date() {
        let m = NAME_PATTERN.find("담당자 김철수(90.01.01) 입니다").unwrap();
        assert_eq!(m.as_str(), "김철수(90.01.01)");
    }

    #[test]
    fn test_name_unit_requires_word_boundary() {
        assert!(NAME_UNIT_PATTERN.is_match("김철수 (90.01.01)"));
        // 한 단어 안에 묻힌 경우는 단위로 보지 않음
        assert!(!NAME_UNIT_PATTERN.is_match("대한민국김치찌개"));
    }

    #[test]
    fn test_surnames_unique() {
        let mut list = SURNAMES.to_vec();
        list.sort();
        list.dedup();
        assert_eq!(list.len(), SURNAMES.len());
    }
}
